//! Node Rewriter: rule-driven structural source rewriting.
//!
//! Rules walk a syntax tree with a cursor, queue byte-span actions against
//! the source and hand them to a mutation session that sorts them, drops
//! overlapping ones deterministically and splices the survivors.
//!
//! # Architecture
//!
//! - [`mutation`]: actions, conflict detection and splicing
//! - [`tree`] and [`query`]: owned syntax trees, capability paths and matchers
//! - [`template`]: ERB and HAML encoded as Ruby, with offsets mapped back
//! - [`rewriter`]: the evaluation context, rule instances, rules and registry
//! - [`config`]: run configuration and declarative TOML rules
//!
//! # Safety
//!
//! - Every range is validated before the first splice
//! - Atomic file writes (tempfile + fsync + rename)
//! - Files changed on disk since they were read are not overwritten
//! - Added and removed files stay inside the configured root
//!
//! # Example
//!
//! ```no_run
//! use node_rewriter::query::NodePattern;
//! use node_rewriter::{Rule, Workspace};
//!
//! let workspace = Workspace::at("app")?;
//! let rule = Rule::builder("ruby", "rename_foobar")
//!     .body(|scope| {
//!         scope.within_files(&["**/*.rb"], |ctx| {
//!             ctx.within(&NodePattern::kind("class").attr("name", "Foobar"), |ctx| {
//!                 ctx.replace(&["name"], "Rejuvinate")
//!             })
//!         })
//!     })
//!     .register(workspace.registry());
//! rule.process(&workspace)?;
//! # Ok::<(), node_rewriter::RuleError>(())
//! ```

pub mod cache;
pub mod config;
pub mod files;
pub mod mutation;
pub mod pool;
pub mod query;
pub mod rewriter;
pub mod safety;
pub mod template;
pub mod tree;

// Re-exports
pub use config::{
    load_config_from_path, load_rules_from_path, ConfigError, Configuration, RuleFile,
    VersionError,
};
pub use mutation::{Action, ActionKind, MutationError, MutationResult, MutationSession, Strategy};
pub use rewriter::{
    Context, ExecutionOptions, Registry, Rule, RuleError, RuleScope, Warning, Workspace,
};
pub use safety::{RootGuard, SafetyError};
pub use tree::{Adapter, SyntaxTree, TreeError, TreeSitterAdapter};
