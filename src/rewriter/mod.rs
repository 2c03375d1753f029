//! Rules, their per-file instances and the evaluation context.
//!
//! A [`Rule`] is a named body registered in a [`Registry`]. Running it
//! against a [`Workspace`] globs files, binds the body to each file as a
//! [`RuleInstance`], evaluates it through a [`Context`] and hands the
//! resulting actions to a mutation session.

pub mod context;
pub mod errors;
pub mod guard;
pub mod instance;
pub mod registry;
pub mod rule;
pub mod warning;
pub mod workspace;

pub use context::{Context, Helper, Helpers, InsertAt, InsertOptions};
pub use errors::RuleError;
pub use guard::Guard;
pub use instance::{InstanceOutcome, InstanceSettings, RuleInstance};
pub use registry::{Registry, RuleLoader};
pub use rule::{ExecutionOptions, Rule, RuleBuilder, RuleScope};
pub use warning::Warning;
pub use workspace::Workspace;
