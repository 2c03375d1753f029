//! Run configuration and declarative rule files.

pub mod compile;
pub mod loader;
pub mod schema;
pub mod version;

pub use compile::{compile_rule, register_rules, DirectoryLoader};
pub use loader::{
    load_config_from_path, load_config_from_str, load_rules_from_path, load_rules_from_str,
    ConfigError,
};
pub use schema::{
    Configuration, DependencyGuard, GuardDefinition, OperationDefinition, QueryDefinition,
    RuleDefinition, RuleFile, RuntimeVersionGuard, ValidationError, ValidationIssue,
};
pub use version::{matches_requirement, VersionError};
