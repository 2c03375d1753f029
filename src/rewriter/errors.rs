use crate::config::{ConfigError, VersionError};
use crate::files::FilesError;
use crate::mutation::MutationError;
use crate::safety::SafetyError;
use crate::tree::TreeError;
use std::path::PathBuf;
use thiserror::Error;

/// Everything a rule run can fail with.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error("{path}: {source}")]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<RuleError>,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no adapter or template engine handles {path}")]
    UnsupportedLanguage { path: PathBuf },

    #[error("file kept conflicting after {passes} passes")]
    Unsettled { passes: usize },

    #[error("helper '{name}' is not defined")]
    UnknownHelper { name: String },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Files(#[from] FilesError),

    #[error(transparent)]
    Safety(#[from] SafetyError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

impl RuleError {
    /// Attach the file being processed.
    pub fn in_file(self, path: impl Into<PathBuf>) -> Self {
        match self {
            RuleError::InFile { .. } => self,
            other => RuleError::InFile {
                path: path.into(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any file context peeled off.
    pub fn root_cause(&self) -> &RuleError {
        match self {
            RuleError::InFile { source, .. } => source.root_cause(),
            other => other,
        }
    }
}
