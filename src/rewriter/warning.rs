use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// An advisory recorded by a rule body against a source line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Warning {
    pub file_path: PathBuf,
    /// 1-based line in the raw source
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}: {}", self.file_path.display(), self.line, self.message)
    }
}
