use super::Action;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MutationError {
    #[error("mutation actions are conflicted")]
    Conflict { conflicts: Vec<Action> },

    #[error("Invalid byte range: [{start}, {end}) in source of length {len}")]
    InvalidRange { start: usize, end: usize, len: usize },

    #[error("byte offset {offset} is not on a UTF-8 character boundary")]
    NotCharBoundary { offset: usize },

    #[error("{path} changed on disk since it was read")]
    ModifiedOnDisk { path: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
