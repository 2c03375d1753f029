use super::MutationError;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use xxhash_rust::xxh3::xxh3_64;

/// The raw text of one file as it was read, plus its xxh3 digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceBuffer {
    path: PathBuf,
    raw: String,
    digest: u64,
}

impl SourceBuffer {
    pub fn read(path: impl Into<PathBuf>) -> Result<Self, MutationError> {
        let path = path.into();
        let raw = fs::read_to_string(&path).map_err(|source| MutationError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Self::from_text(path, raw))
    }

    pub fn from_text(path: impl Into<PathBuf>, raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let digest = xxh3_64(raw.as_bytes());
        Self {
            path: path.into(),
            raw,
            digest,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn digest(&self) -> u64 {
        self.digest
    }

    /// Replace the file contents with `new_source`.
    ///
    /// Refuses to write when the file no longer hashes to what was read.
    pub fn commit(&self, new_source: &str) -> Result<(), MutationError> {
        let on_disk = fs::read(&self.path).map_err(|source| MutationError::Io {
            path: self.path.clone(),
            source,
        })?;
        if xxh3_64(&on_disk) != self.digest {
            return Err(MutationError::ModifiedOnDisk {
                path: self.path.clone(),
            });
        }
        atomic_write(&self.path, new_source.as_bytes())
    }
}

/// Atomic file write: tempfile + fsync + rename, then bump mtime.
///
/// Either the full write succeeds or nothing changes.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<(), MutationError> {
    let io_err = |source: std::io::Error| MutationError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    // Same directory keeps the rename on one filesystem
    let mut temp = tempfile::NamedTempFile::new_in(parent).map_err(io_err)?;
    temp.write_all(content).map_err(io_err)?;
    temp.as_file().sync_all().map_err(io_err)?;
    temp.persist(path).map_err(|e| io_err(e.error))?;

    filetime::set_file_mtime(path, filetime::FileTime::now()).map_err(io_err)?;
    Ok(())
}
