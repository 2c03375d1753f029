use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Keeps file-level effects (add, remove, rewrite) inside the configured root.
#[derive(Debug, Clone)]
pub struct RootGuard {
    /// Canonical root
    root: PathBuf,
    /// Canonical paths that are never written, even below the root
    forbidden_paths: Vec<PathBuf>,
}

#[derive(Error, Debug)]
pub enum SafetyError {
    #[error("Path is outside the root: {path} (root: {root})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    #[error("Path is in forbidden directory: {path} (forbidden: {forbidden})")]
    ForbiddenPath { path: PathBuf, forbidden: PathBuf },

    #[error("Failed to canonicalize path: {0}")]
    Canonicalize(#[from] std::io::Error),
}

impl RootGuard {
    pub fn new(root: impl AsRef<Path>) -> Result<Self, SafetyError> {
        let root = root.as_ref().canonicalize()?;

        let mut forbidden_paths = Vec::new();
        if let Some(home) = home::home_dir() {
            for dir in [".cargo/registry", ".cargo/git", ".rustup"] {
                if let Ok(path) = home.join(dir).canonicalize() {
                    forbidden_paths.push(path);
                }
            }
        }
        if let Ok(git_dir) = root.join(".git").canonicalize() {
            forbidden_paths.push(git_dir);
        }

        Ok(Self {
            root,
            forbidden_paths,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a root-relative path and check it stays inside the root.
    ///
    /// The target may not exist yet: the nearest existing ancestor is
    /// canonicalized so symlinked directories cannot escape.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, SafetyError> {
        let relative = relative.as_ref();
        let joined = if relative.is_absolute() {
            relative.to_path_buf()
        } else {
            self.root.join(relative)
        };
        let lexical = normalize(&joined);
        self.check(&lexical)?;

        let mut existing = lexical.as_path();
        let mut rest = Vec::new();
        while !existing.exists() {
            match (existing.parent(), existing.file_name()) {
                (Some(parent), Some(name)) => {
                    rest.push(name.to_os_string());
                    existing = parent;
                }
                _ => break,
            }
        }
        let mut canonical = existing.canonicalize()?;
        canonical.extend(rest.iter().rev());
        self.check(&canonical)?;
        Ok(canonical)
    }

    fn check(&self, path: &Path) -> Result<(), SafetyError> {
        if !path.starts_with(&self.root) {
            return Err(SafetyError::OutsideRoot {
                path: path.to_path_buf(),
                root: self.root.clone(),
            });
        }
        for forbidden in &self.forbidden_paths {
            if path.starts_with(forbidden) {
                return Err(SafetyError::ForbiddenPath {
                    path: path.to_path_buf(),
                    forbidden: forbidden.clone(),
                });
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub fn with_forbidden(
        root: impl AsRef<Path>,
        forbidden: Vec<PathBuf>,
    ) -> Result<Self, SafetyError> {
        Ok(Self {
            root: root.as_ref().canonicalize()?,
            forbidden_paths: forbidden,
        })
    }
}

/// Fold `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
