//! File discovery relative to the configured root.

use globset::{Glob, GlobBuilder, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum FilesError {
    #[error("invalid glob pattern {pattern:?}: {source}")]
    InvalidGlob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

/// `*` and `?` stay within one path component; only `**` crosses
/// directories.
pub(crate) fn build_glob(pattern: &str) -> Result<Glob, globset::Error> {
    GlobBuilder::new(pattern).literal_separator(true).build()
}

pub(crate) fn compile_globset<S: AsRef<str>>(globs: &[S]) -> Result<GlobSet, FilesError> {
    let mut builder = GlobSetBuilder::new();
    for glob in globs {
        let pattern = glob.as_ref();
        builder.add(build_glob(pattern).map_err(|source| FilesError::InvalidGlob {
            pattern: pattern.to_string(),
            source,
        })?);
    }
    builder.build().map_err(|source| FilesError::InvalidGlob {
        pattern: globs
            .iter()
            .map(AsRef::as_ref)
            .collect::<Vec<_>>()
            .join(", "),
        source,
    })
}

/// Include/exclude filters shared by every glob in a run.
///
/// `only` and `skip` entries are either globs or plain path prefixes
/// (`app/models` covers everything beneath it).
#[derive(Debug, Clone)]
pub struct PathFilter {
    only: Vec<String>,
    only_set: GlobSet,
    skip: Vec<String>,
    skip_set: GlobSet,
}

impl PathFilter {
    pub fn new(only: &[String], skip: &[String]) -> Result<Self, FilesError> {
        Ok(Self {
            only: only.iter().map(|p| normalize_prefix(p)).collect(),
            only_set: compile_globset(only)?,
            skip: skip.iter().map(|p| normalize_prefix(p)).collect(),
            skip_set: compile_globset(skip)?,
        })
    }

    pub fn allows(&self, relative: &Path) -> bool {
        let only = self.only.is_empty()
            || self.only_set.is_match(relative)
            || self.only.iter().any(|prefix| relative.starts_with(prefix));
        let skipped = self.skip_set.is_match(relative)
            || self.skip.iter().any(|prefix| relative.starts_with(prefix));
        only && !skipped
    }
}

fn normalize_prefix(prefix: &str) -> String {
    prefix.trim_start_matches("./").trim_end_matches('/').to_string()
}

/// Files under `root` matching any of `patterns`, as root-relative paths in
/// sorted order.
///
/// Hidden `.git` directories are never entered.
pub fn glob<S: AsRef<str>>(
    root: &Path,
    patterns: &[S],
    filter: &PathFilter,
) -> Result<Vec<PathBuf>, FilesError> {
    let include = compile_globset(patterns)?;
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.file_name() != ".git");

    for entry in walker {
        let entry = entry.map_err(|source| FilesError::Walk {
            path: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if include.is_match(relative) && filter.allows(relative) {
            files.push(relative.to_path_buf());
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn workspace(files: &[&str]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in files {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        dir
    }

    fn no_filter() -> PathFilter {
        PathFilter::new(&[], &[]).unwrap()
    }

    #[test]
    fn finds_matching_files_in_sorted_order() {
        let dir = workspace(&["b.rb", "app/models/post.rb", "a.rb", "README.md"]);
        let files = glob(dir.path(), &["**/*.rb"], &no_filter()).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("a.rb"),
                PathBuf::from("app/models/post.rb"),
                PathBuf::from("b.rb"),
            ]
        );
    }

    #[test]
    fn only_and_skip_paths() {
        let dir = workspace(&[
            "app/models/post.rb",
            "app/models/concerns/tagged.rb",
            "lib/tasks.rb",
            "vendor/gem.rb",
        ]);
        let filter = PathFilter::new(
            &["app/".to_string()],
            &["app/models/concerns/**".to_string()],
        )
        .unwrap();
        let files = glob(dir.path(), &["**/*.rb"], &filter).unwrap();
        assert_eq!(files, vec![PathBuf::from("app/models/post.rb")]);

        let filter = PathFilter::new(&[], &["vendor".to_string()]).unwrap();
        let files = glob(dir.path(), &["**/*.rb"], &filter).unwrap();
        assert_eq!(files.len(), 3);
    }

    #[test]
    fn star_stays_in_one_directory() {
        let dir = workspace(&["a.rb", "lib/b.rb", "lib/deep/c.rb"]);
        let files = glob(dir.path(), &["*.rb"], &no_filter()).unwrap();
        assert_eq!(files, vec![PathBuf::from("a.rb")]);

        let files = glob(dir.path(), &["lib/*.rb"], &no_filter()).unwrap();
        assert_eq!(files, vec![PathBuf::from("lib/b.rb")]);

        let filter = PathFilter::new(&[], &["lib/*.rb".to_string()]).unwrap();
        let files = glob(dir.path(), &["**/*.rb"], &filter).unwrap();
        assert_eq!(
            files,
            vec![PathBuf::from("a.rb"), PathBuf::from("lib/deep/c.rb")]
        );
    }

    #[test]
    fn skips_git_directory() {
        let dir = workspace(&[".git/hooks/pre-commit.rb", "main.rb"]);
        let files = glob(dir.path(), &["**/*.rb"], &no_filter()).unwrap();
        assert_eq!(files, vec![PathBuf::from("main.rb")]);
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let dir = workspace(&[]);
        let err = glob(dir.path(), &["src/[*.rs"], &no_filter()).unwrap_err();
        assert!(matches!(err, FilesError::InvalidGlob { .. }));
    }
}
