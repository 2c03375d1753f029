//! Applicability guards, checked once before a rule touches any file.

use super::RuleError;
use crate::config::version::{normalize_version, parse_requirement};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const LOCKFILES: &[&str] = &["Cargo.lock", "Gemfile.lock"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Version pinned in a file such as `.ruby-version` or `rust-toolchain`.
    RuntimeVersion { file: PathBuf, requirement: String },
    /// Locked version of a dependency. Without an explicit lockfile the
    /// first of `Cargo.lock` and `Gemfile.lock` present under the root is
    /// used.
    Dependency {
        name: String,
        requirement: String,
        lockfile: Option<PathBuf>,
    },
}

impl fmt::Display for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Guard::RuntimeVersion { file, requirement } => {
                write!(f, "{} {}", file.display(), requirement)
            }
            Guard::Dependency {
                name, requirement, ..
            } => write!(f, "{} {}", name, requirement),
        }
    }
}

impl Guard {
    /// Whether the guard holds for the project under `root`.
    ///
    /// Missing files and versions are unmet; an invalid requirement is an
    /// error.
    pub fn check(&self, root: &Path) -> Result<bool, RuleError> {
        match self {
            Guard::RuntimeVersion { file, requirement } => {
                let requirement = parse_requirement(requirement)?;
                let Some(version) = read_runtime_version(&root.join(file)) else {
                    return Ok(false);
                };
                Ok(normalize_version(&version).is_ok_and(|v| requirement.matches(&v)))
            }
            Guard::Dependency {
                name,
                requirement,
                lockfile,
            } => {
                let requirement = parse_requirement(requirement)?;
                let lockfile = match lockfile {
                    Some(path) => root.join(path),
                    None => match LOCKFILES.iter().map(|f| root.join(f)).find(|p| p.exists()) {
                        Some(path) => path,
                        None => return Ok(false),
                    },
                };
                let Ok(contents) = fs::read_to_string(&lockfile) else {
                    return Ok(false);
                };
                let versions = if lockfile.file_name().is_some_and(|f| f == "Gemfile.lock") {
                    gemfile_lock_versions(&contents, name)
                } else {
                    cargo_lock_versions(&contents, name)
                };
                Ok(versions
                    .iter()
                    .filter_map(|v| normalize_version(v).ok())
                    .any(|v| requirement.matches(&v)))
            }
        }
    }
}

fn read_runtime_version(path: &Path) -> Option<String> {
    let contents = fs::read_to_string(path).ok()?;
    if path.extension().is_some_and(|ext| ext == "toml") {
        let doc = contents.parse::<toml_edit::DocumentMut>().ok()?;
        return doc
            .get("toolchain")
            .and_then(|toolchain| toolchain.get("channel"))
            .and_then(|channel| channel.as_str())
            .map(str::to_string);
    }
    contents
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
}

fn cargo_lock_versions(contents: &str, name: &str) -> Vec<String> {
    let Ok(doc) = contents.parse::<toml_edit::DocumentMut>() else {
        return Vec::new();
    };
    let Some(packages) = doc.get("package").and_then(|p| p.as_array_of_tables()) else {
        return Vec::new();
    };
    packages
        .iter()
        .filter(|pkg| pkg.get("name").and_then(|n| n.as_str()) == Some(name))
        .filter_map(|pkg| pkg.get("version").and_then(|v| v.as_str()))
        .map(str::to_string)
        .collect()
}

/// Top-level specs are indented four spaces: `    rails (7.0.4)`.
fn gemfile_lock_versions(contents: &str, name: &str) -> Vec<String> {
    contents
        .lines()
        .filter(|line| line.starts_with("    ") && !line.starts_with("     "))
        .filter_map(|line| {
            let (gem, rest) = line.trim().split_once(" (")?;
            (gem == name).then(|| rest.trim_end_matches(')').to_string())
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CARGO_LOCK: &str = r#"
version = 3

[[package]]
name = "serde"
version = "1.0.200"

[[package]]
name = "tokio"
version = "1.38.0"
"#;

    const GEMFILE_LOCK: &str = "GEM
  remote: https://rubygems.org/
  specs:
    actionpack (7.0.4)
      rack (~> 2.0, >= 2.2.0)
    rack (2.2.6)
    rails (7.0.4)

PLATFORMS
  ruby
";

    fn root_with(files: &[(&str, &str)]) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, contents) in files {
            fs::write(dir.path().join(name), contents).unwrap();
        }
        dir
    }

    fn runtime(file: &str, requirement: &str) -> Guard {
        Guard::RuntimeVersion {
            file: PathBuf::from(file),
            requirement: requirement.to_string(),
        }
    }

    fn dependency(name: &str, requirement: &str) -> Guard {
        Guard::Dependency {
            name: name.to_string(),
            requirement: requirement.to_string(),
            lockfile: None,
        }
    }

    #[test]
    fn runtime_version_file() {
        let dir = root_with(&[(".ruby-version", "ruby-3.2.2\n")]);
        assert!(runtime(".ruby-version", ">= 2.2.3").check(dir.path()).unwrap());
        assert!(!runtime(".ruby-version", ">= 3.3").check(dir.path()).unwrap());
        assert!(runtime(".ruby-version", "3.2").check(dir.path()).unwrap());
    }

    #[test]
    fn toolchain_toml_channel() {
        let dir = root_with(&[("rust-toolchain.toml", "[toolchain]\nchannel = \"1.75\"\n")]);
        assert!(runtime("rust-toolchain.toml", ">= 1.70").check(dir.path()).unwrap());
        assert!(!runtime("rust-toolchain.toml", ">= 1.80").check(dir.path()).unwrap());
    }

    #[test]
    fn missing_or_unversioned_file_is_unmet() {
        let dir = root_with(&[("rust-toolchain", "stable\n")]);
        assert!(!runtime(".ruby-version", ">= 2.0").check(dir.path()).unwrap());
        assert!(!runtime("rust-toolchain", ">= 1.0").check(dir.path()).unwrap());
    }

    #[test]
    fn invalid_requirement_is_an_error() {
        let dir = root_with(&[(".ruby-version", "3.2.2")]);
        let err = runtime(".ruby-version", ">=nope").check(dir.path()).unwrap_err();
        assert!(matches!(err, RuleError::Version(_)));
    }

    #[test]
    fn cargo_lock_dependency() {
        let dir = root_with(&[("Cargo.lock", CARGO_LOCK)]);
        assert!(dependency("tokio", ">= 1.0").check(dir.path()).unwrap());
        assert!(!dependency("tokio", "< 1.0").check(dir.path()).unwrap());
        assert!(!dependency("rand", ">= 0.1").check(dir.path()).unwrap());
    }

    #[test]
    fn gemfile_lock_dependency() {
        let dir = root_with(&[("Gemfile.lock", GEMFILE_LOCK)]);
        assert!(dependency("rails", ">= 7.0").check(dir.path()).unwrap());
        assert!(dependency("rack", "~2.2").check(dir.path()).unwrap());
        // A nested constraint line is not a locked version.
        assert_eq!(gemfile_lock_versions(GEMFILE_LOCK, "rack"), vec!["2.2.6"]);
        assert!(!dependency("rails", ">= 8").check(dir.path()).unwrap());
    }

    #[test]
    fn no_lockfile_is_unmet() {
        let dir = root_with(&[]);
        assert!(!dependency("rails", ">= 1").check(dir.path()).unwrap());
    }
}
