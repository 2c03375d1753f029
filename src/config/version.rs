//! Version matching for rule guards.
//!
//! Runtime version files and lockfiles rarely hold strict semver
//! (`ruby-3.2`, `1.75`, `2.0.0-p0`), so versions are normalized before they
//! are matched against a requirement like `">= 2.2.3, < 4"`.

use semver::{Version, VersionReq};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    /// Not recognizable as a version (e.g., "stable")
    InvalidVersion { value: String, source: String },
    /// Invalid version requirement (e.g., ">=bad")
    InvalidRequirement { value: String, source: String },
}

impl fmt::Display for VersionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionError::InvalidVersion { value, source } => {
                write!(f, "invalid version '{}': {}", value, source)
            }
            VersionError::InvalidRequirement { value, source } => {
                write!(f, "invalid version requirement '{}': {}", value, source)
            }
        }
    }
}

impl std::error::Error for VersionError {}

/// Coerce a loosely written version into semver.
///
/// Drops any prefix before the first digit, keeps up to three numeric
/// components and pads missing ones with zero. Anything after the numeric
/// part (`-p0`, `.beta`) is ignored.
pub fn normalize_version(raw: &str) -> Result<Version, VersionError> {
    let invalid = |reason: &str| VersionError::InvalidVersion {
        value: raw.to_string(),
        source: reason.to_string(),
    };
    let trimmed = raw.trim();
    let start = trimmed
        .find(|c: char| c.is_ascii_digit())
        .ok_or_else(|| invalid("no numeric component"))?;

    let mut parts = [0u64; 3];
    let mut count = 0;
    for piece in trimmed[start..].split('.') {
        let digits: String = piece.chars().take_while(char::is_ascii_digit).collect();
        if digits.is_empty() || count == parts.len() {
            break;
        }
        parts[count] = digits.parse().map_err(|_| invalid("component out of range"))?;
        count += 1;
        if digits.len() != piece.len() {
            break;
        }
    }
    Ok(Version::new(parts[0], parts[1], parts[2]))
}

/// Parse a requirement; a bare version means "at least this version".
pub fn parse_requirement(requirement: &str) -> Result<VersionReq, VersionError> {
    let requirement = requirement.trim();
    let invalid = |source: String| VersionError::InvalidRequirement {
        value: requirement.to_string(),
        source,
    };
    if requirement.starts_with(|c: char| c.is_ascii_digit()) {
        let version = normalize_version(requirement).map_err(|e| invalid(e.to_string()))?;
        return VersionReq::parse(&format!(">={version}")).map_err(|e| invalid(e.to_string()));
    }
    VersionReq::parse(requirement).map_err(|e| invalid(e.to_string()))
}

/// Check if a loosely written version satisfies a requirement string.
///
/// # Examples
///
/// ```
/// use node_rewriter::config::version::matches_requirement;
///
/// assert!(matches_requirement("ruby-3.2.2", Some(">= 2.2.3")).unwrap());
/// assert!(matches_requirement("1.75", Some("1.70")).unwrap());
/// assert!(!matches_requirement("2.1.0", Some(">= 2.2.3")).unwrap());
///
/// // None requirement means "any version"
/// assert!(matches_requirement("1.0.0", None).unwrap());
/// ```
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(requirement) = requirement.map(str::trim).filter(|r| !r.is_empty()) else {
        return Ok(true);
    };
    let requirement = parse_requirement(requirement)?;
    let version = normalize_version(version)?;
    Ok(requirement.matches(&version))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_loose_versions() {
        assert_eq!(normalize_version("3.2.2").unwrap(), Version::new(3, 2, 2));
        assert_eq!(normalize_version("ruby-3.2").unwrap(), Version::new(3, 2, 0));
        assert_eq!(normalize_version("2.0.0-p648").unwrap(), Version::new(2, 0, 0));
        assert_eq!(normalize_version(" 1.75\n").unwrap(), Version::new(1, 75, 0));
        assert_eq!(normalize_version("1.2.3.4").unwrap(), Version::new(1, 2, 3));
        assert_eq!(normalize_version("4.0.0.beta1").unwrap(), Version::new(4, 0, 0));
    }

    #[test]
    fn rejects_versions_without_digits() {
        assert!(matches!(
            normalize_version("stable"),
            Err(VersionError::InvalidVersion { .. })
        ));
    }

    #[test]
    fn bare_requirement_means_at_least() {
        assert!(matches_requirement("2.2.3", Some("2.2.3")).unwrap());
        assert!(matches_requirement("3.0.0", Some("2.2.3")).unwrap());
        assert!(!matches_requirement("2.2.2", Some("2.2.3")).unwrap());
    }

    #[test]
    fn compound_requirement() {
        let req = ">= 2.2.3, < 3.0.0";
        assert!(matches_requirement("2.7.8", Some(req)).unwrap());
        assert!(!matches_requirement("3.1.0", Some(req)).unwrap());
        assert!(!matches_requirement("2.0.0", Some(req)).unwrap());
    }

    #[test]
    fn missing_or_blank_requirement_matches_everything() {
        assert!(matches_requirement("0.1.0", None).unwrap());
        assert!(matches_requirement("0.1.0", Some("  ")).unwrap());
    }

    #[test]
    fn invalid_requirement_is_an_error() {
        let err = matches_requirement("1.0.0", Some(">=bad")).unwrap_err();
        assert!(matches!(err, VersionError::InvalidRequirement { .. }));
        assert!(err.to_string().contains(">=bad"));
    }
}
