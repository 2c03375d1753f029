use crate::config::version::parse_requirement;
use crate::mutation::Strategy;
use crate::rewriter::InsertAt;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

/// Read-only run configuration.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Configuration {
    pub root_path: PathBuf,
    /// Only files under these prefixes (or matching these globs) are visited.
    pub only_paths: Vec<String>,
    pub skip_paths: Vec<String>,
    pub number_of_workers: usize,
    pub single_quote: bool,
    pub tab_width: usize,
    pub strategy: Vec<String>,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            root_path: PathBuf::from("."),
            only_paths: Vec::new(),
            skip_paths: Vec::new(),
            number_of_workers: 1,
            single_quote: true,
            tab_width: 2,
            strategy: vec!["keep-running".to_string()],
        }
    }
}

impl Configuration {
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_path = root.into();
        self
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.number_of_workers = workers;
        self
    }

    pub fn with_strategy(mut self, names: &[&str]) -> Self {
        self.strategy = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn strategy(&self) -> Result<Strategy, crate::mutation::UnknownStrategy> {
        Strategy::from_names(&self.strategy)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();
        if self.number_of_workers == 0 {
            issues.push(ValidationIssue::InvalidValue {
                field: "number_of_workers",
                message: "must be at least 1".to_string(),
            });
        }
        if self.tab_width == 0 {
            issues.push(ValidationIssue::InvalidValue {
                field: "tab_width",
                message: "must be at least 1".to_string(),
            });
        }
        if let Err(err) = self.strategy() {
            issues.push(ValidationIssue::InvalidValue {
                field: "strategy",
                message: err.to_string(),
            });
        }
        for glob in self.only_paths.iter().chain(&self.skip_paths) {
            if let Err(err) = crate::files::build_glob(glob) {
                issues.push(ValidationIssue::InvalidValue {
                    field: "only_paths/skip_paths",
                    message: format!("invalid glob {glob:?}: {err}"),
                });
            }
        }
        ValidationError::from_issues(issues)
    }
}

/// A file of declarative rules.
#[derive(Debug, Deserialize, Default, Clone)]
pub struct RuleFile {
    #[serde(default)]
    pub rules: Vec<RuleDefinition>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuleDefinition {
    pub group: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub redo_until_no_change: bool,
    #[serde(default)]
    pub guard: Option<GuardDefinition>,
    pub query: QueryDefinition,
    pub operation: OperationDefinition,
    /// `group/name` references run after this rule's own files.
    #[serde(default)]
    pub sub_rules: Vec<String>,
}

impl RuleDefinition {
    pub fn id(&self) -> String {
        format!("{}/{}", self.group, self.name)
    }
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct GuardDefinition {
    #[serde(default)]
    pub runtime_version: Option<RuntimeVersionGuard>,
    #[serde(default)]
    pub dependency: Option<DependencyGuard>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeVersionGuard {
    pub file: String,
    pub requirement: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DependencyGuard {
    pub name: String,
    pub requirement: String,
    #[serde(default)]
    pub lockfile: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum QueryDefinition {
    Node {
        #[serde(default)]
        kind: Option<String>,
        /// Capability path -> expected source text
        #[serde(default)]
        attributes: BTreeMap<String, String>,
    },
    AstGrep {
        pattern: String,
    },
}

#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum OperationDefinition {
    Replace {
        paths: Vec<String>,
        with: String,
    },
    ReplaceWith {
        code: String,
    },
    Insert {
        code: String,
        #[serde(default)]
        at: InsertAt,
        #[serde(default)]
        to: Option<String>,
        #[serde(default)]
        and_comma: bool,
    },
    Append {
        code: String,
    },
    Prepend {
        code: String,
    },
    Remove {
        #[serde(default)]
        and_comma: bool,
    },
    Delete {
        paths: Vec<String>,
        #[serde(default)]
        and_comma: bool,
    },
    Wrap {
        prefix: String,
        suffix: String,
    },
    Warn {
        message: String,
    },
}

impl RuleFile {
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = Vec::new();

        if self.rules.is_empty() {
            issues.push(ValidationIssue::EmptyRuleList);
        }

        let mut seen = BTreeSet::new();
        for rule in &self.rules {
            if rule.group.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule: None,
                    field: "group",
                });
            }
            if rule.name.trim().is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule: None,
                    field: "name",
                });
            }
            let id = rule.id();
            if !seen.insert(id.clone()) {
                issues.push(ValidationIssue::DuplicateRule { rule: id.clone() });
            }

            if rule.files.is_empty() {
                issues.push(ValidationIssue::MissingField {
                    rule: Some(id.clone()),
                    field: "files",
                });
            }
            for glob in &rule.files {
                if let Err(err) = crate::files::build_glob(glob) {
                    issues.push(ValidationIssue::InvalidCombo {
                        rule: Some(id.clone()),
                        message: format!("invalid glob {glob:?}: {err}"),
                    });
                }
            }

            match &rule.query {
                QueryDefinition::Node { kind, attributes } => {
                    if kind.is_none() && attributes.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule: Some(id.clone()),
                            field: "query.kind",
                        });
                    }
                }
                QueryDefinition::AstGrep { pattern } => {
                    if pattern.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule: Some(id.clone()),
                            field: "query.pattern",
                        });
                    }
                }
            }

            match &rule.operation {
                OperationDefinition::Replace { paths, .. }
                | OperationDefinition::Delete { paths, .. } => {
                    if paths.is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule: Some(id.clone()),
                            field: "operation.paths",
                        });
                    }
                }
                OperationDefinition::Warn { message } => {
                    if message.trim().is_empty() {
                        issues.push(ValidationIssue::MissingField {
                            rule: Some(id.clone()),
                            field: "operation.message",
                        });
                    }
                }
                _ => {}
            }

            if let Some(guard) = &rule.guard {
                let requirements = guard
                    .runtime_version
                    .iter()
                    .map(|g| &g.requirement)
                    .chain(guard.dependency.iter().map(|g| &g.requirement));
                for requirement in requirements {
                    if let Err(err) = parse_requirement(requirement) {
                        issues.push(ValidationIssue::InvalidCombo {
                            rule: Some(id.clone()),
                            message: err.to_string(),
                        });
                    }
                }
            }

            for reference in &rule.sub_rules {
                if reference.split_once('/').is_none() {
                    issues.push(ValidationIssue::InvalidCombo {
                        rule: Some(id.clone()),
                        message: format!("sub-rule {reference:?} is not of the form group/name"),
                    });
                }
            }
        }

        ValidationError::from_issues(issues)
    }
}

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationError {
    fn from_issues(issues: Vec<ValidationIssue>) -> Result<(), Self> {
        if issues.is_empty() {
            Ok(())
        } else {
            Err(Self { issues })
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, issue) in self.issues.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "{issue}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone)]
pub enum ValidationIssue {
    EmptyRuleList,
    MissingField {
        rule: Option<String>,
        field: &'static str,
    },
    DuplicateRule {
        rule: String,
    },
    InvalidCombo {
        rule: Option<String>,
        message: String,
    },
    InvalidValue {
        field: &'static str,
        message: String,
    },
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationIssue::EmptyRuleList => write!(f, "rule file contains no rules"),
            ValidationIssue::MissingField { rule, field } => match rule {
                Some(id) => write!(f, "rule '{id}' missing required field '{field}'"),
                None => write!(f, "rule missing required field '{field}'"),
            },
            ValidationIssue::DuplicateRule { rule } => {
                write!(f, "rule '{rule}' is defined more than once")
            }
            ValidationIssue::InvalidCombo { rule, message } => match rule {
                Some(id) => write!(f, "rule '{id}' has invalid configuration: {message}"),
                None => write!(f, "invalid rule configuration: {message}"),
            },
            ValidationIssue::InvalidValue { field, message } => {
                write!(f, "invalid configuration value '{field}': {message}")
            }
        }
    }
}
