//! Turns declarative rule definitions into runnable [`Rule`]s.

use super::loader::load_rules_from_path;
use super::schema::{OperationDefinition, QueryDefinition, RuleDefinition, RuleFile};
use crate::query::{AstGrepPattern, Matcher, NodePattern};
use crate::rewriter::{Context, InsertOptions, Registry, Rule, RuleError, RuleLoader};
use std::path::PathBuf;
use std::sync::Arc;

/// Build the rule a definition describes.
///
/// The body visits every file matching `files`, runs the operation on each
/// node the query matches, then invokes the sub-rules in order.
pub fn compile_rule(definition: &RuleDefinition) -> Rule {
    let mut builder = Rule::builder(&definition.group, &definition.name);
    if let Some(description) = &definition.description {
        builder = builder.description(description);
    }
    if definition.redo_until_no_change {
        builder = builder.redo_until_no_change();
    }
    if let Some(guard) = &definition.guard {
        if let Some(runtime) = &guard.runtime_version {
            builder = builder.if_runtime_version(&runtime.file, &runtime.requirement);
        }
        if let Some(dependency) = &guard.dependency {
            builder = match &dependency.lockfile {
                Some(lockfile) => {
                    builder.if_dependency_in(lockfile, &dependency.name, &dependency.requirement)
                }
                None => builder.if_dependency(&dependency.name, &dependency.requirement),
            };
        }
    }

    let matcher = compile_query(&definition.query);
    let files = definition.files.clone();
    let operation = definition.operation.clone();
    let sub_rules: Vec<(String, String)> = definition
        .sub_rules
        .iter()
        .filter_map(|id| id.split_once('/'))
        .map(|(group, name)| (group.to_string(), name.to_string()))
        .collect();

    builder
        .body(move |scope| {
            scope.within_files(files.as_slice(), |ctx| {
                ctx.within(matcher.as_ref(), |ctx| apply_operation(&operation, ctx))
            })?;
            for (group, name) in &sub_rules {
                scope.add_rule(group, name)?;
            }
            Ok(())
        })
        .build()
}

fn compile_query(query: &QueryDefinition) -> Arc<dyn Matcher> {
    match query {
        QueryDefinition::Node { kind, attributes } => {
            let mut pattern = match kind {
                Some(kind) => NodePattern::kind(kind),
                None => NodePattern::any(),
            };
            for (path, text) in attributes {
                pattern = pattern.attr(path, text.as_str());
            }
            Arc::new(pattern)
        }
        QueryDefinition::AstGrep { pattern } => Arc::new(AstGrepPattern::new(pattern)),
    }
}

fn apply_operation(operation: &OperationDefinition, ctx: &mut Context<'_>) -> Result<(), RuleError> {
    match operation {
        OperationDefinition::Replace { paths, with } => ctx.replace(&as_strs(paths), with),
        OperationDefinition::ReplaceWith { code } => ctx.replace_with(code),
        OperationDefinition::Insert {
            code,
            at,
            to,
            and_comma,
        } => ctx.insert(
            code,
            InsertOptions {
                at: *at,
                to: to.clone(),
                and_comma: *and_comma,
            },
        ),
        OperationDefinition::Append { code } => ctx.append(code),
        OperationDefinition::Prepend { code } => ctx.prepend(code),
        OperationDefinition::Remove { and_comma } => ctx.remove(*and_comma),
        OperationDefinition::Delete { paths, and_comma } => ctx.delete(&as_strs(paths), *and_comma),
        OperationDefinition::Wrap { prefix, suffix } => ctx.wrap(prefix, suffix),
        OperationDefinition::Warn { message } => ctx.warn(message),
    }
}

fn as_strs(paths: &[String]) -> Vec<&str> {
    paths.iter().map(String::as_str).collect()
}

/// Compile and register every rule in `file`, in file order.
pub fn register_rules(file: &RuleFile, registry: &Registry) -> Vec<Arc<Rule>> {
    file.rules
        .iter()
        .map(|definition| registry.register(Arc::new(compile_rule(definition))))
        .collect()
}

/// Loads `<dir>/<group>/<name>.toml` on demand.
///
/// Every rule in the loaded file is registered, so siblings declared
/// alongside the requested rule become available too.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    dir: PathBuf,
}

impl DirectoryLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl RuleLoader for DirectoryLoader {
    fn load(
        &self,
        group: &str,
        name: &str,
        registry: &Registry,
    ) -> Result<Option<Arc<Rule>>, RuleError> {
        let path = self.dir.join(group).join(format!("{name}.toml"));
        if !path.is_file() {
            return Ok(None);
        }
        let file = load_rules_from_path(&path)?;
        register_rules(&file, registry);
        tracing::debug!(path = %path.display(), rules = file.rules.len(), "loaded rule file");
        Ok(registry.fetch(group, name))
    }
}
