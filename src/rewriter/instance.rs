use super::context::{Context, Helpers};
use super::{RuleError, Warning};
use crate::mutation::{Action, ActionKind, MutationResult, MutationSession, SourceBuffer, Strategy};
use crate::template::{EngineRegistry, Encoded};
use crate::tree::{language, Adapter, TreeSitterAdapter};
use std::path::{Path, PathBuf};

/// Upper bound on conflicted passes over one file.
const MAX_PASSES: usize = 16;

/// Everything an instance borrows from the run that spawned it.
#[derive(Clone, Copy)]
pub struct InstanceSettings<'a> {
    pub strategy: Strategy,
    /// Overrides language detection for every file.
    pub adapter: Option<&'a dyn Adapter>,
    pub engines: &'a EngineRegistry,
    pub helpers: &'a Helpers,
    pub tab_width: usize,
    pub single_quote: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InstanceOutcome {
    pub result: MutationResult,
    pub warnings: Vec<Warning>,
    /// The file on disk was rewritten.
    pub changed: bool,
}

/// One rule body bound to one file.
pub struct RuleInstance<'a> {
    path: PathBuf,
    relative: PathBuf,
    settings: InstanceSettings<'a>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pass {
    Commit,
    Simulate,
}

impl<'a> RuleInstance<'a> {
    /// `root.join(relative)` is the file; `relative` is what results and
    /// warnings report.
    pub fn new(root: &Path, relative: impl Into<PathBuf>, settings: InstanceSettings<'a>) -> Self {
        let relative = relative.into();
        Self {
            path: root.join(&relative),
            relative,
            settings,
        }
    }

    pub fn path(&self) -> &Path {
        &self.relative
    }

    /// Evaluate, apply and write.
    ///
    /// When a pass drops conflicting actions but still rewrote the file, the
    /// file is read again and processed anew so the dropped edits get
    /// another chance against the updated text. Processing stops once a
    /// pass drops the same edits as the one before it; a file still
    /// conflicting after `MAX_PASSES` is an error.
    pub fn process<F>(&self, body: &F) -> Result<InstanceOutcome, RuleError>
    where
        F: for<'t> Fn(&mut Context<'t>) -> Result<(), RuleError> + ?Sized,
    {
        let mut changed = false;
        let mut passes = 0usize;
        let mut previous: Option<Vec<DroppedEdit>> = None;
        loop {
            if passes == MAX_PASSES {
                return Err(RuleError::Unsettled { passes });
            }
            passes += 1;
            let buffer = SourceBuffer::read(&self.path)?;
            let (result, warnings) = self.evaluate(&buffer, body, Pass::Commit)?;

            let wrote = match result.new_source.as_deref() {
                Some(new_source) if new_source != buffer.raw() => {
                    buffer.commit(new_source)?;
                    true
                }
                _ => false,
            };
            changed |= wrote;
            tracing::debug!(
                file = %self.relative.display(),
                pass = passes,
                wrote,
                conflicted = result.conflicted,
                "processed file"
            );

            let dropped = dropped_edits(&result.dropped);
            let stalled = previous.as_ref() == Some(&dropped);
            if stalled {
                tracing::debug!(
                    file = %self.relative.display(),
                    dropped = dropped.len(),
                    "conflicts repeat, not reprocessing"
                );
            }
            if !(result.conflicted && wrote) || stalled {
                return Ok(InstanceOutcome {
                    result: MutationResult {
                        file_path: Some(self.relative.clone()),
                        ..result
                    },
                    warnings,
                    changed,
                });
            }
            previous = Some(dropped);
        }
    }

    /// Evaluate once and return the surviving actions. Never writes.
    pub fn test<F>(&self, body: &F) -> Result<InstanceOutcome, RuleError>
    where
        F: for<'t> Fn(&mut Context<'t>) -> Result<(), RuleError> + ?Sized,
    {
        let buffer = SourceBuffer::read(&self.path)?;
        let (result, warnings) = self.evaluate(&buffer, body, Pass::Simulate)?;
        tracing::debug!(
            file = %self.relative.display(),
            affected = result.affected,
            "simulated file"
        );
        Ok(InstanceOutcome {
            result: MutationResult {
                file_path: Some(self.relative.clone()),
                ..result
            },
            warnings,
            changed: false,
        })
    }

    fn evaluate<F>(
        &self,
        buffer: &SourceBuffer,
        body: &F,
        pass: Pass,
    ) -> Result<(MutationResult, Vec<Warning>), RuleError>
    where
        F: for<'t> Fn(&mut Context<'t>) -> Result<(), RuleError> + ?Sized,
    {
        let engine = self.settings.engines.for_path(&self.path);
        let encoded = match engine {
            Some(engine) => engine.encode(buffer.raw()),
            None => Encoded::identity(buffer.raw()),
        };

        let detected;
        let adapter: &dyn Adapter = match (self.settings.adapter, engine) {
            (Some(adapter), _) => adapter,
            (None, Some(engine)) => {
                detected = TreeSitterAdapter::new(engine.target_language());
                &detected
            }
            (None, None) => {
                let lang = language::from_path(&self.path).ok_or_else(|| {
                    RuleError::UnsupportedLanguage {
                        path: self.relative.clone(),
                    }
                })?;
                detected = TreeSitterAdapter::new(lang);
                &detected
            }
        };

        let tree = adapter.parse(encoded.surrogate())?;
        let mut context = Context::new(adapter, &tree, buffer.raw(), &encoded, &self.relative)
            .with_helpers(self.settings.helpers)
            .with_formatting(self.settings.tab_width, self.settings.single_quote);
        body(&mut context)?;
        let (actions, warnings) = context.finish();

        let mut session =
            MutationSession::new(buffer.raw()).with_strategy(self.settings.strategy);
        session.extend(actions);
        if !encoded.is_identity() {
            session.set_remap(encoded.remapper());
        }
        let result = match pass {
            Pass::Commit => session.apply()?,
            Pass::Simulate => session.test()?,
        };
        Ok((result, warnings))
    }
}

/// A dropped action without its offsets, which move as the file is
/// rewritten.
type DroppedEdit = (ActionKind, Option<String>);

fn dropped_edits(actions: &[Action]) -> Vec<DroppedEdit> {
    let mut edits: Vec<DroppedEdit> = actions
        .iter()
        .map(|action| (action.kind, action.new_code.clone()))
        .collect();
    edits.sort();
    edits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::NodePattern;
    use crate::rewriter::{InsertAt, InsertOptions};
    use std::fs;

    fn settings<'a>(engines: &'a EngineRegistry, helpers: &'a Helpers) -> InstanceSettings<'a> {
        InstanceSettings {
            strategy: Strategy::default(),
            adapter: None,
            engines,
            helpers,
            tab_width: 2,
            single_quote: true,
        }
    }

    fn rename(ctx: &mut Context<'_>) -> Result<(), RuleError> {
        ctx.within(&NodePattern::kind("class").attr("name", "Foobar"), |ctx| {
            ctx.replace(&["name"], "Rejuvinate")
        })
    }

    #[test]
    fn process_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("post.rb"), "class Foobar\nend").unwrap();
        let (engines, helpers) = (EngineRegistry::new(), Helpers::new());
        let instance = RuleInstance::new(dir.path(), "post.rb", settings(&engines, &helpers));

        let outcome = instance.process(&rename).unwrap();
        assert!(outcome.changed);
        assert_eq!(outcome.result.file_path, Some(PathBuf::from("post.rb")));
        assert_eq!(
            fs::read_to_string(dir.path().join("post.rb")).unwrap(),
            "class Rejuvinate\nend"
        );
    }

    #[test]
    fn test_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("post.rb"), "class Foobar\nend").unwrap();
        let (engines, helpers) = (EngineRegistry::new(), Helpers::new());
        let instance = RuleInstance::new(dir.path(), "post.rb", settings(&engines, &helpers));

        let outcome = instance.test(&rename).unwrap();
        assert!(outcome.result.affected);
        let actions = outcome.result.actions.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, ActionKind::Replace);
        assert_eq!((actions[0].start, actions[0].end), (6, 12));
        assert_eq!(
            fs::read_to_string(dir.path().join("post.rb")).unwrap(),
            "class Foobar\nend"
        );
    }

    /// `foo(1)` becomes `foo!(1)`, at every nesting depth.
    fn bang_calls(ctx: &mut Context<'_>) -> Result<(), RuleError> {
        ctx.within(&NodePattern::kind("call"), |ctx| {
            let banged = ctx
                .node()
                .field("method")
                .is_some_and(|method| method.text().ends_with('!'));
            if !banged {
                ctx.replace_with("{{message}}!({{arguments}})")?;
            }
            Ok(())
        })
    }

    fn rename_message(ctx: &mut Context<'_>) -> Result<(), RuleError> {
        ctx.within(&NodePattern::kind("call").attr("message", "name"), |ctx| {
            ctx.replace(&["message"], "full_name")
        })
    }

    #[test]
    fn conflicted_pass_is_reprocessed() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("list.rb"), "foo(bar(1))\n").unwrap();
        let (engines, helpers) = (EngineRegistry::new(), Helpers::new());
        let instance = RuleInstance::new(dir.path(), "list.rb", settings(&engines, &helpers));

        // The outer rewrite overlaps the inner one and loses the first pass.
        let outcome = instance.process(&bang_calls).unwrap();
        assert!(outcome.changed);
        assert!(!outcome.result.conflicted);
        assert_eq!(
            fs::read_to_string(dir.path().join("list.rb")).unwrap(),
            "foo!(bar!(1))\n"
        );
    }

    /// Every call appends `.x` at its end, and nested calls share that end.
    fn suffix_calls(ctx: &mut Context<'_>) -> Result<(), RuleError> {
        ctx.within(&NodePattern::kind("call"), |ctx| {
            ctx.insert(".x", InsertOptions::at(InsertAt::End))
        })
    }

    #[test]
    fn repeating_conflicts_stop_reprocessing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("chain.rb"), "foo bar baz\n").unwrap();
        let (engines, helpers) = (EngineRegistry::new(), Helpers::new());
        let instance = RuleInstance::new(dir.path(), "chain.rb", settings(&engines, &helpers));

        let outcome = instance.process(&suffix_calls).unwrap();
        assert!(outcome.changed);
        assert!(outcome.result.conflicted);
        let rewritten = fs::read_to_string(dir.path().join("chain.rb")).unwrap();
        assert!(rewritten.starts_with("foo bar baz.x"));
        assert!(rewritten.len() < "foo bar baz\n".len() + 2 * MAX_PASSES);
    }

    #[test]
    fn dropped_edits_ignore_offsets() {
        let early = [Action::new(ActionKind::Insert, 3, 3, ".x")];
        let late = [Action::new(ActionKind::Insert, 9, 9, ".x")];
        assert_eq!(dropped_edits(&early), dropped_edits(&late));
        assert_ne!(dropped_edits(&early), dropped_edits(&[]));
    }

    #[test]
    fn template_actions_are_remapped() {
        let dir = tempfile::tempdir().unwrap();
        let raw = "- if current_user\n  = current_user.login\n- if current_user\n  = current_user.name\n";
        fs::write(dir.path().join("show.html.haml"), raw).unwrap();
        let (engines, helpers) = (EngineRegistry::with_defaults(), Helpers::new());
        let instance =
            RuleInstance::new(dir.path(), "show.html.haml", settings(&engines, &helpers));

        instance.process(&rename_message).unwrap();
        assert_eq!(
            fs::read_to_string(dir.path().join("show.html.haml")).unwrap(),
            "- if current_user\n  = current_user.login\n- if current_user\n  = current_user.full_name\n"
        );
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        let (engines, helpers) = (EngineRegistry::new(), Helpers::new());
        let instance = RuleInstance::new(dir.path(), "notes.txt", settings(&engines, &helpers));
        let err = instance.test(&rename).unwrap_err();
        assert!(matches!(err, RuleError::UnsupportedLanguage { .. }));
    }

    #[test]
    fn injected_adapter_overrides_detection() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Rakefile"), "class Foobar\nend").unwrap();
        let (engines, helpers) = (EngineRegistry::new(), Helpers::new());
        let ruby = TreeSitterAdapter::new(crate::tree::SupportLang::Ruby);
        let settings = InstanceSettings {
            adapter: Some(&ruby),
            ..settings(&engines, &helpers)
        };
        let outcome = RuleInstance::new(dir.path(), "Rakefile", settings)
            .test(&rename)
            .unwrap();
        assert!(outcome.result.affected);
    }
}
