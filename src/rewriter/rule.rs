//! Named rules and the scope their bodies run in.

use super::context::{Context, Helper, Helpers};
use super::{
    Guard, InstanceOutcome, InstanceSettings, Registry, RuleError, RuleInstance, Warning, Workspace,
};
use crate::config::Configuration;
use crate::mutation::{atomic_write, Action, MutationResult};
use parking_lot::Mutex;
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Body = Arc<dyn Fn(&mut RuleScope<'_>) -> Result<(), RuleError> + Send + Sync>;

/// How a rule run treats files.
///
/// | `run_instance` | `write_to_file` | mode     |
/// |----------------|-----------------|----------|
/// | true           | true            | commit   |
/// | true           | false           | simulate |
/// | false          | any             | sandbox  |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOptions {
    pub run_instance: bool,
    pub write_to_file: bool,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self::commit()
    }
}

impl ExecutionOptions {
    pub fn commit() -> Self {
        Self {
            run_instance: true,
            write_to_file: true,
        }
    }

    pub fn simulate() -> Self {
        Self {
            run_instance: true,
            write_to_file: false,
        }
    }

    /// Evaluate the body for its structure only; no file is read or written.
    pub fn sandbox() -> Self {
        Self {
            run_instance: false,
            write_to_file: false,
        }
    }

    fn simulating(self) -> bool {
        self.run_instance && !self.write_to_file
    }
}

#[derive(Debug, Default)]
struct RuleState {
    warnings: Vec<Warning>,
    affected_files: BTreeSet<PathBuf>,
    sub_rules: Vec<String>,
    test_results: Vec<MutationResult>,
}

/// A named, reusable rewrite.
///
/// The body is run against a [`Workspace`] through [`process`](Self::process),
/// [`process_with_sandbox`](Self::process_with_sandbox) or
/// [`test`](Self::test). Each entry point starts from empty run state.
pub struct Rule {
    group: String,
    name: String,
    description: Option<String>,
    guards: Vec<Guard>,
    redo: bool,
    helpers: Helpers,
    body: Option<Body>,
    state: Mutex<RuleState>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("id", &self.id())
            .field("description", &self.description)
            .field("guards", &self.guards)
            .field("redo", &self.redo)
            .field("helpers", &self.helpers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Rule {
    pub fn builder(group: impl Into<String>, name: impl Into<String>) -> RuleBuilder {
        RuleBuilder {
            group: group.into(),
            name: name.into(),
            description: None,
            guards: Vec::new(),
            redo: false,
            helpers: Helpers::new(),
            body: None,
        }
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `group/name`.
    pub fn id(&self) -> String {
        format!("{}/{}", self.group, self.name)
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn guards(&self) -> &[Guard] {
        &self.guards
    }

    pub fn redo_until_no_change(&self) -> bool {
        self.redo
    }

    pub fn warnings(&self) -> Vec<Warning> {
        self.state.lock().warnings.clone()
    }

    /// Files rewritten on disk by the last run.
    pub fn affected_files(&self) -> BTreeSet<PathBuf> {
        self.state.lock().affected_files.clone()
    }

    /// Ids of the sub-rules the last run invoked, in call order.
    pub fn sub_rules(&self) -> Vec<String> {
        self.state.lock().sub_rules.clone()
    }

    /// Affected results collected by the last simulated run.
    pub fn test_results(&self) -> Vec<MutationResult> {
        self.state.lock().test_results.clone()
    }

    /// Run and write changes to disk.
    pub fn process(&self, workspace: &Workspace) -> Result<(), RuleError> {
        self.reset();
        self.run(workspace, ExecutionOptions::commit())
    }

    /// Run the body without touching files, recording sub-rule calls.
    pub fn process_with_sandbox(&self, workspace: &Workspace) -> Result<(), RuleError> {
        self.reset();
        self.run(workspace, ExecutionOptions::sandbox())
    }

    /// Run without writing and return every affected per-file result.
    pub fn test(&self, workspace: &Workspace) -> Result<Vec<MutationResult>, RuleError> {
        self.reset();
        self.run(workspace, ExecutionOptions::simulate())?;
        Ok(self.test_results())
    }

    fn reset(&self) {
        *self.state.lock() = RuleState::default();
    }

    /// Whether every guard holds for the project under `root`.
    pub fn guards_met(&self, root: &Path) -> Result<bool, RuleError> {
        for guard in &self.guards {
            if !guard.check(root)? {
                tracing::info!(rule = %self.id(), guard = %guard, "guard not met, skipping rule");
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn run(&self, workspace: &Workspace, options: ExecutionOptions) -> Result<(), RuleError> {
        if !self.guards_met(workspace.root())? {
            return Ok(());
        }
        let Some(body) = &self.body else {
            return Ok(());
        };

        let mut pass = 0usize;
        loop {
            pass += 1;
            self.state.lock().warnings.clear();
            let mut scope = RuleScope {
                rule: self,
                workspace,
                options,
                changed: false,
            };
            body(&mut scope)?;
            tracing::debug!(rule = %self.id(), pass, changed = scope.changed, "rule pass finished");
            if !(self.redo && scope.changed) {
                return Ok(());
            }
        }
    }
}

/// Builds a [`Rule`].
pub struct RuleBuilder {
    group: String,
    name: String,
    description: Option<String>,
    guards: Vec<Guard>,
    redo: bool,
    helpers: Helpers,
    body: Option<Body>,
}

impl RuleBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Only run when the version pinned in `file` satisfies `requirement`.
    pub fn if_runtime_version(mut self, file: impl Into<PathBuf>, requirement: impl Into<String>) -> Self {
        self.guards.push(Guard::RuntimeVersion {
            file: file.into(),
            requirement: requirement.into(),
        });
        self
    }

    /// Only run when the locked version of `name` satisfies `requirement`.
    pub fn if_dependency(mut self, name: impl Into<String>, requirement: impl Into<String>) -> Self {
        self.guards.push(Guard::Dependency {
            name: name.into(),
            requirement: requirement.into(),
            lockfile: None,
        });
        self
    }

    pub fn if_dependency_in(
        mut self,
        lockfile: impl Into<PathBuf>,
        name: impl Into<String>,
        requirement: impl Into<String>,
    ) -> Self {
        self.guards.push(Guard::Dependency {
            name: name.into(),
            requirement: requirement.into(),
            lockfile: Some(lockfile.into()),
        });
        self
    }

    /// Repeat the body while a pass still rewrites files.
    pub fn redo_until_no_change(mut self) -> Self {
        self.redo = true;
        self
    }

    pub fn helper<F>(mut self, name: impl Into<String>, helper: F) -> Self
    where
        F: Fn(&[&str]) -> String + Send + Sync + 'static,
    {
        let helper: Helper = Arc::new(helper);
        self.helpers.insert(name.into(), helper);
        self
    }

    pub fn body<F>(mut self, body: F) -> Self
    where
        F: Fn(&mut RuleScope<'_>) -> Result<(), RuleError> + Send + Sync + 'static,
    {
        self.body = Some(Arc::new(body));
        self
    }

    pub fn build(self) -> Rule {
        Rule {
            group: self.group,
            name: self.name,
            description: self.description,
            guards: self.guards,
            redo: self.redo,
            helpers: self.helpers,
            body: self.body,
            state: Mutex::new(RuleState::default()),
        }
    }

    /// Build and register, replacing any rule with the same id.
    pub fn register(self, registry: &Registry) -> Arc<Rule> {
        registry.register(Arc::new(self.build()))
    }
}

/// What a rule body sees during one pass.
pub struct RuleScope<'r> {
    rule: &'r Rule,
    workspace: &'r Workspace,
    options: ExecutionOptions,
    changed: bool,
}

impl<'r> RuleScope<'r> {
    pub fn options(&self) -> ExecutionOptions {
        self.options
    }

    pub fn config(&self) -> &Configuration {
        self.workspace.config()
    }

    pub fn workspace(&self) -> &Workspace {
        self.workspace
    }

    pub fn rule(&self) -> &Rule {
        self.rule
    }

    /// Run `body` once per file matching `patterns`.
    ///
    /// Files are discovered in sorted order. With more than one worker they
    /// are processed in parallel, but outcomes are still merged in discovery
    /// order and the first failing file, in that order, fails the pass.
    /// Does nothing in sandbox mode.
    pub fn within_files<S, F>(&mut self, patterns: &[S], body: F) -> Result<(), RuleError>
    where
        S: AsRef<str>,
        F: for<'t> Fn(&mut Context<'t>) -> Result<(), RuleError> + Sync,
    {
        if !self.options.run_instance {
            return Ok(());
        }
        let (rule, workspace) = (self.rule, self.workspace);
        let files = workspace.glob(patterns)?;
        let config = workspace.config();
        let settings = InstanceSettings {
            strategy: workspace.strategy(),
            adapter: workspace.adapter(),
            engines: workspace.engines(),
            helpers: &rule.helpers,
            tab_width: config.tab_width,
            single_quote: config.single_quote,
        };
        let simulate = self.options.simulating();
        let root = workspace.root();
        let run_one = |relative: &PathBuf| -> Result<InstanceOutcome, RuleError> {
            let instance = RuleInstance::new(root, relative, settings);
            let outcome = if simulate {
                instance.test(&body)
            } else {
                instance.process(&body)
            };
            outcome.map_err(|err| err.in_file(relative))
        };

        let workers = config.number_of_workers;
        if workers > 1 && files.len() > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(workers)
                .build()
                .map_err(|err| RuleError::WorkerPool(err.to_string()))?;
            let outcomes: Vec<_> = pool.install(|| files.par_iter().map(run_one).collect());
            for outcome in outcomes {
                self.merge(outcome?);
            }
        } else {
            for relative in &files {
                let outcome = run_one(relative)?;
                self.merge(outcome);
            }
        }
        Ok(())
    }

    fn merge(&mut self, outcome: InstanceOutcome) {
        let mut state = self.rule.state.lock();
        state.warnings.extend(outcome.warnings);
        if outcome.changed {
            self.changed = true;
            if let Some(path) = &outcome.result.file_path {
                state.affected_files.insert(path.clone());
            }
        }
        if self.options.simulating() && outcome.result.affected {
            state.test_results.push(outcome.result);
        }
    }

    /// Create `relative` with `content`. An existing file is left alone.
    pub fn add_file(&mut self, relative: &str, content: &str) -> Result<(), RuleError> {
        if !self.options.run_instance {
            return Ok(());
        }
        if self.options.simulating() {
            self.record_file_action(relative, Action::add_file(content));
            return Ok(());
        }

        let path = self.workspace.guard().resolve(relative)?;
        if path.exists() {
            tracing::warn!(rule = %self.rule.id(), file = relative, "file already exists, not adding");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| RuleError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        atomic_write(&path, content.as_bytes())?;
        tracing::info!(rule = %self.rule.id(), file = relative, "added file");
        Ok(())
    }

    /// Delete `relative` if it exists.
    pub fn remove_file(&mut self, relative: &str) -> Result<(), RuleError> {
        if !self.options.run_instance {
            return Ok(());
        }
        if self.options.simulating() {
            self.record_file_action(relative, Action::remove_file());
            return Ok(());
        }

        let path = self.workspace.guard().resolve(relative)?;
        if !path.exists() {
            tracing::debug!(rule = %self.rule.id(), file = relative, "nothing to remove");
            return Ok(());
        }
        fs::remove_file(&path).map_err(|source| RuleError::Io {
            path: path.clone(),
            source,
        })?;
        tracing::info!(rule = %self.rule.id(), file = relative, "removed file");
        Ok(())
    }

    fn record_file_action(&mut self, relative: &str, action: Action) {
        self.rule.state.lock().test_results.push(MutationResult {
            affected: true,
            conflicted: false,
            actions: Some(vec![action]),
            file_path: Some(Path::new(relative).to_path_buf()),
            ..MutationResult::default()
        });
    }

    /// Run another rule with this run's options.
    ///
    /// The rule is looked up in the registry first, then through the
    /// workspace loader. An unknown rule is logged and skipped. Simulated
    /// sub-rule results are merged into this rule's results.
    pub fn add_rule(&mut self, group: &str, name: &str) -> Result<(), RuleError> {
        let workspace = self.workspace;
        let rule = match workspace.registry().fetch(group, name) {
            Some(rule) => Some(rule),
            None => match workspace.loader() {
                Some(loader) => loader.load(group, name, workspace.registry())?,
                None => None,
            },
        };
        let Some(rule) = rule else {
            tracing::warn!(rule = %self.rule.id(), sub_rule = %format!("{group}/{name}"), "sub-rule not found");
            return Ok(());
        };

        tracing::debug!(rule = %self.rule.id(), sub_rule = %rule.id(), "running sub-rule");
        rule.reset();
        rule.run(workspace, self.options)?;
        let results = if self.options.simulating() {
            rule.test_results()
        } else {
            Vec::new()
        };

        let mut state = self.rule.state.lock();
        state.test_results.extend(results);
        state.sub_rules.push(rule.id());
        Ok(())
    }
}
