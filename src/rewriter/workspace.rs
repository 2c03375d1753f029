use super::{Registry, RuleError, RuleLoader};
use crate::config::{ConfigError, Configuration};
use crate::files::{self, PathFilter};
use crate::mutation::Strategy;
use crate::safety::RootGuard;
use crate::template::EngineRegistry;
use crate::tree::Adapter;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The collaborators a rule run is given: configuration, the rule
/// registry, template engines, an optional adapter override and an optional
/// loader for rules that are not registered yet.
pub struct Workspace {
    config: Configuration,
    strategy: Strategy,
    filter: PathFilter,
    guard: RootGuard,
    registry: Arc<Registry>,
    engines: EngineRegistry,
    adapter: Option<Arc<dyn Adapter>>,
    loader: Option<Arc<dyn RuleLoader>>,
}

impl fmt::Debug for Workspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workspace")
            .field("root", &self.guard.root())
            .field("config", &self.config)
            .field("engines", &self.engines)
            .field("adapter", &self.adapter.is_some())
            .field("loader", &self.loader.is_some())
            .finish()
    }
}

impl Workspace {
    /// Validate `config` and resolve its root.
    pub fn new(config: Configuration) -> Result<Self, RuleError> {
        config
            .validate()
            .map_err(|source| ConfigError::Validation { path: None, source })?;
        let strategy = config.strategy().unwrap_or_default();
        let filter = PathFilter::new(&config.only_paths, &config.skip_paths)?;
        let guard = RootGuard::new(&config.root_path)?;
        Ok(Self {
            config,
            strategy,
            filter,
            guard,
            registry: Arc::new(Registry::new()),
            engines: EngineRegistry::with_defaults(),
            adapter: None,
            loader: None,
        })
    }

    /// A workspace rooted at `root` with default configuration.
    pub fn at(root: impl Into<PathBuf>) -> Result<Self, RuleError> {
        Self::new(Configuration::default().with_root(root))
    }

    pub fn with_registry(mut self, registry: Arc<Registry>) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_engines(mut self, engines: EngineRegistry) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn with_loader(mut self, loader: Arc<dyn RuleLoader>) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Canonical root directory.
    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    pub fn strategy(&self) -> Strategy {
        self.strategy
    }

    pub fn guard(&self) -> &RootGuard {
        &self.guard
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    pub fn adapter(&self) -> Option<&dyn Adapter> {
        self.adapter.as_deref()
    }

    pub fn loader(&self) -> Option<&dyn RuleLoader> {
        self.loader.as_deref()
    }

    /// Root-relative files matching `patterns` after the configured
    /// only/skip filters.
    pub fn glob<S: AsRef<str>>(&self, patterns: &[S]) -> Result<Vec<PathBuf>, RuleError> {
        Ok(files::glob(self.root(), patterns, &self.filter)?)
    }
}
