use super::{Rule, RuleError};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Named rules, keyed by group then name.
#[derive(Default)]
pub struct Registry {
    rules: RwLock<BTreeMap<String, BTreeMap<String, Arc<Rule>>>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry").field("rules", &self.list()).finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `rule`, replacing any rule with the same group and name.
    pub fn register(&self, rule: Arc<Rule>) -> Arc<Rule> {
        let mut rules = self.rules.write();
        rules
            .entry(rule.group().to_string())
            .or_default()
            .insert(rule.name().to_string(), Arc::clone(&rule));
        rule
    }

    pub fn fetch(&self, group: &str, name: &str) -> Option<Arc<Rule>> {
        self.rules.read().get(group)?.get(name).cloned()
    }

    pub fn contains(&self, group: &str, name: &str) -> bool {
        self.fetch(group, name).is_some()
    }

    /// Every `(group, name)` in sorted order.
    pub fn list(&self) -> Vec<(String, String)> {
        self.rules
            .read()
            .iter()
            .flat_map(|(group, rules)| rules.keys().map(move |name| (group.clone(), name.clone())))
            .collect()
    }

    pub fn clear(&self) {
        self.rules.write().clear();
    }
}

/// Loads rules that are not registered yet, for sub-rule composition.
pub trait RuleLoader: Send + Sync {
    /// Load `group/name`, registering it in `registry`. `Ok(None)` when the
    /// loader has no such rule.
    fn load(
        &self,
        group: &str,
        name: &str,
        registry: &Registry,
    ) -> Result<Option<Arc<Rule>>, RuleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(group: &str, name: &str) -> Arc<Rule> {
        Arc::new(Rule::builder(group, name).build())
    }

    #[test]
    fn register_fetch_list_clear() {
        let registry = Registry::new();
        registry.register(rule("ruby", "b"));
        registry.register(rule("rails", "a"));
        registry.register(rule("ruby", "a"));

        assert!(registry.contains("ruby", "a"));
        assert!(registry.fetch("ruby", "c").is_none());
        assert_eq!(
            registry.list(),
            vec![
                ("rails".to_string(), "a".to_string()),
                ("ruby".to_string(), "a".to_string()),
                ("ruby".to_string(), "b".to_string()),
            ]
        );

        registry.clear();
        assert!(registry.list().is_empty());
    }

    #[test]
    fn re_registering_replaces() {
        let registry = Registry::new();
        registry.register(rule("ruby", "a"));
        let replacement = Arc::new(Rule::builder("ruby", "a").description("second").build());
        registry.register(replacement);
        assert_eq!(
            registry.fetch("ruby", "a").unwrap().description(),
            Some("second")
        );
        assert_eq!(registry.list().len(), 1);
    }
}
