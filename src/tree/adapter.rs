use super::capability::{CapabilityTable, Resolved};
use super::node::{NodeId, SyntaxTree};
use super::TreeError;
use crate::pool;
use ast_grep_language::SupportLang;
use std::sync::Arc;

/// Tree access used by rule instances: parse text, resolve capability paths.
pub trait Adapter: Send + Sync {
    fn parse(&self, text: &str) -> Result<SyntaxTree, TreeError>;

    fn resolve(&self, tree: &SyntaxTree, node: NodeId, path: &str) -> Result<Resolved, TreeError> {
        tree.resolve(node, path)
    }
}

/// Parses with the pooled tree-sitter parser for one grammar.
#[derive(Debug, Clone)]
pub struct TreeSitterAdapter {
    lang: SupportLang,
    capabilities: Arc<CapabilityTable>,
}

impl TreeSitterAdapter {
    pub fn new(lang: SupportLang) -> Self {
        let capabilities = Arc::new(CapabilityTable::for_language(&lang));
        Self { lang, capabilities }
    }

    /// Replace the built-in capability table.
    pub fn with_capabilities(mut self, table: CapabilityTable) -> Self {
        self.capabilities = Arc::new(table);
        self
    }

    pub fn lang(&self) -> &SupportLang {
        &self.lang
    }
}

impl Adapter for TreeSitterAdapter {
    fn parse(&self, text: &str) -> Result<SyntaxTree, TreeError> {
        let tree = pool::with_parser(&self.lang, |parser| parser.parse(text, None))?
            .ok_or(TreeError::ParseFailed)?;
        Ok(SyntaxTree::from_tree_sitter(
            text.to_string(),
            self.lang.clone(),
            &tree,
            Arc::clone(&self.capabilities),
        ))
    }
}
