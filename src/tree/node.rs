use super::capability::CapabilityTable;
use ast_grep_core::tree_sitter::StrDoc;
use ast_grep_core::AstGrep;
use ast_grep_language::{LanguageExt, SupportLang};
use std::fmt;
use std::ops::Range;
use std::sync::{Arc, OnceLock};
use tree_sitter::Language;

/// Index of a node inside its [`SyntaxTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
struct NodeData {
    kind: &'static str,
    range: Range<usize>,
    named: bool,
    field: Option<&'static str>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// An owned, immutable node tree over one parse text.
///
/// Nodes live in a flat preorder arena; parents are indices, never owners.
pub struct SyntaxTree {
    source: String,
    lang: SupportLang,
    language: Language,
    nodes: Vec<NodeData>,
    capabilities: Arc<CapabilityTable>,
    /// ast-grep's view of `source`, parsed on first structural query.
    structural: OnceLock<AstGrep<StrDoc<SupportLang>>>,
}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyntaxTree")
            .field("lang", &self.lang)
            .field("source_len", &self.source.len())
            .field("nodes", &self.nodes.len())
            .finish()
    }
}

impl SyntaxTree {
    /// Copy a tree-sitter tree into the arena.
    pub fn from_tree_sitter(
        source: String,
        lang: SupportLang,
        tree: &tree_sitter::Tree,
        capabilities: Arc<CapabilityTable>,
    ) -> Self {
        let mut nodes: Vec<NodeData> = Vec::new();
        let mut parents: Vec<NodeId> = Vec::new();
        let mut cursor = tree.walk();

        'walk: loop {
            let node = cursor.node();
            let id = NodeId(nodes.len());
            let parent = parents.last().copied();
            nodes.push(NodeData {
                kind: node.kind(),
                range: node.byte_range(),
                named: node.is_named(),
                field: cursor.field_name(),
                parent,
                children: Vec::new(),
            });
            if let Some(parent) = parent {
                nodes[parent.0].children.push(id);
            }

            if cursor.goto_first_child() {
                parents.push(id);
                continue;
            }
            loop {
                if cursor.goto_next_sibling() {
                    break;
                }
                if !cursor.goto_parent() {
                    break 'walk;
                }
                parents.pop();
            }
        }

        let language = lang.get_ts_language();
        Self {
            source,
            lang,
            language,
            nodes,
            capabilities,
            structural: OnceLock::new(),
        }
    }

    pub fn root(&self) -> NodeRef<'_> {
        self.node(NodeId(0))
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn lang(&self) -> &SupportLang {
        &self.lang
    }

    /// The same text parsed for ast-grep matching. Parsed once per tree.
    pub fn structural(&self) -> &AstGrep<StrDoc<SupportLang>> {
        self.structural
            .get_or_init(|| AstGrep::new(self.source.as_str(), self.lang.clone()))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    /// Whether the grammar declares a field with this name.
    pub fn is_field(&self, name: &str) -> bool {
        self.language.field_id_for_name(name).is_some()
    }

    /// Outermost node with exactly this range and kind.
    pub fn find_node(&self, range: Range<usize>, kind: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.range == range && n.kind == kind)
            .map(NodeId)
    }

    /// Byte offset where the line holding `offset` starts.
    pub fn line_start(&self, offset: usize) -> usize {
        self.source[..offset].rfind('\n').map_or(0, |i| i + 1)
    }

    /// Byte offset of the newline ending the line holding `offset`, or the
    /// source length on the last line.
    pub fn line_end(&self, offset: usize) -> usize {
        self.source[offset..]
            .find('\n')
            .map_or(self.source.len(), |i| offset + i)
    }

    /// Leading whitespace of the line holding `offset`.
    pub fn indent_at(&self, offset: usize) -> &str {
        let start = self.line_start(offset);
        let line = &self.source[start..self.line_end(offset)];
        let width = line.len() - line.trim_start_matches([' ', '\t']).len();
        &line[..width]
    }

    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes[id.0]
    }
}

/// A borrowed handle to one node.
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t SyntaxTree,
    id: NodeId,
}

impl fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:?}", self.kind(), self.range())
    }
}

impl PartialEq for NodeRef<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.id == other.id
    }
}

impl Eq for NodeRef<'_> {}

impl<'t> NodeRef<'t> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn tree(&self) -> &'t SyntaxTree {
        self.tree
    }

    pub fn kind(&self) -> &'static str {
        self.tree.data(self.id).kind
    }

    pub fn range(&self) -> Range<usize> {
        self.tree.data(self.id).range.clone()
    }

    pub fn start(&self) -> usize {
        self.tree.data(self.id).range.start
    }

    pub fn end(&self) -> usize {
        self.tree.data(self.id).range.end
    }

    pub fn text(&self) -> &'t str {
        &self.tree.source[self.range()]
    }

    pub fn is_named(&self) -> bool {
        self.tree.data(self.id).named
    }

    /// Grammar field this node occupies in its parent.
    pub fn field_name(&self) -> Option<&'static str> {
        self.tree.data(self.id).field
    }

    pub fn parent(&self) -> Option<NodeRef<'t>> {
        self.tree.data(self.id).parent.map(|id| self.tree.node(id))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'t>> + 't {
        let tree = self.tree;
        tree.data(self.id).children.iter().map(move |&id| tree.node(id))
    }

    pub fn named_children(&self) -> impl Iterator<Item = NodeRef<'t>> + 't {
        self.children().filter(|child| child.is_named())
    }

    /// First child under a grammar field.
    pub fn field(&self, name: &str) -> Option<NodeRef<'t>> {
        self.fields(name).next()
    }

    /// Every child under a grammar field, in source order.
    pub fn fields<'n>(&self, name: &'n str) -> impl Iterator<Item = NodeRef<'t>> + 'n
    where
        't: 'n,
    {
        self.children().filter(move |child| child.field_name() == Some(name))
    }

    /// Preorder walk of this subtree, starting with the node itself.
    pub fn descendants(&self) -> Descendants<'t> {
        Descendants {
            tree: self.tree,
            stack: vec![self.id],
        }
    }

    /// 1-based line of the node's first byte.
    pub fn line(&self) -> usize {
        self.tree.source[..self.start()].matches('\n').count() + 1
    }

    pub fn column(&self) -> usize {
        self.start() - self.tree.line_start(self.start())
    }

    pub fn indent(&self) -> &'t str {
        self.tree.indent_at(self.start())
    }
}

pub struct Descendants<'t> {
    tree: &'t SyntaxTree,
    stack: Vec<NodeId>,
}

impl<'t> Iterator for Descendants<'t> {
    type Item = NodeRef<'t>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.data(id).children.iter().rev().copied());
        Some(self.tree.node(id))
    }
}
