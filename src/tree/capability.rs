//! Capability paths: dotted accessors such as `arguments.-1` or
//! `name`, resolved against a node.
//!
//! Named segments are looked up in a per-kind [`CapabilityTable`] first,
//! then as grammar fields, then as the generic `children`, `parent`,
//! `first` and `last`. Numeric segments index named children (or a
//! sequence); negative indices count from the end.

use super::node::{NodeId, NodeRef, SyntaxTree};
use super::TreeError;
use ast_grep_language::SupportLang;
use std::collections::HashMap;
use std::ops::Range;

/// How a named segment reaches from a node to its target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Accessor {
    /// The child under a grammar field.
    Field(String),
    /// The named children of the child under a grammar field.
    FieldChildren(String),
    NamedChildren,
    Parent,
}

/// Per-kind named accessors, on top of what the grammar provides.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: HashMap<String, HashMap<String, Accessor>>,
}

impl CapabilityTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kind: &str, name: &str, accessor: Accessor) -> Self {
        self.insert(kind, name, accessor);
        self
    }

    pub fn insert(&mut self, kind: &str, name: &str, accessor: Accessor) {
        self.entries
            .entry(kind.to_string())
            .or_default()
            .insert(name.to_string(), accessor);
    }

    pub fn get(&self, kind: &str, name: &str) -> Option<&Accessor> {
        self.entries.get(kind)?.get(name)
    }

    /// Built-in accessors for a grammar.
    pub fn for_language(lang: &SupportLang) -> Self {
        let field = |name: &str| Accessor::Field(name.to_string());
        let listed = |name: &str| Accessor::FieldChildren(name.to_string());
        match lang {
            SupportLang::Rust => Self::new()
                .with("call_expression", "arguments", listed("arguments"))
                .with("call_expression", "parentheses", field("arguments"))
                .with("call_expression", "receiver", field("function"))
                .with("field_expression", "receiver", field("value"))
                .with("field_expression", "message", field("field"))
                .with("function_item", "arguments", listed("parameters"))
                .with("function_item", "parentheses", field("parameters"))
                .with("macro_invocation", "name", field("macro"))
                .with("struct_item", "fields", listed("body"))
                .with("impl_item", "items", listed("body")),
            SupportLang::Ruby => Self::new()
                .with("call", "message", field("method"))
                .with("call", "arguments", listed("arguments"))
                .with("call", "parentheses", field("arguments"))
                .with("class", "parent_class", listed("superclass"))
                .with("class", "body", listed("body"))
                .with("method", "arguments", listed("parameters"))
                .with("method", "parentheses", field("parameters"))
                .with("pair", "key", field("key")),
            SupportLang::Python => Self::new()
                .with("call", "arguments", listed("arguments"))
                .with("call", "parentheses", field("arguments"))
                .with("function_definition", "arguments", listed("parameters"))
                .with("attribute", "message", field("attribute"))
                .with("attribute", "receiver", field("object")),
            SupportLang::JavaScript | SupportLang::TypeScript | SupportLang::Tsx => Self::new()
                .with("call_expression", "arguments", listed("arguments"))
                .with("call_expression", "parentheses", field("arguments"))
                .with("member_expression", "receiver", field("object"))
                .with("member_expression", "message", field("property"))
                .with("function_declaration", "arguments", listed("parameters")),
            SupportLang::Go => Self::new()
                .with("call_expression", "arguments", listed("arguments"))
                .with("call_expression", "parentheses", field("arguments"))
                .with("function_declaration", "arguments", listed("parameters")),
            _ => Self::new(),
        }
    }
}

/// What a capability path resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    Node(NodeId),
    Sequence(Vec<NodeId>),
    Absent,
}

impl Resolved {
    fn from_nodes(mut ids: Vec<NodeId>) -> Self {
        match ids.len() {
            0 => Resolved::Absent,
            1 => Resolved::Node(ids.remove(0)),
            _ => Resolved::Sequence(ids),
        }
    }

    /// The covered range: a node's own range, or first start to last end
    /// for a non-empty sequence.
    pub fn range(&self, tree: &SyntaxTree) -> Option<Range<usize>> {
        match self {
            Resolved::Node(id) => Some(tree.node(*id).range()),
            Resolved::Sequence(ids) => {
                let first = tree.node(*ids.first()?);
                let last = tree.node(*ids.last()?);
                Some(first.start()..last.end())
            }
            Resolved::Absent => None,
        }
    }

    /// Source text of [`range`](Self::range); empty when there is none.
    pub fn text<'t>(&self, tree: &'t SyntaxTree) -> &'t str {
        self.range(tree).map_or("", |range| &tree.source()[range])
    }

    pub fn is_absent(&self) -> bool {
        match self {
            Resolved::Absent => true,
            Resolved::Sequence(ids) => ids.is_empty(),
            Resolved::Node(_) => false,
        }
    }

    /// Nodes to visit: one, each element, or none.
    pub fn nodes(&self) -> Vec<NodeId> {
        match self {
            Resolved::Node(id) => vec![*id],
            Resolved::Sequence(ids) => ids.clone(),
            Resolved::Absent => Vec::new(),
        }
    }
}

impl SyntaxTree {
    /// Resolve a dotted capability path from `node`. The empty path is the
    /// node itself.
    pub fn resolve(&self, node: NodeId, path: &str) -> Result<Resolved, TreeError> {
        let mut current = Resolved::Node(node);
        if path.is_empty() {
            return Ok(current);
        }
        for segment in path.split('.') {
            current = match current {
                Resolved::Absent => return Ok(Resolved::Absent),
                Resolved::Node(id) => self.resolve_on_node(self.node(id), segment)?,
                Resolved::Sequence(ids) => self.resolve_on_sequence(ids, segment)?,
            };
        }
        Ok(current)
    }

    /// Resolve `path` and return its range, failing when it has none.
    pub fn resolve_range(&self, node: NodeId, path: &str) -> Result<Range<usize>, TreeError> {
        self.resolve(node, path)?
            .range(self)
            .ok_or_else(|| TreeError::EmptyRange {
                path: path.to_string(),
                text: self.node(node).text().to_string(),
            })
    }

    fn resolve_on_node(&self, node: NodeRef<'_>, segment: &str) -> Result<Resolved, TreeError> {
        if let Ok(index) = segment.parse::<isize>() {
            let children: Vec<NodeId> = node.named_children().map(|n| n.id()).collect();
            return Ok(index_into(&children, index).map_or(Resolved::Absent, Resolved::Node));
        }

        if let Some(accessor) = self.capabilities().get(node.kind(), segment) {
            return Ok(apply_accessor(node, accessor));
        }

        if self.is_field(segment) {
            return Ok(Resolved::from_nodes(
                node.fields(segment).map(|n| n.id()).collect(),
            ));
        }

        let resolved = match segment {
            "children" => Resolved::Sequence(node.named_children().map(|n| n.id()).collect()),
            "parent" => node.parent().map_or(Resolved::Absent, |p| Resolved::Node(p.id())),
            "first" => node
                .named_children()
                .next()
                .map_or(Resolved::Absent, |n| Resolved::Node(n.id())),
            "last" => node
                .named_children()
                .last()
                .map_or(Resolved::Absent, |n| Resolved::Node(n.id())),
            _ => {
                return Err(TreeError::UnresolvedCapability {
                    segment: segment.to_string(),
                    text: node.text().to_string(),
                })
            }
        };
        Ok(resolved)
    }

    fn resolve_on_sequence(&self, ids: Vec<NodeId>, segment: &str) -> Result<Resolved, TreeError> {
        let picked = match segment {
            "first" => ids.first().copied(),
            "last" => ids.last().copied(),
            _ => match segment.parse::<isize>() {
                Ok(index) => index_into(&ids, index),
                Err(_) => {
                    let text = Resolved::Sequence(ids).text(self).to_string();
                    return Err(TreeError::UnresolvedCapability {
                        segment: segment.to_string(),
                        text,
                    });
                }
            },
        };
        Ok(picked.map_or(Resolved::Absent, Resolved::Node))
    }
}

fn apply_accessor(node: NodeRef<'_>, accessor: &Accessor) -> Resolved {
    match accessor {
        Accessor::Field(name) => node
            .field(name)
            .map_or(Resolved::Absent, |n| Resolved::Node(n.id())),
        Accessor::FieldChildren(name) => match node.field(name) {
            Some(container) => {
                Resolved::Sequence(container.named_children().map(|n| n.id()).collect())
            }
            None => Resolved::Absent,
        },
        Accessor::NamedChildren => {
            Resolved::Sequence(node.named_children().map(|n| n.id()).collect())
        }
        Accessor::Parent => node
            .parent()
            .map_or(Resolved::Absent, |p| Resolved::Node(p.id())),
    }
}

fn index_into(ids: &[NodeId], index: isize) -> Option<NodeId> {
    let len = ids.len() as isize;
    let position = if index < 0 { len + index } else { index };
    if (0..len).contains(&position) {
        Some(ids[position as usize])
    } else {
        None
    }
}
