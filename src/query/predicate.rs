use super::{Matcher, Matches, QueryOptions};
use crate::tree::{NodeRef, Resolved, SyntaxTree};

/// Predicate over a node: an optional kind plus attribute expectations keyed
/// by capability path.
///
/// ```no_run
/// use node_rewriter::query::{Expect, NodePattern};
///
/// // foo.bar(...) calls whose last argument is a string literal
/// let pattern = NodePattern::kind("call_expression")
///     .attr("receiver.field", "bar")
///     .attr("arguments.-1", NodePattern::kind("string_literal"));
/// # let _ = pattern;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodePattern {
    kind: Option<String>,
    attributes: Vec<(String, Expect)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expect {
    /// Source text equals this string.
    Text(String),
    OneOf(Vec<String>),
    /// The resolved node (or any sequence element) matches a nested pattern.
    Node(Box<NodePattern>),
    Present,
    Absent,
    /// Sequence length, or named child count of a single node.
    Len(usize),
    Not(Box<Expect>),
}

impl From<&str> for Expect {
    fn from(text: &str) -> Self {
        Expect::Text(text.to_string())
    }
}

impl From<String> for Expect {
    fn from(text: String) -> Self {
        Expect::Text(text)
    }
}

impl From<NodePattern> for Expect {
    fn from(pattern: NodePattern) -> Self {
        Expect::Node(Box::new(pattern))
    }
}

impl Expect {
    pub fn not(expect: impl Into<Expect>) -> Self {
        Expect::Not(Box::new(expect.into()))
    }

    fn accepts(&self, tree: &SyntaxTree, resolved: &Resolved) -> bool {
        match self {
            Expect::Text(expected) => !resolved.is_absent() && resolved.text(tree) == expected,
            Expect::OneOf(options) => {
                !resolved.is_absent() && options.iter().any(|o| o == resolved.text(tree))
            }
            Expect::Node(pattern) => resolved
                .nodes()
                .into_iter()
                .any(|id| pattern.is_match(tree.node(id))),
            Expect::Present => !resolved.is_absent(),
            Expect::Absent => resolved.is_absent(),
            Expect::Len(len) => match resolved {
                Resolved::Sequence(ids) => ids.len() == *len,
                Resolved::Node(id) => tree.node(*id).named_children().count() == *len,
                Resolved::Absent => *len == 0,
            },
            Expect::Not(inner) => !inner.accepts(tree, resolved),
        }
    }
}

impl NodePattern {
    /// Matches every named node.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            attributes: Vec::new(),
        }
    }

    pub fn attr(mut self, path: impl Into<String>, expect: impl Into<Expect>) -> Self {
        self.attributes.push((path.into(), expect.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.attributes.is_empty()
    }

    /// Attributes whose path does not resolve count as a mismatch.
    pub fn is_match(&self, node: NodeRef<'_>) -> bool {
        if !node.is_named() {
            return false;
        }
        if let Some(kind) = &self.kind {
            if node.kind() != kind {
                return false;
            }
        }
        let tree = node.tree();
        self.attributes.iter().all(|(path, expect)| {
            tree.resolve(node.id(), path)
                .map(|resolved| expect.accepts(tree, &resolved))
                .unwrap_or(false)
        })
    }
}

impl Matcher for NodePattern {
    fn query<'a>(&'a self, node: NodeRef<'a>, options: QueryOptions) -> Matches<'a> {
        let skip = usize::from(!options.include_self);
        let matches = node
            .descendants()
            .skip(skip)
            .filter(move |candidate| self.is_match(*candidate));
        if options.stop_at_first {
            Box::new(matches.take(1))
        } else {
            Box::new(matches)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Adapter, SupportLang, TreeSitterAdapter};

    fn rust(source: &str) -> SyntaxTree {
        TreeSitterAdapter::new(SupportLang::Rust).parse(source).unwrap()
    }

    #[test]
    fn matches_kind_and_text_attribute() {
        let tree = rust("struct Foobar;\nstruct Other;\n");
        let pattern = NodePattern::kind("struct_item").attr("name", "Foobar");
        let found: Vec<_> = pattern
            .query(tree.root(), QueryOptions::scope())
            .map(|n| n.text())
            .collect();
        assert_eq!(found, vec!["struct Foobar;"]);
    }

    #[test]
    fn nested_pattern_on_sequence() {
        let tree = rust("fn main() { log(1, \"a\"); log(2, 3); }");
        let pattern = NodePattern::kind("call_expression")
            .attr("function", "log")
            .attr("arguments.-1", NodePattern::kind("string_literal"));
        let found: Vec<_> = pattern
            .query(tree.root(), QueryOptions::scope())
            .map(|n| n.text())
            .collect();
        assert_eq!(found, vec!["log(1, \"a\")"]);
    }

    #[test]
    fn absent_len_and_negation() {
        let tree = rust("struct A;\nstruct B<T>(T);\n");
        let plain = NodePattern::kind("struct_item").attr("type_parameters", Expect::Absent);
        let generic = NodePattern::kind("struct_item")
            .attr("type_parameters", Expect::not(Expect::Absent))
            .attr("type_parameters", Expect::Len(1));
        let texts = |p: &NodePattern| -> Vec<String> {
            p.query(tree.root(), QueryOptions::scope())
                .map(|n| n.text().to_string())
                .collect()
        };
        assert_eq!(texts(&plain), vec!["struct A;"]);
        assert_eq!(texts(&generic), vec!["struct B<T>(T);"]);
    }

    #[test]
    fn unresolvable_attribute_is_a_mismatch() {
        let tree = rust("struct A;");
        let pattern = NodePattern::kind("struct_item").attr("no_such_capability", "A");
        assert_eq!(pattern.query(tree.root(), QueryOptions::scope()).count(), 0);
    }

    #[test]
    fn include_self_and_stop_at_first() {
        let tree = rust("mod a { mod b {} }");
        let outer = tree
            .root()
            .named_children()
            .next()
            .unwrap();
        let pattern = NodePattern::kind("mod_item");

        let with_self = pattern.query(outer, QueryOptions::scope()).count();
        let below = pattern
            .query(
                outer,
                QueryOptions {
                    include_self: false,
                    stop_at_first: false,
                },
            )
            .count();
        let first = pattern.query(tree.root(), QueryOptions::exists_below()).count();
        assert_eq!((with_self, below, first), (2, 1, 1));
    }

    #[test]
    fn anonymous_tokens_never_match() {
        let tree = rust("struct A;");
        let pattern = NodePattern::kind("struct");
        assert_eq!(pattern.query(tree.root(), QueryOptions::scope()).count(), 0);
    }
}
