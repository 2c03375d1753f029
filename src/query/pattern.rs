use super::{Matcher, Matches, QueryOptions};
use crate::cache;
use crate::tree::{NodeId, NodeRef};

/// Structural matcher using ast-grep's metavariable syntax.
///
/// # Metavariable Syntax
///
/// - `$NAME` - Matches a single node and captures it
/// - `$$$NAME` - Matches zero or more nodes (variadic)
/// - `$_` - Matches any single node (anonymous)
///
/// Matches are mapped back onto the queried tree by range and kind, so the
/// tree and the pattern must share a grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AstGrepPattern {
    pattern: String,
}

impl AstGrepPattern {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }
}

impl Matcher for AstGrepPattern {
    fn query<'a>(&'a self, node: NodeRef<'a>, options: QueryOptions) -> Matches<'a> {
        let tree = node.tree();
        let pat = cache::compiled(tree.lang(), &self.pattern);
        let scope = node.range();
        let scope_kind = node.kind();

        // Descend to ast-grep's copy of the queried node so only its subtree
        // is searched.
        let mut current = tree.structural().root();
        while !(current.range() == scope && current.kind() == scope_kind) {
            let inner = current.children().find(|child| {
                let range = child.range();
                range.start <= scope.start && scope.end <= range.end
            });
            match inner {
                Some(inner) => current = inner,
                None => return Box::new(std::iter::empty()),
            }
        }

        let mut found: Vec<NodeId> = Vec::new();
        for m in current.find_all(&pat) {
            let matched = m.get_node();
            let kind = matched.kind();
            let Some(id) = tree.find_node(matched.range(), &kind) else {
                continue;
            };
            if !options.include_self && id == node.id() {
                continue;
            }
            found.push(id);
            if options.stop_at_first {
                break;
            }
        }

        // Arena ids are preorder positions
        found.sort();
        found.dedup();
        Box::new(found.into_iter().map(move |id| tree.node(id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{Adapter, SupportLang, TreeSitterAdapter};

    #[test]
    fn finds_clone_calls() {
        let tree = TreeSitterAdapter::new(SupportLang::Rust)
            .parse("fn main() { let a = x.clone(); let b = y.clone(); let c = z; }")
            .unwrap();
        let pattern = AstGrepPattern::new("$A.clone()");
        let found: Vec<_> = pattern
            .query(tree.root(), QueryOptions::scope())
            .map(|n| n.text())
            .collect();
        assert_eq!(found, vec!["x.clone()", "y.clone()"]);

        let first: Vec<_> = pattern
            .query(tree.root(), QueryOptions::exists_below())
            .map(|n| n.text())
            .collect();
        assert_eq!(first, vec!["x.clone()"]);
    }

    #[test]
    fn limited_to_queried_subtree() {
        let tree = TreeSitterAdapter::new(SupportLang::Rust)
            .parse("fn a() { x.clone(); }\nfn b() { y.clone(); }\n")
            .unwrap();
        let second_fn = tree.root().named_children().nth(1).unwrap();
        let pattern = AstGrepPattern::new("$A.clone()");
        let found: Vec<_> = pattern
            .query(second_fn, QueryOptions::scope())
            .map(|n| n.text())
            .collect();
        assert_eq!(found, vec!["y.clone()"]);
    }

    #[test]
    fn structural_parse_is_shared_between_queries() {
        let tree = TreeSitterAdapter::new(SupportLang::Rust)
            .parse("fn a() { x.clone(); }\nfn b() { y.clone(); }\n")
            .unwrap();
        let first = tree.structural() as *const _;
        let pattern = AstGrepPattern::new("$A.clone()");
        for function in tree.root().named_children() {
            assert_eq!(pattern.query(function, QueryOptions::scope()).count(), 1);
        }
        assert!(std::ptr::eq(first, tree.structural()));
    }

    #[test]
    fn include_self_is_honoured() {
        let tree = TreeSitterAdapter::new(SupportLang::Rust)
            .parse("fn main() { x.clone().clone(); }")
            .unwrap();
        let outer = tree
            .root()
            .descendants()
            .find(|n| n.kind() == "call_expression")
            .unwrap();
        let pattern = AstGrepPattern::new("$A.clone()");
        let with_self: Vec<_> = pattern
            .query(outer, QueryOptions::scope())
            .map(|n| n.text())
            .collect();
        assert_eq!(with_self, vec!["x.clone().clone()", "x.clone()"]);

        let below = QueryOptions {
            include_self: false,
            stop_at_first: false,
        };
        let below: Vec<_> = pattern.query(outer, below).map(|n| n.text()).collect();
        assert_eq!(below, vec!["x.clone()"]);
    }
}
