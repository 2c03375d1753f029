//! The pattern matcher contract.
//!
//! A [`Matcher`] takes a node and yields the matching nodes of its subtree in
//! preorder. Two implementations ship: [`NodePattern`], a predicate over node
//! kind and capability-path attributes, and [`AstGrepPattern`], an ast-grep
//! structural pattern with `$META` variables.

pub mod pattern;
pub mod predicate;

pub use pattern::AstGrepPattern;
pub use predicate::{Expect, NodePattern};

use crate::tree::NodeRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueryOptions {
    /// Whether the queried node itself may match.
    pub include_self: bool,
    /// Yield at most one match.
    pub stop_at_first: bool,
}

impl QueryOptions {
    /// Options for match-descent scopes.
    pub fn scope() -> Self {
        Self {
            include_self: true,
            stop_at_first: false,
        }
    }

    /// Options for existence checks below a node.
    pub fn exists_below() -> Self {
        Self {
            include_self: false,
            stop_at_first: true,
        }
    }
}

pub type Matches<'a> = Box<dyn Iterator<Item = NodeRef<'a>> + 'a>;

pub trait Matcher: Send + Sync {
    fn query<'a>(&'a self, node: NodeRef<'a>, options: QueryOptions) -> Matches<'a>;
}
