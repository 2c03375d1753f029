//! Node trees and the adapter boundary.
//!
//! A tree-sitter parse is copied into an owned [`SyntaxTree`] arena so rule
//! code can hold plain [`NodeId`]s and cheap [`NodeRef`] handles. Capability
//! paths resolve against it through the per-kind [`CapabilityTable`].

pub mod adapter;
pub mod capability;
pub mod errors;
pub mod language;
pub mod node;

pub use adapter::{Adapter, TreeSitterAdapter};
pub use capability::{Accessor, CapabilityTable, Resolved};
pub use errors::TreeError;
pub use language::SupportLang;
pub use node::{Descendants, NodeId, NodeRef, SyntaxTree};
