//! Byte-span mutation engine.
//!
//! Rule bodies queue [`Action`]s on a [`MutationSession`]. The session sorts
//! them by `(start, end)`, drops conflicts with a right-to-left sweep and
//! splices the survivors back to front, so offsets of earlier actions never
//! shift.

pub mod action;
pub mod buffer;
pub mod errors;
pub mod session;
pub mod strategy;

pub use action::{Action, ActionKind, NodeSpan};
pub use buffer::{atomic_write, SourceBuffer};
pub use errors::MutationError;
pub use session::{remove_conflicts, splice, MutationResult, MutationSession, Remap};
pub use strategy::{Strategy, UnknownStrategy};
