//! Undo/redo over reversible, data-only actions.
//!
//! [`Action`] describes what was done (create, update, delete, batch delete,
//! single-field update) with the data needed to reverse it. [`CommandHistory`]
//! keeps the past/future stacks and interprets an action against an injected
//! [`RecordPort`] when it is undone or redone.

pub mod action;
pub mod engine;
pub mod port;
pub mod stack;

pub use action::{Action, ActionKind, HistoryEntry};
pub use engine::{CommandHistory, HistoryStep, REDO_ACTION, UNDO_ACTION};
pub use port::RecordPort;
pub use stack::HistoryState;
