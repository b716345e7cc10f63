//! Engine error types.
//!
//! Every failure is caught at the boundary of the operation that caused it
//! and returned as one of these values; none of them leave the engine in a
//! state that blocks the next operation.

use thiserror::Error;

use crmsync_core::{ActionId, BoxError, CoreError, MacroId, QueryKey};
use crmsync_storage::StorageError;

/// A remote write rejected; the cache entry was restored to its snapshot.
#[derive(Debug, Error)]
pub enum MutationError {
    #[error("mutation of {key} failed and was rolled back: {source}")]
    Remote {
        key: QueryKey,
        #[source]
        source: BoxError,
    },
}

/// An action's undo or redo step rejected; both stacks are unchanged.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("undo of '{description}' failed: {source}")]
    Undo {
        action_id: ActionId,
        description: String,
        #[source]
        source: BoxError,
    },

    #[error("redo of '{description}' failed: {source}")]
    Redo {
        action_id: ActionId,
        description: String,
        #[source]
        source: BoxError,
    },
}

/// A save rejected; the data stays marked as unsaved.
#[derive(Debug, Error)]
pub enum AutoSaveError {
    #[error("save failed: {0}")]
    Save(#[source] BoxError),
}

/// Errors from the macro recorder, library and player.
#[derive(Debug, Error)]
pub enum MacroError {
    #[error("macro not found: {0}")]
    NotFound(MacroId),

    #[error("a recording is already in progress")]
    AlreadyRecording,

    #[error("no recording in progress")]
    NotRecording,

    #[error("macro name must not be empty")]
    EmptyName,

    #[error("shortcut '{shortcut}' is already used by macro {owner}")]
    ShortcutInUse { shortcut: String, owner: MacroId },

    #[error(transparent)]
    InvalidShortcut(#[from] CoreError),

    #[error("macro import failed: {0}")]
    Import(#[source] serde_json::Error),

    #[error("macro export failed: {0}")]
    Export(#[source] serde_json::Error),

    #[error("failed to persist macros: {0}")]
    Storage(#[from] StorageError),

    #[error("macro step {index} failed: {source}")]
    Execution {
        index: usize,
        #[source]
        source: BoxError,
    },
}

/// Union of the engine errors, for hosts that funnel everything through one type.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Mutation(#[from] MutationError),

    #[error(transparent)]
    History(#[from] HistoryError),

    #[error(transparent)]
    AutoSave(#[from] AutoSaveError),

    #[error(transparent)]
    Macro(#[from] MacroError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Core(#[from] CoreError),
}
