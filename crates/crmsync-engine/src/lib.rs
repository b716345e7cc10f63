//! The crmsync state-synchronization engine.
//!
//! - [`optimistic`]: [`MutationCoordinator`], snapshot/predict/rollback around remote writes
//! - [`predict`]: list-shaped prediction helpers for collection mutations
//! - [`history`]: [`CommandHistory`], undo/redo over data-only [`Action`]s
//! - [`autosave`]: [`AutoSaver`], debounced saving with teardown flush
//! - [`macros`]: recording, storing and replaying UI macros
//! - [`preferences`]: persisted shortcut overrides
//! - [`sync_core`]: [`SyncCore`], one place wiring the pieces together
//! - [`error`]: engine error types

pub mod autosave;
pub mod error;
pub mod history;
pub mod macros;
pub mod optimistic;
pub mod predict;
pub mod preferences;
pub mod sync_core;

pub use autosave::{AutoSaveOptions, AutoSaveStatus, AutoSaver, SaveIndicator};
pub use error::{AutoSaveError, EngineError, HistoryError, MacroError, MutationError};
pub use history::{Action, ActionKind, CommandHistory, HistoryEntry, HistoryStep, RecordPort};
pub use macros::{
    Macro, MacroAction, MacroActionKind, MacroExecutor, MacroLibrary, MacroManager, MacroPatch,
    MacroRecorder, NoopExecutor, PlaybackReport, RecordedInput, RecorderState,
};
pub use optimistic::{ConcurrencyPolicy, MutationCoordinator};
pub use preferences::ShortcutPreferences;
pub use sync_core::SyncCore;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a std mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
