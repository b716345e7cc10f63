//! Shared building blocks for the crmsync state-synchronization core.
//!
//! - [`id`]: typed identifiers for actions and macros
//! - [`key`]: [`QueryKey`], the address of a cache entry
//! - [`cache`]: the [`QueryCache`] port and the [`InMemoryCache`] backend
//! - [`keys`]: keyboard model and the chord-aware [`SequenceDispatcher`]
//! - [`config`]: [`SyncConfig`] with environment overrides
//! - [`error`]: [`CoreError`]

pub mod cache;
pub mod config;
pub mod error;
pub mod id;
pub mod key;
pub mod keys;

pub use cache::{BoxError, BoxFuture, CacheEvent, InMemoryCache, QueryCache};
pub use config::SyncConfig;
pub use error::CoreError;
pub use id::{ActionId, MacroActionId, MacroId, ShortcutId};
pub use key::QueryKey;
pub use keys::{KeyDispatch, KeyEvent, Modifiers, SequenceDispatcher, SequenceDetector, Shortcut};

/// Milliseconds since the Unix epoch, used for persisted timestamps.
pub fn epoch_millis() -> u64 {
    use std::time::SystemTime;
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
