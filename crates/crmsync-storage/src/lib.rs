//! Durable key-value storage for crmsync.
//!
//! Provides the [`PersistentStore`] trait, a string-keyed namespace of JSON
//! blobs, plus the [`InMemoryStore`] and [`SqliteStore`] backends.
//!
//! # Modules
//!
//! - [`error`]: StorageError enum with all failure modes
//! - [`traits`]: PersistentStore trait and the JSON blob helpers
//! - [`memory`]: InMemoryStore implementation
//! - [`schema`]: SQL schema migrations
//! - [`sqlite`]: SqliteStore implementation

pub mod error;
pub mod memory;
pub mod schema;
pub mod sqlite;
pub mod traits;

pub use error::StorageError;
pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{load_json, save_json, PersistentStore};

/// Key holding the macro library (a JSON object of macro id to macro).
pub const MACROS_KEY: &str = "crm_macros";

/// Key holding the user's shortcut preferences.
pub const SHORTCUT_PREFERENCES_KEY: &str = "crm_shortcut_preferences";
