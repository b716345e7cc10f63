//! The [`PersistentStore`] trait defining the durable storage contract.
//!
//! Values are opaque strings; callers store JSON through [`save_json`] and
//! read it back through [`load_json`], which treats corrupt data as absent.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;

/// A string-keyed namespace of string values.
///
/// Backends (InMemoryStore, SqliteStore) are fully swappable.
pub trait PersistentStore: Send {
    /// Returns the stored value, or `None` if the key was never set.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

impl<S: PersistentStore + ?Sized> PersistentStore for Box<S> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}

/// Reads and deserializes the JSON stored under `key`.
///
/// Missing keys, backend read failures and unparsable JSON all yield
/// `None`; the latter two are logged.
pub fn load_json<T, S>(store: &S, key: &str) -> Option<T>
where
    T: DeserializeOwned,
    S: PersistentStore + ?Sized,
{
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(err) => {
            tracing::warn!(key, error = %err, "failed to read persisted data");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(key, error = %err, "ignoring corrupt persisted data");
            None
        }
    }
}

/// Serializes `value` as JSON and stores it under `key`.
pub fn save_json<T, S>(store: &mut S, key: &str, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
    S: PersistentStore + ?Sized,
{
    let json = serde_json::to_string(value)?;
    store.set(key, &json)
}
