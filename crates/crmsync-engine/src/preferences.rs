//! Persisted keyboard-shortcut preferences.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crmsync_core::Shortcut;
use crmsync_storage::{load_json, save_json, PersistentStore, StorageError, SHORTCUT_PREFERENCES_KEY};

/// User overrides for named shortcut bindings (e.g. `history.undo`).
///
/// An action without an override keeps its built-in bindings. When
/// `enabled` is false no engine binding is registered at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShortcutPreferences {
    pub enabled: bool,
    pub overrides: BTreeMap<String, Vec<Shortcut>>,
}

impl Default for ShortcutPreferences {
    fn default() -> Self {
        ShortcutPreferences {
            enabled: true,
            overrides: BTreeMap::new(),
        }
    }
}

impl ShortcutPreferences {
    /// Loads the stored preferences; missing or corrupt data yields the defaults.
    pub fn load<S: PersistentStore + ?Sized>(store: &S) -> Self {
        load_json(store, SHORTCUT_PREFERENCES_KEY).unwrap_or_default()
    }

    pub fn save<S: PersistentStore + ?Sized>(&self, store: &mut S) -> Result<(), StorageError> {
        save_json(store, SHORTCUT_PREFERENCES_KEY, self)
    }

    /// Replaces the bindings of `action`. An empty list unbinds it.
    pub fn set_override(&mut self, action: impl Into<String>, shortcuts: impl IntoIterator<Item = Shortcut>) {
        self.overrides.insert(action.into(), shortcuts.into_iter().collect());
    }

    /// Restores the built-in bindings of `action`.
    pub fn clear_override(&mut self, action: &str) -> bool {
        self.overrides.remove(action).is_some()
    }

    /// The shortcuts to register for `action`.
    pub fn bindings_for(&self, action: &str, defaults: &[&str]) -> Vec<Shortcut> {
        if !self.enabled {
            return Vec::new();
        }
        if let Some(shortcuts) = self.overrides.get(action) {
            return shortcuts.clone();
        }
        defaults
            .iter()
            .filter_map(|raw| match raw.parse::<Shortcut>() {
                Ok(shortcut) => Some(shortcut),
                Err(err) => {
                    tracing::warn!(action, error = %err, "skipping unparsable default binding");
                    None
                }
            })
            .collect()
    }
}
