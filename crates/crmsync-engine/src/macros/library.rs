//! The persisted macro collection.
//!
//! The whole collection is stored as one JSON object keyed by macro id and
//! rewritten on every change. A change is only applied in memory once the
//! store accepted it, so a failed write leaves the library untouched.

use indexmap::IndexMap;

use crmsync_core::{epoch_millis, MacroId, Shortcut};
use crmsync_storage::{load_json, save_json, PersistentStore, MACROS_KEY};

use super::model::{Macro, MacroPatch};
use crate::error::MacroError;

type MacroMap = IndexMap<MacroId, Macro>;

pub struct MacroLibrary<S> {
    store: S,
    macros: MacroMap,
}

impl<S: PersistentStore> MacroLibrary<S> {
    /// Loads the stored collection. Missing or corrupt data yields an empty library.
    pub fn load(store: S) -> Self {
        let macros: MacroMap = load_json(&store, MACROS_KEY).unwrap_or_default();
        tracing::debug!(count = macros.len(), "loaded macro library");
        MacroLibrary { store, macros }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn len(&self) -> usize {
        self.macros.len()
    }

    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    pub fn get(&self, id: MacroId) -> Option<&Macro> {
        self.macros.get(&id)
    }

    /// All macros, oldest first.
    pub fn list(&self) -> Vec<&Macro> {
        let mut macros: Vec<&Macro> = self.macros.values().collect();
        macros.sort_by_key(|m| m.created_at);
        macros
    }

    pub fn find_by_shortcut(&self, shortcut: &Shortcut) -> Option<&Macro> {
        self.macros.values().find(|m| m.shortcut.as_ref() == Some(shortcut))
    }

    /// Adds a freshly recorded macro.
    pub fn insert(&mut self, mac: Macro) -> Result<MacroId, MacroError> {
        validate_name(&mac.name)?;
        if let Some(shortcut) = &mac.shortcut {
            self.check_shortcut(shortcut, mac.id)?;
        }
        let id = mac.id;
        let mut next = self.macros.clone();
        next.insert(id, mac);
        self.commit(next)?;
        Ok(id)
    }

    pub fn update(&mut self, id: MacroId, patch: MacroPatch) -> Result<&Macro, MacroError> {
        let mut mac = self.macros.get(&id).cloned().ok_or(MacroError::NotFound(id))?;
        if let Some(name) = patch.name {
            validate_name(&name)?;
            mac.name = name.trim().to_string();
        }
        if let Some(description) = patch.description {
            mac.description = description;
        }
        if let Some(shortcut) = patch.shortcut {
            if let Some(shortcut) = &shortcut {
                self.check_shortcut(shortcut, id)?;
            }
            mac.shortcut = shortcut;
        }
        if let Some(actions) = patch.actions {
            mac.actions = actions;
        }

        let mut next = self.macros.clone();
        next.insert(id, mac);
        self.commit(next)?;
        self.macros.get(&id).ok_or(MacroError::NotFound(id))
    }

    /// Copies a macro under a new id. The copy has no shortcut and no usage.
    pub fn duplicate(&mut self, id: MacroId) -> Result<MacroId, MacroError> {
        let original = self.macros.get(&id).ok_or(MacroError::NotFound(id))?;
        let copy = Macro {
            id: MacroId::new(),
            name: format!("{} (copy)", original.name),
            shortcut: None,
            created_at: epoch_millis(),
            last_used_at: None,
            times_used: 0,
            ..original.clone()
        };
        self.insert(copy)
    }

    pub fn delete(&mut self, id: MacroId) -> Result<Macro, MacroError> {
        let mut next = self.macros.clone();
        let removed = next.shift_remove(&id).ok_or(MacroError::NotFound(id))?;
        self.commit(next)?;
        Ok(removed)
    }

    /// Bumps the usage counter and last-used time, returning the updated macro.
    pub fn mark_used(&mut self, id: MacroId) -> Result<Macro, MacroError> {
        let mut next = self.macros.clone();
        let mac = next.get_mut(&id).ok_or(MacroError::NotFound(id))?;
        mac.times_used += 1;
        mac.last_used_at = Some(epoch_millis());
        let used = mac.clone();
        self.commit(next)?;
        Ok(used)
    }

    /// One macro as pretty-printed JSON.
    pub fn export(&self, id: MacroId) -> Result<String, MacroError> {
        let mac = self.macros.get(&id).ok_or(MacroError::NotFound(id))?;
        serde_json::to_string_pretty(mac).map_err(MacroError::Export)
    }

    /// Adds a macro from exported JSON under a fresh id with reset usage.
    ///
    /// Malformed JSON leaves the library untouched. A shortcut already
    /// taken by another macro is dropped from the imported copy.
    pub fn import(&mut self, json: &str) -> Result<MacroId, MacroError> {
        let mut mac: Macro = serde_json::from_str(json).map_err(MacroError::Import)?;
        mac.id = MacroId::new();
        mac.times_used = 0;
        mac.last_used_at = None;
        mac.created_at = epoch_millis();
        if let Some(shortcut) = &mac.shortcut {
            if let Some(owner) = self.find_by_shortcut(shortcut) {
                tracing::warn!(%shortcut, owner = %owner.id, "imported macro shortcut already in use; dropping it");
                mac.shortcut = None;
            }
        }
        self.insert(mac)
    }

    fn check_shortcut(&self, shortcut: &Shortcut, id: MacroId) -> Result<(), MacroError> {
        match self.find_by_shortcut(shortcut) {
            Some(owner) if owner.id != id => Err(MacroError::ShortcutInUse {
                shortcut: shortcut.to_string(),
                owner: owner.id,
            }),
            _ => Ok(()),
        }
    }

    fn commit(&mut self, next: MacroMap) -> Result<(), MacroError> {
        save_json(&mut self.store, MACROS_KEY, &next)?;
        self.macros = next;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), MacroError> {
    if name.trim().is_empty() {
        Err(MacroError::EmptyName)
    } else {
        Ok(())
    }
}
