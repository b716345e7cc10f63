//! Stable ID newtypes.
//!
//! Persisted identifiers wrap a v4 `Uuid` so an `ActionId` cannot be passed
//! where a `MacroId` is expected. `ShortcutId` is a process-local counter
//! handed out by the dispatcher and is never persisted.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of a recorded history action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub Uuid);

/// Identity of a stored macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacroId(pub Uuid);

/// Identity of a single step inside a macro.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MacroActionId(pub Uuid);

/// Handle returned by [`crate::SequenceDispatcher::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShortcutId(pub u64);

macro_rules! uuid_id {
    ($name:ident) => {
        impl $name {
            /// Allocates a fresh random identifier.
            pub fn new() -> Self {
                $name(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map($name)
            }
        }
    };
}

uuid_id!(ActionId);
uuid_id!(MacroId);
uuid_id!(MacroActionId);

impl fmt::Display for ShortcutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(MacroId::new(), MacroId::new());
        assert_ne!(ActionId::new(), ActionId::new());
    }

    #[test]
    fn ids_serialize_as_bare_strings() {
        let id = MacroId(Uuid::nil());
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"00000000-0000-0000-0000-000000000000\"");
        let parsed: MacroId = json.trim_matches('"').parse().unwrap();
        assert_eq!(parsed, id);
    }
}
