//! Macro data types and their JSON wire format.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crmsync_core::{MacroActionId, MacroId, Shortcut};

/// Kind of UI step. The engine never interprets it; executors do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MacroActionKind {
    Click,
    Keypress,
    Input,
    Navigation,
    ApiCall,
}

/// One recorded step of a macro.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroAction {
    pub id: MacroActionId,
    #[serde(rename = "type")]
    pub kind: MacroActionKind,
    /// Milliseconds since the recording started (not since the previous step).
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    pub description: String,
}

/// A step as reported by the host while recording; the recorder adds the
/// id and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedInput {
    pub kind: MacroActionKind,
    pub target: Option<String>,
    pub value: Option<Value>,
    pub description: String,
}

impl RecordedInput {
    pub fn new(kind: MacroActionKind, description: impl Into<String>) -> Self {
        RecordedInput {
            kind,
            target: None,
            value: None,
            description: description.into(),
        }
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// A named, replayable recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Macro {
    pub id: MacroId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub actions: Vec<MacroAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortcut: Option<Shortcut>,
    /// Milliseconds since the Unix epoch.
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<u64>,
    #[serde(default)]
    pub times_used: u64,
}

impl Macro {
    /// Length of the recording, from its first step to its last.
    pub fn duration_ms(&self) -> u64 {
        match (self.actions.first(), self.actions.last()) {
            (Some(first), Some(last)) => last.timestamp.saturating_sub(first.timestamp),
            _ => 0,
        }
    }
}

/// Partial update for [`crate::MacroLibrary::update`]. `None` leaves a field
/// as it is; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MacroPatch {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
    pub shortcut: Option<Option<Shortcut>>,
    pub actions: Option<Vec<MacroAction>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn action_wire_format() {
        let action = MacroAction {
            id: MacroActionId(Uuid::nil()),
            kind: MacroActionKind::ApiCall,
            timestamp: 1200,
            target: Some("#save-lead".into()),
            value: Some(json!({"stage": "won"})),
            description: "Save lead".into(),
        };
        insta::assert_json_snapshot!(action, @r###"
        {
          "id": "00000000-0000-0000-0000-000000000000",
          "type": "api_call",
          "timestamp": 1200,
          "target": "#save-lead",
          "value": {
            "stage": "won"
          },
          "description": "Save lead"
        }
        "###);
    }

    #[test]
    fn macro_uses_camel_case_and_tolerates_missing_usage() {
        let raw = json!({
            "id": Uuid::nil(),
            "name": "Qualify",
            "actions": [],
            "shortcut": "g q",
            "createdAt": 10
        });
        let m: Macro = serde_json::from_value(raw).unwrap();
        assert_eq!(m.times_used, 0);
        assert_eq!(m.shortcut, Some(Shortcut::chord('g', 'q')));

        let back = serde_json::to_value(&m).unwrap();
        assert_eq!(back["createdAt"], 10);
        assert_eq!(back["timesUsed"], 0);
        assert!(back.get("lastUsedAt").is_none());
    }
}
