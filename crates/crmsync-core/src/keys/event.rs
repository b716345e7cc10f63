//! Raw key-down events.

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Modifier keys held during a key press.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Modifiers {
    pub ctrl: bool,
    pub meta: bool,
    pub shift: bool,
    pub alt: bool,
}

impl Modifiers {
    pub const NONE: Modifiers = Modifiers {
        ctrl: false,
        meta: false,
        shift: false,
        alt: false,
    };

    pub const CTRL: Modifiers = Modifiers {
        ctrl: true,
        ..Modifiers::NONE
    };

    pub const META: Modifiers = Modifiers {
        meta: true,
        ..Modifiers::NONE
    };

    pub const SHIFT: Modifiers = Modifiers {
        shift: true,
        ..Modifiers::NONE
    };

    pub const ALT: Modifiers = Modifiers {
        alt: true,
        ..Modifiers::NONE
    };

    /// Combines two modifier sets.
    pub const fn with(self, other: Modifiers) -> Modifiers {
        Modifiers {
            ctrl: self.ctrl || other.ctrl,
            meta: self.meta || other.meta,
            shift: self.shift || other.shift,
            alt: self.alt || other.alt,
        }
    }

    /// True when ctrl, meta or alt is held. Shift alone does not count:
    /// it is part of ordinary typing.
    pub fn has_command(&self) -> bool {
        self.ctrl || self.meta || self.alt
    }
}

/// A key press from the host environment.
#[derive(Debug, Clone)]
pub struct KeyEvent {
    /// Key identity as reported by the host ("g", "Z", "Escape", "?").
    pub key: String,
    pub modifiers: Modifiers,
    /// Focus was inside a text input, textarea or content-editable element.
    pub in_text_input: bool,
    pub at: Instant,
}

impl KeyEvent {
    pub fn new(key: impl Into<String>) -> Self {
        KeyEvent {
            key: key.into(),
            modifiers: Modifiers::NONE,
            in_text_input: false,
            at: Instant::now(),
        }
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn in_text_input(mut self) -> Self {
        self.in_text_input = true;
        self
    }

    pub fn at(mut self, at: Instant) -> Self {
        self.at = at;
        self
    }

    /// Lowercased key name, the form shortcuts are matched against.
    pub fn normalized_key(&self) -> String {
        normalize_key(&self.key)
    }
}

/// Canonical key spelling shared by events and parsed shortcuts.
pub(crate) fn normalize_key(raw: &str) -> String {
    let lower = raw.to_lowercase();
    match lower.as_str() {
        "esc" => "escape".to_string(),
        "del" => "delete".to_string(),
        "space" | "spacebar" => " ".to_string(),
        "return" => "enter".to_string(),
        "up" => "arrowup".to_string(),
        "down" => "arrowdown".to_string(),
        "left" => "arrowleft".to_string(),
        "right" => "arrowright".to_string(),
        _ => lower,
    }
}
