//! Shortcut definitions and their string form.
//!
//! # String format
//!
//! - Single key: `[modifiers+]key`, e.g. `"ctrl+z"`, `"Ctrl+Shift+Z"`, `"meta+k"`, `"?"`.
//!   Modifiers: `ctrl`/`control`, `meta`/`cmd`/`command`/`super`/`win`,
//!   `shift`, `alt`/`option`.
//! - Chord: two single characters separated by whitespace or `then`,
//!   e.g. `"g d"` or `"g then d"`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::event::{normalize_key, Modifiers};
use crate::error::CoreError;

/// A key binding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Shortcut {
    /// One key, optionally with modifiers held.
    Key { key: String, modifiers: Modifiers },
    /// Two unmodified characters typed in order within the chord window.
    Chord { first: char, second: char },
}

impl Shortcut {
    pub fn key(key: &str, modifiers: Modifiers) -> Self {
        Shortcut::Key {
            key: normalize_key(key),
            modifiers,
        }
    }

    pub fn chord(first: char, second: char) -> Self {
        Shortcut::Chord {
            first: lower_char(first),
            second: lower_char(second),
        }
    }

    /// True when the binding needs ctrl, meta or alt. Only such bindings
    /// fire while focus is inside a text input.
    pub fn requires_modifier(&self) -> bool {
        match self {
            Shortcut::Key { modifiers, .. } => modifiers.has_command(),
            Shortcut::Chord { .. } => false,
        }
    }

    /// Tests a single key press against a `Key` binding.
    ///
    /// Ctrl, meta and alt must match exactly. Shift must match exactly for
    /// letters and named keys; for symbols such as `?` it is implied by the
    /// character itself and ignored.
    pub fn matches_key(&self, key: &str, modifiers: Modifiers) -> bool {
        match self {
            Shortcut::Key {
                key: expected,
                modifiers: required,
            } => {
                if expected != key
                    || required.ctrl != modifiers.ctrl
                    || required.meta != modifiers.meta
                    || required.alt != modifiers.alt
                {
                    return false;
                }
                if shift_is_implied(expected) {
                    true
                } else {
                    required.shift == modifiers.shift
                }
            }
            Shortcut::Chord { .. } => false,
        }
    }

    /// Tests a two-key sequence against a `Chord` binding.
    pub fn matches_chord(&self, first: char, second: char) -> bool {
        match self {
            Shortcut::Chord {
                first: a,
                second: b,
            } => *a == first && *b == second,
            Shortcut::Key { .. } => false,
        }
    }
}

fn lower_char(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn shift_is_implied(key: &str) -> bool {
    let mut chars = key.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => !c.is_alphabetic() && !c.is_whitespace(),
        _ => false,
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

impl FromStr for Shortcut {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidShortcut {
            input: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(invalid("empty shortcut"));
        }

        let words: Vec<&str> = trimmed
            .split_whitespace()
            .filter(|w| !w.eq_ignore_ascii_case("then"))
            .collect();
        if words.len() == 2 {
            return match (single_char(words[0]), single_char(words[1])) {
                (Some(first), Some(second)) => Ok(Shortcut::chord(first, second)),
                _ => Err(invalid("chord keys must be single characters")),
            };
        }
        if words.len() > 2 {
            return Err(invalid("chords have exactly two keys"));
        }

        // "ctrl++" binds the plus key itself.
        let (body, plus_key) = match trimmed.strip_suffix("++") {
            Some(rest) => (rest, true),
            None if trimmed == "+" => ("", true),
            None => (trimmed, false),
        };

        let mut modifiers = Modifiers::NONE;
        let mut key: Option<String> = plus_key.then(|| "+".to_string());

        for part in body.split('+').map(str::trim).filter(|p| !p.is_empty()) {
            match part.to_lowercase().as_str() {
                "ctrl" | "control" => modifiers.ctrl = true,
                "meta" | "cmd" | "command" | "super" | "win" => modifiers.meta = true,
                "shift" => modifiers.shift = true,
                "alt" | "option" => modifiers.alt = true,
                _ => {
                    if key.is_some() {
                        return Err(invalid("more than one non-modifier key"));
                    }
                    key = Some(part.to_string());
                }
            }
        }

        match key {
            Some(key) => Ok(Shortcut::key(&key, modifiers)),
            None => Err(invalid("no key specified (only modifiers)")),
        }
    }
}

impl TryFrom<String> for Shortcut {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Shortcut> for String {
    fn from(shortcut: Shortcut) -> Self {
        shortcut.to_string()
    }
}

impl fmt::Display for Shortcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Shortcut::Chord { first, second } => write!(f, "{} {}", first, second),
            Shortcut::Key { key, modifiers } => {
                let mut parts: Vec<&str> = Vec::new();
                if modifiers.ctrl {
                    parts.push("ctrl");
                }
                if modifiers.meta {
                    parts.push("meta");
                }
                if modifiers.alt {
                    parts.push("alt");
                }
                if modifiers.shift {
                    parts.push("shift");
                }
                let key = if key == " " { "space" } else { key.as_str() };
                parts.push(key);
                write!(f, "{}", parts.join("+"))
            }
        }
    }
}
