//! Chord timing state.
//!
//! [`SequenceDetector`] remembers the last unmodified single-character key
//! and when it was pressed. It is owned by one dispatcher; nothing else
//! reads or writes it.

use std::time::Duration;

use tokio::time::Instant;

use crate::config::DEFAULT_CHORD_WINDOW;

#[derive(Debug, Clone)]
pub struct SequenceDetector {
    last_key: Option<char>,
    last_key_at: Option<Instant>,
    window: Duration,
}

impl SequenceDetector {
    pub fn new(window: Duration) -> Self {
        SequenceDetector {
            last_key: None,
            last_key_at: None,
            window,
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// The previously recorded key, if it was pressed no more than
    /// `window` before `now`.
    pub fn previous_within(&self, now: Instant) -> Option<char> {
        match (self.last_key, self.last_key_at) {
            (Some(key), Some(at)) if now.saturating_duration_since(at) <= self.window => Some(key),
            _ => None,
        }
    }

    pub fn record(&mut self, key: char, at: Instant) {
        self.last_key = Some(key);
        self.last_key_at = Some(at);
    }

    pub fn reset(&mut self) {
        self.last_key = None;
        self.last_key_at = None;
    }
}

impl Default for SequenceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_CHORD_WINDOW)
    }
}
