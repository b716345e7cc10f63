//! The shortcut registry consulted on every key press.
//!
//! [`SequenceDispatcher`] matches a [`KeyEvent`] against registered
//! [`Shortcut`]s. When the previous unmodified character arrived within the
//! chord window, chord bindings are tried first; otherwise (or when no chord
//! matches) single-key bindings are tried. The first match in registration
//! order fires, and at most one binding fires per event.
//!
//! Events typed inside a text input only reach bindings that need ctrl,
//! meta or alt, and they never take part in chords.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::event::KeyEvent;
use super::sequence::SequenceDetector;
use super::shortcut::Shortcut;
use crate::id::ShortcutId;

/// Callback run when a binding matches.
pub type ShortcutAction = Arc<dyn Fn() + Send + Sync>;

/// Read-only view of a registration, for help overlays.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortcutDescriptor {
    pub id: ShortcutId,
    pub shortcut: Shortcut,
    pub description: String,
}

/// Outcome of [`SequenceDispatcher::handle_key_event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDispatch {
    /// A binding fired; the host should call `preventDefault` on the event.
    Handled(ShortcutId),
    Unhandled,
}

impl KeyDispatch {
    pub fn is_handled(&self) -> bool {
        matches!(self, KeyDispatch::Handled(_))
    }
}

struct Registration {
    id: ShortcutId,
    shortcut: Shortcut,
    description: String,
    action: ShortcutAction,
}

struct DispatcherInner {
    registrations: Mutex<Vec<Registration>>,
    detector: Mutex<SequenceDetector>,
    next_id: AtomicU64,
    enabled: AtomicBool,
}

/// Chord-aware shortcut dispatcher. Cloning yields a handle to the same registry.
#[derive(Clone)]
pub struct SequenceDispatcher {
    inner: Arc<DispatcherInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SequenceDispatcher {
    pub fn new(chord_window: Duration) -> Self {
        Self::with_detector(SequenceDetector::new(chord_window))
    }

    pub fn with_detector(detector: SequenceDetector) -> Self {
        SequenceDispatcher {
            inner: Arc::new(DispatcherInner {
                registrations: Mutex::new(Vec::new()),
                detector: Mutex::new(detector),
                next_id: AtomicU64::new(1),
                enabled: AtomicBool::new(true),
            }),
        }
    }

    /// Adds a binding. Later registrations lose ties against earlier ones.
    pub fn register<F>(&self, shortcut: Shortcut, description: impl Into<String>, action: F) -> ShortcutId
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = ShortcutId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let description = description.into();
        tracing::debug!(%id, %shortcut, %description, "registered shortcut");
        lock(&self.inner.registrations).push(Registration {
            id,
            shortcut,
            description,
            action: Arc::new(action),
        });
        id
    }

    /// Removes a binding. Returns false if it was already gone.
    pub fn unregister(&self, id: ShortcutId) -> bool {
        let mut registrations = lock(&self.inner.registrations);
        let before = registrations.len();
        registrations.retain(|r| r.id != id);
        registrations.len() != before
    }

    pub fn shortcuts(&self) -> Vec<ShortcutDescriptor> {
        lock(&self.inner.registrations)
            .iter()
            .map(|r| ShortcutDescriptor {
                id: r.id,
                shortcut: r.shortcut.clone(),
                description: r.description.clone(),
            })
            .collect()
    }

    /// The first registration bound to exactly `shortcut`.
    pub fn find(&self, shortcut: &Shortcut) -> Option<ShortcutId> {
        lock(&self.inner.registrations)
            .iter()
            .find(|r| &r.shortcut == shortcut)
            .map(|r| r.id)
    }

    /// Globally enables or disables dispatch (e.g. while a modal owns the keyboard).
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
        if !enabled {
            lock(&self.inner.detector).reset();
        }
    }

    pub fn handle_key_event(&self, event: &KeyEvent) -> KeyDispatch {
        if !self.inner.enabled.load(Ordering::Relaxed) {
            return KeyDispatch::Unhandled;
        }

        let key = event.normalized_key();
        let matched = {
            let mut detector = lock(&self.inner.detector);
            let registrations = lock(&self.inner.registrations);

            let mut found: Option<&Registration> = None;
            let chord_key = single_char(&key).filter(|_| !event.modifiers.has_command());

            match chord_key {
                Some(c) if !event.in_text_input => {
                    if let Some(previous) = detector.previous_within(event.at) {
                        found = registrations
                            .iter()
                            .find(|r| r.shortcut.matches_chord(previous, c));
                    }
                    if found.is_some() {
                        detector.reset();
                    } else {
                        detector.record(c, event.at);
                    }
                }
                _ => detector.reset(),
            }

            if found.is_none() {
                found = registrations.iter().find(|r| {
                    (!event.in_text_input || r.shortcut.requires_modifier())
                        && r.shortcut.matches_key(&key, event.modifiers)
                });
            }

            found.map(|r| (r.id, Arc::clone(&r.action)))
        };

        // Locks are released before running the action so it may
        // register or unregister bindings itself.
        match matched {
            Some((id, action)) => {
                tracing::debug!(%id, key = %event.key, "shortcut fired");
                action();
                KeyDispatch::Handled(id)
            }
            None => KeyDispatch::Unhandled,
        }
    }
}

impl Default for SequenceDispatcher {
    fn default() -> Self {
        Self::with_detector(SequenceDetector::default())
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}
