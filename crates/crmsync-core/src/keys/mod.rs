//! Keyboard model and shortcut dispatch.
//!
//! - [`event`]: [`KeyEvent`] and [`Modifiers`] as delivered by the host
//! - [`shortcut`]: [`Shortcut`], single keys with modifiers or two-key chords
//! - [`sequence`]: [`SequenceDetector`], the chord timing state
//! - [`dispatcher`]: [`SequenceDispatcher`], the registry consulted per key press

pub mod dispatcher;
pub mod event;
pub mod sequence;
pub mod shortcut;

pub use dispatcher::{KeyDispatch, SequenceDispatcher, ShortcutAction, ShortcutDescriptor};
pub use event::{KeyEvent, Modifiers};
pub use sequence::SequenceDetector;
pub use shortcut::Shortcut;
