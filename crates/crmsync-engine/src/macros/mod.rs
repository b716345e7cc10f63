//! Recording and replaying UI macros.
//!
//! [`MacroRecorder`] captures timestamped steps, [`MacroLibrary`] persists
//! the resulting [`Macro`]s, [`play`] replays them through a
//! [`MacroExecutor`], and [`MacroManager`] ties these to the shortcut
//! dispatcher.

pub mod library;
pub mod manager;
pub mod model;
pub mod player;
pub mod recorder;

pub use library::MacroLibrary;
pub use manager::MacroManager;
pub use model::{Macro, MacroAction, MacroActionKind, MacroPatch, RecordedInput};
pub use player::{play, MacroExecutor, NoopExecutor, PlaybackReport};
pub use recorder::{MacroRecorder, RecorderState};
