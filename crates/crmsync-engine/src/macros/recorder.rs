//! The recording state machine.
//!
//! ```text
//! idle --start--> recording --pause--> paused --resume--> recording
//! recording | paused --stop(name)--> idle   (emits a Macro)
//! recording | paused --cancel-->     idle   (discards)
//! ```
//!
//! Timestamps are measured from `start`, so time spent paused shows up as
//! a gap on replay.

use tokio::time::Instant;

use crmsync_core::{epoch_millis, MacroActionId, MacroId, Shortcut};

use super::model::{Macro, MacroAction, RecordedInput};
use crate::error::MacroError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RecorderState {
    #[default]
    Idle,
    Recording,
    Paused,
}

#[derive(Debug, Default)]
pub struct MacroRecorder {
    state: RecorderState,
    started_at: Option<Instant>,
    actions: Vec<MacroAction>,
}

impl MacroRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    /// Steps captured so far in the current recording.
    pub fn actions(&self) -> &[MacroAction] {
        &self.actions
    }

    pub fn start(&mut self) -> Result<(), MacroError> {
        if self.state != RecorderState::Idle {
            return Err(MacroError::AlreadyRecording);
        }
        self.state = RecorderState::Recording;
        self.started_at = Some(Instant::now());
        self.actions.clear();
        tracing::debug!("macro recording started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), MacroError> {
        match self.state {
            RecorderState::Idle => Err(MacroError::NotRecording),
            _ => {
                self.state = RecorderState::Paused;
                Ok(())
            }
        }
    }

    pub fn resume(&mut self) -> Result<(), MacroError> {
        match self.state {
            RecorderState::Idle => Err(MacroError::NotRecording),
            _ => {
                self.state = RecorderState::Recording;
                Ok(())
            }
        }
    }

    /// Appends a step stamped with the time since `start`. Dropped unless
    /// actively recording.
    pub fn record_action(&mut self, input: RecordedInput) -> Option<&MacroAction> {
        let started_at = match (self.state, self.started_at) {
            (RecorderState::Recording, Some(started_at)) => started_at,
            _ => return None,
        };
        self.actions.push(MacroAction {
            id: MacroActionId::new(),
            kind: input.kind,
            timestamp: started_at.elapsed().as_millis() as u64,
            target: input.target,
            value: input.value,
            description: input.description,
        });
        self.actions.last()
    }

    /// Ends the recording and turns the captured steps into a new macro.
    ///
    /// An empty name is rejected and the recording keeps going.
    pub fn stop(
        &mut self,
        name: &str,
        description: Option<String>,
        shortcut: Option<Shortcut>,
    ) -> Result<Macro, MacroError> {
        if self.state == RecorderState::Idle {
            return Err(MacroError::NotRecording);
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(MacroError::EmptyName);
        }

        let actions = std::mem::take(&mut self.actions);
        self.state = RecorderState::Idle;
        self.started_at = None;
        tracing::debug!(name, steps = actions.len(), "macro recording stopped");
        Ok(Macro {
            id: MacroId::new(),
            name: name.to_string(),
            description,
            actions,
            shortcut,
            created_at: epoch_millis(),
            last_used_at: None,
            times_used: 0,
        })
    }

    /// Discards the current recording. Returns false if none was running.
    pub fn cancel(&mut self) -> bool {
        let was_recording = self.state != RecorderState::Idle;
        self.state = RecorderState::Idle;
        self.started_at = None;
        self.actions.clear();
        was_recording
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::macros::MacroActionKind;

    fn click(what: &str) -> RecordedInput {
        RecordedInput::new(MacroActionKind::Click, what).target(format!("#{what}"))
    }

    #[tokio::test(start_paused = true)]
    async fn timestamps_are_relative_to_start() {
        let mut recorder = MacroRecorder::new();
        recorder.start().unwrap();
        recorder.record_action(click("a"));
        tokio::time::advance(Duration::from_millis(500)).await;
        recorder.record_action(click("b"));
        tokio::time::advance(Duration::from_millis(700)).await;
        recorder.record_action(click("c"));

        let m = recorder.stop("Three clicks", None, None).unwrap();
        let stamps: Vec<u64> = m.actions.iter().map(|a| a.timestamp).collect();
        assert_eq!(stamps, vec![0, 500, 1200]);
        assert_eq!(m.duration_ms(), 1200);
        assert_eq!(recorder.state(), RecorderState::Idle);
        assert!(recorder.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn paused_actions_are_dropped_and_pause_time_counts() {
        let mut recorder = MacroRecorder::new();
        recorder.start().unwrap();
        recorder.pause().unwrap();
        assert!(recorder.record_action(click("ignored")).is_none());
        tokio::time::advance(Duration::from_millis(300)).await;
        recorder.resume().unwrap();
        let stamp = recorder.record_action(click("kept")).map(|a| a.timestamp);
        assert_eq!(stamp, Some(300));
        assert_eq!(recorder.actions().len(), 1);
    }

    #[test]
    fn illegal_transitions_are_rejected() {
        let mut recorder = MacroRecorder::new();
        assert!(matches!(recorder.pause(), Err(MacroError::NotRecording)));
        assert!(matches!(recorder.stop("x", None, None), Err(MacroError::NotRecording)));
        assert!(!recorder.cancel());

        recorder.start().unwrap();
        assert!(matches!(recorder.start(), Err(MacroError::AlreadyRecording)));
        assert!(matches!(recorder.stop("  ", None, None), Err(MacroError::EmptyName)));
        assert_eq!(recorder.state(), RecorderState::Recording);
        assert!(recorder.cancel());
        assert_eq!(recorder.state(), RecorderState::Idle);
    }
}
