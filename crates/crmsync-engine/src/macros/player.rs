//! Timed macro playback.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crmsync_core::BoxError;

use super::model::{Macro, MacroAction};
use crate::error::MacroError;

/// Performs one recorded step (simulate a click, fill a field, call an API).
pub trait MacroExecutor: Send + Sync + 'static {
    fn execute(&self, action: &MacroAction) -> impl Future<Output = Result<(), BoxError>> + Send;
}

impl<E: MacroExecutor> MacroExecutor for Arc<E> {
    fn execute(&self, action: &MacroAction) -> impl Future<Output = Result<(), BoxError>> + Send {
        (**self).execute(action)
    }
}

/// Executor used for shortcut-triggered playback when the host supplies none.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopExecutor;

impl MacroExecutor for NoopExecutor {
    async fn execute(&self, action: &MacroAction) -> Result<(), BoxError> {
        tracing::debug!(step = %action.description, "no executor installed; skipping macro step");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackReport {
    /// False when playback was cancelled before the last step ran.
    pub completed: bool,
    pub actions_run: usize,
}

/// Runs every step of `mac` through `executor`, sleeping the recorded gap
/// between consecutive steps after each one settles.
///
/// `cancel` is checked before each step and while sleeping; a running
/// executor call is never interrupted. An executor error stops playback.
pub async fn play<E: MacroExecutor>(
    mac: &Macro,
    executor: &E,
    cancel: &CancellationToken,
) -> Result<PlaybackReport, MacroError> {
    tracing::info!(name = %mac.name, steps = mac.actions.len(), "macro playback started");

    for (index, action) in mac.actions.iter().enumerate() {
        if cancel.is_cancelled() {
            return Ok(cancelled(mac, index));
        }
        executor
            .execute(action)
            .await
            .map_err(|source| {
                tracing::warn!(name = %mac.name, index, error = %source, "macro step failed");
                MacroError::Execution { index, source }
            })?;

        if let Some(next) = mac.actions.get(index + 1) {
            let gap = Duration::from_millis(next.timestamp.saturating_sub(action.timestamp));
            tokio::select! {
                _ = cancel.cancelled() => return Ok(cancelled(mac, index + 1)),
                _ = tokio::time::sleep(gap) => {}
            }
        }
    }

    tracing::info!(name = %mac.name, "macro playback finished");
    Ok(PlaybackReport {
        completed: true,
        actions_run: mac.actions.len(),
    })
}

fn cancelled(mac: &Macro, actions_run: usize) -> PlaybackReport {
    tracing::info!(name = %mac.name, actions_run, "macro playback cancelled");
    PlaybackReport {
        completed: false,
        actions_run,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tokio::time::Instant;

    use crmsync_core::{MacroActionId, MacroId};

    use super::*;
    use crate::lock;
    use crate::macros::MacroActionKind;

    /// Logs when each step ran, relative to construction.
    struct Clock {
        origin: Instant,
        seen: Mutex<Vec<u64>>,
        fail_at: Option<u64>,
        cost: Duration,
    }

    impl Clock {
        fn new() -> Self {
            Clock {
                origin: Instant::now(),
                seen: Mutex::new(Vec::new()),
                fail_at: None,
                cost: Duration::ZERO,
            }
        }
    }

    impl MacroExecutor for Clock {
        async fn execute(&self, action: &MacroAction) -> Result<(), BoxError> {
            lock(&self.seen).push(self.origin.elapsed().as_millis() as u64);
            tokio::time::sleep(self.cost).await;
            if self.fail_at == Some(action.timestamp) {
                return Err("element not found".into());
            }
            Ok(())
        }
    }

    fn recorded(stamps: &[u64]) -> Macro {
        Macro {
            id: MacroId::new(),
            name: "timed".into(),
            description: None,
            actions: stamps
                .iter()
                .map(|&timestamp| MacroAction {
                    id: MacroActionId::new(),
                    kind: MacroActionKind::Click,
                    timestamp,
                    target: None,
                    value: None,
                    description: format!("at {timestamp}"),
                })
                .collect(),
            shortcut: None,
            created_at: 0,
            last_used_at: None,
            times_used: 0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn replays_recorded_spacing() {
        let clock = Clock::new();
        let report = play(&recorded(&[0, 500, 1200]), &clock, &CancellationToken::new()).await.unwrap();
        assert_eq!(report, PlaybackReport { completed: true, actions_run: 3 });
        assert_eq!(*lock(&clock.seen), vec![0, 500, 1200]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_steps_never_make_later_steps_early() {
        let clock = Clock {
            cost: Duration::from_millis(100),
            ..Clock::new()
        };
        play(&recorded(&[0, 500, 1200]), &clock, &CancellationToken::new()).await.unwrap();
        let seen = lock(&clock.seen).clone();
        assert!(seen[1] >= 500 && seen[2] >= 1200, "{seen:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn cancelling_during_a_gap_stops_playback() {
        let clock = Arc::new(Clock::new());
        let token = CancellationToken::new();
        let mac = recorded(&[0, 500, 1200]);

        let task = tokio::spawn({
            let (clock, token) = (Arc::clone(&clock), token.clone());
            async move { play(&mac, &clock, &token).await }
        });
        tokio::time::sleep(Duration::from_millis(700)).await;
        token.cancel();

        let report = task.await.unwrap().unwrap();
        assert_eq!(report, PlaybackReport { completed: false, actions_run: 2 });
        assert_eq!(lock(&clock.seen).len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn executor_error_aborts_with_index() {
        let clock = Clock {
            fail_at: Some(500),
            ..Clock::new()
        };
        let err = play(&recorded(&[0, 500, 1200]), &clock, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MacroError::Execution { index: 1, .. }));
        assert_eq!(lock(&clock.seen).len(), 2);
    }
}
