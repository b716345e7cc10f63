//! Debounced auto-save.
//!
//! [`AutoSaver`] tracks the latest data and the last successfully saved
//! data (the baseline). Every [`AutoSaver::update`] that leaves the data
//! different from the baseline restarts a debounce timer; when it expires
//! the current data is handed to the save function. Saves never overlap:
//! a save waits for the previous one to settle.
//!
//! Closing (or dropping) the saver cancels the pending timer and flushes
//! unsaved data one last time. A save that has already started always runs
//! to completion; only the debounce wait is ever cancelled.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crmsync_core::{BoxError, BoxFuture};

use crate::error::AutoSaveError;
use crate::lock;

type SaveFn<T> = Arc<dyn Fn(T) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoSaveOptions {
    /// Quiet period after the last change before saving.
    pub delay: Duration,
    /// When false, changes are tracked but never saved automatically.
    pub enabled: bool,
}

impl Default for AutoSaveOptions {
    fn default() -> Self {
        AutoSaveOptions {
            delay: crmsync_core::config::DEFAULT_AUTOSAVE_DELAY,
            enabled: true,
        }
    }
}

/// Derived view of the saver; never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoSaveStatus {
    pub is_saving: bool,
    pub last_saved_at: Option<Instant>,
    pub error: Option<String>,
    pub has_unsaved_changes: bool,
}

struct SaveState<T> {
    current: T,
    baseline: T,
    is_saving: bool,
    last_saved_at: Option<Instant>,
    error: Option<String>,
    timer: Option<JoinHandle<()>>,
    closed: bool,
}

impl<T> SaveState<T> {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Clears `is_saving` even when the save future is dropped midway.
struct SavingGuard<'a, T> {
    state: &'a Mutex<SaveState<T>>,
}

impl<T> Drop for SavingGuard<'_, T> {
    fn drop(&mut self) {
        lock(self.state).is_saving = false;
    }
}

struct SaverInner<T> {
    state: Mutex<SaveState<T>>,
    save_lock: AsyncMutex<()>,
    save: SaveFn<T>,
    options: AutoSaveOptions,
}

impl<T> SaverInner<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Starts the debounce timer. Only the sleep is abortable; once it
    /// expires the save runs on its own task so a later change cannot cut
    /// it short.
    fn schedule(self: &Arc<Self>, state: &mut SaveState<T>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime available; change will be saved on close");
            return;
        };
        let inner = Arc::clone(self);
        let delay = self.options.delay;
        state.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            tokio::spawn(async move {
                // Failures are recorded in the status.
                let _ = inner.save(false).await;
            });
        }));
    }

    /// Saves the current data. Unless `force` is set, nothing happens when
    /// the data already matches the baseline.
    async fn save(self: &Arc<Self>, force: bool) -> Result<(), AutoSaveError> {
        let _serial = self.save_lock.lock().await;

        let data = {
            let mut state = lock(&self.state);
            if !force && state.current == state.baseline {
                return Ok(());
            }
            state.is_saving = true;
            state.current.clone()
        };
        let saving = SavingGuard { state: &self.state };

        let result = (self.save)(data.clone()).await;

        drop(saving);
        let mut state = lock(&self.state);
        match result {
            Ok(()) => {
                state.baseline = data;
                state.last_saved_at = Some(Instant::now());
                state.error = None;
                let pending = state.current != state.baseline;
                tracing::debug!(pending, "auto-save completed");
                let timer_idle = state.timer.as_ref().map_or(true, JoinHandle::is_finished);
                if pending && timer_idle && !state.closed && self.options.enabled {
                    self.schedule(&mut state);
                }
                Ok(())
            }
            Err(err) => {
                tracing::warn!(error = %err, "auto-save failed");
                state.error = Some(err.to_string());
                Err(AutoSaveError::Save(err))
            }
        }
    }
}

/// Debounced saver for one piece of editable data.
pub struct AutoSaver<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    inner: Arc<SaverInner<T>>,
}

impl<T> AutoSaver<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    /// Creates a saver whose baseline is `initial`.
    pub fn new<F, Fut>(initial: T, options: AutoSaveOptions, save: F) -> Self
    where
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let save: SaveFn<T> = Arc::new(move |data: T| -> BoxFuture<'static, Result<(), BoxError>> {
            Box::pin(save(data))
        });
        AutoSaver {
            inner: Arc::new(SaverInner {
                state: Mutex::new(SaveState {
                    current: initial.clone(),
                    baseline: initial,
                    is_saving: false,
                    last_saved_at: None,
                    error: None,
                    timer: None,
                    closed: false,
                }),
                save_lock: AsyncMutex::new(()),
                save,
                options,
            }),
        }
    }

    pub fn options(&self) -> AutoSaveOptions {
        self.inner.options
    }

    /// Replaces the tracked data and restarts the debounce timer if it
    /// differs from the last saved data.
    pub fn update(&self, data: T) {
        let mut state = lock(&self.inner.state);
        if state.closed {
            tracing::debug!("ignoring update to a closed auto-saver");
            return;
        }
        state.current = data;
        state.cancel_timer();
        if state.current == state.baseline || !self.inner.options.enabled {
            return;
        }

        self.inner.schedule(&mut state);
    }

    /// Cancels the pending timer and saves the current data right away.
    pub async fn save_now(&self) -> Result<(), AutoSaveError> {
        lock(&self.inner.state).cancel_timer();
        self.inner.save(true).await
    }

    /// Makes `data` the new baseline without saving it (e.g. after loading
    /// a different record).
    pub fn reset(&self, data: T) {
        let mut state = lock(&self.inner.state);
        state.cancel_timer();
        state.current = data.clone();
        state.baseline = data;
        state.error = None;
    }

    pub fn status(&self) -> AutoSaveStatus {
        let state = lock(&self.inner.state);
        AutoSaveStatus {
            is_saving: state.is_saving,
            last_saved_at: state.last_saved_at,
            error: state.error.clone(),
            has_unsaved_changes: state.current != state.baseline,
        }
    }

    pub fn current(&self) -> T {
        lock(&self.inner.state).current.clone()
    }

    /// Stops the timer and flushes unsaved data. Later updates are ignored.
    pub async fn close(&self) -> Result<(), AutoSaveError> {
        {
            let mut state = lock(&self.inner.state);
            state.closed = true;
            state.cancel_timer();
        }
        self.inner.save(false).await
    }
}

impl<T> Drop for AutoSaver<T>
where
    T: Clone + PartialEq + Send + Sync + 'static,
{
    fn drop(&mut self) {
        {
            let mut state = lock(&self.inner.state);
            if state.closed {
                return;
            }
            state.closed = true;
            state.cancel_timer();
            if state.current == state.baseline {
                return;
            }
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let inner = Arc::clone(&self.inner);
                runtime.spawn(async move {
                    let _ = inner.save(false).await;
                });
            }
            Err(_) => tracing::warn!("auto-saver dropped outside a runtime; unsaved changes lost"),
        }
    }
}

/// What a save badge should show.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveIndicator {
    Saving,
    Error(String),
    Unsaved,
    Saved { seconds_ago: u64 },
    Hidden,
}

impl SaveIndicator {
    /// Picks the most relevant state: saving, then error, then unsaved,
    /// then the time since the last save.
    pub fn from_status(status: &AutoSaveStatus, now: Instant) -> Self {
        if status.is_saving {
            SaveIndicator::Saving
        } else if let Some(error) = &status.error {
            SaveIndicator::Error(error.clone())
        } else if status.has_unsaved_changes {
            SaveIndicator::Unsaved
        } else if let Some(saved_at) = status.last_saved_at {
            SaveIndicator::Saved {
                seconds_ago: now.saturating_duration_since(saved_at).as_secs(),
            }
        } else {
            SaveIndicator::Hidden
        }
    }
}

impl fmt::Display for SaveIndicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SaveIndicator::Saving => f.write_str("Saving..."),
            SaveIndicator::Error(error) => write!(f, "Save failed: {error}"),
            SaveIndicator::Unsaved => f.write_str("Unsaved changes"),
            SaveIndicator::Saved { seconds_ago: 0 } => f.write_str("Saved just now"),
            SaveIndicator::Saved { seconds_ago } => write!(f, "Saved {seconds_ago}s ago"),
            SaveIndicator::Hidden => Ok(()),
        }
    }
}
