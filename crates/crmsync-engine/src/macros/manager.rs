//! Recorder, library, player and shortcut bindings behind one handle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use tokio_util::sync::CancellationToken;

use crmsync_core::{MacroId, SequenceDispatcher, Shortcut, ShortcutId};
use crmsync_storage::PersistentStore;

use super::library::MacroLibrary;
use super::model::{Macro, MacroAction, MacroPatch, RecordedInput};
use super::player::{play, MacroExecutor, NoopExecutor, PlaybackReport};
use super::recorder::{MacroRecorder, RecorderState};
use crate::error::MacroError;
use crate::lock;

struct ManagerInner<S, E> {
    library: Mutex<MacroLibrary<S>>,
    recorder: Mutex<MacroRecorder>,
    dispatcher: SequenceDispatcher,
    bindings: Mutex<HashMap<MacroId, ShortcutId>>,
    /// Executor for shortcut-triggered playback.
    executor: E,
    /// Parent of every shortcut-triggered playback's token.
    playbacks: Mutex<CancellationToken>,
}

impl<S, E> Drop for ManagerInner<S, E> {
    fn drop(&mut self) {
        // The dispatcher may outlive the manager; stale bindings would
        // swallow their keys.
        for (_, shortcut_id) in lock(&self.bindings).drain() {
            self.dispatcher.unregister(shortcut_id);
        }
    }
}

/// Cloneable handle to the macro subsystem.
///
/// Every macro with a shortcut is registered on the dispatcher; a match
/// plays it with the manager's executor ([`NoopExecutor`] unless one was
/// supplied).
pub struct MacroManager<S, E = NoopExecutor> {
    inner: Arc<ManagerInner<S, E>>,
}

impl<S, E> Clone for MacroManager<S, E> {
    fn clone(&self) -> Self {
        MacroManager {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: PersistentStore + 'static> MacroManager<S, NoopExecutor> {
    pub fn new(store: S, dispatcher: SequenceDispatcher) -> Self {
        Self::with_executor(store, dispatcher, NoopExecutor)
    }
}

impl<S, E> MacroManager<S, E>
where
    S: PersistentStore + 'static,
    E: MacroExecutor,
{
    /// Loads the stored library and binds the shortcuts of every macro in it.
    pub fn with_executor(store: S, dispatcher: SequenceDispatcher, executor: E) -> Self {
        let manager = MacroManager {
            inner: Arc::new(ManagerInner {
                library: Mutex::new(MacroLibrary::load(store)),
                recorder: Mutex::new(MacroRecorder::new()),
                dispatcher,
                bindings: Mutex::new(HashMap::new()),
                executor,
                playbacks: Mutex::new(CancellationToken::new()),
            }),
        };
        for mac in manager.macros() {
            manager.bind(&mac);
        }
        manager
    }

    // Recording.

    pub fn recorder_state(&self) -> RecorderState {
        lock(&self.inner.recorder).state()
    }

    pub fn start_recording(&self) -> Result<(), MacroError> {
        lock(&self.inner.recorder).start()
    }

    pub fn pause_recording(&self) -> Result<(), MacroError> {
        lock(&self.inner.recorder).pause()
    }

    pub fn resume_recording(&self) -> Result<(), MacroError> {
        lock(&self.inner.recorder).resume()
    }

    pub fn cancel_recording(&self) -> bool {
        lock(&self.inner.recorder).cancel()
    }

    pub fn record_action(&self, input: RecordedInput) -> Option<MacroAction> {
        lock(&self.inner.recorder).record_action(input).cloned()
    }

    /// Ends the recording and stores it as a new macro.
    ///
    /// A taken shortcut or an empty name is rejected before the recording
    /// ends, so the caller can retry with different values.
    pub fn stop_recording(
        &self,
        name: &str,
        description: Option<String>,
        shortcut: Option<&str>,
    ) -> Result<Macro, MacroError> {
        let shortcut = shortcut.map(str::parse::<Shortcut>).transpose()?;
        let mut library = lock(&self.inner.library);
        if let Some(shortcut) = &shortcut {
            if let Some(owner) = library.find_by_shortcut(shortcut) {
                return Err(MacroError::ShortcutInUse {
                    shortcut: shortcut.to_string(),
                    owner: owner.id,
                });
            }
        }

        let mac = lock(&self.inner.recorder).stop(name, description, shortcut)?;
        library.insert(mac.clone())?;
        drop(library);
        self.bind(&mac);
        tracing::info!(name = %mac.name, steps = mac.actions.len(), "saved macro");
        Ok(mac)
    }

    // Library.

    pub fn macros(&self) -> Vec<Macro> {
        lock(&self.inner.library).list().into_iter().cloned().collect()
    }

    pub fn get(&self, id: MacroId) -> Option<Macro> {
        lock(&self.inner.library).get(id).cloned()
    }

    pub fn update(&self, id: MacroId, patch: MacroPatch) -> Result<Macro, MacroError> {
        let rebind = patch.shortcut.is_some();
        let updated = lock(&self.inner.library).update(id, patch)?.clone();
        if rebind {
            self.unbind(id);
            self.bind(&updated);
        }
        Ok(updated)
    }

    pub fn duplicate(&self, id: MacroId) -> Result<Macro, MacroError> {
        let mut library = lock(&self.inner.library);
        let copy = library.duplicate(id)?;
        library.get(copy).cloned().ok_or(MacroError::NotFound(copy))
    }

    pub fn delete(&self, id: MacroId) -> Result<Macro, MacroError> {
        let removed = lock(&self.inner.library).delete(id)?;
        self.unbind(id);
        Ok(removed)
    }

    pub fn export(&self, id: MacroId) -> Result<String, MacroError> {
        lock(&self.inner.library).export(id)
    }

    pub fn import(&self, json: &str) -> Result<Macro, MacroError> {
        let imported = {
            let mut library = lock(&self.inner.library);
            let id = library.import(json)?;
            library.get(id).cloned().ok_or(MacroError::NotFound(id))?
        };
        self.bind(&imported);
        Ok(imported)
    }

    // Playback.

    pub async fn play_macro<X: MacroExecutor>(&self, id: MacroId, executor: &X) -> Result<PlaybackReport, MacroError> {
        self.play_macro_with_cancel(id, executor, &CancellationToken::new()).await
    }

    /// Counts a use of the macro, then plays it until done or cancelled.
    pub async fn play_macro_with_cancel<X: MacroExecutor>(
        &self,
        id: MacroId,
        executor: &X,
        cancel: &CancellationToken,
    ) -> Result<PlaybackReport, MacroError> {
        let mac = mark_used(&self.inner, id)?;
        play(&mac, executor, cancel).await
    }

    /// Cancels every playback started from a shortcut.
    pub fn cancel_playbacks(&self) {
        let mut parent = lock(&self.inner.playbacks);
        parent.cancel();
        *parent = CancellationToken::new();
    }

    fn bind(&self, mac: &Macro) {
        let Some(shortcut) = mac.shortcut.clone() else {
            return;
        };
        let id = mac.id;
        let weak: Weak<ManagerInner<S, E>> = Arc::downgrade(&self.inner);
        let shortcut_id = self.inner.dispatcher.register(shortcut, format!("Play macro: {}", mac.name), move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let Ok(runtime) = tokio::runtime::Handle::try_current() else {
                tracing::warn!(%id, "no async runtime available; macro shortcut ignored");
                return;
            };
            let token = lock(&inner.playbacks).child_token();
            runtime.spawn(async move {
                let result = match mark_used(&inner, id) {
                    Ok(mac) => play(&mac, &inner.executor, &token).await,
                    Err(err) => Err(err),
                };
                if let Err(err) = result {
                    tracing::warn!(%id, error = %err, "macro playback from shortcut failed");
                }
            });
        });
        if let Some(previous) = lock(&self.inner.bindings).insert(id, shortcut_id) {
            self.inner.dispatcher.unregister(previous);
        }
    }

    fn unbind(&self, id: MacroId) {
        if let Some(shortcut_id) = lock(&self.inner.bindings).remove(&id) {
            self.inner.dispatcher.unregister(shortcut_id);
        }
    }
}

/// Records the use and returns the macro to play. A failed write of the
/// usage counter does not prevent playback.
fn mark_used<S: PersistentStore, E>(inner: &ManagerInner<S, E>, id: MacroId) -> Result<Macro, MacroError> {
    let mut library = lock(&inner.library);
    match library.mark_used(id) {
        Ok(mac) => Ok(mac),
        Err(MacroError::Storage(err)) => {
            tracing::warn!(%id, error = %err, "could not persist macro usage");
            library.get(id).cloned().ok_or(MacroError::NotFound(id))
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crmsync_core::{KeyEvent, Modifiers};
    use crmsync_storage::InMemoryStore;

    use super::*;
    use crate::macros::MacroActionKind;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl MacroExecutor for Collect {
        async fn execute(&self, action: &MacroAction) -> Result<(), crmsync_core::BoxError> {
            lock(&self.0).push(action.description.clone());
            Ok(())
        }
    }

    fn dispatcher() -> SequenceDispatcher {
        SequenceDispatcher::new(Duration::from_millis(1000))
    }

    fn record(manager: &MacroManager<InMemoryStore, impl MacroExecutor>, name: &str, shortcut: Option<&str>) -> Macro {
        manager.start_recording().unwrap();
        manager.record_action(RecordedInput::new(MacroActionKind::Navigation, "Open leads").target("/leads"));
        manager.record_action(RecordedInput::new(MacroActionKind::Input, "Search").value("acme"));
        manager.stop_recording(name, None, shortcut).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn recorded_macro_plays_and_counts_usage() {
        let manager = MacroManager::new(InMemoryStore::new(), dispatcher());
        let mac = record(&manager, "Find Acme", None);
        assert_eq!(manager.recorder_state(), RecorderState::Idle);

        let executor = Arc::new(Collect::default());
        let report = manager.play_macro(mac.id, &executor).await.unwrap();
        assert!(report.completed);
        assert_eq!(*lock(&executor.0), vec!["Open leads", "Search"]);

        let stored = manager.get(mac.id).unwrap();
        assert_eq!(stored.times_used, 1);
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn shortcut_plays_with_manager_executor() {
        let executor = Arc::new(Collect::default());
        let dispatcher = dispatcher();
        let manager = MacroManager::with_executor(InMemoryStore::new(), dispatcher.clone(), Arc::clone(&executor));
        let mac = record(&manager, "Find Acme", Some("g a"));

        assert!(!dispatcher.handle_key_event(&KeyEvent::new("g")).is_handled());
        assert!(dispatcher.handle_key_event(&KeyEvent::new("a")).is_handled());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(lock(&executor.0).len(), 2);
        assert_eq!(manager.get(mac.id).unwrap().times_used, 1);
    }

    #[tokio::test]
    async fn taken_shortcut_keeps_recording_alive() {
        let manager = MacroManager::new(InMemoryStore::new(), dispatcher());
        record(&manager, "First", Some("ctrl+1"));

        manager.start_recording().unwrap();
        let err = manager.stop_recording("Second", None, Some("ctrl+1")).unwrap_err();
        assert!(matches!(err, MacroError::ShortcutInUse { .. }));
        assert_eq!(manager.recorder_state(), RecorderState::Recording);
        assert!(manager.stop_recording("Second", None, Some("ctrl+2")).is_ok());
    }

    #[tokio::test]
    async fn deleting_unbinds_the_shortcut() {
        let dispatcher = dispatcher();
        let manager = MacroManager::new(InMemoryStore::new(), dispatcher.clone());
        let mac = record(&manager, "Bound", Some("ctrl+m"));
        let event = KeyEvent::new("m").with_modifiers(Modifiers::CTRL);
        assert_eq!(dispatcher.shortcuts().len(), 1);

        manager.delete(mac.id).unwrap();
        assert!(dispatcher.shortcuts().is_empty());
        assert!(!dispatcher.handle_key_event(&event).is_handled());
    }

    #[tokio::test]
    async fn dropping_the_manager_releases_its_shortcuts() {
        let dispatcher = dispatcher();
        let manager = MacroManager::new(InMemoryStore::new(), dispatcher.clone());
        record(&manager, "Bound", Some("ctrl+m"));
        let clone = manager.clone();
        drop(manager);
        assert_eq!(dispatcher.shortcuts().len(), 1);

        drop(clone);
        assert!(dispatcher.shortcuts().is_empty());
        let event = KeyEvent::new("m").with_modifiers(Modifiers::CTRL);
        assert!(!dispatcher.handle_key_event(&event).is_handled());
    }

    #[tokio::test]
    async fn stored_shortcuts_are_bound_on_load() {
        let store = {
            let manager = MacroManager::new(InMemoryStore::new(), dispatcher());
            record(&manager, "Persisted", Some("g p"));
            let library = lock(&manager.inner.library);
            library.store().clone()
        };
        let dispatcher = dispatcher();
        let manager = MacroManager::new(store, dispatcher.clone());
        assert_eq!(manager.macros().len(), 1);
        assert!(dispatcher.find(&Shortcut::chord('g', 'p')).is_some());
    }
}
