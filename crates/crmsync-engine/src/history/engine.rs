//! The undo/redo engine.
//!
//! Only one undo or redo runs at a time; a second request while one is in
//! flight returns [`HistoryStep::Busy`] without touching the stacks, so a
//! repeated key press cannot corrupt them. A step that fails leaves both
//! stacks exactly as they were.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crmsync_core::{QueryCache, SequenceDispatcher, ShortcutId};

use super::action::{Action, Direction, HistoryEntry};
use super::port::RecordPort;
use super::stack::HistoryState;
use crate::error::HistoryError;
use crate::lock;
use crate::preferences::ShortcutPreferences;

/// Preference name of the undo binding.
pub const UNDO_ACTION: &str = "history.undo";
/// Preference name of the redo binding.
pub const REDO_ACTION: &str = "history.redo";

const DEFAULT_UNDO: &[&str] = &["ctrl+z", "meta+z"];
const DEFAULT_REDO: &[&str] = &["ctrl+shift+z", "meta+shift+z", "ctrl+y"];

/// Outcome of an undo or redo request.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryStep {
    /// The action was reversed (or reapplied) and moved to the other stack.
    Applied(HistoryEntry),
    /// There was nothing to undo (or redo).
    Empty,
    /// Another undo/redo is still running; nothing happened.
    Busy,
}

struct HistoryShared {
    state: HistoryState,
    /// Bumped by `clear`; a step that finishes after a clear does not
    /// put its action back.
    epoch: u64,
}

struct HistoryInner<P, C> {
    shared: Mutex<HistoryShared>,
    busy: AtomicBool,
    port: P,
    cache: C,
}

/// Undo/redo stacks bound to a record port and a cache.
pub struct CommandHistory<P, C> {
    inner: Arc<HistoryInner<P, C>>,
}

impl<P, C> Clone for CommandHistory<P, C> {
    fn clone(&self) -> Self {
        CommandHistory {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// An action taken off its stack for the duration of one step. Unless the
/// step settles, dropping it (on failure or when the step's future is
/// dropped) puts the action back where it came from.
struct PendingStep<'a> {
    shared: &'a Mutex<HistoryShared>,
    action: Action,
    direction: Direction,
    index: usize,
    revision: u64,
    epoch: u64,
    settled: bool,
}

impl<'a> PendingStep<'a> {
    fn take(shared: &'a Mutex<HistoryShared>, direction: Direction) -> Option<Self> {
        let mut guard = lock(shared);
        let index = guard.state.past_len().saturating_sub(1);
        let revision = guard.state.revision();
        let epoch = guard.epoch;
        let action = match direction {
            Direction::Undo => guard.state.take_undo(),
            Direction::Redo => guard.state.take_redo(),
        }?;
        Some(PendingStep {
            shared,
            action,
            direction,
            index,
            revision,
            epoch,
            settled: false,
        })
    }

    fn settle(&mut self) -> Action {
        self.settled = true;
        self.action.clone()
    }
}

impl Drop for PendingStep<'_> {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        let mut shared = lock(self.shared);
        if shared.epoch != self.epoch {
            return;
        }
        let action = self.action.clone();
        match self.direction {
            Direction::Undo => shared.state.restore_undo(action, self.index),
            Direction::Redo if shared.state.revision() == self.revision => shared.state.restore_redo(action),
            Direction::Redo => {}
        }
    }
}

impl<P: RecordPort, C: QueryCache + 'static> CommandHistory<P, C> {
    pub fn new(port: P, cache: C, limit: usize) -> Self {
        CommandHistory {
            inner: Arc::new(HistoryInner {
                shared: Mutex::new(HistoryShared {
                    state: HistoryState::new(limit),
                    epoch: 0,
                }),
                busy: AtomicBool::new(false),
                port,
                cache,
            }),
        }
    }

    pub fn port(&self) -> &P {
        &self.inner.port
    }

    /// Pushes `action` onto the undo stack and discards the redo stack.
    pub fn record(&self, action: Action) {
        tracing::debug!(action = %action.description, "recorded history action");
        let evicted = lock(&self.inner.shared).state.record(action);
        if !evicted.is_empty() {
            tracing::debug!(count = evicted.len(), "evicted oldest history actions");
        }
    }

    pub fn clear(&self) {
        let mut shared = lock(&self.inner.shared);
        shared.state.clear();
        shared.epoch += 1;
    }

    /// Actions that can be undone, oldest first.
    pub fn past(&self) -> Vec<Action> {
        lock(&self.inner.shared).state.past().cloned().collect()
    }

    /// Actions that can be redone, next redo first.
    pub fn future(&self) -> Vec<Action> {
        lock(&self.inner.shared).state.future().cloned().collect()
    }

    /// Every action in reverse chronological order.
    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        let shared = lock(&self.inner.shared);
        let done = shared.state.past().map(|a| a.entry(false));
        let undone = shared.state.future().map(|a| a.entry(true));
        let mut entries: Vec<HistoryEntry> = done.chain(undone).collect();
        entries.reverse();
        entries
    }

    pub fn can_undo(&self) -> bool {
        lock(&self.inner.shared).state.past_len() > 0
    }

    pub fn can_redo(&self) -> bool {
        lock(&self.inner.shared).state.future_len() > 0
    }

    pub fn is_busy(&self) -> bool {
        self.inner.busy.load(Ordering::Acquire)
    }

    /// Reverses the most recent action.
    pub async fn undo(&self) -> Result<HistoryStep, HistoryError> {
        self.step(Direction::Undo).await
    }

    /// Reapplies the most recently undone action.
    pub async fn redo(&self) -> Result<HistoryStep, HistoryError> {
        self.step(Direction::Redo).await
    }

    async fn step(&self, direction: Direction) -> Result<HistoryStep, HistoryError> {
        let Some(_busy) = BusyGuard::acquire(&self.inner.busy) else {
            tracing::debug!(?direction, "history step ignored: another step is in flight");
            return Ok(HistoryStep::Busy);
        };

        let Some(mut step) = PendingStep::take(&self.inner.shared, direction) else {
            return Ok(HistoryStep::Empty);
        };

        match step.action.apply(&self.inner.port, direction).await {
            Ok(()) => {
                let action = step.settle();
                self.invalidate_affected(&action);
                let undone = direction == Direction::Undo;
                let entry = action.entry(undone);
                tracing::info!(action = %action.description, ?direction, "history step applied");
                let mut shared = lock(&self.inner.shared);
                if shared.epoch == step.epoch {
                    match direction {
                        // New work recorded meanwhile discards redo-ability.
                        Direction::Undo if shared.state.revision() == step.revision => {
                            shared.state.push_future(action)
                        }
                        Direction::Undo => {}
                        Direction::Redo => shared.state.push_past(action),
                    }
                }
                Ok(HistoryStep::Applied(entry))
            }
            Err(source) => {
                let action = &step.action;
                tracing::warn!(action = %action.description, ?direction, error = %source, "history step failed");
                let (action_id, description) = (action.id, action.description.clone());
                // Dropping the unsettled step puts the action back.
                drop(step);
                Err(match direction {
                    Direction::Undo => HistoryError::Undo {
                        action_id,
                        description,
                        source,
                    },
                    Direction::Redo => HistoryError::Redo {
                        action_id,
                        description,
                        source,
                    },
                })
            }
        }
    }

    fn invalidate_affected(&self, action: &Action) {
        for key in &action.affected_keys {
            self.inner.cache.invalidate(key);
        }
    }

    /// Registers the undo and redo bindings on `dispatcher`.
    ///
    /// Matched key presses spawn the step on the runtime current at bind
    /// time; failures are logged. Returns the registration ids, which are
    /// empty when no runtime is available or shortcuts are disabled.
    pub fn bind_shortcuts(
        &self,
        dispatcher: &SequenceDispatcher,
        preferences: &ShortcutPreferences,
    ) -> Vec<ShortcutId> {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no async runtime available; history shortcuts not bound");
            return Vec::new();
        };

        let mut ids = Vec::new();
        for shortcut in preferences.bindings_for(UNDO_ACTION, DEFAULT_UNDO) {
            let history = self.clone();
            let runtime = runtime.clone();
            ids.push(dispatcher.register(shortcut, "Undo", move || {
                let history = history.clone();
                runtime.spawn(async move {
                    if let Err(err) = history.undo().await {
                        tracing::warn!(error = %err, "undo from shortcut failed");
                    }
                });
            }));
        }
        for shortcut in preferences.bindings_for(REDO_ACTION, DEFAULT_REDO) {
            let history = self.clone();
            let runtime = runtime.clone();
            ids.push(dispatcher.register(shortcut, "Redo", move || {
                let history = history.clone();
                runtime.spawn(async move {
                    if let Err(err) = history.redo().await {
                        tracing::warn!(error = %err, "redo from shortcut failed");
                    }
                });
            }));
        }
        ids
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    use proptest::prelude::*;
    use serde_json::{json, Value};

    use crmsync_core::{BoxError, InMemoryCache, QueryKey};

    use super::*;
    use crate::history::ActionKind;
    use crate::predict::record_id;

    /// Records keyed by (entity, id), with optional latency and failure.
    #[derive(Default)]
    struct FakePort {
        records: Mutex<BTreeMap<(String, String), Value>>,
        fail: AtomicBool,
        latency: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakePort {
        fn seed(&self, entity: &str, record: Value) {
            let id = record_id(&record).unwrap();
            lock(&self.records).insert((entity.to_string(), id), record);
        }

        fn ids(&self, entity: &str) -> Vec<String> {
            lock(&self.records)
                .keys()
                .filter(|(e, _)| e == entity)
                .map(|(_, id)| id.clone())
                .collect()
        }

        fn get(&self, entity: &str, id: &str) -> Option<Value> {
            lock(&self.records).get(&(entity.to_string(), id.to_string())).cloned()
        }

        async fn enter(&self) -> Result<(), BoxError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err("backend unavailable".into());
            }
            Ok(())
        }
    }

    impl RecordPort for Arc<FakePort> {
        async fn create(&self, entity: &str, record: Value) -> Result<Value, BoxError> {
            self.enter().await?;
            self.seed(entity, record.clone());
            Ok(record)
        }

        async fn update(&self, entity: &str, id: &str, changes: Value) -> Result<Value, BoxError> {
            self.enter().await?;
            let mut records = lock(&self.records);
            let record = records
                .get_mut(&(entity.to_string(), id.to_string()))
                .ok_or_else(|| BoxError::from("no such record"))?;
            if let (Some(target), Some(changes)) = (record.as_object_mut(), changes.as_object()) {
                for (field, value) in changes {
                    target.insert(field.clone(), value.clone());
                }
            }
            Ok(record.clone())
        }

        async fn delete(&self, entity: &str, id: &str) -> Result<(), BoxError> {
            self.enter().await?;
            lock(&self.records).remove(&(entity.to_string(), id.to_string()));
            Ok(())
        }
    }

    fn history(port: &Arc<FakePort>) -> CommandHistory<Arc<FakePort>, InMemoryCache> {
        CommandHistory::new(Arc::clone(port), InMemoryCache::new(), 50)
    }

    #[tokio::test]
    async fn undo_then_redo_restores_state() {
        let port = Arc::new(FakePort::default());
        port.seed("leads", json!({"id": "1", "stage": "new"}));
        let history = history(&port);

        // The host already applied the change; record how to reverse it.
        port.update("leads", "1", json!({"stage": "won"})).await.unwrap();
        history.record(Action::update(
            "leads",
            "1",
            json!({"stage": "new"}),
            json!({"stage": "won"}),
            vec![QueryKey::from("leads")],
        ));

        assert!(matches!(history.undo().await.unwrap(), HistoryStep::Applied(e) if e.undone));
        assert_eq!(port.get("leads", "1").unwrap()["stage"], "new");
        assert!(!history.can_undo());
        assert!(history.can_redo());

        assert!(matches!(history.redo().await.unwrap(), HistoryStep::Applied(e) if !e.undone));
        assert_eq!(port.get("leads", "1").unwrap()["stage"], "won");
        assert_eq!(history.past().len(), 1);
        assert!(history.future().is_empty());
    }

    #[tokio::test]
    async fn empty_stacks_report_empty() {
        let port = Arc::new(FakePort::default());
        let history = history(&port);
        assert_eq!(history.undo().await.unwrap(), HistoryStep::Empty);
        assert_eq!(history.redo().await.unwrap(), HistoryStep::Empty);
        assert_eq!(port.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_undo_leaves_stacks_unchanged() {
        let port = Arc::new(FakePort::default());
        port.seed("deals", json!({"id": "d1"}));
        let history = history(&port);
        history.record(Action::create("deals", json!({"id": "d0"}), vec![]));
        history.record(Action::create("deals", json!({"id": "d1"}), vec![]));
        let before = history.past();

        port.fail.store(true, Ordering::SeqCst);
        let err = history.undo().await.unwrap_err();
        assert!(matches!(err, HistoryError::Undo { .. }));
        assert_eq!(history.past(), before);
        assert!(history.future().is_empty());
        assert!(!history.is_busy());

        port.fail.store(false, Ordering::SeqCst);
        history.undo().await.unwrap();
        assert!(port.get("deals", "d1").is_none());
    }

    #[tokio::test]
    async fn failed_redo_leaves_stacks_unchanged() {
        let port = Arc::new(FakePort::default());
        port.seed("tasks", json!({"id": "t1", "status": "done"}));
        let history = history(&port);
        history.record(Action::field_update("tasks", "t1", "status", json!("open"), json!("done"), vec![]));
        history.undo().await.unwrap();
        assert_eq!(port.get("tasks", "t1").unwrap()["status"], "open");

        port.fail.store(true, Ordering::SeqCst);
        assert!(matches!(history.redo().await, Err(HistoryError::Redo { .. })));
        assert!(history.past().is_empty());
        assert_eq!(history.future().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_request_while_in_flight_is_busy() {
        let port = Arc::new(FakePort {
            latency: Some(Duration::from_millis(200)),
            ..FakePort::default()
        });
        port.seed("leads", json!({"id": "1"}));
        let history = history(&port);
        history.record(Action::create("leads", json!({"id": "1"}), vec![]));

        let first = tokio::spawn({
            let history = history.clone();
            async move { history.undo().await }
        });
        tokio::task::yield_now().await;
        assert!(history.is_busy());
        assert_eq!(history.undo().await.unwrap(), HistoryStep::Busy);
        assert_eq!(history.redo().await.unwrap(), HistoryStep::Busy);

        assert!(matches!(first.await.unwrap().unwrap(), HistoryStep::Applied(_)));
        assert_eq!(port.calls.load(Ordering::SeqCst), 1);
        assert_eq!(history.future().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_steps_put_the_action_back() {
        let port = Arc::new(FakePort {
            latency: Some(Duration::from_millis(200)),
            ..FakePort::default()
        });
        port.seed("leads", json!({"id": "1"}));
        port.seed("leads", json!({"id": "2"}));
        let history = history(&port);
        history.record(Action::create("leads", json!({"id": "1"}), vec![]));
        history.record(Action::create("leads", json!({"id": "2"}), vec![]));
        let before = history.past();

        let abandoned = tokio::time::timeout(Duration::from_millis(50), history.undo()).await;
        assert!(abandoned.is_err());
        assert_eq!(history.past(), before);
        assert!(history.future().is_empty());
        assert!(!history.is_busy());

        assert!(matches!(history.undo().await.unwrap(), HistoryStep::Applied(_)));
        let pending = history.future();
        let abandoned = tokio::time::timeout(Duration::from_millis(50), history.redo()).await;
        assert!(abandoned.is_err());
        assert_eq!(history.future(), pending);
        assert_eq!(history.past().len(), 1);
        assert!(!history.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn recording_during_undo_discards_redo() {
        let port = Arc::new(FakePort {
            latency: Some(Duration::from_millis(200)),
            ..FakePort::default()
        });
        port.seed("leads", json!({"id": "1"}));
        let history = history(&port);
        history.record(Action::create("leads", json!({"id": "1"}), vec![]));

        let undo = tokio::spawn({
            let history = history.clone();
            async move { history.undo().await }
        });
        tokio::task::yield_now().await;
        history.record(Action::create("leads", json!({"id": "2"}), vec![]));
        undo.await.unwrap().unwrap();

        assert_eq!(history.past().len(), 1);
        assert!(history.future().is_empty());
    }

    #[tokio::test]
    async fn batch_delete_undo_recreates_every_record() {
        let port = Arc::new(FakePort::default());
        for id in ["a", "b", "c", "d", "e"] {
            port.seed("leads", json!({"id": id}));
        }
        let history = history(&port);

        let removed = vec![port.get("leads", "b").unwrap(), port.get("leads", "d").unwrap()];
        for id in ["b", "d"] {
            port.delete("leads", id).await.unwrap();
        }
        history.record(Action::batch_delete("leads", removed, vec![QueryKey::from("leads")]));
        assert_eq!(port.ids("leads").len(), 3);

        history.undo().await.unwrap();
        assert_eq!(port.ids("leads"), vec!["a", "b", "c", "d", "e"]);

        history.redo().await.unwrap();
        assert_eq!(port.ids("leads"), vec!["a", "c", "e"]);
    }

    #[tokio::test]
    async fn entries_are_newest_first() {
        let port = Arc::new(FakePort::default());
        port.seed("leads", json!({"id": "2"}));
        let history = history(&port);
        history.record(Action::create("leads", json!({"id": "1"}), vec![]).with_description("first"));
        history.record(Action::create("leads", json!({"id": "2"}), vec![]).with_description("second"));
        history.undo().await.unwrap();

        let entries = history.history_entries();
        let summary: Vec<_> = entries.iter().map(|e| (e.description.as_str(), e.undone)).collect();
        assert_eq!(summary, vec![("second", true), ("first", false)]);
    }

    #[tokio::test]
    async fn bound_shortcuts_drive_undo() {
        let port = Arc::new(FakePort::default());
        port.seed("leads", json!({"id": "1"}));
        let history = history(&port);
        history.record(Action::create("leads", json!({"id": "1"}), vec![]));

        let dispatcher = SequenceDispatcher::new(Duration::from_millis(1000));
        let ids = history.bind_shortcuts(&dispatcher, &ShortcutPreferences::default());
        assert_eq!(ids.len(), 5);

        let event = crmsync_core::KeyEvent::new("z").with_modifiers(crmsync_core::Modifiers::CTRL);
        assert!(dispatcher.handle_key_event(&event).is_handled());
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(port.get("leads", "1").is_none());
        assert!(history.can_redo());
    }

    proptest! {
        #[test]
        fn past_never_exceeds_limit(count in 0usize..120, limit in 1usize..60) {
            let port = Arc::new(FakePort::default());
            let history = CommandHistory::new(port, InMemoryCache::new(), limit);
            for i in 0..count {
                history.record(Action::create("leads", json!({"id": i.to_string()}), vec![]));
            }
            let past = history.past();
            prop_assert_eq!(past.len(), count.min(limit));
            if let Some(last) = past.last() {
                prop_assert_eq!(
                    last.kind.clone(),
                    ActionKind::Create { entity: "leads".into(), record: json!({"id": (count - 1).to_string()}) }
                );
            }
        }
    }

    #[test]
    fn sixty_records_keep_the_newest_fifty() {
        let port = Arc::new(FakePort::default());
        let history = history(&port);
        for i in 0..60 {
            history.record(Action::create("leads", json!({"id": i}), vec![]).with_description(format!("#{i}")));
        }
        let past = history.past();
        assert_eq!(past.len(), 50);
        assert_eq!(past[0].description, "#10");
        assert_eq!(past[49].description, "#59");
    }
}
