//! One handle wiring the engine together.
//!
//! [`SyncCore`] owns a single cache shared by the mutation coordinator and
//! the command history, a single shortcut dispatcher shared by the history
//! bindings and macro shortcuts, and the macro subsystem.

use std::future::Future;

use serde_json::Value;

use crmsync_core::{BoxError, InMemoryCache, KeyDispatch, KeyEvent, QueryKey, SequenceDispatcher, ShortcutId, SyncConfig};
use crmsync_storage::PersistentStore;

use crate::autosave::{AutoSaveOptions, AutoSaver};
use crate::error::MutationError;
use crate::history::{Action, CommandHistory, RecordPort};
use crate::macros::{MacroExecutor, MacroManager, NoopExecutor};
use crate::optimistic::{ConcurrencyPolicy, MutationCoordinator};
use crate::preferences::ShortcutPreferences;

pub struct SyncCore<P, S, E = NoopExecutor> {
    config: SyncConfig,
    cache: InMemoryCache,
    dispatcher: SequenceDispatcher,
    coordinator: MutationCoordinator<InMemoryCache>,
    history: CommandHistory<P, InMemoryCache>,
    macros: MacroManager<S, E>,
    preferences: ShortcutPreferences,
    history_shortcuts: Vec<ShortcutId>,
}

impl<P, S> SyncCore<P, S, NoopExecutor>
where
    P: RecordPort,
    S: PersistentStore + 'static,
{
    /// Builds the core with unserialized mutations and no macro executor.
    pub fn new(config: SyncConfig, port: P, store: S) -> Self {
        Self::with_executor(config, port, store, NoopExecutor, ConcurrencyPolicy::default())
    }
}

impl<P, S, E> SyncCore<P, S, E>
where
    P: RecordPort,
    S: PersistentStore + 'static,
    E: MacroExecutor,
{
    /// Builds the core. Shortcut preferences are read from `store` before
    /// it is handed to the macro library; undo/redo bindings are only
    /// registered when called inside a tokio runtime.
    pub fn with_executor(config: SyncConfig, port: P, store: S, executor: E, policy: ConcurrencyPolicy) -> Self {
        let preferences = ShortcutPreferences::load(&store);
        let cache = InMemoryCache::new();
        let dispatcher = SequenceDispatcher::new(config.chord_window);
        dispatcher.set_enabled(preferences.enabled);

        let coordinator = MutationCoordinator::with_policy(cache.clone(), policy);
        let history = CommandHistory::new(port, cache.clone(), config.history_limit);
        let history_shortcuts = history.bind_shortcuts(&dispatcher, &preferences);
        let macros = MacroManager::with_executor(store, dispatcher.clone(), executor);

        tracing::info!(
            history_limit = config.history_limit,
            chord_window_ms = config.chord_window.as_millis() as u64,
            ?policy,
            "sync core ready"
        );

        SyncCore {
            config,
            cache,
            dispatcher,
            coordinator,
            history,
            macros,
            preferences,
            history_shortcuts,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn cache(&self) -> &InMemoryCache {
        &self.cache
    }

    pub fn dispatcher(&self) -> &SequenceDispatcher {
        &self.dispatcher
    }

    pub fn coordinator(&self) -> &MutationCoordinator<InMemoryCache> {
        &self.coordinator
    }

    pub fn history(&self) -> &CommandHistory<P, InMemoryCache> {
        &self.history
    }

    pub fn macros(&self) -> &MacroManager<S, E> {
        &self.macros
    }

    pub fn preferences(&self) -> &ShortcutPreferences {
        &self.preferences
    }

    /// Ids of the undo/redo bindings registered on the dispatcher.
    pub fn history_shortcuts(&self) -> &[ShortcutId] {
        &self.history_shortcuts
    }

    /// Routes a key press to the dispatcher. A handled event should have its
    /// default browser behavior suppressed by the host.
    pub fn handle_key_event(&self, event: &KeyEvent) -> KeyDispatch {
        self.dispatcher.handle_key_event(event)
    }

    /// Runs an optimistic mutation and, once the backend confirmed it,
    /// records the action built from the result so it can be undone.
    pub async fn mutate_undoable<V, R, Pr, F, Fut, A>(
        &self,
        key: &QueryKey,
        variables: V,
        predict: Pr,
        remote: F,
        to_action: A,
    ) -> Result<R, MutationError>
    where
        Pr: FnOnce(Option<&Value>, &V) -> Value,
        F: FnOnce(V) -> Fut,
        Fut: Future<Output = Result<R, BoxError>>,
        A: FnOnce(&R) -> Action,
    {
        let result = self.coordinator.mutate(key, variables, predict, remote).await?;
        self.history.record(to_action(&result));
        Ok(result)
    }

    /// An auto-saver using the configured debounce delay.
    pub fn autosaver<T, F, Fut>(&self, initial: T, save: F) -> AutoSaver<T>
    where
        T: Clone + PartialEq + Send + Sync + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let options = AutoSaveOptions {
            delay: self.config.autosave_delay,
            enabled: true,
        };
        AutoSaver::new(initial, options, save)
    }
}
