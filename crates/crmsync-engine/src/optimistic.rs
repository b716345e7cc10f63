//! Optimistic mutations with rollback.
//!
//! [`MutationCoordinator::mutate`] runs the fixed sequence:
//!
//! 1. cancel any in-flight fetch for the key,
//! 2. snapshot the current value,
//! 3. write the predicted value (observers see it immediately),
//! 4. await the remote call,
//! 5. on success keep the prediction and invalidate the key,
//! 6. on failure restore the snapshot, invalidate the key and return the error.
//!
//! The key never holds a value the caller did not either predict or
//! previously hold.
//!
//! Two mutations of the same key that overlap in time race: the second one
//! snapshots the first one's unconfirmed prediction and, if it fails, rolls
//! back to that intermediate value. [`ConcurrencyPolicy::PerKey`] queues
//! mutations per key so each one snapshots a settled value.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;

use crmsync_core::{BoxError, QueryCache, QueryKey};

use crate::error::MutationError;

/// How overlapping mutations of one cache key are scheduled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConcurrencyPolicy {
    /// Mutations run as soon as they are issued.
    #[default]
    Unserialized,
    /// Mutations of the same key wait for the previous one to settle.
    PerKey,
}

pub struct MutationCoordinator<C> {
    cache: C,
    policy: ConcurrencyPolicy,
    key_locks: DashMap<QueryKey, Arc<AsyncMutex<()>>>,
}

impl<C: QueryCache> MutationCoordinator<C> {
    pub fn new(cache: C) -> Self {
        Self::with_policy(cache, ConcurrencyPolicy::default())
    }

    pub fn with_policy(cache: C, policy: ConcurrencyPolicy) -> Self {
        MutationCoordinator {
            cache,
            policy,
            key_locks: DashMap::new(),
        }
    }

    pub fn cache(&self) -> &C {
        &self.cache
    }

    pub fn policy(&self) -> ConcurrencyPolicy {
        self.policy
    }

    /// Applies `predict` to the cache entry at `key`, then runs `remote`.
    ///
    /// `predict` receives the current value (if any) and the variables.
    /// `remote` receives the variables and resolves to the authoritative
    /// result, which is returned unchanged on success.
    pub async fn mutate<V, R, P, F, Fut>(
        &self,
        key: &QueryKey,
        variables: V,
        predict: P,
        remote: F,
    ) -> Result<R, MutationError>
    where
        P: FnOnce(Option<&Value>, &V) -> Value,
        F: FnOnce(V) -> Fut,
        Fut: Future<Output = Result<R, BoxError>>,
    {
        let key_lock = match self.policy {
            ConcurrencyPolicy::PerKey => Some(self.key_lock(key)),
            ConcurrencyPolicy::Unserialized => None,
        };
        let guard = match &key_lock {
            Some(lock) => Some(lock.lock().await),
            None => None,
        };

        self.cache.cancel_in_flight(key);
        let snapshot = self.cache.get(key);
        let predicted = predict(snapshot.as_ref(), &variables);
        self.cache.set(key, predicted);
        tracing::debug!(%key, "optimistic value applied");

        let outcome = match remote(variables).await {
            Ok(result) => {
                self.cache.invalidate(key);
                Ok(result)
            }
            Err(source) => {
                match snapshot {
                    Some(previous) => self.cache.set(key, previous),
                    None => self.cache.remove(key),
                }
                tracing::warn!(%key, error = %source, "remote mutation failed; rolled back");
                self.cache.invalidate(key);
                Err(MutationError::Remote {
                    key: key.clone(),
                    source,
                })
            }
        };

        drop(guard);
        if let Some(lock) = key_lock {
            drop(lock);
            self.key_locks
                .remove_if(key, |_, lock| Arc::strong_count(lock) == 1);
        }

        outcome
    }

    fn key_lock(&self, key: &QueryKey) -> Arc<AsyncMutex<()>> {
        Arc::clone(
            self.key_locks
                .entry(key.clone())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .value(),
        )
    }
}
