//! Overlapping optimistic mutations of one cache key.

use std::time::Duration;

use serde_json::{json, Value};

use crmsync_core::{BoxError, InMemoryCache, QueryCache, QueryKey};
use crmsync_engine::predict;
use crmsync_engine::{ConcurrencyPolicy, MutationCoordinator};

/// A remote call that settles after `delay_ms`.
async fn remote(delay_ms: u64, ok: bool) -> Result<(), BoxError> {
    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
    if ok {
        Ok(())
    } else {
        Err("rejected".into())
    }
}

/// M1 adds X and fails slowly; M2 adds Y and succeeds quickly.
async fn race(policy: ConcurrencyPolicy) -> Value {
    let cache = InMemoryCache::new();
    let key = QueryKey::from("leads");
    cache.set(&key, json!([{"id": "A"}]));
    let coordinator = MutationCoordinator::with_policy(cache.clone(), policy);

    let first = coordinator.mutate(
        &key,
        json!({"id": "X"}),
        |list: Option<&Value>, item: &Value| predict::append(list, item.clone()),
        |_| remote(200, false),
    );
    let second = coordinator.mutate(
        &key,
        json!({"id": "Y"}),
        |list: Option<&Value>, item: &Value| predict::append(list, item.clone()),
        |_| remote(100, true),
    );
    let (first, second) = tokio::join!(first, second);
    assert!(first.is_err());
    assert!(second.is_ok());

    cache.get(&key).unwrap_or(Value::Null)
}

#[tokio::test(start_paused = true)]
async fn unserialized_rollback_clobbers_a_confirmed_write() {
    // M1's snapshot predates M2, so rolling M1 back drops Y.
    assert_eq!(race(ConcurrencyPolicy::Unserialized).await, json!([{"id": "A"}]));
}

#[tokio::test(start_paused = true)]
async fn per_key_policy_keeps_every_confirmed_write() {
    assert_eq!(race(ConcurrencyPolicy::PerKey).await, json!([{"id": "A"}, {"id": "Y"}]));
}

#[tokio::test(start_paused = true)]
async fn per_key_policy_does_not_serialize_different_keys() {
    let cache = InMemoryCache::new();
    let coordinator = MutationCoordinator::with_policy(cache.clone(), ConcurrencyPolicy::PerKey);
    let (leads, deals) = (QueryKey::from("leads"), QueryKey::from("deals"));

    let started = tokio::time::Instant::now();
    let (a, b) = tokio::join!(
        coordinator.mutate(&leads, (), |_, _| json!(["lead"]), |_| remote(300, true)),
        coordinator.mutate(&deals, (), |_, _| json!(["deal"]), |_| remote(300, true)),
    );
    assert!(a.is_ok() && b.is_ok());
    assert_eq!(started.elapsed(), Duration::from_millis(300));
}
