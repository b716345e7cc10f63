//! The record port that history actions are replayed through.

use std::future::Future;

use serde_json::Value;

use crmsync_core::BoxError;

/// Create/update/delete calls for CRM records, grouped by entity name
/// ("leads", "deals", ...). The history engine performs no I/O beyond
/// invoking these.
pub trait RecordPort: Send + Sync + 'static {
    /// Creates `record` and returns the stored record, which may carry a
    /// different id than the one requested.
    fn create(&self, entity: &str, record: Value) -> impl Future<Output = Result<Value, BoxError>> + Send;

    /// Applies the fields in `changes` to the record with `id`.
    fn update(&self, entity: &str, id: &str, changes: Value) -> impl Future<Output = Result<Value, BoxError>> + Send;

    /// Deletes the record with `id`.
    fn delete(&self, entity: &str, id: &str) -> impl Future<Output = Result<(), BoxError>> + Send;
}
