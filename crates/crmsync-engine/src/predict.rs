//! Prediction helpers for collection-shaped cache entries.
//!
//! A collection is a JSON array of objects, each identified by its `"id"`
//! field (string or number). Every helper takes the current cache value,
//! which may be absent, and returns the predicted next value; absent or
//! non-array values are treated as an empty list.

use serde_json::{Map, Value};

/// The identifier of a record, with numeric ids rendered as strings.
pub fn record_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn items(list: Option<&Value>) -> Vec<Value> {
    match list {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn has_id(item: &Value, id: &str) -> bool {
    record_id(item).as_deref() == Some(id)
}

/// Adds `item` at the end of the list.
pub fn append(list: Option<&Value>, item: Value) -> Value {
    let mut items = items(list);
    items.push(item);
    Value::Array(items)
}

/// Adds `item` at the front of the list.
pub fn prepend(list: Option<&Value>, item: Value) -> Value {
    let mut items = items(list);
    items.insert(0, item);
    Value::Array(items)
}

/// Replaces the item sharing `item`'s id; appends when no item matches.
pub fn replace_by_id(list: Option<&Value>, item: Value) -> Value {
    let mut items = items(list);
    match record_id(&item).and_then(|id| items.iter().position(|i| has_id(i, &id))) {
        Some(pos) => items[pos] = item,
        None => items.push(item),
    }
    Value::Array(items)
}

/// Shallow-merges the fields of `patch` into the item with `id`.
pub fn patch_by_id(list: Option<&Value>, id: &str, patch: &Value) -> Value {
    let mut items = items(list);
    if let Some(item) = items.iter_mut().find(|i| has_id(i, id)) {
        merge(item, patch);
    }
    Value::Array(items)
}

/// Shallow-merges the fields of `patch` into a single record value.
pub fn patch_record(record: Option<&Value>, patch: &Value) -> Value {
    let mut record = record.cloned().unwrap_or_else(|| Value::Object(Map::new()));
    merge(&mut record, patch);
    record
}

/// Drops the item with `id`.
pub fn remove_by_id(list: Option<&Value>, id: &str) -> Value {
    let mut items = items(list);
    items.retain(|i| !has_id(i, id));
    Value::Array(items)
}

/// Drops every item whose id is in `ids`.
pub fn remove_many(list: Option<&Value>, ids: &[String]) -> Value {
    let mut items = items(list);
    items.retain(|i| !ids.iter().any(|id| has_id(i, id)));
    Value::Array(items)
}

/// Moves the item at `from` to position `to`. Out-of-range positions leave
/// the list unchanged.
pub fn move_item(list: Option<&Value>, from: usize, to: usize) -> Value {
    let mut items = items(list);
    if from < items.len() && to < items.len() {
        let item = items.remove(from);
        items.insert(to, item);
    }
    Value::Array(items)
}

fn merge(target: &mut Value, patch: &Value) {
    match (target, patch) {
        (Value::Object(target), Value::Object(patch)) => {
            for (k, v) in patch {
                target.insert(k.clone(), v.clone());
            }
        }
        (target, patch) => *target = patch.clone(),
    }
}
