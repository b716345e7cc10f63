//! Reversible history actions.
//!
//! [`ActionKind`] captures enough information to reverse a mutation and to
//! reapply it. Actions carry data only and serialize to JSON with a `type`
//! tag; the engine decides which [`RecordPort`] call each direction needs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crmsync_core::{epoch_millis, ActionId, BoxError, QueryKey};

use super::port::RecordPort;
use crate::predict::record_id;

/// What an action did, with the data to reverse it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// A record was created. Undo deletes it; redo recreates it.
    Create { entity: String, record: Value },
    /// Fields of a record changed. `before` holds the prior values of the
    /// changed fields only.
    Update {
        entity: String,
        id: String,
        before: Value,
        after: Value,
    },
    /// A record was deleted (the full record is kept for re-creation).
    Delete { entity: String, record: Value },
    /// Several records were deleted as one step.
    BatchDelete { entity: String, records: Vec<Value> },
    /// One field of a record changed.
    FieldUpdate {
        entity: String,
        id: String,
        field: String,
        before: Value,
        after: Value,
    },
}

impl ActionKind {
    /// The serialized tag of this kind.
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::Create { .. } => "create",
            ActionKind::Update { .. } => "update",
            ActionKind::Delete { .. } => "delete",
            ActionKind::BatchDelete { .. } => "batch_delete",
            ActionKind::FieldUpdate { .. } => "field_update",
        }
    }

    pub fn entity(&self) -> &str {
        match self {
            ActionKind::Create { entity, .. }
            | ActionKind::Update { entity, .. }
            | ActionKind::Delete { entity, .. }
            | ActionKind::BatchDelete { entity, .. }
            | ActionKind::FieldUpdate { entity, .. } => entity,
        }
    }
}

/// A recorded, reversible unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: ActionId,
    pub kind: ActionKind,
    pub description: String,
    pub timestamp_ms: u64,
    /// Cache keys to invalidate after every successful undo or redo.
    pub affected_keys: Vec<QueryKey>,
}

/// Serializable summary of an action for history panels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: ActionId,
    #[serde(rename = "type")]
    pub action_type: String,
    pub description: String,
    pub timestamp_ms: u64,
    /// Whether the action currently sits on the redo stack.
    pub undone: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    Undo,
    Redo,
}

impl Action {
    pub fn new(kind: ActionKind, description: impl Into<String>, affected_keys: Vec<QueryKey>) -> Self {
        Action {
            id: ActionId::new(),
            kind,
            description: description.into(),
            timestamp_ms: epoch_millis(),
            affected_keys,
        }
    }

    /// `record` was created.
    pub fn create(entity: impl Into<String>, record: Value, affected_keys: Vec<QueryKey>) -> Self {
        let entity = entity.into();
        let description = format!("Create {}", singular(&entity));
        Self::new(ActionKind::Create { entity, record }, description, affected_keys)
    }

    /// The record `id` went from `before` to `after`.
    pub fn update(
        entity: impl Into<String>,
        id: impl Into<String>,
        before: Value,
        after: Value,
        affected_keys: Vec<QueryKey>,
    ) -> Self {
        let entity = entity.into();
        let description = format!("Update {}", singular(&entity));
        Self::new(
            ActionKind::Update {
                entity,
                id: id.into(),
                before,
                after,
            },
            description,
            affected_keys,
        )
    }

    /// `record` was deleted.
    pub fn delete(entity: impl Into<String>, record: Value, affected_keys: Vec<QueryKey>) -> Self {
        let entity = entity.into();
        let description = format!("Delete {}", singular(&entity));
        Self::new(ActionKind::Delete { entity, record }, description, affected_keys)
    }

    /// Every record in `records` was deleted as one step.
    pub fn batch_delete(entity: impl Into<String>, records: Vec<Value>, affected_keys: Vec<QueryKey>) -> Self {
        let entity = entity.into();
        let description = format!("Delete {} {}", records.len(), entity);
        Self::new(ActionKind::BatchDelete { entity, records }, description, affected_keys)
    }

    /// The single `field` of record `id` went from `before` to `after`.
    pub fn field_update(
        entity: impl Into<String>,
        id: impl Into<String>,
        field: impl Into<String>,
        before: Value,
        after: Value,
        affected_keys: Vec<QueryKey>,
    ) -> Self {
        let entity = entity.into();
        let field = field.into();
        let description = format!("Change {} {}", singular(&entity), field);
        Self::new(
            ActionKind::FieldUpdate {
                entity,
                id: id.into(),
                field,
                before,
                after,
            },
            description,
            affected_keys,
        )
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn entry(&self, undone: bool) -> HistoryEntry {
        HistoryEntry {
            id: self.id,
            action_type: self.kind.type_name().to_string(),
            description: self.description.clone(),
            timestamp_ms: self.timestamp_ms,
            undone,
        }
    }

    /// Replays one direction of this action through `port`.
    ///
    /// Re-created records adopt whatever the port returns, so later steps
    /// address the live record even when the backend assigned a new id.
    /// A batch that fails partway is compensated before the error is
    /// returned, leaving the backend as it was before the attempt.
    pub(crate) async fn apply<P: RecordPort>(&mut self, port: &P, direction: Direction) -> Result<(), BoxError> {
        match (&mut self.kind, direction) {
            (ActionKind::Create { entity, record }, Direction::Undo)
            | (ActionKind::Delete { entity, record }, Direction::Redo) => {
                let id = require_id(record)?;
                port.delete(entity, &id).await
            }
            (ActionKind::Create { entity, record }, Direction::Redo)
            | (ActionKind::Delete { entity, record }, Direction::Undo) => {
                let created = port.create(entity, record.clone()).await?;
                adopt(record, created);
                Ok(())
            }
            (ActionKind::Update { entity, id, before, .. }, Direction::Undo) => {
                port.update(entity, id, before.clone()).await.map(|_| ())
            }
            (ActionKind::Update { entity, id, after, .. }, Direction::Redo) => {
                port.update(entity, id, after.clone()).await.map(|_| ())
            }
            (
                ActionKind::FieldUpdate {
                    entity,
                    id,
                    field,
                    before,
                    after,
                },
                direction,
            ) => {
                let value = match direction {
                    Direction::Undo => before.clone(),
                    Direction::Redo => after.clone(),
                };
                let mut changes = Map::new();
                changes.insert(field.clone(), value);
                port.update(entity, id, Value::Object(changes)).await.map(|_| ())
            }
            (ActionKind::BatchDelete { entity, records }, Direction::Undo) => {
                recreate_all(port, entity, records).await
            }
            (ActionKind::BatchDelete { entity, records }, Direction::Redo) => {
                delete_all(port, entity, records).await
            }
        }
    }
}

async fn recreate_all<P: RecordPort>(port: &P, entity: &str, records: &mut [Value]) -> Result<(), BoxError> {
    let mut restored = Vec::with_capacity(records.len());
    for record in records.iter() {
        match port.create(entity, record.clone()).await {
            Ok(created) => {
                let mut record = record.clone();
                adopt(&mut record, created);
                restored.push(record);
            }
            Err(err) => {
                for record in &restored {
                    if let Some(id) = record_id(record) {
                        if let Err(undo_err) = port.delete(entity, &id).await {
                            tracing::warn!(entity, %id, error = %undo_err, "could not remove partially restored record");
                        }
                    }
                }
                return Err(err);
            }
        }
    }
    for (slot, record) in records.iter_mut().zip(restored) {
        *slot = record;
    }
    Ok(())
}

async fn delete_all<P: RecordPort>(port: &P, entity: &str, records: &mut [Value]) -> Result<(), BoxError> {
    let ids = records.iter().map(require_id).collect::<Result<Vec<_>, _>>()?;
    for (deleted, id) in ids.iter().enumerate() {
        if let Err(err) = port.delete(entity, id).await {
            for record in records[..deleted].iter_mut() {
                match port.create(entity, record.clone()).await {
                    Ok(created) => adopt(record, created),
                    Err(redo_err) => {
                        tracing::warn!(entity, error = %redo_err, "could not restore partially deleted record");
                    }
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

fn require_id(record: &Value) -> Result<String, BoxError> {
    record_id(record).ok_or_else(|| BoxError::from("record has no \"id\" field"))
}

fn adopt(record: &mut Value, created: Value) {
    if record_id(&created).is_some() {
        *record = created;
    }
}

fn singular(entity: &str) -> &str {
    entity.strip_suffix('s').unwrap_or(entity)
}
