//! Deferred writes and undo
//!
//! `CREATE ... > YIELD` stages an operation instead of committing it.
//! `PUSH` flushes staged operations in FIFO order; a failure stops the
//! flush and leaves the failing operation at the front of the queue.
//!
//! Committed mutations leave a [`RevertRecord`] describing how to undo
//! them. Only the latest one is kept.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::schema::ModelDescriptor;
use crate::store::{DataStore, Fields, Record, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Create,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Create => write!(f, "CREATE"),
        }
    }
}

/// A staged mutation
#[derive(Debug, Clone)]
pub struct PendingOperation {
    pub token: Uuid,
    pub kind: OperationKind,
    pub model: Arc<ModelDescriptor>,
    pub identifier: String,
    pub payload: Fields,
}

impl PendingOperation {
    async fn apply(&self, store: &dyn DataStore) -> Result<Record, StoreError> {
        match self.kind {
            OperationKind::Create => store.create(&self.model, self.payload.clone()).await,
        }
    }
}

impl fmt::Display for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} > {} > {}",
            self.kind, self.model.display_name, self.identifier
        )
    }
}

/// Outcome of a flush
#[derive(Debug, Default)]
pub struct FlushReport {
    /// Records created, in application order
    pub applied: Vec<Record>,
    /// The operation that failed (still queued) and why
    pub failed: Option<(PendingOperation, StoreError)>,
    /// Operations left in the queue afterwards
    pub remaining: usize,
}

impl FlushReport {
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }
}

/// FIFO queue of staged operations
#[derive(Debug, Default)]
pub struct PendingQueue {
    ops: VecDeque<PendingOperation>,
}

impl PendingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a create operation without touching the store
    pub fn stage(&mut self, model: Arc<ModelDescriptor>, identifier: impl Into<String>, payload: Fields) -> Uuid {
        let token = Uuid::new_v4();
        let op = PendingOperation {
            token,
            kind: OperationKind::Create,
            model,
            identifier: identifier.into(),
            payload,
        };
        tracing::debug!("Staged {} ({})", op, token);
        self.ops.push_back(op);
        token
    }

    /// Staged operation for (model, identifier), if any
    pub fn find_mut(&mut self, model: &ModelDescriptor, identifier: &str) -> Option<&mut PendingOperation> {
        self.ops
            .iter_mut()
            .find(|op| op.model.name == model.name && op.identifier == identifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &PendingOperation> {
        self.ops.iter()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Drop everything, returning how many operations were discarded
    pub fn clear(&mut self) -> usize {
        let count = self.ops.len();
        self.ops.clear();
        tracing::debug!("Cleared {} pending operations", count);
        count
    }

    /// Apply up to `limit` operations (all when `None`) from the front
    pub async fn flush(&mut self, store: &dyn DataStore, limit: Option<usize>) -> FlushReport {
        let limit = limit.unwrap_or(self.ops.len());
        let mut report = FlushReport::default();

        while report.applied.len() < limit {
            let Some(op) = self.ops.front() else {
                break;
            };

            match op.apply(store).await {
                Ok(record) => {
                    report.applied.push(record);
                    self.ops.pop_front();
                }
                Err(e) => {
                    tracing::warn!("Flush stopped at {}: {}", op, e);
                    report.failed = Some((op.clone(), e));
                    break;
                }
            }
        }

        report.remaining = self.ops.len();
        tracing::info!(
            "Flushed {} pending operations, {} remaining",
            report.applied.len(),
            report.remaining
        );
        report
    }
}

/// One step that undoes part of a committed mutation
#[derive(Debug, Clone, PartialEq)]
pub enum InverseOp {
    /// Undo a create
    Delete { model: Arc<ModelDescriptor>, pk: i64 },
    /// Undo a delete
    Recreate { model: Arc<ModelDescriptor>, fields: Fields },
    /// Undo an update
    Restore {
        model: Arc<ModelDescriptor>,
        pk: i64,
        field: String,
        value: JsonValue,
    },
}

impl InverseOp {
    async fn apply(&self, store: &dyn DataStore) -> Result<(), StoreError> {
        match self {
            InverseOp::Delete { model, pk } => {
                store.delete(model, *pk).await?;
            }
            InverseOp::Recreate { model, fields } => {
                store.create(model, fields.clone()).await?;
            }
            InverseOp::Restore {
                model,
                pk,
                field,
                value,
            } => {
                store.update(model, *pk, field, value.clone()).await?;
            }
        }
        Ok(())
    }
}

/// Undo information for the most recent mutating command
#[derive(Debug, Clone, PartialEq)]
pub struct RevertRecord {
    /// Command line that produced the mutation
    pub command: String,
    pub steps: Vec<InverseOp>,
}

impl RevertRecord {
    pub fn new(command: impl Into<String>, steps: Vec<InverseOp>) -> Self {
        Self {
            command: command.into(),
            steps,
        }
    }

    /// Apply the steps newest first, dropping each one once it has run.
    /// On failure the failing step and everything older stay in `steps`.
    pub async fn apply(&mut self, store: &dyn DataStore) -> Result<usize, StoreError> {
        let mut applied = 0;
        while let Some(step) = self.steps.last() {
            step.apply(store).await?;
            self.steps.pop();
            applied += 1;
        }
        Ok(applied)
    }
}
