//! Durable FIFO of writes recorded while offline.

mod storage;

pub use storage::SqliteQueue;

use chrono::{DateTime, Utc};
use color_eyre::Result;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Identifier of a pending operation. Assigned in creation order, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct OperationId(pub i64);

impl fmt::Display for OperationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "#{}", self.0)
  }
}

/// A write (e.g. a recorded transaction) that has not reached the server yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingOperation {
  pub id: OperationId,
  /// Opaque JSON document posted as-is during sync
  pub payload: Value,
  pub created_at: DateTime<Utc>,
}

/// Storage for pending operations.
///
/// The queue is the single source of truth for what must still reach the
/// server; it must survive restarts.
pub trait PendingQueue: Send + Sync {
  /// Persist a new operation at the back of the queue.
  fn enqueue(&self, payload: &Value) -> Result<PendingOperation>;

  /// Every pending operation in creation order.
  fn list_pending(&self) -> Result<Vec<PendingOperation>>;

  /// Delete by id. Removing an absent id is a no-op.
  fn remove(&self, id: OperationId) -> Result<()>;

  /// Number of pending operations.
  fn len(&self) -> Result<usize>;

  fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }
}
