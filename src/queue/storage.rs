use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use serde_json::Value;
use std::sync::Arc;

use super::{OperationId, PendingOperation, PendingQueue};
use crate::db::{parse_datetime, Database};

/// SQLite-backed pending queue with a fixed capacity.
pub struct SqliteQueue {
  db: Arc<Database>,
  max_pending: usize,
}

impl SqliteQueue {
  pub fn new(db: Arc<Database>, max_pending: usize) -> Self {
    Self { db, max_pending }
  }
}

impl PendingQueue for SqliteQueue {
  fn enqueue(&self, payload: &Value) -> Result<PendingOperation> {
    let data =
      serde_json::to_string(payload).map_err(|e| eyre!("Failed to serialize payload: {}", e))?;

    self.db.with_conn(|conn| {
      let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM pending_operations", [], |row| {
          row.get(0)
        })
        .map_err(|e| eyre!("Failed to count pending operations: {}", e))?;

      if count as usize >= self.max_pending {
        return Err(eyre!(
          "Pending queue is full ({} operations waiting to sync)",
          count
        ));
      }

      conn
        .execute(
          "INSERT INTO pending_operations (payload, created_at) VALUES (?, datetime('now'))",
          params![data],
        )
        .map_err(|e| eyre!("Failed to store pending operation: {}", e))?;

      let id = conn.last_insert_rowid();
      let created_at: String = conn
        .query_row(
          "SELECT created_at FROM pending_operations WHERE id = ?",
          params![id],
          |row| row.get(0),
        )
        .map_err(|e| eyre!("Failed to read back pending operation: {}", e))?;

      Ok(PendingOperation {
        id: OperationId(id),
        payload: payload.clone(),
        created_at: parse_datetime(&created_at)?,
      })
    })
  }

  fn list_pending(&self) -> Result<Vec<PendingOperation>> {
    self.db.with_conn(|conn| {
      let mut stmt = conn
        .prepare("SELECT id, payload, created_at FROM pending_operations ORDER BY id")
        .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

      let rows = stmt
        .query_map([], |row| {
          Ok((
            row.get::<_, i64>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
          ))
        })
        .map_err(|e| eyre!("Failed to query pending operations: {}", e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| eyre!("Failed to read pending operation: {}", e))?;

      rows
        .into_iter()
        .map(|(id, payload, created_at)| {
          Ok(PendingOperation {
            id: OperationId(id),
            payload: serde_json::from_str(&payload)
              .map_err(|e| eyre!("Corrupt payload for operation {}: {}", id, e))?,
            created_at: parse_datetime(&created_at)?,
          })
        })
        .collect()
    })
  }

  fn remove(&self, id: OperationId) -> Result<()> {
    self.db.with_conn(|conn| {
      conn
        .execute("DELETE FROM pending_operations WHERE id = ?", params![id.0])
        .map_err(|e| eyre!("Failed to remove operation {}: {}", id, e))?;
      Ok(())
    })
  }

  fn len(&self) -> Result<usize> {
    self.db.with_conn(|conn| {
      let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM pending_operations", [], |row| {
          row.get(0)
        })
        .map_err(|e| eyre!("Failed to count pending operations: {}", e))?;
      Ok(count as usize)
    })
  }
}
