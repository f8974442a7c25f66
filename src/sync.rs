//! Background sync: drains the pending queue against the transactions API.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;

use crate::http::{Network, Request};
use crate::queue::{OperationId, PendingOperation, PendingQueue};

/// Result of one sync trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
  /// The trigger carried a tag this coordinator does not handle
  Ignored,
  /// Another drain was already in progress
  AlreadyRunning,
  /// Every pending operation reached the server
  Completed { synced: usize },
  /// An operation failed; it and everything after it stay queued
  Halted {
    synced: usize,
    failed: OperationId,
    remaining: usize,
    reason: String,
  },
}

impl SyncOutcome {
  /// Whether the trigger should be scheduled again later.
  pub fn needs_retry(&self) -> bool {
    matches!(self, SyncOutcome::Halted { .. })
  }
}

/// Drains pending operations in order, stopping at the first failure.
pub struct SyncCoordinator<Q, N> {
  queue: Arc<Q>,
  network: Arc<N>,
  tag: String,
  endpoint: Url,
  draining: Mutex<()>,
}

impl<Q, N> SyncCoordinator<Q, N>
where
  Q: PendingQueue,
  N: Network,
{
  pub fn new(queue: Arc<Q>, network: Arc<N>, tag: impl Into<String>, endpoint: Url) -> Self {
    Self {
      queue,
      network,
      tag: tag.into(),
      endpoint,
      draining: Mutex::new(()),
    }
  }

  pub fn tag(&self) -> &str {
    &self.tag
  }

  /// Handle a sync trigger.
  ///
  /// Only the transaction-sync tag is handled. A trigger that arrives while a
  /// drain is running does not start a second one.
  pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome> {
    if tag != self.tag {
      debug!(tag, "ignoring sync tag");
      return Ok(SyncOutcome::Ignored);
    }

    let Ok(_guard) = self.draining.try_lock() else {
      info!("sync already in progress");
      return Ok(SyncOutcome::AlreadyRunning);
    };

    self.drain().await
  }

  async fn drain(&self) -> Result<SyncOutcome> {
    let pending = self.queue.list_pending()?;
    let total = pending.len();
    if total > 0 {
      info!(pending = total, "syncing pending operations");
    }

    for (synced, op) in pending.iter().enumerate() {
      if let Err(e) = self.send(op).await {
        warn!(id = %op.id, error = %e, "sync halted");
        return Ok(SyncOutcome::Halted {
          synced,
          failed: op.id,
          remaining: total - synced,
          reason: e.to_string(),
        });
      }

      // Acknowledged by the server; only now may it leave the queue
      self.queue.remove(op.id)?;
      debug!(id = %op.id, "operation synced");
    }

    if total > 0 {
      info!(synced = total, "sync complete");
    }
    Ok(SyncOutcome::Completed { synced: total })
  }

  async fn send(&self, op: &PendingOperation) -> Result<()> {
    let request = Request::post_json(self.endpoint.clone(), &op.payload)?;
    let response = self.network.fetch(&request).await?;

    if response.is_success() {
      Ok(())
    } else {
      Err(eyre!(
        "server rejected operation {} with status {} {}",
        op.id,
        response.status,
        response.status_text
      ))
    }
  }
}
