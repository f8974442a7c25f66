//! The offline worker: routes lifecycle events to the cache, queue, sync and notification parts.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use url::Url;

use crate::cache::{self, CacheStorage, FetchOutcome, FetchPolicy, PrecacheReport};
use crate::config::Config;
use crate::host::ClientHost;
use crate::http::{Network, Request};
use crate::notify::{ClickOutcome, NotificationClick, NotificationDispatcher, NotificationPayload};
use crate::queue::{PendingOperation, PendingQueue};
use crate::sync::{SyncCoordinator, SyncOutcome};

/// Lifecycle state of the worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Created, nothing run yet
  Parsed,
  Installing,
  /// Installed and ready to activate (waiting is always skipped)
  Installed,
  Activating,
  /// Intercepting fetches
  Activated,
  /// Install failed; the worker will never activate
  Redundant,
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      WorkerState::Parsed => "parsed",
      WorkerState::Installing => "installing",
      WorkerState::Installed => "installed",
      WorkerState::Activating => "activating",
      WorkerState::Activated => "activated",
      WorkerState::Redundant => "redundant",
    };
    f.write_str(name)
  }
}

/// Result of the activate step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivateReport {
  /// Stale cache versions that were deleted
  pub deleted: Vec<String>,
  /// Number of windows taken under control
  pub claimed: usize,
}

/// Snapshot for the `status` command
#[derive(Debug, Clone)]
pub struct WorkerStatus {
  pub state: WorkerState,
  pub cache_version: String,
  pub caches: Vec<String>,
  pub cached_entries: usize,
  pub pending: usize,
}

/// Offline worker bound to one deployment's configuration.
pub struct Worker<S, Q, N, H> {
  config: Config,
  state: RwLock<WorkerState>,
  storage: Arc<S>,
  queue: Arc<Q>,
  network: Arc<N>,
  host: Arc<H>,
  precache: Vec<Url>,
  policy: FetchPolicy<S, N>,
  sync: SyncCoordinator<Q, N>,
  notifications: NotificationDispatcher<H>,
}

impl<S, Q, N, H> Worker<S, Q, N, H>
where
  S: CacheStorage + 'static,
  Q: PendingQueue,
  N: Network,
  H: ClientHost,
{
  pub fn new(
    config: Config,
    storage: Arc<S>,
    queue: Arc<Q>,
    network: Arc<N>,
    host: Arc<H>,
  ) -> Result<Self> {
    let origin = config.origin_url()?;
    let precache = config
      .cache
      .precache
      .iter()
      .map(|path| config.resolve(path))
      .collect::<Result<Vec<_>>>()?;

    let policy = FetchPolicy::new(
      Arc::clone(&storage),
      Arc::clone(&network),
      &origin,
      config.cache.version.clone(),
      config.resolve(&config.cache.offline_url)?,
    );
    let sync = SyncCoordinator::new(
      Arc::clone(&queue),
      Arc::clone(&network),
      config.sync.tag.clone(),
      config.resolve(&config.sync.endpoint)?,
    );
    let notifications =
      NotificationDispatcher::new(Arc::clone(&host), config.notifications.clone(), origin);

    Ok(Self {
      config,
      state: RwLock::new(WorkerState::Parsed),
      storage,
      queue,
      network,
      host,
      precache,
      policy,
      sync,
      notifications,
    })
  }

  pub fn state(&self) -> WorkerState {
    *self.state.read().unwrap_or_else(|e| e.into_inner())
  }

  fn set_state(&self, state: WorkerState) {
    let mut current = self.state.write().unwrap_or_else(|e| e.into_inner());
    let previous = *current;
    info!(from = %previous, to = %state, "worker state change");
    *current = state;
  }

  pub fn config(&self) -> &Config {
    &self.config
  }

  pub fn network(&self) -> &N {
    &self.network
  }

  /// Bring the worker to `Activated`.
  ///
  /// A version installed by an earlier run is not reseeded, but activation
  /// always runs so stale versions are evicted and clients claimed.
  pub async fn start(&self) -> Result<()> {
    if self.state() == WorkerState::Activated {
      return Ok(());
    }

    if self.storage.has(&self.config.cache.version)? {
      info!(version = %self.config.cache.version, "resuming installed worker");
      self.set_state(WorkerState::Installed);
    } else {
      self.install().await?;
    }

    self.activate().await?;
    Ok(())
  }

  /// Open the current cache version and seed the shell assets.
  ///
  /// Individual seed failures are reported, never fatal. Waiting is skipped:
  /// the worker is ready to activate as soon as seeding finishes.
  pub async fn install(&self) -> Result<PrecacheReport> {
    self.set_state(WorkerState::Installing);
    let version = &self.config.cache.version;

    if let Err(e) = self.storage.open(version) {
      self.set_state(WorkerState::Redundant);
      return Err(eyre!("Failed to open cache {}: {}", version, e));
    }

    let report =
      cache::precache(self.storage.as_ref(), self.network.as_ref(), version, &self.precache).await;
    info!(
      version = %version,
      cached = report.cached.len(),
      failed = report.failed.len(),
      "install complete, skipping wait"
    );

    self.set_state(WorkerState::Installed);
    Ok(report)
  }

  /// Delete every other cache version and take control of open windows.
  pub async fn activate(&self) -> Result<ActivateReport> {
    self.set_state(WorkerState::Activating);

    let deleted = cache::evict_stale(self.storage.as_ref(), &self.config.cache.version);

    let claimed = match self.host.claim().await {
      Ok(n) => n,
      Err(e) => {
        warn!(error = %e, "failed to claim clients");
        0
      }
    };

    self.set_state(WorkerState::Activated);
    Ok(ActivateReport { deleted, claimed })
  }

  /// Route a request through the interception policy.
  ///
  /// Until the worker is activated nothing is intercepted.
  pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome> {
    if self.state() != WorkerState::Activated {
      return Ok(FetchOutcome::Passthrough);
    }
    self.policy.handle(request).await
  }

  /// Record a write made while offline. Failures go back to the caller.
  pub fn enqueue(&self, payload: &Value) -> Result<PendingOperation> {
    let op = self.queue.enqueue(payload)?;
    info!(id = %op.id, "queued operation for sync");
    Ok(op)
  }

  pub fn pending(&self) -> Result<Vec<PendingOperation>> {
    self.queue.list_pending()
  }

  pub async fn handle_sync(&self, tag: &str) -> Result<SyncOutcome> {
    self.sync.handle_sync(tag).await
  }

  /// Tag handled by the sync coordinator
  pub fn sync_tag(&self) -> &str {
    self.sync.tag()
  }

  pub async fn handle_push(&self, raw: Option<&str>) -> Result<NotificationPayload> {
    self.notifications.on_push(raw).await
  }

  pub async fn handle_notification_click(&self, click: &NotificationClick) -> Result<ClickOutcome> {
    self.notifications.on_notification_click(click).await
  }

  pub fn status(&self) -> Result<WorkerStatus> {
    let version = self.config.cache.version.clone();
    Ok(WorkerStatus {
      state: self.state(),
      caches: self.storage.keys()?,
      cached_entries: self.storage.entry_count(&version)?,
      pending: self.queue.len()?,
      cache_version: version,
    })
  }
}
