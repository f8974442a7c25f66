//! Command-line subcommands, one per worker lifecycle event.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::cache::{FetchOutcome, SqliteStorage};
use crate::config::Config;
use crate::db::Database;
use crate::host::ConsoleHost;
use crate::http::{Method, Network, ReqwestNetwork, Request, Response};
use crate::notify::NotificationClick;
use crate::queue::{PendingOperation, SqliteQueue};
use crate::sync::SyncOutcome;
use crate::worker::Worker;

type AppWorker = Worker<SqliteStorage, SqliteQueue, ReqwestNetwork, ConsoleHost>;

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Open the current cache version and seed the shell assets
  Install,
  /// Delete stale cache versions and claim open windows
  Activate,
  /// Route a request through the worker
  Fetch {
    /// Path or absolute URL
    url: String,
    /// Treat the request as a page navigation
    #[arg(long)]
    navigate: bool,
    /// HTTP method
    #[arg(short, long, default_value = "GET")]
    method: Method,
  },
  /// Queue a write for the next sync
  Enqueue {
    /// JSON payload, e.g. '{"transaction_type": "DEPOSIT", "amount": "5000"}'
    payload: String,
  },
  /// List writes waiting to sync
  Pending,
  /// Drain the pending queue now
  Sync {
    /// Sync tag (defaults to the configured transaction tag)
    #[arg(long)]
    tag: Option<String>,
  },
  /// Probe connectivity and sync whenever the server is reachable
  Watch,
  /// Show a push notification
  Push {
    /// Raw push payload, JSON or plain text
    payload: Option<String>,
  },
  /// Simulate a click on a notification
  Click {
    /// Notification data, e.g. '{"url": "/dashboard/"}'
    #[arg(long)]
    data: Option<String>,
    /// Notification tag
    #[arg(long)]
    tag: Option<String>,
  },
  /// Show worker, cache and queue state
  Status,
}

/// Build the worker from the configuration and run one command.
pub async fn run(config: Config, command: Command) -> Result<()> {
  let worker = build_worker(config)?;

  match command {
    Command::Install => {
      let report = worker.install().await?;
      println!("Cached {} shell assets", report.cached.len());
      for (url, reason) in &report.failed {
        println!("  skipped {}: {}", url, reason);
      }
    }
    Command::Activate => {
      let report = worker.activate().await?;
      for name in &report.deleted {
        println!("Deleted stale cache {}", name);
      }
      println!(
        "Active cache: {} ({} windows claimed)",
        worker.config().cache.version,
        report.claimed
      );
    }
    Command::Fetch {
      url,
      navigate,
      method,
    } => fetch(&worker, &url, navigate, method).await?,
    Command::Enqueue { payload } => {
      let payload = parse_json(&payload)?;
      let op = worker.enqueue(&payload)?;
      println!("Queued operation {}", op.id);
    }
    Command::Pending => {
      let pending = worker.pending()?;
      if pending.is_empty() {
        println!("Nothing waiting to sync");
      }
      for op in pending {
        println!("{}  {}  {}", op.id, op.created_at.format("%Y-%m-%d %H:%M:%S"), op.payload);
      }
    }
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| worker.sync_tag().to_string());
      let outcome = worker.handle_sync(&tag).await?;
      println!("{}", describe_sync(&outcome));
      if outcome.needs_retry() {
        return Err(eyre!("Sync incomplete; pending operations will be retried"));
      }
    }
    Command::Watch => watch(&worker).await?,
    Command::Push { payload } => {
      worker.handle_push(payload.as_deref()).await?;
    }
    Command::Click { data, tag } => {
      let click = NotificationClick {
        tag: tag.unwrap_or_else(|| worker.config().notifications.tag.clone()),
        data: match data {
          Some(raw) => parse_json(&raw)?,
          None => Value::Object(Default::default()),
        },
      };
      let outcome = worker.handle_notification_click(&click).await?;
      info!(?outcome, "notification click handled");
    }
    Command::Status => {
      let status = worker.status()?;
      println!("State:          {}", status.state);
      println!("Active cache:   {}", status.cache_version);
      println!("Cached entries: {}", status.cached_entries);
      println!("All caches:     {}", status.caches.join(", "));
      println!("Pending writes: {}", status.pending);
    }
  }

  Ok(())
}

fn build_worker(config: Config) -> Result<AppWorker> {
  let db = Arc::new(Database::open(&config.database_path()?)?);
  let storage = Arc::new(SqliteStorage::new(Arc::clone(&db)));
  let queue = Arc::new(SqliteQueue::new(db, config.sync.max_pending));
  let network = Arc::new(ReqwestNetwork::new(&config.origin_url()?)?);
  let host = Arc::new(ConsoleHost);

  Worker::new(config, storage, queue, network, host)
}

async fn fetch(worker: &AppWorker, url: &str, navigate: bool, method: Method) -> Result<()> {
  worker.start().await?;

  let url = worker.config().resolve(url)?;
  let request = if navigate {
    Request::navigate(url)
  } else {
    Request::new(method, url)
  };

  let outcome = worker.handle_fetch(&request).await?;
  let source = outcome.source();

  match outcome {
    FetchOutcome::Passthrough => {
      let response = worker.network().fetch(&request).await?;
      print_response(source, &response);
    }
    FetchOutcome::Cached(response) | FetchOutcome::Offline(response) => {
      print_response(source, &response)
    }
    FetchOutcome::Network {
      response,
      cache_write,
    } => {
      print_response(source, &response);
      // The process is about to exit; let the background write land first
      if let Some(handle) = cache_write {
        if let Err(e) = handle.await {
          warn!(error = %e, "cache write task failed");
        }
      }
    }
  }

  Ok(())
}

fn print_response(source: &str, response: &Response) {
  eprintln!(
    "{} {} (from {})",
    response.status, response.status_text, source
  );
  println!("{}", response.text());
}

/// Poll the health endpoint and trigger a sync while the server is reachable
/// and writes are waiting.
async fn watch(worker: &AppWorker) -> Result<()> {
  let config = worker.config();
  let health = Request::get(config.resolve(&config.sync.health_path)?);
  let mut interval = tokio::time::interval(Duration::from_secs(config.sync.retry_interval_secs.max(1)));
  let mut online = false;

  info!(
    every = config.sync.retry_interval_secs,
    "watching connectivity"
  );

  loop {
    tokio::select! {
      _ = tokio::signal::ctrl_c() => {
        info!("stopping watch");
        return Ok(());
      }
      _ = interval.tick() => {}
    }

    let reachable = matches!(worker.network().fetch(&health).await, Ok(r) if r.is_success());
    if reachable != online {
      info!(online = reachable, "connectivity changed");
      online = reachable;
    }

    if !online || !has_pending(worker.pending()) {
      continue;
    }

    match worker.handle_sync(worker.sync_tag()).await {
      Ok(outcome) => println!("{}", describe_sync(&outcome)),
      Err(e) => warn!(error = %e, "sync failed, will retry"),
    }
  }
}

/// A queue read error counts as nothing pending; the next tick retries.
fn has_pending(pending: Result<Vec<PendingOperation>>) -> bool {
  match pending {
    Ok(pending) => !pending.is_empty(),
    Err(e) => {
      warn!(error = %e, "failed to read pending queue, will retry");
      false
    }
  }
}

fn parse_json(raw: &str) -> Result<Value> {
  serde_json::from_str(raw).map_err(|e| eyre!("Invalid JSON payload: {}", e))
}

fn describe_sync(outcome: &SyncOutcome) -> String {
  match outcome {
    SyncOutcome::Ignored => "Sync tag not handled".to_string(),
    SyncOutcome::AlreadyRunning => "Sync already in progress".to_string(),
    SyncOutcome::Completed { synced: 0 } => "Nothing to sync".to_string(),
    SyncOutcome::Completed { synced } => format!("Synced {} operations", synced),
    SyncOutcome::Halted {
      synced,
      failed,
      remaining,
      reason,
    } => format!(
      "Synced {} operations; stopped at {} ({} still pending): {}",
      synced, failed, remaining, reason
    ),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::queue::OperationId;
  use clap::Parser;

  #[derive(Parser, Debug)]
  struct Cli {
    #[command(subcommand)]
    command: Command,
  }

  #[test]
  fn test_parse_fetch_flags() {
    let cli = Cli::try_parse_from(["floatly-sw", "fetch", "/dashboard/", "--navigate"]).unwrap();
    assert!(matches!(
      cli.command,
      Command::Fetch { ref url, navigate: true, method: Method::Get } if url == "/dashboard/"
    ));

    let cli = Cli::try_parse_from(["floatly-sw", "fetch", "/api/x/", "-m", "post"]).unwrap();
    assert!(matches!(cli.command, Command::Fetch { method: Method::Post, .. }));
  }

  #[test]
  fn test_parse_sync_tag() {
    let cli = Cli::try_parse_from(["floatly-sw", "sync", "--tag", "sync-reports"]).unwrap();
    assert!(matches!(cli.command, Command::Sync { tag: Some(ref t) } if t == "sync-reports"));
  }

  #[test]
  fn test_parse_json_rejects_garbage() {
    assert!(parse_json(r#"{"amount": "5000"}"#).is_ok());
    assert!(parse_json("amount=5000").is_err());
  }

  #[test]
  fn test_has_pending_survives_queue_errors() {
    assert!(!has_pending(Err(eyre!("database is locked"))));
    assert!(!has_pending(Ok(Vec::new())));

    let op = PendingOperation {
      id: OperationId(1),
      payload: serde_json::json!({"amount": "5000"}),
      created_at: chrono::Utc::now(),
    };
    assert!(has_pending(Ok(vec![op])));
  }

  #[test]
  fn test_describe_sync() {
    assert_eq!(
      describe_sync(&SyncOutcome::Completed { synced: 0 }),
      "Nothing to sync"
    );
    assert_eq!(
      describe_sync(&SyncOutcome::Halted {
        synced: 2,
        failed: OperationId(7),
        remaining: 3,
        reason: "status 500".to_string(),
      }),
      "Synced 2 operations; stopped at #7 (3 still pending): status 500"
    );
  }
}
