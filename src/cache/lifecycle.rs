//! Install-time seeding and activation-time eviction of cache versions.

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use tracing::{info, warn};
use url::Url;

use super::traits::{CacheStorage, RequestKey};
use crate::http::{Method, Network, Request};

/// Outcome of seeding the shell assets.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PrecacheReport {
  pub cached: Vec<String>,
  /// URL and reason for every seed that could not be stored
  pub failed: Vec<(String, String)>,
}

/// Fetch and store every seed URL independently.
///
/// A failure on one URL never affects the others.
pub async fn precache<S, N>(storage: &S, network: &N, cache_name: &str, urls: &[Url]) -> PrecacheReport
where
  S: CacheStorage,
  N: Network,
{
  let results = join_all(urls.iter().map(|url| async move {
    let outcome = seed_one(storage, network, cache_name, url).await;
    (url, outcome)
  }))
  .await;

  let mut report = PrecacheReport::default();
  for (url, outcome) in results {
    match outcome {
      Ok(()) => report.cached.push(url.to_string()),
      Err(e) => {
        warn!(url = %url, error = %e, "failed to precache");
        report.failed.push((url.to_string(), e.to_string()));
      }
    }
  }
  report
}

async fn seed_one<S, N>(storage: &S, network: &N, cache_name: &str, url: &Url) -> Result<()>
where
  S: CacheStorage,
  N: Network,
{
  let request = Request::get(url.clone());
  let response = network.fetch(&request).await?;
  if !response.is_cacheable() {
    return Err(eyre!(
      "response is not cacheable (status {}, {:?})",
      response.status,
      response.response_type
    ));
  }
  storage.put(cache_name, &RequestKey::new(Method::Get, url), &response)
}

/// Delete every store except `current`. Returns the names that were deleted.
///
/// Failures are logged and skipped; stale stores left behind are retried on
/// the next activation.
pub fn evict_stale<S: CacheStorage>(storage: &S, current: &str) -> Vec<String> {
  let names = match storage.keys() {
    Ok(names) => names,
    Err(e) => {
      warn!(error = %e, "failed to enumerate caches");
      return Vec::new();
    }
  };

  let mut deleted = Vec::new();
  for name in names.into_iter().filter(|name| name != current) {
    match storage.delete(&name) {
      Ok(_) => {
        info!(cache = %name, "deleted stale cache");
        deleted.push(name);
      }
      Err(e) => warn!(cache = %name, error = %e, "failed to delete stale cache"),
    }
  }
  deleted
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::db::Database;
  use crate::http::Response;
  use crate::testing::{url, FakeNetwork, CACHE_NAME};
  use std::sync::Arc;

  fn storage() -> SqliteStorage {
    SqliteStorage::new(Arc::new(Database::open_in_memory().unwrap()))
  }

  #[tokio::test]
  async fn test_precache_skips_failures() {
    let storage = storage();
    let network = FakeNetwork::new();
    network.route("/", Response::new(200, "home"));
    network.route("/offline/", Response::new(200, "offline"));
    network.route("/static/css/main.css", Response::new(500, "boom"));

    let urls = vec![
      url("/"),
      url("/static/css/main.css"),
      url("/static/js/missing.js"),
      url("/offline/"),
    ];
    let report = precache(&storage, &network, CACHE_NAME, &urls).await;

    assert_eq!(report.cached, vec![url("/").to_string(), url("/offline/").to_string()]);
    assert_eq!(report.failed.len(), 2);
    assert_eq!(storage.entry_count(CACHE_NAME).unwrap(), 2);
  }

  #[tokio::test]
  async fn test_precache_offline_network() {
    let storage = storage();
    let network = FakeNetwork::new();
    network.set_offline(true);

    let report = precache(&storage, &network, CACHE_NAME, &[url("/")]).await;

    assert!(report.cached.is_empty());
    assert_eq!(report.failed.len(), 1);
  }

  #[test]
  fn test_evict_keeps_only_current() {
    let storage = storage();
    for name in ["floatly-v1.0.0", CACHE_NAME, "other-app"] {
      storage.open(name).unwrap();
    }

    let mut deleted = evict_stale(&storage, CACHE_NAME);
    deleted.sort();

    assert_eq!(deleted, vec!["floatly-v1.0.0".to_string(), "other-app".to_string()]);
    assert_eq!(storage.keys().unwrap(), vec![CACHE_NAME.to_string()]);
  }

  #[test]
  fn test_evict_with_nothing_stale() {
    let storage = storage();
    storage.open(CACHE_NAME).unwrap();
    assert!(evict_stale(&storage, CACHE_NAME).is_empty());
  }
}
