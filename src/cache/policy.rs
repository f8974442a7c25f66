//! Fetch interception: cache-first for same-origin GETs, offline page for navigations.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::{Origin, Url};

use super::traits::{CacheStorage, RequestKey};
use crate::http::{Method, Network, Request, Response};

/// What the interception policy did with a request.
#[derive(Debug)]
pub enum FetchOutcome {
  /// Not intercepted; the request goes straight to the network, uncached
  Passthrough,
  /// Served from the active cache without a network round-trip
  Cached(Response),
  /// Fetched from the network. `cache_write` is set when a copy is being
  /// stored in the background; nothing on the response path waits for it.
  Network {
    response: Response,
    cache_write: Option<JoinHandle<()>>,
  },
  /// Network unavailable for a navigation; serving the offline document
  Offline(Response),
}

impl FetchOutcome {
  pub fn response(&self) -> Option<&Response> {
    match self {
      FetchOutcome::Passthrough => None,
      FetchOutcome::Cached(response) | FetchOutcome::Offline(response) => Some(response),
      FetchOutcome::Network { response, .. } => Some(response),
    }
  }

  pub fn source(&self) -> &'static str {
    match self {
      FetchOutcome::Passthrough => "passthrough",
      FetchOutcome::Cached(_) => "cache",
      FetchOutcome::Network { .. } => "network",
      FetchOutcome::Offline(_) => "offline",
    }
  }
}

/// Cache-first interception policy bound to one cache version.
pub struct FetchPolicy<S, N> {
  storage: Arc<S>,
  network: Arc<N>,
  origin: Origin,
  cache_name: String,
  offline_url: Url,
}

impl<S, N> FetchPolicy<S, N>
where
  S: CacheStorage + 'static,
  N: Network,
{
  pub fn new(
    storage: Arc<S>,
    network: Arc<N>,
    origin: &Url,
    cache_name: impl Into<String>,
    offline_url: Url,
  ) -> Self {
    Self {
      storage,
      network,
      origin: origin.origin(),
      cache_name: cache_name.into(),
      offline_url,
    }
  }

  /// Whether the policy takes over this request at all.
  pub fn intercepts(&self, request: &Request) -> bool {
    request.method == Method::Get && request.url.origin() == self.origin
  }

  /// Handle one intercepted request.
  ///
  /// 1. Non-GET or cross-origin - passthrough
  /// 2. Cache hit - return the snapshot
  /// 3. Cache miss - fetch; store a copy of 200 basic responses in the background
  /// 4. Network failure - offline document for navigations, error otherwise
  pub async fn handle(&self, request: &Request) -> Result<FetchOutcome> {
    if !self.intercepts(request) {
      debug!(method = %request.method, url = %request.url, "not intercepted");
      return Ok(FetchOutcome::Passthrough);
    }

    let key = RequestKey::from_request(request);

    match self.storage.get(&self.cache_name, &key) {
      Ok(Some(cached)) => {
        debug!(url = key.url(), "cache hit");
        return Ok(FetchOutcome::Cached(cached.response));
      }
      Ok(None) => debug!(url = key.url(), "cache miss"),
      Err(e) => warn!(url = key.url(), error = %e, "cache lookup failed, treating as miss"),
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        let cache_write = if response.is_cacheable() {
          Some(self.spawn_cache_write(key, response.clone()))
        } else {
          debug!(
            url = key.url(),
            status = response.status,
            "response not cacheable"
          );
          None
        };
        Ok(FetchOutcome::Network {
          response,
          cache_write,
        })
      }
      Err(err) if request.is_navigation() => {
        warn!(url = %request.url, error = %err, "navigation failed, serving offline document");
        self
          .offline_document()
          .map(FetchOutcome::Offline)
          .map_err(|fallback| eyre!("{}; {}", err, fallback))
      }
      Err(err) => Err(err),
    }
  }

  /// Write a snapshot without making the caller wait for it.
  fn spawn_cache_write(&self, key: RequestKey, response: Response) -> JoinHandle<()> {
    let storage = Arc::clone(&self.storage);
    let cache_name = self.cache_name.clone();

    tokio::spawn(async move {
      if let Err(e) = storage.put(&cache_name, &key, &response) {
        warn!(url = key.url(), error = %e, "failed to cache response");
      }
    })
  }

  fn offline_document(&self) -> Result<Response> {
    let key = RequestKey::new(Method::Get, &self.offline_url);
    self
      .storage
      .get(&self.cache_name, &key)?
      .map(|cached| cached.response)
      .ok_or_else(|| eyre!("offline document {} is not cached", self.offline_url))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::SqliteStorage;
  use crate::db::Database;
  use crate::http::ResponseType;
  use crate::cache::traits::CachedResponse;
  use crate::testing::{url, FakeNetwork, CACHE_NAME};
  use std::sync::{mpsc, Mutex};

  struct Fixture {
    storage: Arc<SqliteStorage>,
    network: Arc<FakeNetwork>,
    policy: FetchPolicy<SqliteStorage, FakeNetwork>,
  }

  fn fixture() -> Fixture {
    let storage = Arc::new(SqliteStorage::new(Arc::new(
      Database::open_in_memory().unwrap(),
    )));
    let network = Arc::new(FakeNetwork::new());
    let policy = FetchPolicy::new(
      Arc::clone(&storage),
      Arc::clone(&network),
      &url("/"),
      CACHE_NAME,
      url("/offline/"),
    );
    Fixture {
      storage,
      network,
      policy,
    }
  }

  fn cached_body(storage: &SqliteStorage, path: &str) -> Option<String> {
    storage
      .get(CACHE_NAME, &RequestKey::new(Method::Get, &url(path)))
      .unwrap()
      .map(|c| c.response.text())
  }

  #[tokio::test]
  async fn test_hit_skips_network() {
    let f = fixture();
    f.storage
      .put(
        CACHE_NAME,
        &RequestKey::new(Method::Get, &url("/static/css/main.css")),
        &Response::new(200, "body{}"),
      )
      .unwrap();
    f.network.set_offline(true);

    let outcome = f
      .policy
      .handle(&Request::get(url("/static/css/main.css")))
      .await
      .unwrap();

    assert!(matches!(outcome, FetchOutcome::Cached(_)));
    assert_eq!(outcome.response().unwrap().text(), "body{}");
    assert!(f.network.requests().is_empty());
  }

  #[tokio::test]
  async fn test_miss_fetches_and_stores_copy() {
    let f = fixture();
    f.network.route("/dashboard/", Response::new(200, "dashboard"));

    let outcome = f
      .policy
      .handle(&Request::get(url("/dashboard/")))
      .await
      .unwrap();

    let FetchOutcome::Network {
      response,
      cache_write,
    } = outcome
    else {
      panic!("expected network outcome");
    };
    assert_eq!(response.text(), "dashboard");
    cache_write.expect("200 basic response is cached").await.unwrap();
    assert_eq!(cached_body(&f.storage, "/dashboard/").as_deref(), Some("dashboard"));

    // Second request is served from cache
    let again = f
      .policy
      .handle(&Request::get(url("/dashboard/")))
      .await
      .unwrap();
    assert!(matches!(again, FetchOutcome::Cached(_)));
    assert_eq!(f.network.requests().len(), 1);
  }

  /// Storage whose writes block until the test releases them
  struct GatedStorage {
    inner: SqliteStorage,
    gate: Mutex<mpsc::Receiver<()>>,
  }

  impl CacheStorage for GatedStorage {
    fn open(&self, name: &str) -> Result<()> {
      self.inner.open(name)
    }

    fn has(&self, name: &str) -> Result<bool> {
      self.inner.has(name)
    }

    fn keys(&self) -> Result<Vec<String>> {
      self.inner.keys()
    }

    fn delete(&self, name: &str) -> Result<bool> {
      self.inner.delete(name)
    }

    fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
      let _ = self.gate.lock().unwrap().recv();
      self.inner.put(name, key, response)
    }

    fn get(&self, name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
      self.inner.get(name, key)
    }

    fn entry_count(&self, name: &str) -> Result<usize> {
      self.inner.entry_count(name)
    }
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_response_returned_while_cache_write_pending() {
    let (release, gate) = mpsc::channel();
    let storage = Arc::new(GatedStorage {
      inner: SqliteStorage::new(Arc::new(Database::open_in_memory().unwrap())),
      gate: Mutex::new(gate),
    });
    let network = Arc::new(FakeNetwork::new());
    network.route("/reports/", Response::new(200, "reports"));
    let policy = FetchPolicy::new(
      Arc::clone(&storage),
      network,
      &url("/"),
      CACHE_NAME,
      url("/offline/"),
    );

    let outcome = policy.handle(&Request::get(url("/reports/"))).await.unwrap();

    let FetchOutcome::Network {
      response,
      cache_write: Some(cache_write),
    } = outcome
    else {
      panic!("expected network outcome with a pending cache write");
    };
    assert_eq!(response.text(), "reports");
    assert!(!cache_write.is_finished());
    assert_eq!(storage.inner.entry_count(CACHE_NAME).unwrap(), 0);

    release.send(()).unwrap();
    cache_write.await.unwrap();
    assert_eq!(
      cached_body(&storage.inner, "/reports/").as_deref(),
      Some("reports")
    );
  }

  #[tokio::test]
  async fn test_non_get_is_not_intercepted() {
    let f = fixture();
    let request =
      Request::post_json(url("/api/transactions/"), &serde_json::json!({"amount": 1})).unwrap();

    let outcome = f.policy.handle(&request).await.unwrap();

    assert!(matches!(outcome, FetchOutcome::Passthrough));
    assert!(f.network.requests().is_empty());
    assert_eq!(f.storage.entry_count(CACHE_NAME).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_cross_origin_is_not_intercepted() {
    let f = fixture();
    let request = Request::get(Url::parse("https://cdn.jsdelivr.net/npm/chart.js").unwrap());

    let outcome = f.policy.handle(&request).await.unwrap();

    assert!(matches!(outcome, FetchOutcome::Passthrough));
    assert_eq!(f.storage.entry_count(CACHE_NAME).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_uncacheable_responses_pass_through() {
    let f = fixture();
    f.network.route("/missing/", Response::new(404, "nope"));
    f.network.route(
      "/redirected/",
      Response::new(200, "elsewhere").with_type(ResponseType::Opaque),
    );

    for path in ["/missing/", "/redirected/"] {
      let outcome = f.policy.handle(&Request::get(url(path))).await.unwrap();
      let FetchOutcome::Network { cache_write, .. } = outcome else {
        panic!("expected network outcome for {}", path);
      };
      assert!(cache_write.is_none());
    }
    assert_eq!(f.storage.entry_count(CACHE_NAME).unwrap(), 0);
  }

  #[tokio::test]
  async fn test_offline_navigation_serves_offline_document() {
    let f = fixture();
    f.storage
      .put(
        CACHE_NAME,
        &RequestKey::new(Method::Get, &url("/offline/")),
        &Response::new(200, "You are offline"),
      )
      .unwrap();
    f.network.set_offline(true);

    let outcome = f
      .policy
      .handle(&Request::navigate(url("/transactions/add/")))
      .await
      .unwrap();

    assert!(matches!(outcome, FetchOutcome::Offline(_)));
    assert_eq!(outcome.response().unwrap().text(), "You are offline");
  }

  #[tokio::test]
  async fn test_offline_subresource_fails() {
    let f = fixture();
    f.network.set_offline(true);

    let result = f.policy.handle(&Request::get(url("/static/js/app.js"))).await;

    assert!(result.is_err());
  }

  #[tokio::test]
  async fn test_offline_navigation_without_document_fails() {
    let f = fixture();
    f.network.set_offline(true);

    let err = f
      .policy
      .handle(&Request::navigate(url("/dashboard/")))
      .await
      .unwrap_err();

    assert!(err.to_string().contains("offline document"));
  }
}
