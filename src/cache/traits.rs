//! Core traits and types for the versioned response cache.

use chrono::{DateTime, Utc};
use color_eyre::Result;
use sha2::{Digest, Sha256};
use url::Url;

use crate::http::{Method, Request, Response};

/// Identifies a cached response: method plus normalized absolute URL.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: Method,
  url: String,
}

impl RequestKey {
  pub fn new(method: Method, url: &Url) -> Self {
    let mut url = url.clone();
    // Fragments never reach the server
    url.set_fragment(None);
    Self {
      method,
      url: url.to_string(),
    }
  }

  pub fn from_request(request: &Request) -> Self {
    Self::new(request.method, &request.url)
  }

  pub fn method(&self) -> Method {
    self.method
  }

  pub fn url(&self) -> &str {
    &self.url
  }

  /// SHA256 hash for stable, fixed-length storage keys
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_str().as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// A response snapshot read back from a store.
#[derive(Debug, Clone)]
pub struct CachedResponse {
  pub response: Response,
  /// When the snapshot was written
  pub cached_at: DateTime<Utc>,
}

/// Named stores of request/response snapshots, one per cache version.
///
/// Writing to a store that does not exist yet creates it.
pub trait CacheStorage: Send + Sync {
  /// Create the named store if it is absent.
  fn open(&self, name: &str) -> Result<()>;

  /// Whether the named store exists.
  fn has(&self, name: &str) -> Result<bool>;

  /// Names of every existing store.
  fn keys(&self) -> Result<Vec<String>>;

  /// Delete a store and all of its entries. Returns false if it did not exist.
  fn delete(&self, name: &str) -> Result<bool>;

  /// Store a snapshot, replacing any previous entry for the same key.
  fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Look up a snapshot.
  fn get(&self, name: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Number of entries in the named store.
  fn entry_count(&self, name: &str) -> Result<usize>;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_key_strips_fragment() {
    let a = Url::parse("https://floatly.test/dashboard/#charts").unwrap();
    let b = Url::parse("https://floatly.test/dashboard/").unwrap();
    assert_eq!(RequestKey::new(Method::Get, &a), RequestKey::new(Method::Get, &b));
    assert_eq!(
      RequestKey::new(Method::Get, &a).url(),
      "https://floatly.test/dashboard/"
    );
  }

  #[test]
  fn test_key_normalizes_host_and_port() {
    let a = Url::parse("HTTPS://Floatly.Test:443/").unwrap();
    let b = Url::parse("https://floatly.test").unwrap();
    assert_eq!(
      RequestKey::new(Method::Get, &a).cache_hash(),
      RequestKey::new(Method::Get, &b).cache_hash()
    );
  }

  #[test]
  fn test_hash_depends_on_method() {
    let url = Url::parse("https://floatly.test/api/transactions/").unwrap();
    let get = RequestKey::new(Method::Get, &url).cache_hash();
    let head = RequestKey::new(Method::Head, &url).cache_hash();
    assert_ne!(get, head);
    assert_eq!(get.len(), 64);
  }
}
