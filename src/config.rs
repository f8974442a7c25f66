use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;
use url::Url;

use crate::db;
use crate::notify::NotificationDefaults;

/// Deployment configuration. Loaded once at startup, read-only afterwards.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Origin the worker serves, e.g. https://floatly.cm
  #[serde(default = "default_origin")]
  pub origin: String,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  #[serde(default)]
  pub notifications: NotificationDefaults,
  /// Database file (defaults to $XDG_DATA_HOME/floatly-sw/worker.db)
  pub database: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Name of the active cache generation
  #[serde(default = "default_cache_version")]
  pub version: String,
  /// Document served to navigations when the network is unavailable
  #[serde(default = "default_offline_url")]
  pub offline_url: String,
  /// Shell paths seeded at install time
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: default_cache_version(),
      offline_url: default_offline_url(),
      precache: default_precache(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// Sync tag identifying transaction sync triggers
  #[serde(default = "default_sync_tag")]
  pub tag: String,
  /// Endpoint receiving queued transactions
  #[serde(default = "default_sync_endpoint")]
  pub endpoint: String,
  /// Writes beyond this many pending operations are rejected
  #[serde(default = "default_max_pending")]
  pub max_pending: usize,
  /// Seconds between connectivity probes in watch mode
  #[serde(default = "default_retry_interval")]
  pub retry_interval_secs: u64,
  /// Path probed to decide whether the server is reachable
  #[serde(default = "default_health_path")]
  pub health_path: String,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      tag: default_sync_tag(),
      endpoint: default_sync_endpoint(),
      max_pending: default_max_pending(),
      retry_interval_secs: default_retry_interval(),
      health_path: default_health_path(),
    }
  }
}

fn default_origin() -> String {
  "http://localhost:8000".to_string()
}

fn default_cache_version() -> String {
  "floatly-v1.0.1".to_string()
}

fn default_offline_url() -> String {
  "/offline/".to_string()
}

fn default_precache() -> Vec<String> {
  ["/", "/offline/", "/static/css/output.css", "/static/js/app.js", "/manifest.json"]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_sync_tag() -> String {
  "sync-transactions".to_string()
}

fn default_sync_endpoint() -> String {
  "/api/transactions/".to_string()
}

fn default_max_pending() -> usize {
  1000
}

fn default_retry_interval() -> u64 {
  30
}

fn default_health_path() -> String {
  "/health/".to_string()
}

impl Default for Config {
  fn default() -> Self {
    Self {
      origin: default_origin(),
      cache: CacheConfig::default(),
      sync: SyncConfig::default(),
      notifications: NotificationDefaults::default(),
      database: None,
    }
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./floatly-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/floatly-sw/config.yaml
  ///
  /// Built-in defaults are used when no file is found.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!(
          "Config file not found: {}\n\
                 See config.example.yaml for the format.",
          p.display()
        ));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        debug!("no config file found, using defaults");
        Self::default()
      }
    };

    if let Ok(origin) = std::env::var("FLOATLY_SW_ORIGIN") {
      config.origin = origin;
    }

    config.validate()
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("floatly-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("floatly-sw").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents).map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))
  }

  /// Check the origin and make sure the offline document is always seeded.
  fn validate(mut self) -> Result<Self> {
    let origin = self.origin_url()?;
    if !matches!(origin.scheme(), "http" | "https") {
      return Err(eyre!("Origin must be an http(s) URL: {}", self.origin));
    }

    if self.cache.version.trim().is_empty() {
      return Err(eyre!("Cache version must not be empty"));
    }

    let offline = self.resolve(&self.cache.offline_url)?;
    let seeded = self
      .cache
      .precache
      .iter()
      .filter_map(|p| self.resolve(p).ok())
      .any(|u| u == offline);
    if !seeded {
      self.cache.precache.push(self.cache.offline_url.clone());
    }

    for path in &self.cache.precache {
      let url = self.resolve(path)?;
      if url.origin() != origin.origin() {
        return Err(eyre!("Precache URL must be same-origin: {}", url));
      }
    }

    Ok(self)
  }

  pub fn origin_url(&self) -> Result<Url> {
    Url::parse(&self.origin).map_err(|e| eyre!("Invalid origin '{}': {}", self.origin, e))
  }

  /// Resolve a path (or absolute URL) against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin_url()?
      .join(path)
      .map_err(|e| eyre!("Invalid URL '{}': {}", path, e))
  }

  pub fn database_path(&self) -> Result<PathBuf> {
    match &self.database {
      Some(path) => Ok(path.clone()),
      None => db::Database::default_path(),
    }
  }
}
