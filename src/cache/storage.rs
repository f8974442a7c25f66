//! SQLite implementation of the versioned cache storage.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::traits::{CacheStorage, CachedResponse, RequestKey};
use crate::db::{parse_datetime, Database};
use crate::http::{Response, ResponseType};

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

impl CacheStorage for SqliteStorage {
  fn open(&self, name: &str) -> Result<()> {
    self.db.with_conn(|conn| {
      conn
        .execute(
          "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
          params![name],
        )
        .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;
      Ok(())
    })
  }

  fn has(&self, name: &str) -> Result<bool> {
    self.db.with_conn(|conn| {
      let found: Option<i64> = conn
        .query_row(
          "SELECT 1 FROM cache_stores WHERE name = ?",
          params![name],
          |row| row.get(0),
        )
        .optional()
        .map_err(|e| eyre!("Failed to query cache {}: {}", name, e))?;
      Ok(found.is_some())
    })
  }

  fn keys(&self) -> Result<Vec<String>> {
    self.db.with_conn(|conn| {
      let mut stmt = conn
        .prepare("SELECT name FROM cache_stores ORDER BY created_at, name")
        .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

      let names = stmt
        .query_map([], |row| row.get(0))
        .map_err(|e| eyre!("Failed to list caches: {}", e))?
        .collect::<rusqlite::Result<Vec<String>>>()
        .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

      Ok(names)
    })
  }

  fn delete(&self, name: &str) -> Result<bool> {
    self.db.with_conn(|conn| {
      conn
        .execute("BEGIN TRANSACTION", [])
        .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

      let result = conn
        .execute(
          "DELETE FROM cache_entries WHERE store_name = ?",
          params![name],
        )
        .and_then(|_| conn.execute("DELETE FROM cache_stores WHERE name = ?", params![name]));

      match result {
        Ok(removed) => {
          conn
            .execute("COMMIT", [])
            .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;
          Ok(removed > 0)
        }
        Err(e) => {
          let _ = conn.execute("ROLLBACK", []);
          Err(eyre!("Failed to delete cache {}: {}", name, e))
        }
      }
    })
  }

  fn put(&self, name: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    self.db.with_conn(|conn| {
      conn
        .execute(
          "INSERT OR IGNORE INTO cache_stores (name) VALUES (?)",
          params![name],
        )
        .map_err(|e| eyre!("Failed to open cache {}: {}", name, e))?;

      conn
        .execute(
          "INSERT OR REPLACE INTO cache_entries
             (store_name, key_hash, method, url, status, status_text, headers, body, response_url, cached_at)
           VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))",
          params![
            name,
            key.cache_hash(),
            key.method().as_str(),
            key.url(),
            response.status,
            response.status_text,
            headers,
            response.body,
            response.url,
          ],
        )
        .map_err(|e| eyre!("Failed to store {} in cache {}: {}", key.url(), name, e))?;

      Ok(())
    })
  }

  fn get(&self, name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    self.db.with_conn(|conn| {
      let row: Option<(u16, String, String, Vec<u8>, Option<String>, String)> = conn
        .query_row(
          "SELECT status, status_text, headers, body, response_url, cached_at FROM cache_entries
           WHERE store_name = ? AND key_hash = ?",
          params![name, key.cache_hash()],
          |row| {
            Ok((
              row.get(0)?,
              row.get(1)?,
              row.get(2)?,
              row.get(3)?,
              row.get(4)?,
              row.get(5)?,
            ))
          },
        )
        .optional()
        .map_err(|e| eyre!("Failed to look up {} in cache {}: {}", key.url(), name, e))?;

      let Some((status, status_text, headers, body, url, cached_at)) = row else {
        return Ok(None);
      };

      let headers: BTreeMap<String, String> = serde_json::from_str(&headers)
        .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;

      Ok(Some(CachedResponse {
        response: Response {
          status,
          status_text,
          headers,
          body,
          url,
          // Only basic responses are ever written
          response_type: ResponseType::Basic,
        },
        cached_at: parse_datetime(&cached_at)?,
      }))
    })
  }

  fn entry_count(&self, name: &str) -> Result<usize> {
    self.db.with_conn(|conn| {
      let count: i64 = conn
        .query_row(
          "SELECT COUNT(*) FROM cache_entries WHERE store_name = ?",
          params![name],
          |row| row.get(0),
        )
        .map_err(|e| eyre!("Failed to count entries in cache {}: {}", name, e))?;
      Ok(count as usize)
    })
  }
}
