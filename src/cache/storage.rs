//! SQLite-backed cache store.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Arc;

use crate::db::{parse_datetime, Database};
use crate::http::{CachedResponse, Response};

use super::key::RequestKey;
use super::traits::CacheStore;

/// SQLite-based cache storage implementation.
pub struct SqliteStorage {
  db: Arc<Database>,
}

impl SqliteStorage {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

fn insert_entry(
  conn: &Connection,
  cache_name: &str,
  key: &RequestKey,
  response: &Response,
) -> Result<()> {
  let headers = serde_json::to_string(&response.headers)
    .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

  conn
    .execute(
      "INSERT OR REPLACE INTO cache_entries
         (cache_name, request_key, request_description, status, status_text, headers, body, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, datetime('now'))",
      params![
        cache_name,
        key.cache_hash(),
        key.description(),
        response.status,
        response.status_text,
        headers,
        response.body,
      ],
    )
    .map_err(|e| eyre!("Failed to store {}: {}", key.description(), e))?;

  Ok(())
}

#[async_trait]
impl CacheStore for SqliteStorage {
  async fn cache_names(&self) -> Result<Vec<String>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare("SELECT DISTINCT cache_name FROM cache_entries ORDER BY cache_name")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list caches: {}", e))?
      .collect::<Result<Vec<String>, _>>()
      .map_err(|e| eyre!("Failed to read cache name: {}", e))?;

    Ok(names)
  }

  async fn get(&self, cache_name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT status, status_text, headers, body, cached_at FROM cache_entries
         WHERE cache_name = ? AND request_key = ?",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let row: Option<(u16, String, String, Vec<u8>, String)> = stmt
      .query_row(params![cache_name, key.cache_hash()], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
      })
      .optional()
      .map_err(|e| eyre!("Failed to read {}: {}", key.description(), e))?;

    match row {
      Some((status, status_text, headers, body, cached_at)) => {
        let headers = serde_json::from_str(&headers)
          .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
        Ok(Some(CachedResponse {
          response: Response {
            status,
            status_text,
            headers,
            body,
          },
          cached_at: parse_datetime(&cached_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  async fn put(&self, cache_name: &str, key: &RequestKey, response: &Response) -> Result<()> {
    let conn = self.db.conn()?;
    insert_entry(&conn, cache_name, key, response)
  }

  async fn put_all(&self, cache_name: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    let mut conn = self.db.conn()?;
    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    for (key, response) in entries {
      insert_entry(&tx, cache_name, key, response)?;
    }

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  async fn delete(&self, cache_name: &str, key: &RequestKey) -> Result<bool> {
    let conn = self.db.conn()?;
    let removed = conn
      .execute(
        "DELETE FROM cache_entries WHERE cache_name = ? AND request_key = ?",
        params![cache_name, key.cache_hash()],
      )
      .map_err(|e| eyre!("Failed to delete {}: {}", key.description(), e))?;

    Ok(removed > 0)
  }

  async fn delete_cache(&self, cache_name: &str) -> Result<bool> {
    let conn = self.db.conn()?;
    let removed = conn
      .execute(
        "DELETE FROM cache_entries WHERE cache_name = ?",
        params![cache_name],
      )
      .map_err(|e| eyre!("Failed to delete cache {}: {}", cache_name, e))?;

    Ok(removed > 0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  fn storage(dir: &tempfile::TempDir) -> SqliteStorage {
    let db = Database::open(Some(&dir.path().join("offline.db"))).unwrap();
    SqliteStorage::new(Arc::new(db))
  }

  fn key(path: &str) -> RequestKey {
    RequestKey::get(&Url::parse("https://app.test").unwrap().join(path).unwrap())
  }

  #[tokio::test]
  async fn test_put_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(&dir);
    let response = Response::new(200, "[1,2]")
      .with_status_text("OK")
      .with_header("Content-Type", "application/json");

    storage.put("dynamic", &key("/api/events"), &response).await.unwrap();

    let cached = storage.get("dynamic", &key("/api/events")).await.unwrap().unwrap();
    assert_eq!(cached.response, response);
    assert!(storage.get("static", &key("/api/events")).await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_rewrite_keeps_single_entry() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(&dir);

    storage.put("dynamic", &key("/api/me"), &Response::new(200, "old")).await.unwrap();
    storage.put("dynamic", &key("/api/me"), &Response::new(200, "new")).await.unwrap();

    let count: i64 = storage
      .db
      .conn()
      .unwrap()
      .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))
      .unwrap();
    assert_eq!(count, 1);
    let cached = storage.get("dynamic", &key("/api/me")).await.unwrap().unwrap();
    assert_eq!(cached.response.text(), "new");
  }

  #[tokio::test]
  async fn test_delete_cache_and_names() {
    let dir = tempfile::tempdir().unwrap();
    let storage = storage(&dir);
    let entries = vec![
      (key("/"), Response::new(200, "root")),
      (key("/offline.html"), Response::new(200, "offline")),
    ];
    storage.put_all("static-v1", &entries).await.unwrap();
    storage.put("dynamic-v1", &key("/api/x"), &Response::new(200, "x")).await.unwrap();

    assert_eq!(
      storage.cache_names().await.unwrap(),
      vec!["dynamic-v1".to_string(), "static-v1".to_string()]
    );

    assert!(storage.delete_cache("static-v1").await.unwrap());
    assert!(!storage.delete_cache("static-v1").await.unwrap());
    assert_eq!(storage.cache_names().await.unwrap(), vec!["dynamic-v1".to_string()]);
  }

  #[tokio::test]
  async fn test_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    storage(&dir)
      .put("static", &key("/static/js/bundle.js"), &Response::new(200, "js"))
      .await
      .unwrap();

    let reopened = storage(&dir);
    let cached = reopened
      .get("static", &key("/static/js/bundle.js"))
      .await
      .unwrap();
    assert_eq!(cached.unwrap().response.text(), "js");
  }
}
