//! Persistence of the active generation across restarts.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, OptionalExtension};
use std::sync::{Arc, Mutex};

use crate::cache::CacheNames;
use crate::db::Database;

use super::CacheGeneration;

/// Remembers which generation was last activated.
#[async_trait]
pub trait GenerationRecord: Send + Sync {
  async fn active(&self) -> Result<Option<CacheGeneration>>;

  async fn set_active(&self, generation: &CacheGeneration) -> Result<()>;
}

pub struct SqliteGenerationRecord {
  db: Arc<Database>,
}

impl SqliteGenerationRecord {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

#[async_trait]
impl GenerationRecord for SqliteGenerationRecord {
  async fn active(&self) -> Result<Option<CacheGeneration>> {
    self
      .db
      .conn()?
      .query_row(
        "SELECT version, static_cache, dynamic_cache FROM active_generation WHERE id = 1",
        [],
        |row| {
          Ok(CacheGeneration {
            version: row.get(0)?,
            names: CacheNames {
              static_cache: row.get(1)?,
              dynamic_cache: row.get(2)?,
            },
          })
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to read active generation: {}", e))
  }

  async fn set_active(&self, generation: &CacheGeneration) -> Result<()> {
    self
      .db
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO active_generation (id, version, static_cache, dynamic_cache, activated_at)
         VALUES (1, ?, ?, ?, datetime('now'))",
        params![
          generation.version,
          generation.names.static_cache,
          generation.names.dynamic_cache
        ],
      )
      .map_err(|e| eyre!("Failed to record generation {}: {}", generation.version, e))?;

    Ok(())
  }
}

/// In-memory record, lost on drop.
#[derive(Default)]
pub struct MemoryGenerationRecord {
  active: Mutex<Option<CacheGeneration>>,
}

impl MemoryGenerationRecord {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl GenerationRecord for MemoryGenerationRecord {
  async fn active(&self) -> Result<Option<CacheGeneration>> {
    let active = self.active.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(active.clone())
  }

  async fn set_active(&self, generation: &CacheGeneration) -> Result<()> {
    let mut active = self.active.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    *active = Some(generation.clone());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn generation(version: &str) -> CacheGeneration {
    CacheGeneration {
      version: version.to_string(),
      names: CacheNames {
        static_cache: format!("{}-static", version),
        dynamic_cache: format!("{}-dynamic", version),
      },
    }
  }

  #[tokio::test]
  async fn test_latest_activation_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("offline.db");
    {
      let record = SqliteGenerationRecord::new(Arc::new(Database::open(Some(&path)).unwrap()));
      assert_eq!(record.active().await.unwrap(), None);
      record.set_active(&generation("v1")).await.unwrap();
      record.set_active(&generation("v2")).await.unwrap();
    }

    let reopened = SqliteGenerationRecord::new(Arc::new(Database::open(Some(&path)).unwrap()));
    assert_eq!(reopened.active().await.unwrap(), Some(generation("v2")));
  }
}
