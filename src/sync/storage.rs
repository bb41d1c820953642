//! Durable FIFO storage for pending actions.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use rusqlite::params;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::db::{parse_datetime, Database};

use super::action::{ActionKind, PendingAction};

/// Trait for pending action storage backends.
///
/// Entries come back in insertion order. `remove` must be atomic per entry so
/// that overlapping drain passes replay an action at least once, never lose it.
#[async_trait]
pub trait ActionQueue: Send + Sync {
  /// Every queued action, oldest first.
  async fn all(&self) -> Result<Vec<PendingAction>>;

  async fn append(&self, action: &PendingAction) -> Result<()>;

  /// Remove an action after a successful replay. Returns whether it was queued.
  async fn remove(&self, id: &str) -> Result<bool>;

  /// Count a failed replay attempt.
  async fn record_failure(&self, id: &str, error: &str) -> Result<()>;
}

/// SQLite-based queue implementation.
pub struct SqliteQueue {
  db: Arc<Database>,
}

impl SqliteQueue {
  pub fn new(db: Arc<Database>) -> Self {
    Self { db }
  }
}

#[async_trait]
impl ActionQueue for SqliteQueue {
  async fn all(&self) -> Result<Vec<PendingAction>> {
    let conn = self.db.conn()?;
    let mut stmt = conn
      .prepare(
        "SELECT id, kind, queued_at, attempts, last_error FROM pending_actions ORDER BY seq",
      )
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let rows: Vec<(String, String, String, u32, Option<String>)> = stmt
      .query_map([], |row| {
        Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
      })
      .map_err(|e| eyre!("Failed to query pending actions: {}", e))?
      .collect::<Result<_, _>>()
      .map_err(|e| eyre!("Failed to read pending action: {}", e))?;

    // An unreadable row is left in place and skipped so it cannot block the rest
    let actions = rows
      .into_iter()
      .filter_map(|(id, kind, queued_at, attempts, last_error)| {
        let kind: ActionKind = match serde_json::from_str(&kind) {
          Ok(kind) => kind,
          Err(e) => {
            warn!(id = %id, error = %e, "Skipping unreadable pending action");
            return None;
          }
        };
        let queued_at = match parse_datetime(&queued_at) {
          Ok(at) => at,
          Err(e) => {
            warn!(id = %id, error = %e, "Skipping pending action with bad timestamp");
            return None;
          }
        };
        Some(PendingAction {
          id,
          kind,
          queued_at,
          attempts,
          last_error,
        })
      })
      .collect();

    Ok(actions)
  }

  async fn append(&self, action: &PendingAction) -> Result<()> {
    let kind =
      serde_json::to_string(&action.kind).map_err(|e| eyre!("Failed to serialize action: {}", e))?;
    let queued_at = action.queued_at.format("%Y-%m-%d %H:%M:%S").to_string();

    self
      .db
      .conn()?
      .execute(
        "INSERT INTO pending_actions (id, kind, queued_at, attempts, last_error)
         VALUES (?, ?, ?, ?, ?)",
        params![action.id, kind, queued_at, action.attempts, action.last_error],
      )
      .map_err(|e| eyre!("Failed to queue action {}: {}", action.id, e))?;

    Ok(())
  }

  async fn remove(&self, id: &str) -> Result<bool> {
    let removed = self
      .db
      .conn()?
      .execute("DELETE FROM pending_actions WHERE id = ?", params![id])
      .map_err(|e| eyre!("Failed to remove action {}: {}", id, e))?;

    Ok(removed > 0)
  }

  async fn record_failure(&self, id: &str, error: &str) -> Result<()> {
    self
      .db
      .conn()?
      .execute(
        "UPDATE pending_actions SET attempts = attempts + 1, last_error = ? WHERE id = ?",
        params![error, id],
      )
      .map_err(|e| eyre!("Failed to update action {}: {}", id, e))?;

    Ok(())
  }
}

/// In-memory queue, lost on drop.
#[derive(Default)]
pub struct MemoryQueue {
  actions: Mutex<Vec<PendingAction>>,
}

impl MemoryQueue {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl ActionQueue for MemoryQueue {
  async fn all(&self) -> Result<Vec<PendingAction>> {
    let actions = self.actions.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(actions.clone())
  }

  async fn append(&self, action: &PendingAction) -> Result<()> {
    let mut actions = self.actions.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if actions.iter().any(|a| a.id == action.id) {
      return Err(eyre!("Action {} is already queued", action.id));
    }
    actions.push(action.clone());
    Ok(())
  }

  async fn remove(&self, id: &str) -> Result<bool> {
    let mut actions = self.actions.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let before = actions.len();
    actions.retain(|a| a.id != id);
    Ok(actions.len() < before)
  }

  async fn record_failure(&self, id: &str, error: &str) -> Result<()> {
    let mut actions = self.actions.lock().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    if let Some(action) = actions.iter_mut().find(|a| a.id == id) {
      action.attempts += 1;
      action.last_error = Some(error.to_string());
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn queue(dir: &tempfile::TempDir) -> SqliteQueue {
    let db = Database::open(Some(&dir.path().join("offline.db"))).unwrap();
    SqliteQueue::new(Arc::new(db))
  }

  fn leave(days: u32) -> PendingAction {
    PendingAction::new(ActionKind::SubmitLeave {
      payload: json!({ "days": days }),
    })
  }

  #[tokio::test]
  async fn test_fifo_order_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let (a, b, c) = (leave(1), leave(2), leave(3));
    {
      let queue = queue(&dir);
      queue.append(&a).await.unwrap();
      queue.append(&b).await.unwrap();
      queue.append(&c).await.unwrap();
    }

    let reopened = queue(&dir);
    let ids: Vec<_> = reopened.all().await.unwrap().into_iter().map(|a| a.id).collect();
    assert_eq!(ids, vec![a.id, b.id, c.id]);
  }

  #[tokio::test]
  async fn test_remove_and_record_failure() {
    let dir = tempfile::tempdir().unwrap();
    let queue = queue(&dir);
    let (a, b) = (leave(1), leave(2));
    queue.append(&a).await.unwrap();
    queue.append(&b).await.unwrap();

    queue.record_failure(&a.id, "connection reset").await.unwrap();
    queue.record_failure(&a.id, "status 503").await.unwrap();
    assert!(queue.remove(&b.id).await.unwrap());
    assert!(!queue.remove(&b.id).await.unwrap());

    let remaining = queue.all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].kind, a.kind);
    assert_eq!(remaining[0].attempts, 2);
    assert_eq!(remaining[0].last_error.as_deref(), Some("status 503"));
  }

  #[tokio::test]
  async fn test_unreadable_row_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let queue = queue(&dir);
    queue
      .db
      .conn()
      .unwrap()
      .execute(
        "INSERT INTO pending_actions (id, kind) VALUES ('bad', '{\"kind\":\"future_kind\"}')",
        [],
      )
      .unwrap();
    let good = leave(3);
    queue.append(&good).await.unwrap();

    let actions = queue.all().await.unwrap();
    assert_eq!(actions.len(), 1);
    assert_eq!(actions[0].id, good.id);
  }

  #[tokio::test]
  async fn test_duplicate_id_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let queue = queue(&dir);
    let a = leave(1);
    queue.append(&a).await.unwrap();
    assert!(queue.append(&a).await.is_err());

    let memory = MemoryQueue::new();
    memory.append(&a).await.unwrap();
    assert!(memory.append(&a).await.is_err());
  }
}
