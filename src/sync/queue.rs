//! Offline action queue: submit live or defer, then drain on reconnect.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use url::Url;

use crate::http::{Request, Response};
use crate::net::Network;

use super::action::{ActionKind, PendingAction};
use super::storage::ActionQueue;

/// Header carrying the action id on every replay, so the origin can drop duplicates.
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Performs one action against the origin.
///
/// `Err` means the origin could not be reached. Any response it produced is `Ok`.
#[async_trait]
pub trait ActionReplayer: Send + Sync {
  /// Reject an action that could never be replayed, without contacting the origin.
  fn check(&self, action: &PendingAction) -> Result<()>;

  async fn replay(&self, action: &PendingAction) -> Result<Response>;
}

/// Replays actions as HTTP calls on the origin API.
pub struct HttpReplayer {
  network: Arc<dyn Network>,
  origin: Url,
}

impl HttpReplayer {
  pub fn new(network: Arc<dyn Network>, origin: Url) -> Self {
    Self { network, origin }
  }

  fn request_for(&self, action: &PendingAction) -> Result<Request> {
    let endpoint = action.kind.endpoint()?;
    let url = self
      .origin
      .join(&endpoint.path)
      .map_err(|e| eyre!("Invalid path {}: {}", endpoint.path, e))?;
    if url.origin() != self.origin.origin() {
      return Err(eyre!("{} is not on the origin", endpoint.path));
    }

    let mut request =
      Request::new(endpoint.method, url).with_header(IDEMPOTENCY_HEADER, action.id.as_str());
    if let Some(body) = endpoint.body {
      request = request.with_json(body);
    }
    Ok(request)
  }
}

#[async_trait]
impl ActionReplayer for HttpReplayer {
  fn check(&self, action: &PendingAction) -> Result<()> {
    self.request_for(action).map(|_| ())
  }

  async fn replay(&self, action: &PendingAction) -> Result<Response> {
    let request = self.request_for(action)?;
    self.network.fetch(&request).await
  }
}

/// Outcome of submitting an action.
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
  /// The origin answered; the response is passed back whatever its status
  Completed(Response),
  /// The origin was unreachable; the action was queued under this id
  Queued(String),
}

/// Result of one drain pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainReport {
  pub replayed: usize,
  pub failed: usize,
  pub remaining: usize,
}

/// Durable FIFO of deferred actions with an internally serialized drain loop.
pub struct OfflineQueue {
  queue: Arc<dyn ActionQueue>,
  replayer: Arc<dyn ActionReplayer>,
  drain_lock: Mutex<()>,
}

impl OfflineQueue {
  pub fn new(queue: Arc<dyn ActionQueue>, replayer: Arc<dyn ActionReplayer>) -> Self {
    Self {
      queue,
      replayer,
      drain_lock: Mutex::new(()),
    }
  }

  /// Try the action live, queueing it if the origin is unreachable.
  ///
  /// An action that cannot be turned into a request is returned as an error
  /// and never queued.
  pub async fn submit(&self, kind: ActionKind) -> Result<SubmitOutcome> {
    let action = PendingAction::new(kind);
    self.replayer.check(&action)?;

    match self.replayer.replay(&action).await {
      Ok(response) => Ok(SubmitOutcome::Completed(response)),
      Err(e) => {
        info!(action = action.kind.name(), id = %action.id, error = %e, "Origin unreachable, queueing action");
        self.queue.append(&action).await.map_err(|err| {
          error!(id = %action.id, error = %err, "Failed to queue action");
          err
        })?;
        Ok(SubmitOutcome::Queued(action.id))
      }
    }
  }

  /// Queue an action without trying it first.
  pub async fn enqueue(&self, kind: ActionKind) -> Result<String> {
    let action = PendingAction::new(kind);
    self.replayer.check(&action)?;
    self.queue.append(&action).await?;
    Ok(action.id)
  }

  /// Every queued action, oldest first.
  pub async fn pending(&self) -> Result<Vec<PendingAction>> {
    self.queue.all().await
  }

  /// Replay every queued action once, in insertion order.
  ///
  /// Actions are processed strictly one at a time. A success (2xx) removes the
  /// action; anything else records the failure and moves on to the next one.
  /// Overlapping calls wait for the running pass to finish.
  pub async fn drain(&self) -> Result<DrainReport> {
    let _guard = self.drain_lock.lock().await;

    let actions = self.queue.all().await?;
    let mut report = DrainReport::default();
    info!(pending = actions.len(), "Background sync");

    for action in &actions {
      let failure = match self.replayer.replay(action).await {
        Ok(response) if response.ok() => match self.queue.remove(&action.id).await {
          Ok(_) => {
            report.replayed += 1;
            continue;
          }
          // The replay went through; it will be sent again next pass.
          Err(e) => format!("replayed but not removed: {}", e),
        },
        Ok(response) => format!("status {}", response.status),
        Err(e) => e.to_string(),
      };

      warn!(action = action.kind.name(), id = %action.id, error = %failure, "Background sync failed for action");
      report.failed += 1;
      if let Err(e) = self.queue.record_failure(&action.id, &failure).await {
        warn!(id = %action.id, error = %e, "Failed to record replay failure");
      }
    }

    report.remaining = actions.len() - report.replayed;
    info!(
      replayed = report.replayed,
      failed = report.failed,
      "Background sync finished"
    );
    Ok(report)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::sync::MemoryQueue;
  use crate::testing::{url, FakeNetwork, ORIGIN};
  use reqwest::Method;
  use serde_json::json;

  struct Fixture {
    network: Arc<FakeNetwork>,
    queue: Arc<MemoryQueue>,
    offline: OfflineQueue,
  }

  fn fixture() -> Fixture {
    let network = Arc::new(FakeNetwork::new());
    let queue = Arc::new(MemoryQueue::new());
    let replayer = Arc::new(HttpReplayer::new(network.clone(), url("/")));
    let offline = OfflineQueue::new(queue.clone(), replayer);
    Fixture {
      network,
      queue,
      offline,
    }
  }

  fn request(path: &str) -> ActionKind {
    ActionKind::Request {
      method: "POST".to_string(),
      path: path.to_string(),
      body: Some(json!({ "path": path })),
    }
  }

  #[tokio::test]
  async fn test_submit_online_completes() {
    let f = fixture();
    f.network.respond("/api/leaves", Response::new(201, r#"{"id":1}"#));

    let outcome = f
      .offline
      .submit(ActionKind::SubmitLeave {
        payload: json!({ "days": 2 }),
      })
      .await
      .unwrap();

    assert_eq!(outcome, SubmitOutcome::Completed(Response::new(201, r#"{"id":1}"#)));
    assert!(f.queue.all().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_submit_error_status_is_not_queued() {
    let f = fixture();
    f.network.respond("/api/leaves", Response::new(422, "invalid"));

    let outcome = f
      .offline
      .submit(ActionKind::SubmitLeave { payload: json!({}) })
      .await
      .unwrap();

    assert!(matches!(outcome, SubmitOutcome::Completed(r) if r.status == 422));
    assert!(f.queue.all().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_submit_offline_queues() {
    let f = fixture();
    f.network.set_offline(true);

    let outcome = f
      .offline
      .submit(ActionKind::MarkNotificationRead {
        notification_id: "5".to_string(),
      })
      .await
      .unwrap();

    let SubmitOutcome::Queued(id) = outcome else {
      panic!("expected the action to be queued");
    };
    let pending = f.offline.pending().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, id);
  }

  #[tokio::test]
  async fn test_invalid_action_is_rejected_not_queued() {
    let f = fixture();

    let read_only = ActionKind::Request {
      method: "GET".to_string(),
      path: "/api/leaves".to_string(),
      body: None,
    };
    assert!(f.offline.submit(read_only.clone()).await.is_err());
    assert!(f.offline.enqueue(read_only).await.is_err());

    let elsewhere = ActionKind::Request {
      method: "POST".to_string(),
      path: "https://elsewhere.example.com/api/leaves".to_string(),
      body: None,
    };
    assert!(f.offline.submit(elsewhere).await.is_err());

    assert!(f.queue.all().await.unwrap().is_empty());
    assert!(f.network.calls().is_empty());
  }

  #[tokio::test]
  async fn test_drain_skips_failure_and_continues() {
    let f = fixture();
    let a = f.offline.enqueue(request("/api/a")).await.unwrap();
    f.offline.enqueue(request("/api/b")).await.unwrap();
    f.offline.enqueue(request("/api/c")).await.unwrap();
    f.network.fail("/api/a");
    f.network.respond("/api/b", Response::new(200, "ok"));
    f.network.respond("/api/c", Response::new(204, ""));

    let report = f.offline.drain().await.unwrap();

    assert_eq!(
      report,
      DrainReport {
        replayed: 2,
        failed: 1,
        remaining: 1
      }
    );
    let remaining = f.queue.all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, a);
    assert_eq!(remaining[0].attempts, 1);

    let order: Vec<_> = f.network.calls().iter().map(|r| r.url.path().to_string()).collect();
    assert_eq!(order, vec!["/api/a", "/api/b", "/api/c"]);
  }

  #[tokio::test]
  async fn test_error_status_stays_queued() {
    let f = fixture();
    f.offline.enqueue(request("/api/x")).await.unwrap();
    f.network.respond("/api/x", Response::new(500, "boom"));

    let report = f.offline.drain().await.unwrap();
    assert_eq!(report.failed, 1);
    let remaining = f.queue.all().await.unwrap();
    assert_eq!(remaining[0].last_error.as_deref(), Some("status 500"));

    f.network.respond("/api/x", Response::new(200, "ok"));
    let report = f.offline.drain().await.unwrap();
    assert_eq!(report.replayed, 1);
    assert!(f.queue.all().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_replay_carries_idempotency_key() {
    let f = fixture();
    let id = f
      .offline
      .enqueue(ActionKind::RegisterForEvent {
        payload: json!({ "eventId": "42" }),
      })
      .await
      .unwrap();
    f.network
      .respond("/api/event-registrations/register", Response::new(200, "{}"));

    f.offline.drain().await.unwrap();

    let calls = f.network.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].method, Method::POST);
    assert_eq!(
      calls[0].url.as_str(),
      format!("{}/api/event-registrations/register", ORIGIN)
    );
    assert!(calls[0]
      .headers
      .contains(&(IDEMPOTENCY_HEADER.to_string(), id)));
    assert_eq!(calls[0].body.as_deref(), Some(br#"{"eventId":"42"}"#.as_slice()));
  }

  #[tokio::test]
  async fn test_unreadable_entry_does_not_block_drain() {
    let dir = tempfile::tempdir().unwrap();
    let db = Arc::new(crate::db::Database::open(Some(&dir.path().join("offline.db"))).unwrap());
    db.conn()
      .unwrap()
      .execute(
        "INSERT INTO pending_actions (id, kind) VALUES ('bad', '{\"kind\":\"future_kind\"}')",
        [],
      )
      .unwrap();

    let network = Arc::new(FakeNetwork::new());
    let replayer = Arc::new(HttpReplayer::new(network.clone(), url("/")));
    let offline = OfflineQueue::new(Arc::new(crate::sync::SqliteQueue::new(db)), replayer);
    offline
      .enqueue(ActionKind::SubmitLeave {
        payload: json!({ "days": 1 }),
      })
      .await
      .unwrap();
    network.respond("/api/leaves", Response::new(201, "{}"));

    let report = offline.drain().await.unwrap();

    assert_eq!(report.replayed, 1);
    assert_eq!(network.call_count("/api/leaves"), 1);
  }

  #[tokio::test]
  async fn test_overlapping_drains_replay_once() {
    let f = fixture();
    f.offline.enqueue(request("/api/once")).await.unwrap();
    f.network.respond("/api/once", Response::new(200, "ok"));

    let (first, second) = tokio::join!(f.offline.drain(), f.offline.drain());

    assert_eq!(first.unwrap().replayed + second.unwrap().replayed, 1);
    assert_eq!(f.network.call_count("/api/once"), 1);
  }
}
