use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info};
use url::Url;

use crate::control::VersionReply;
use crate::http::Request;
use crate::net::Network;
use crate::notify::NotificationIntent;
use crate::worker::FetchResponse;

/// Events delivered by the host environment
#[derive(Debug)]
pub enum HostEvent {
  /// A new generation should be installed
  Install {
    respond_to: oneshot::Sender<Result<()>>,
  },
  /// The waiting generation should take over
  Activate {
    respond_to: oneshot::Sender<Result<()>>,
  },
  /// An outbound request was intercepted
  Fetch {
    request: Request,
    respond_to: oneshot::Sender<FetchResponse>,
  },
  /// A push message arrived
  Push { payload: Option<Vec<u8>> },
  /// The user clicked a notification or one of its actions
  NotificationClick {
    notification: NotificationIntent,
    action: Option<String>,
  },
  /// A control-channel message from the application
  Message {
    message: Value,
    reply: Option<oneshot::Sender<VersionReply>>,
  },
  /// A background sync request with its tag
  Sync { tag: String },
  /// The origin became reachable again
  ConnectivityRestored,
}

/// Receiving end of the host event channel
pub struct EventHandler {
  rx: mpsc::UnboundedReceiver<HostEvent>,
}

impl EventHandler {
  /// Create a handler and the sender used to feed it
  pub fn new() -> (Self, mpsc::UnboundedSender<HostEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Self { rx }, tx)
  }

  /// Receive the next event
  pub async fn next(&mut self) -> Option<HostEvent> {
    self.rx.recv().await
  }
}

/// Spawn a task that probes the origin and emits `ConnectivityRestored`
/// whenever it goes from unreachable (or unknown) to reachable.
pub fn spawn_connectivity_monitor(
  network: Arc<dyn Network>,
  probe: Url,
  interval: Duration,
  tx: mpsc::UnboundedSender<HostEvent>,
) -> tokio::task::JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    let mut online: Option<bool> = None;

    loop {
      ticker.tick().await;

      let reachable = network.fetch(&Request::get(probe.clone())).await.is_ok();
      if reachable && online != Some(true) {
        info!("Origin reachable");
        if tx.send(HostEvent::ConnectivityRestored).is_err() {
          break;
        }
      } else if !reachable && online != Some(false) {
        info!("Origin unreachable");
      }
      debug!(reachable, "Connectivity probe");
      online = Some(reachable);
    }
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{url, FakeNetwork};

  #[tokio::test]
  async fn test_monitor_signals_on_reconnect() {
    let network = Arc::new(FakeNetwork::new());
    network.set_offline(true);
    let (mut events, tx) = EventHandler::new();

    let handle =
      spawn_connectivity_monitor(network.clone(), url("/"), Duration::from_millis(5), tx);

    tokio::time::sleep(Duration::from_millis(30)).await;
    network.set_offline(false);

    let event = tokio::time::timeout(Duration::from_secs(1), events.next())
      .await
      .unwrap();
    assert!(matches!(event, Some(HostEvent::ConnectivityRestored)));

    // Staying online does not signal again
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(events.rx.try_recv().is_err());
    handle.abort();
  }
}
