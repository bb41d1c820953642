//! The worker: one entry point per host event, wired to the components.

use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::{CacheLayer, CacheResult, CacheStore};
use crate::config::{Config, NotificationDefaults};
use crate::control::{ControlMessage, VersionReply};
use crate::event::{EventHandler, HostEvent};
use crate::host::Host;
use crate::http::{Request, Response};
use crate::lifecycle::{CacheGeneration, GenerationRecord, LifecycleController, LifecycleState};
use crate::net::Network;
use crate::notify::{route_click, ClickRoute, NotificationIntent, PushPayload};
use crate::router::Router;
use crate::sync::{
  ActionKind, ActionQueue, DrainReport, HttpReplayer, OfflineQueue, SubmitOutcome,
};

/// The injected collaborators.
#[derive(Clone)]
pub struct Collaborators {
  pub store: Arc<dyn CacheStore>,
  pub queue: Arc<dyn ActionQueue>,
  pub network: Arc<dyn Network>,
  pub host: Arc<dyn Host>,
  pub record: Arc<dyn GenerationRecord>,
}

/// What the host should do with an intercepted request.
#[derive(Debug, Clone)]
pub enum FetchResponse {
  /// Not intercepted; the host performs the request itself
  Passthrough,
  /// Answer with this response
  Respond(CacheResult<Response>),
  /// Intercepted, but nothing can be served: surface a network error
  NetworkError,
}

pub struct Worker {
  origin: Url,
  generation: CacheGeneration,
  manifest: Vec<Url>,
  skip_waiting: bool,
  sync_tag: String,
  notification_defaults: NotificationDefaults,
  router: Router,
  cache: CacheLayer,
  lifecycle: LifecycleController,
  offline: OfflineQueue,
  host: Arc<dyn Host>,
}

impl Worker {
  pub fn new(config: &Config, deps: Collaborators) -> Result<Self> {
    let generation = config.generation();
    let manifest = config
      .precache
      .iter()
      .map(|path| config.resolve(path))
      .collect::<Result<Vec<_>>>()?;

    let cache = CacheLayer::new(
      deps.store.clone(),
      deps.network.clone(),
      generation.names.clone(),
      config.resolve(&config.routes.offline_page)?,
      config.resolve(&config.routes.root_page)?,
    );
    let lifecycle = LifecycleController::new(
      deps.store.clone(),
      deps.network.clone(),
      deps.host.clone(),
      deps.record.clone(),
    );
    let replayer = Arc::new(HttpReplayer::new(deps.network.clone(), config.origin.clone()));
    let offline = OfflineQueue::new(deps.queue.clone(), replayer);

    Ok(Self {
      origin: config.origin.clone(),
      generation,
      manifest,
      skip_waiting: config.skip_waiting,
      sync_tag: config.sync_tag.clone(),
      notification_defaults: config.notifications.clone(),
      router: Router::new(&config.routes),
      cache,
      lifecycle,
      offline,
      host: deps.host,
    })
  }

  /// Bring the worker's generation into service.
  ///
  /// Restores whatever generation an earlier run activated. Unless that is
  /// this worker's generation, installs it, activating only if `skip_waiting`
  /// is set.
  pub async fn start(&self) -> Result<()> {
    if self
      .lifecycle
      .resume(&self.generation, self.manifest.len())
      .await?
    {
      return Ok(());
    }
    self.install().await
  }

  /// Install event: precache the manifest, then promote if configured to skip waiting.
  pub async fn install(&self) -> Result<()> {
    self
      .lifecycle
      .install(self.generation.clone(), &self.manifest)
      .await?;

    if self.skip_waiting {
      self.lifecycle.skip_waiting();
    }
    if self.lifecycle.should_activate() {
      self.activate().await?;
    }
    Ok(())
  }

  /// Activate event: clean up superseded caches and claim clients.
  pub async fn activate(&self) -> Result<()> {
    self.lifecycle.activate().await
  }

  /// Intercepted request.
  pub async fn fetch(&self, request: Request) -> FetchResponse {
    let Some(active) = self.lifecycle.active() else {
      debug!(url = %request.url, "No active generation, passing through");
      return FetchResponse::Passthrough;
    };
    if request.url.origin() != self.origin.origin() {
      return FetchResponse::Passthrough;
    }
    let Some(class) = self.router.classify(&request.method, request.path()) else {
      return FetchResponse::Passthrough;
    };

    debug!(url = %request.url, ?class, version = %active.version, "Intercepted");
    let scoped;
    let cache = if *self.cache.names() == active.names {
      &self.cache
    } else {
      scoped = self.cache.for_generation(active.names);
      &scoped
    };
    match cache.handle(class, &request).await {
      Some(result) => FetchResponse::Respond(result),
      None => FetchResponse::NetworkError,
    }
  }

  /// Push message received. Returns what was displayed, if anything.
  pub async fn push(&self, payload: Option<&[u8]>) -> Result<Option<NotificationIntent>> {
    let Some(bytes) = payload else {
      debug!("Push without payload");
      return Ok(None);
    };

    let payload: PushPayload = match serde_json::from_slice(bytes) {
      Ok(payload) => payload,
      Err(e) => {
        warn!(error = %e, "Dropping unreadable push payload");
        return Ok(None);
      }
    };

    let intent = NotificationIntent::from_payload(payload, &self.notification_defaults);
    info!(tag = %intent.tag, title = %intent.title, "Push received");
    self.host.show_notification(&intent).await?;
    Ok(Some(intent))
  }

  /// The user interacted with a notification.
  pub async fn notification_click(
    &self,
    notification: &NotificationIntent,
    action: Option<&str>,
  ) -> Result<ClickRoute> {
    if let Err(e) = self.host.close_notification(&notification.tag).await {
      warn!(tag = %notification.tag, error = %e, "Failed to close notification");
    }

    let route = route_click(action, &notification.data);
    info!(?action, ?route, "Notification clicked");

    match &route {
      ClickRoute::Open(path) => self.host.open_window(path).await?,
      ClickRoute::MarkRead(id) => {
        self
          .offline
          .submit(ActionKind::MarkNotificationRead {
            notification_id: id.clone(),
          })
          .await?;
      }
    }
    Ok(route)
  }

  /// Cross-context message on the control channel.
  pub async fn message(
    &self,
    message: &Value,
    reply: Option<oneshot::Sender<VersionReply>>,
  ) -> Result<()> {
    match ControlMessage::parse(message) {
      Some(ControlMessage::SkipWaiting) => {
        if self.lifecycle.skip_waiting() {
          self.activate().await?;
        }
      }
      Some(ControlMessage::GetVersion) => match (self.lifecycle.version(), reply) {
        (Some(version), Some(reply)) => {
          if reply.send(VersionReply { version }).is_err() {
            debug!("Version reply channel closed");
          }
        }
        (None, _) => debug!("No active generation to report"),
        (_, None) => debug!("GET_VERSION without reply channel"),
      },
      None => {}
    }
    Ok(())
  }

  /// Background sync event. Only the configured tag drains the queue.
  pub async fn sync(&self, tag: &str) -> Result<Option<DrainReport>> {
    if tag != self.sync_tag {
      debug!(tag, "Ignoring sync tag");
      return Ok(None);
    }
    self.offline.drain().await.map(Some)
  }

  pub async fn connectivity_restored(&self) -> Result<DrainReport> {
    self.offline.drain().await
  }

  /// Perform a mutating action, deferring it if the origin is unreachable.
  pub async fn submit(&self, kind: ActionKind) -> Result<SubmitOutcome> {
    self.offline.submit(kind).await
  }

  pub fn version(&self) -> Option<String> {
    self.lifecycle.version()
  }

  /// Lifecycle state of this worker's own generation.
  pub fn state(&self) -> Option<LifecycleState> {
    self.lifecycle.state(&self.generation.version)
  }

  pub fn offline(&self) -> &OfflineQueue {
    &self.offline
  }

  /// Process host events one at a time until every sender is gone.
  ///
  /// Each event settles fully before the next is taken, so an install or
  /// activation always completes before later requests are served.
  pub async fn run(&self, mut events: EventHandler) {
    while let Some(event) = events.next().await {
      self.handle_event(event).await;
    }
    debug!("Event channel closed");
  }

  async fn handle_event(&self, event: HostEvent) {
    match event {
      HostEvent::Install { respond_to } => {
        let _ = respond_to.send(self.install().await);
      }
      HostEvent::Activate { respond_to } => {
        let _ = respond_to.send(self.activate().await);
      }
      HostEvent::Fetch {
        request,
        respond_to,
      } => {
        let _ = respond_to.send(self.fetch(request).await);
      }
      HostEvent::Push { payload } => {
        if let Err(e) = self.push(payload.as_deref()).await {
          warn!(error = %e, "Failed to show notification");
        }
      }
      HostEvent::NotificationClick {
        notification,
        action,
      } => {
        if let Err(e) = self
          .notification_click(&notification, action.as_deref())
          .await
        {
          warn!(error = %e, "Failed to handle notification click");
        }
      }
      HostEvent::Message { message, reply } => {
        if let Err(e) = self.message(&message, reply).await {
          warn!(error = %e, "Failed to handle message");
        }
      }
      HostEvent::Sync { tag } => match self.sync(&tag).await {
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Background sync failed"),
      },
      HostEvent::ConnectivityRestored => {
        if let Err(e) = self.connectivity_restored().await {
          warn!(error = %e, "Background sync failed");
        }
      }
    }
  }
}
