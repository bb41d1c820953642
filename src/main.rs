mod cache;
mod config;
mod control;
mod db;
mod event;
mod host;
mod http;
mod lifecycle;
mod logging;
mod net;
mod notify;
mod router;
mod sync;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use cache::{MemoryStorage, SqliteStorage};
use event::{EventHandler, HostEvent};
use http::Request;
use notify::{NotificationIntent, PushPayload};
use lifecycle::{LifecycleState, MemoryGenerationRecord, SqliteGenerationRecord};
use sync::{ActionKind, MemoryQueue, SqliteQueue, SubmitOutcome};
use worker::{Collaborators, FetchResponse, Worker};

#[derive(Parser, Debug)]
#[command(name = "offline-sync")]
#[command(about = "Offline caching and background sync for a single-origin web app")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/offline-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Log at debug level unless OFFLINE_SYNC_LOG says otherwise
  #[arg(short, long)]
  verbose: bool,

  /// Keep caches and the action queue in memory instead of the database
  #[arg(long)]
  ephemeral: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Request a path through the cache strategies
  Fetch {
    path: String,
    /// Print the response body
    #[arg(long)]
    body: bool,
  },
  /// Install (and activate) the configured generation
  Install,
  /// Activate the installed, waiting generation
  Activate,
  /// Print the active generation
  Version,
  /// Deliver a push payload (JSON)
  Push { payload: Option<String> },
  /// Simulate a click on a notification
  Click {
    /// Named action, e.g. view_event
    #[arg(long)]
    action: Option<String>,
    /// Notification data bag (JSON object)
    #[arg(long)]
    data: Option<String>,
  },
  /// Post a control-channel message (JSON), e.g. '{"type":"GET_VERSION"}'
  Message { message: String },
  /// Inspect or feed the offline action queue
  Queue {
    #[command(subcommand)]
    command: QueueCommand,
  },
  /// Fire a background sync event
  Sync {
    #[arg(long, default_value = "background-sync")]
    tag: String,
  },
  /// Watch connectivity and sync whenever the origin comes back
  Watch,
}

#[derive(Subcommand, Debug)]
enum QueueCommand {
  /// List pending actions
  List,
  /// Submit an action (JSON), queueing it if the origin is unreachable
  Add {
    action: String,
    /// Queue without trying the origin first
    #[arg(long)]
    defer: bool,
  },
}

fn parse_json(input: &str) -> Result<Value> {
  serde_json::from_str(input).map_err(|e| eyre!("Invalid JSON '{}': {}", input, e))
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = config::Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&db::data_dir()?.join("logs"), args.verbose)?;

  let network = Arc::new(net::HttpClient::new(
    config.timeout(),
    config::Config::get_token(),
  )?);
  let deps = if args.ephemeral {
    Collaborators {
      store: Arc::new(MemoryStorage::new()),
      queue: Arc::new(MemoryQueue::new()),
      record: Arc::new(MemoryGenerationRecord::new()),
      network: network.clone(),
      host: Arc::new(host::ConsoleHost::new(config.origin.clone())),
    }
  } else {
    let database = Arc::new(db::Database::open(config.database.as_deref())?);
    Collaborators {
      store: Arc::new(SqliteStorage::new(database.clone())),
      queue: Arc::new(SqliteQueue::new(database.clone())),
      record: Arc::new(SqliteGenerationRecord::new(database)),
      network: network.clone(),
      host: Arc::new(host::ConsoleHost::new(config.origin.clone())),
    }
  };
  let worker = Arc::new(Worker::new(&config, deps)?);

  // Installing explicitly must not be preempted by a resume
  if !matches!(args.command, Command::Install) {
    if let Err(e) = worker.start().await {
      tracing::warn!(error = %e, "Worker not active, requests pass through");
    }
  }

  let (events, tx) = EventHandler::new();
  let event_loop = tokio::spawn({
    let worker = worker.clone();
    async move { worker.run(events).await }
  });

  match args.command {
    Command::Fetch { path, body } => {
      let (respond_to, rx) = oneshot::channel();
      send(
        &tx,
        HostEvent::Fetch {
          request: Request::get(config.resolve(&path)?),
          respond_to,
        },
      )?;
      match rx.await? {
        FetchResponse::Respond(result) => {
          match result.cached_at {
            Some(at) => println!("{} {:?} cached {}", result.data.status, result.source, at),
            None => println!("{} {:?}", result.data.status, result.source),
          }
          if let Some(content_type) = result.data.header("Content-Type") {
            println!("Content-Type: {}", content_type);
          }
          if body {
            println!("{}", result.data.text());
          }
        }
        FetchResponse::Passthrough => println!("passthrough"),
        FetchResponse::NetworkError => println!("network error"),
      }
    }
    Command::Install => {
      let (respond_to, rx) = oneshot::channel();
      send(&tx, HostEvent::Install { respond_to })?;
      rx.await??;
      match worker.state() {
        Some(state) => println!("{} {:?}", config.generation().version, state),
        None => println!("{} not installed", config.generation().version),
      }
    }
    Command::Activate => {
      if worker.state() != Some(LifecycleState::Active) {
        let (respond_to, rx) = oneshot::channel();
        send(&tx, HostEvent::Activate { respond_to })?;
        rx.await??;
      }
      println!("{}", worker.version().unwrap_or_default());
    }
    Command::Version => {
      let (reply, rx) = oneshot::channel();
      send(
        &tx,
        HostEvent::Message {
          message: serde_json::json!({ "type": "GET_VERSION" }),
          reply: Some(reply),
        },
      )?;
      match rx.await {
        Ok(reply) => println!("{}", reply.version),
        Err(_) => println!("no active generation"),
      }
    }
    Command::Push { payload } => {
      send(
        &tx,
        HostEvent::Push {
          payload: payload.map(String::into_bytes),
        },
      )?;
    }
    Command::Click { action, data } => {
      let data = match data {
        Some(d) => serde_json::from_value(parse_json(&d)?)
          .map_err(|e| eyre!("--data must be a JSON object: {}", e))?,
        None => None,
      };
      let payload = PushPayload {
        data,
        ..PushPayload::default()
      };
      send(
        &tx,
        HostEvent::NotificationClick {
          notification: NotificationIntent::from_payload(payload, &config.notifications),
          action,
        },
      )?;
    }
    Command::Message { message } => {
      let (reply, rx) = oneshot::channel();
      send(
        &tx,
        HostEvent::Message {
          message: parse_json(&message)?,
          reply: Some(reply),
        },
      )?;
      if let Ok(reply) = rx.await {
        println!("{}", serde_json::to_string(&reply)?);
      }
    }
    Command::Queue { command } => match command {
      QueueCommand::List => {
        for action in worker.offline().pending().await? {
          println!(
            "{} {} queued={} attempts={} {}",
            action.id,
            action.kind.name(),
            action.queued_at.format("%Y-%m-%d %H:%M:%S"),
            action.attempts,
            action.last_error.unwrap_or_default()
          );
        }
      }
      QueueCommand::Add { action, defer } => {
        let kind: ActionKind = serde_json::from_value(parse_json(&action)?)
          .map_err(|e| eyre!("Invalid action: {}", e))?;
        if defer {
          println!("queued {}", worker.offline().enqueue(kind).await?);
        } else {
          match worker.submit(kind).await? {
            SubmitOutcome::Completed(response) => {
              println!("{} {}", response.status, response.text())
            }
            SubmitOutcome::Queued(id) => println!("queued {}", id),
          }
        }
      }
    },
    Command::Sync { tag } => send(&tx, HostEvent::Sync { tag })?,
    Command::Watch => {
      let probe = config.resolve(&config.connectivity.probe_path)?;
      let interval = Duration::from_secs(config.connectivity.interval_secs.max(1));
      let monitor = event::spawn_connectivity_monitor(network, probe, interval, tx.clone());
      tokio::signal::ctrl_c()
        .await
        .map_err(|e| eyre!("Failed to listen for ctrl-c: {}", e))?;
      monitor.abort();
    }
  }

  // Let queued events settle before exiting
  drop(tx);
  event_loop.await?;

  Ok(())
}

fn send(tx: &mpsc::UnboundedSender<HostEvent>, event: HostEvent) -> Result<()> {
  tx.send(event).map_err(|_| eyre!("Event loop stopped"))
}
