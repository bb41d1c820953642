//! Calls out to the display host: notifications and application windows.

use async_trait::async_trait;
use color_eyre::Result;
use tracing::info;
use url::Url;

use crate::notify::NotificationIntent;

/// The environment the worker runs inside.
#[async_trait]
pub trait Host: Send + Sync {
  /// Display a native notification. A notification with the same tag replaces the previous one.
  async fn show_notification(&self, intent: &NotificationIntent) -> Result<()>;

  /// Close the native notification view with this tag.
  async fn close_notification(&self, tag: &str) -> Result<()>;

  /// Open an application view at the given path.
  async fn open_window(&self, path: &str) -> Result<()>;

  /// Take control of every open application instance without a reload.
  async fn claim_clients(&self) -> Result<()>;
}

/// Host that renders everything on the terminal.
pub struct ConsoleHost {
  origin: Url,
}

impl ConsoleHost {
  pub fn new(origin: Url) -> Self {
    Self { origin }
  }
}

#[async_trait]
impl Host for ConsoleHost {
  async fn show_notification(&self, intent: &NotificationIntent) -> Result<()> {
    println!("[{}] {}", intent.tag, intent.title);
    println!("  {}", intent.body);
    for action in &intent.actions {
      println!("  ({}) {}", action.action, action.title);
    }
    Ok(())
  }

  async fn close_notification(&self, tag: &str) -> Result<()> {
    info!(tag, "Notification closed");
    Ok(())
  }

  async fn open_window(&self, path: &str) -> Result<()> {
    match self.origin.join(path) {
      Ok(url) => println!("open {}", url),
      Err(_) => println!("open {}", path),
    }
    Ok(())
  }

  async fn claim_clients(&self) -> Result<()> {
    info!("Clients claimed");
    Ok(())
  }
}
