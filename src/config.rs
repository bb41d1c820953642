use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::CacheNames;
use crate::lifecycle::CacheGeneration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// The single application origin, e.g. "https://hr.example.com"
  pub origin: Url,
  #[serde(default)]
  pub cache: CacheConfig,
  /// Build artifacts fetched and stored at install time
  #[serde(default = "default_precache")]
  pub precache: Vec<String>,
  #[serde(default)]
  pub routes: RoutesConfig,
  /// Activate a freshly installed generation without waiting for old clients
  #[serde(default = "default_true")]
  pub skip_waiting: bool,
  /// Background sync tag that triggers a queue drain
  #[serde(default = "default_sync_tag")]
  pub sync_tag: String,
  #[serde(default)]
  pub notifications: NotificationDefaults,
  #[serde(default)]
  pub connectivity: ConnectivityConfig,
  /// Database path (defaults to the user data directory)
  pub database: Option<PathBuf>,
  /// Network timeout in seconds
  #[serde(default = "default_timeout")]
  pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Generation identifier reported over the control channel
  pub version: String,
  pub static_name: String,
  pub dynamic_name: String,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      version: "hrlead-v1.0.0".to_string(),
      static_name: "hrlead-static-v1".to_string(),
      dynamic_name: "hrlead-dynamic-v1".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutesConfig {
  pub api_prefix: String,
  pub static_prefix: String,
  /// Served to page requests that fail while offline
  pub offline_page: String,
  /// Served when even the offline page is not cached
  pub root_page: String,
}

impl Default for RoutesConfig {
  fn default() -> Self {
    Self {
      api_prefix: "/api/".to_string(),
      static_prefix: "/static/".to_string(),
      offline_page: "/offline.html".to_string(),
      root_page: "/".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
  pub title: String,
  pub body: String,
  pub tag: String,
  pub icon: String,
  pub badge: String,
}

impl Default for NotificationDefaults {
  fn default() -> Self {
    Self {
      title: "HRlead".to_string(),
      body: "Nouvelle notification".to_string(),
      tag: "hrlead-notification".to_string(),
      icon: "/favicon.ico".to_string(),
      badge: "/favicon.ico".to_string(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
  /// Path probed to detect that the origin is reachable again
  pub probe_path: String,
  pub interval_secs: u64,
}

impl Default for ConnectivityConfig {
  fn default() -> Self {
    Self {
      probe_path: "/".to_string(),
      interval_secs: 15,
    }
  }
}

fn default_precache() -> Vec<String> {
  [
    "/",
    "/index.html",
    "/static/js/bundle.js",
    "/static/css/main.css",
    "/manifest.json",
    "/favicon.ico",
    "/offline.html",
  ]
  .iter()
  .map(|s| s.to_string())
  .collect()
}

fn default_true() -> bool {
  true
}

fn default_sync_tag() -> String {
  "background-sync".to_string()
}

fn default_timeout() -> u64 {
  10
}

impl Config {
  /// Configuration with every optional field at its default.
  pub fn with_origin(origin: Url) -> Self {
    Self {
      origin,
      cache: CacheConfig::default(),
      precache: default_precache(),
      routes: RoutesConfig::default(),
      skip_waiting: true,
      sync_tag: default_sync_tag(),
      notifications: NotificationDefaults::default(),
      connectivity: ConnectivityConfig::default(),
      database: None,
      timeout_secs: default_timeout(),
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./offline-sync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/offline-sync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/offline-sync/config.yaml \
         with at least an `origin` entry."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("offline-sync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("offline-sync").join("config.yaml");
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

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents).map_err(|e| eyre!("{}", e))?;
    if config.cache.static_name == config.cache.dynamic_name {
      return Err(eyre!(
        "cache.static_name and cache.dynamic_name must differ (both are {})",
        config.cache.static_name
      ));
    }
    Ok(config)
  }

  /// Get the origin bearer token from the environment, if any.
  ///
  /// Checks OFFLINE_SYNC_TOKEN.
  pub fn get_token() -> Option<String> {
    std::env::var("OFFLINE_SYNC_TOKEN").ok().filter(|t| !t.is_empty())
  }

  /// Resolve an application path against the origin.
  pub fn resolve(&self, path: &str) -> Result<Url> {
    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid path {}: {}", path, e))
  }

  pub fn generation(&self) -> CacheGeneration {
    CacheGeneration {
      version: self.cache.version.clone(),
      names: CacheNames {
        static_cache: self.cache.static_name.clone(),
        dynamic_cache: self.cache.dynamic_name.clone(),
      },
    }
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.timeout_secs)
  }
}
