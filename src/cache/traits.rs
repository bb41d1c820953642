//! Core traits and types for the caching system.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use color_eyre::Result;

use crate::http::{CachedResponse, Response};

use super::key::RequestKey;

/// Persistent named key -> response mappings.
///
/// A store springs into existence on its first write and disappears when
/// deleted. Implementations must make `put_all` atomic: either every entry is
/// written or none are.
#[async_trait]
pub trait CacheStore: Send + Sync {
  /// Names of every store currently holding entries.
  async fn cache_names(&self) -> Result<Vec<String>>;

  /// Look up a response in one store.
  async fn get(&self, cache_name: &str, key: &RequestKey) -> Result<Option<CachedResponse>>;

  /// Insert or replace a single entry.
  async fn put(&self, cache_name: &str, key: &RequestKey, response: &Response) -> Result<()>;

  /// Insert or replace a batch of entries in one transaction.
  async fn put_all(&self, cache_name: &str, entries: &[(RequestKey, Response)]) -> Result<()>;

  /// Remove one entry. Returns whether it existed.
  async fn delete(&self, cache_name: &str, key: &RequestKey) -> Result<bool>;

  /// Remove a whole store. Returns whether it existed.
  async fn delete_cache(&self, cache_name: &str) -> Result<bool>;
}

/// The two store names belonging to one cache generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
  pub static_cache: String,
  pub dynamic_cache: String,
}

impl CacheNames {
  pub fn contains(&self, name: &str) -> bool {
    self.static_cache == name || self.dynamic_cache == name
  }
}

/// Result from a strategy, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(data: T) -> Self {
    Self {
      data,
      source: CacheSource::Network,
      cached_at: None,
    }
  }

  /// Create a new cache result from cached data found before any fetch.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Cache,
      cached_at: Some(cached_at),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
    }
  }

  /// Create a result for a substitute document or synthesized response.
  pub fn fallback(data: T, cached_at: Option<DateTime<Utc>>) -> Self {
    Self {
      data,
      source: CacheSource::Fallback,
      cached_at,
    }
  }
}

/// Indicates where a response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Cache hit served without touching the network
  Cache,
  /// Network unavailable, serving the cached snapshot of the same request
  Offline,
  /// Network unavailable and nothing cached for the request itself
  Fallback,
}
