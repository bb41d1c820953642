//! In-memory cache store.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use crate::http::{CachedResponse, Response};

use super::key::RequestKey;
use super::traits::CacheStore;

/// In-memory store.
///
/// Useful for testing and for hosts that don't need persistence. All data is
/// lost on drop.
#[derive(Default)]
pub struct MemoryStorage {
  caches: RwLock<BTreeMap<String, HashMap<String, CachedResponse>>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }

  /// Number of entries held in one store.
  #[cfg(test)]
  pub fn len(&self, cache_name: &str) -> usize {
    self
      .caches
      .read()
      .map(|caches| caches.get(cache_name).map_or(0, HashMap::len))
      .unwrap_or(0)
  }
}

#[async_trait]
impl CacheStore for MemoryStorage {
  async fn cache_names(&self) -> Result<Vec<String>> {
    let caches = self.caches.read().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(caches.keys().cloned().collect())
  }

  async fn get(&self, cache_name: &str, key: &RequestKey) -> Result<Option<CachedResponse>> {
    let caches = self.caches.read().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(
      caches
        .get(cache_name)
        .and_then(|cache| cache.get(&key.cache_hash()))
        .cloned(),
    )
  }

  async fn put(&self, cache_name: &str, key: &RequestKey, response: &Response) -> Result<()> {
    self.put_all(cache_name, &[(key.clone(), response.clone())]).await
  }

  async fn put_all(&self, cache_name: &str, entries: &[(RequestKey, Response)]) -> Result<()> {
    if entries.is_empty() {
      return Ok(());
    }
    let mut caches = self.caches.write().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let cache = caches.entry(cache_name.to_string()).or_default();
    for (key, response) in entries {
      cache.insert(
        key.cache_hash(),
        CachedResponse {
          response: response.clone(),
          cached_at: Utc::now(),
        },
      );
    }
    Ok(())
  }

  async fn delete(&self, cache_name: &str, key: &RequestKey) -> Result<bool> {
    let mut caches = self.caches.write().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let Some(cache) = caches.get_mut(cache_name) else {
      return Ok(false);
    };
    let removed = cache.remove(&key.cache_hash()).is_some();
    if cache.is_empty() {
      caches.remove(cache_name);
    }
    Ok(removed)
  }

  async fn delete_cache(&self, cache_name: &str) -> Result<bool> {
    let mut caches = self.caches.write().map_err(|e| eyre!("Lock poisoned: {}", e))?;
    Ok(caches.remove(cache_name).is_some())
  }
}
