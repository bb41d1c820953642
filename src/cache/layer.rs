//! Cache strategies that combine the stores with live fetching.

use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use crate::http::{CachedResponse, Request, Response};
use crate::net::Network;
use crate::router::ResourceClass;

use super::key::RequestKey;
use super::traits::{CacheNames, CacheResult, CacheStore};

pub const API_OFFLINE_ERROR: &str = "Offline - Données non disponibles";
pub const API_OFFLINE_MESSAGE: &str = "Vérifiez votre connexion internet";
pub const STATIC_OFFLINE_BODY: &str = "Resource not available offline";

/// Response for an API request that failed offline with nothing cached.
pub fn api_offline_response() -> Response {
  let body = serde_json::json!({
    "error": API_OFFLINE_ERROR,
    "message": API_OFFLINE_MESSAGE,
  });

  Response::new(503, body.to_string())
    .with_status_text("Service Unavailable")
    .with_header("Content-Type", "application/json")
}

/// Response for a static asset that is neither cached nor fetchable.
pub fn static_offline_response() -> Response {
  Response::new(404, STATIC_OFFLINE_BODY)
    .with_status_text("Not Found")
    .with_header("Content-Type", "text/plain;charset=UTF-8")
}

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the application and the network,
/// providing transparent caching with offline support. Store failures
/// never fail a request: reads degrade to a miss, writes are skipped.
pub struct CacheLayer {
  store: Arc<dyn CacheStore>,
  network: Arc<dyn Network>,
  names: CacheNames,
  offline_page: Url,
  root_page: Url,
}

impl CacheLayer {
  pub fn new(
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    names: CacheNames,
    offline_page: Url,
    root_page: Url,
  ) -> Self {
    Self {
      store,
      network,
      names,
      offline_page,
      root_page,
    }
  }

  pub fn names(&self) -> &CacheNames {
    &self.names
  }

  /// The same layer reading and writing another generation's stores.
  pub fn for_generation(&self, names: CacheNames) -> Self {
    Self {
      store: self.store.clone(),
      network: self.network.clone(),
      names,
      offline_page: self.offline_page.clone(),
      root_page: self.root_page.clone(),
    }
  }

  /// Serve a request with the strategy matching its class.
  ///
  /// `None` means no response could be produced at all (a page request while
  /// offline with neither the offline nor the root document cached).
  pub async fn handle(
    &self,
    class: ResourceClass,
    request: &Request,
  ) -> Option<CacheResult<Response>> {
    match class {
      ResourceClass::Api | ResourceClass::Page => self.network_first(class, request).await,
      ResourceClass::Static => Some(self.cache_first(request).await),
    }
  }

  /// Network-first strategy.
  ///
  /// 1. Fetch live; a 2xx response is written into the dynamic store
  /// 2. Any live response is returned as is, whatever its status
  /// 3. On transport failure, serve the cached snapshot of the same request
  /// 4. Otherwise fall back per class: JSON 503 for API, offline document for pages
  pub async fn network_first(
    &self,
    class: ResourceClass,
    request: &Request,
  ) -> Option<CacheResult<Response>> {
    let key = RequestKey::for_request(request);

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.ok() {
          self
            .write_through(
              &self.names.dynamic_cache,
              &self.names.static_cache,
              &key,
              &response,
            )
            .await;
        }
        Some(CacheResult::from_network(response))
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Network failed, trying cache");

        let order = [&self.names.dynamic_cache, &self.names.static_cache];
        if let Some(cached) = self.lookup(&order, &key).await {
          return Some(CacheResult::offline(cached.response, cached.cached_at));
        }

        match class {
          ResourceClass::Api => Some(CacheResult::fallback(api_offline_response(), None)),
          _ => self.offline_document().await,
        }
      }
    }
  }

  /// Cache-first strategy.
  ///
  /// 1. Check the static store, then the dynamic one; a hit never touches the network
  /// 2. On miss, fetch live; a 2xx response is written into the static store
  /// 3. On transport failure, answer 404
  pub async fn cache_first(&self, request: &Request) -> CacheResult<Response> {
    let key = RequestKey::for_request(request);

    let order = [&self.names.static_cache, &self.names.dynamic_cache];
    if let Some(cached) = self.lookup(&order, &key).await {
      return CacheResult::from_cache(cached.response, cached.cached_at);
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.ok() {
          self
            .write_through(
              &self.names.static_cache,
              &self.names.dynamic_cache,
              &key,
              &response,
            )
            .await;
        }
        CacheResult::from_network(response)
      }
      Err(e) => {
        debug!(url = %request.url, error = %e, "Static resource fetch failed");
        CacheResult::fallback(static_offline_response(), None)
      }
    }
  }

  /// Store a response and evict the same key from the sibling store.
  async fn write_through(
    &self,
    target: &str,
    sibling: &str,
    key: &RequestKey,
    response: &Response,
  ) {
    if let Err(e) = self.store.put(target, key, response).await {
      warn!(cache = target, request = %key.description(), error = %e, "Skipping cache write");
      return;
    }

    if let Err(e) = self.store.delete(sibling, key).await {
      warn!(cache = sibling, request = %key.description(), error = %e, "Failed to evict duplicate entry");
    }
  }

  /// Look the key up in each store in turn. Read errors count as a miss.
  async fn lookup(&self, caches: &[&String], key: &RequestKey) -> Option<CachedResponse> {
    for cache in caches {
      match self.store.get(cache, key).await {
        Ok(Some(cached)) => return Some(cached),
        Ok(None) => {}
        Err(e) => {
          warn!(cache = %cache, request = %key.description(), error = %e, "Cache read failed");
        }
      }
    }
    None
  }

  /// The cached offline document, or failing that the cached root document.
  async fn offline_document(&self) -> Option<CacheResult<Response>> {
    let order = [&self.names.static_cache, &self.names.dynamic_cache];

    for page in [&self.offline_page, &self.root_page] {
      if let Some(cached) = self.lookup(&order, &RequestKey::get(page)).await {
        debug!(page = %page, "Serving offline document");
        return Some(CacheResult::fallback(cached.response, Some(cached.cached_at)));
      }
    }

    warn!("No offline document cached");
    None
  }
}
