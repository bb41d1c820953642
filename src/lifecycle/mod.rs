//! Generation lifecycle: install, activate, and the version query.

mod record;

pub use record::{GenerationRecord, MemoryGenerationRecord, SqliteGenerationRecord};

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{error, info, warn};
use url::Url;

use crate::cache::{CacheNames, CacheStore, RequestKey};
use crate::host::Host;
use crate::http::Request;
use crate::net::Network;

/// One versioned deployment of the static cache set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheGeneration {
  pub version: String,
  pub names: CacheNames,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
  Installing,
  Waiting,
  Active,
  Redundant,
}

#[derive(Default)]
struct Slots {
  installing: Option<CacheGeneration>,
  waiting: Option<CacheGeneration>,
  active: Option<CacheGeneration>,
  redundant: Vec<String>,
  skip_waiting: bool,
}

/// Owns cache population and the per-generation state machine.
///
/// At most one generation is active at a time. A generation reaches the
/// waiting slot only once its whole manifest is stored.
pub struct LifecycleController {
  store: Arc<dyn CacheStore>,
  network: Arc<dyn Network>,
  host: Arc<dyn Host>,
  record: Arc<dyn GenerationRecord>,
  slots: Mutex<Slots>,
}

impl LifecycleController {
  pub fn new(
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    host: Arc<dyn Host>,
    record: Arc<dyn GenerationRecord>,
  ) -> Self {
    Self {
      store,
      network,
      host,
      record,
      slots: Mutex::new(Slots::default()),
    }
  }

  fn slots(&self) -> MutexGuard<'_, Slots> {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Fetch the whole manifest and store it in the generation's static cache.
  ///
  /// All-or-nothing: if any entry fails to fetch or answers non-2xx, nothing is
  /// written, the generation becomes redundant and the active one keeps serving.
  pub async fn install(&self, generation: CacheGeneration, manifest: &[Url]) -> Result<()> {
    info!(version = %generation.version, files = manifest.len(), "Installing");
    self.slots().installing = Some(generation.clone());

    match self.precache(&generation, manifest).await {
      Ok(()) => {
        info!(version = %generation.version, "Static files cached");
        let mut slots = self.slots();
        slots.installing = None;
        if let Some(previous) = slots.waiting.replace(generation) {
          slots.redundant.push(previous.version);
        }
        Ok(())
      }
      Err(e) => {
        error!(version = %generation.version, error = %e, "Cache install failed");
        let mut slots = self.slots();
        slots.installing = None;
        slots.redundant.push(generation.version);
        Err(e)
      }
    }
  }

  async fn precache(&self, generation: &CacheGeneration, manifest: &[Url]) -> Result<()> {
    let fetches = manifest.iter().map(|url| async move {
      let request = Request::get(url.clone());
      let response = self
        .network
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to precache {}: {}", url, e))?;

      if !response.ok() {
        return Err(eyre!(
          "Failed to precache {}: status {}",
          url,
          response.status
        ));
      }

      Ok((RequestKey::for_request(&request), response))
    });

    let entries = try_join_all(fetches).await?;

    self
      .store
      .put_all(&generation.names.static_cache, &entries)
      .await?;

    // A key lives in one store only
    for (key, _) in &entries {
      if let Err(e) = self.store.delete(&generation.names.dynamic_cache, key).await {
        warn!(cache = %generation.names.dynamic_cache, request = %key.description(), error = %e, "Failed to evict duplicate entry");
      }
    }
    Ok(())
  }

  /// Flag the waiting generation for immediate activation.
  ///
  /// Returns whether a generation is currently waiting.
  pub fn skip_waiting(&self) -> bool {
    let mut slots = self.slots();
    slots.skip_waiting = true;
    slots.waiting.is_some()
  }

  /// Whether the waiting generation should be activated right away.
  pub fn should_activate(&self) -> bool {
    let slots = self.slots();
    slots.skip_waiting && slots.waiting.is_some()
  }

  /// Promote the waiting generation.
  ///
  /// Deletes every cache store other than the new generation's two, then
  /// claims all open clients. Cleanup is best-effort: a store that fails to
  /// delete is logged and left behind.
  pub async fn activate(&self) -> Result<()> {
    let generation = self
      .slots()
      .waiting
      .clone()
      .ok_or_else(|| eyre!("No installed generation is waiting to activate"))?;

    info!(version = %generation.version, "Activating");

    let cache_names = match self.store.cache_names().await {
      Ok(names) => names,
      Err(e) => {
        warn!(error = %e, "Failed to list caches, skipping cleanup");
        Vec::new()
      }
    };

    for name in cache_names {
      if generation.names.contains(&name) {
        continue;
      }
      info!(cache = %name, "Deleting old cache");
      if let Err(e) = self.store.delete_cache(&name).await {
        warn!(cache = %name, error = %e, "Failed to delete old cache");
      }
    }

    {
      let mut slots = self.slots();
      if let Some(previous) = slots.active.take() {
        if previous.version != generation.version {
          slots.redundant.push(previous.version);
        }
      }
      slots.waiting = None;
      slots.skip_waiting = false;
      slots.active = Some(generation.clone());
    }
    info!("Old caches cleaned");

    if let Err(e) = self.record.set_active(&generation).await {
      warn!(version = %generation.version, error = %e, "Failed to record active generation");
    }

    if let Err(e) = self.host.claim_clients().await {
      warn!(error = %e, "Failed to claim clients");
    }

    Ok(())
  }

  /// Restore the generation an earlier run activated.
  ///
  /// Returns true only when that generation is `generation` itself and its
  /// static store is intact. Any other recorded generation is restored as
  /// active and keeps serving until `generation` is installed and activated.
  pub async fn resume(&self, generation: &CacheGeneration, manifest_len: usize) -> Result<bool> {
    let Some(active) = self.record.active().await? else {
      return Ok(false);
    };

    info!(version = %active.version, "Restoring active generation");
    let current = active == *generation;
    self.slots().active = Some(active);
    if !current {
      return Ok(false);
    }

    let names = self.store.cache_names().await?;
    if manifest_len > 0 && !names.contains(&generation.names.static_cache) {
      warn!(cache = %generation.names.static_cache, "Static cache missing, reinstalling");
      return Ok(false);
    }
    Ok(true)
  }

  /// Identifier of the active generation.
  pub fn version(&self) -> Option<String> {
    self.slots().active.as_ref().map(|g| g.version.clone())
  }

  pub fn active(&self) -> Option<CacheGeneration> {
    self.slots().active.clone()
  }

  /// Current state of a generation, if it has been seen at all.
  pub fn state(&self, version: &str) -> Option<LifecycleState> {
    let slots = self.slots();
    let is = |slot: &Option<CacheGeneration>| slot.as_ref().is_some_and(|g| g.version == version);

    if is(&slots.active) {
      Some(LifecycleState::Active)
    } else if is(&slots.waiting) {
      Some(LifecycleState::Waiting)
    } else if is(&slots.installing) {
      Some(LifecycleState::Installing)
    } else if slots.redundant.iter().any(|v| v == version) {
      Some(LifecycleState::Redundant)
    } else {
      None
    }
  }
}
