//! Response caching for offline support.
//!
//! This module provides:
//! - Named key -> response stores (`static` for build artifacts, `dynamic` for runtime responses)
//! - SQLite and in-memory store implementations
//! - The network-first and cache-first strategies that read and write them

mod key;
mod layer;
mod memory;
mod storage;
mod traits;

pub use key::RequestKey;
pub use layer::{api_offline_response, static_offline_response, CacheLayer};
pub use memory::MemoryStorage;
pub use storage::SqliteStorage;
pub use traits::{CacheNames, CacheResult, CacheSource, CacheStore};
