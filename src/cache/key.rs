//! Canonical request identities used as cache keys.

use sha2::{Digest, Sha256};

use crate::http::Request;

/// Identity of a cacheable request: method plus absolute URL.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RequestKey {
  method: String,
  url: String,
}

impl RequestKey {
  pub fn for_request(request: &Request) -> Self {
    Self {
      method: request.method.as_str().to_uppercase(),
      url: request.url.as_str().to_string(),
    }
  }

  /// Key for a GET of the given absolute URL.
  pub fn get(url: &url::Url) -> Self {
    Self {
      method: "GET".to_string(),
      url: url.as_str().to_string(),
    }
  }

  /// Stable, fixed-length key used by the stores.
  pub fn cache_hash(&self) -> String {
    let input = format!("{} {}", self.method, self.url);

    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
  }

  /// Human readable form, stored alongside the hash.
  pub fn description(&self) -> String {
    format!("{} {}", self.method, self.url)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  #[test]
  fn test_same_request_same_hash() {
    let url = Url::parse("https://app.test/api/events?page=2").unwrap();
    let a = RequestKey::for_request(&Request::get(url.clone()));
    let b = RequestKey::get(&url);
    assert_eq!(a.cache_hash(), b.cache_hash());
    assert_eq!(a.cache_hash().len(), 64);
  }

  #[test]
  fn test_query_string_is_part_of_identity() {
    let a = RequestKey::get(&Url::parse("https://app.test/api/events?page=1").unwrap());
    let b = RequestKey::get(&Url::parse("https://app.test/api/events?page=2").unwrap());
    assert_ne!(a.cache_hash(), b.cache_hash());
  }
}
