//! Request classification.

use reqwest::Method;

use crate::config::RoutesConfig;

/// Resource class, determining which caching strategy serves a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceClass {
  /// API calls: network first, cached copy when offline, JSON 503 otherwise
  Api,
  /// Build artifacts: cache first, network on miss
  Static,
  /// Everything else: network first, offline document when offline
  Page,
}

/// Prefix-based classifier over request paths.
#[derive(Debug, Clone)]
pub struct Router {
  api_prefix: String,
  static_prefix: String,
}

impl Router {
  pub fn new(routes: &RoutesConfig) -> Self {
    Self {
      api_prefix: routes.api_prefix.clone(),
      static_prefix: routes.static_prefix.clone(),
    }
  }

  /// Classify a request.
  ///
  /// Returns `None` for anything but GET; those requests are never intercepted.
  /// Every GET path maps to exactly one class, `Page` being the default.
  pub fn classify(&self, method: &Method, path: &str) -> Option<ResourceClass> {
    if *method != Method::GET {
      return None;
    }

    if path.starts_with(&self.api_prefix) {
      Some(ResourceClass::Api)
    } else if path.starts_with(&self.static_prefix) {
      Some(ResourceClass::Static)
    } else {
      Some(ResourceClass::Page)
    }
  }
}
