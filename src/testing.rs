//! Fakes for the injected collaborators.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::host::Host;
use crate::http::{Request, Response};
use crate::net::Network;
use crate::notify::NotificationIntent;

pub const ORIGIN: &str = "https://hr.example.com";

pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

enum Route {
  Respond(Response),
  Fail,
}

/// Scripted network keyed by path (including the query string).
///
/// Unknown paths answer 404; `set_offline(true)` fails every request.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Route>>,
  calls: Mutex<Vec<Request>>,
  offline: AtomicBool,
}

fn route_key(url: &Url) -> String {
  match url.query() {
    Some(q) => format!("{}?{}", url.path(), q),
    None => url.path().to_string(),
  }
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn respond(&self, path: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(path.to_string(), Route::Respond(response));
  }

  pub fn fail(&self, path: &str) {
    self.routes.lock().unwrap().insert(path.to_string(), Route::Fail);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn calls(&self) -> Vec<Request> {
    self.calls.lock().unwrap().clone()
  }

  pub fn call_count(&self, path: &str) -> usize {
    self
      .calls
      .lock()
      .unwrap()
      .iter()
      .filter(|r| route_key(&r.url) == path)
      .count()
  }
}

#[async_trait]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.calls.lock().unwrap().push(request.clone());

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("network unreachable"));
    }

    match self.routes.lock().unwrap().get(&route_key(&request.url)) {
      Some(Route::Respond(response)) => Ok(response.clone()),
      Some(Route::Fail) => Err(eyre!("connection reset")),
      None => Ok(Response::new(404, "not found")),
    }
  }
}

/// Host that records every call.
#[derive(Default)]
pub struct RecordingHost {
  pub shown: Mutex<Vec<NotificationIntent>>,
  pub closed: Mutex<Vec<String>>,
  pub opened: Mutex<Vec<String>>,
  pub claims: Mutex<usize>,
}

impl RecordingHost {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn opened(&self) -> Vec<String> {
    self.opened.lock().unwrap().clone()
  }

  pub fn closed(&self) -> Vec<String> {
    self.closed.lock().unwrap().clone()
  }

  pub fn shown(&self) -> Vec<NotificationIntent> {
    self.shown.lock().unwrap().clone()
  }

  pub fn claims(&self) -> usize {
    *self.claims.lock().unwrap()
  }
}

#[async_trait]
impl Host for RecordingHost {
  async fn show_notification(&self, intent: &NotificationIntent) -> Result<()> {
    self.shown.lock().unwrap().push(intent.clone());
    Ok(())
  }

  async fn close_notification(&self, tag: &str) -> Result<()> {
    self.closed.lock().unwrap().push(tag.to_string());
    Ok(())
  }

  async fn open_window(&self, path: &str) -> Result<()> {
    self.opened.lock().unwrap().push(path.to_string());
    Ok(())
  }

  async fn claim_clients(&self) -> Result<()> {
    *self.claims.lock().unwrap() += 1;
    Ok(())
  }
}
