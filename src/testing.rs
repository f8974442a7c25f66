//! Scripted network and host fakes shared by the unit tests.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use url::Url;

use crate::config::Config;
use crate::host::{ClientHost, WindowClient};
use crate::http::{Method, Network, Request, Response};
use crate::notify::NotificationPayload;

pub const ORIGIN: &str = "https://floatly.test";
pub const CACHE_NAME: &str = "floatly-v1.0.1";
pub const SYNC_TAG: &str = "sync-transactions";

/// Resolve a path (or absolute URL) against the test origin.
pub fn url(path: &str) -> Url {
  Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

pub fn test_config() -> Config {
  let mut config = Config {
    origin: ORIGIN.to_string(),
    ..Config::default()
  };
  config.cache.version = CACHE_NAME.to_string();
  config.cache.precache = ["/", "/offline/", "/static/css/output.css", "/static/js/app.js"]
    .into_iter()
    .map(String::from)
    .collect();
  config
}

pub fn window(id: &str, path: &str, focused: bool) -> WindowClient {
  WindowClient {
    id: id.to_string(),
    url: url(path).to_string(),
    focused,
    can_navigate: true,
  }
}

/// Scripted reply to a POST
#[derive(Debug, Clone, Copy)]
pub enum Reply {
  Status(u16),
  Offline,
}

/// Network serving routed GETs and scripted POST replies.
///
/// Unrouted GETs get a 404; unscripted POSTs get a 201.
#[derive(Default)]
pub struct FakeNetwork {
  routes: Mutex<HashMap<String, Response>>,
  posts: Mutex<VecDeque<Reply>>,
  offline: AtomicBool,
  requests: Mutex<Vec<Request>>,
}

impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, path: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url(path).to_string(), response);
  }

  pub fn script_posts(&self, replies: impl IntoIterator<Item = Reply>) {
    self.posts.lock().unwrap().extend(replies);
  }

  pub fn set_offline(&self, offline: bool) {
    self.offline.store(offline, Ordering::SeqCst);
  }

  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().unwrap().clone()
  }

  /// JSON bodies of every POST attempt, in order
  pub fn posted_payloads(&self) -> Vec<Value> {
    self
      .requests()
      .iter()
      .filter(|r| r.method == Method::Post)
      .filter_map(|r| r.body.as_deref())
      .map(|body| serde_json::from_slice(body).unwrap())
      .collect()
  }
}

impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    self.requests.lock().unwrap().push(request.clone());

    if self.offline.load(Ordering::SeqCst) {
      return Err(eyre!("{} {} failed: network unreachable", request.method, request.url));
    }

    if request.method == Method::Post {
      let reply = self.posts.lock().unwrap().pop_front();
      return match reply {
        Some(Reply::Offline) => Err(eyre!("POST {} failed: connection reset", request.url)),
        Some(Reply::Status(status)) => Ok(Response::new(status, "")),
        None => Ok(Response::new(201, "")),
      };
    }

    let routed = self.routes.lock().unwrap().get(request.url.as_str()).cloned();
    Ok(routed.unwrap_or_else(|| Response::new(404, "Not Found")))
  }
}

/// Side effects recorded by `FakeHost`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCall {
  Show(String),
  Close(String),
  Focus(String),
  Navigate(String, Url),
  Open(Url),
  Claim,
}

pub struct FakeHost {
  windows: Option<Vec<WindowClient>>,
  shown: Mutex<Vec<NotificationPayload>>,
  calls: Mutex<Vec<HostCall>>,
}

impl FakeHost {
  pub fn new() -> Self {
    Self::with_windows(Vec::new())
  }

  pub fn with_windows(windows: Vec<WindowClient>) -> Self {
    Self {
      windows: Some(windows),
      shown: Mutex::new(Vec::new()),
      calls: Mutex::new(Vec::new()),
    }
  }

  /// Host whose window enumeration always fails
  pub fn failing_enumeration() -> Self {
    Self {
      windows: None,
      ..Self::new()
    }
  }

  pub fn shown(&self) -> Vec<NotificationPayload> {
    self.shown.lock().unwrap().clone()
  }

  pub fn calls(&self) -> Vec<HostCall> {
    self.calls.lock().unwrap().clone()
  }

  fn record(&self, call: HostCall) {
    self.calls.lock().unwrap().push(call);
  }
}

impl ClientHost for FakeHost {
  async fn show_notification(&self, notification: &NotificationPayload) -> Result<()> {
    self.record(HostCall::Show(notification.tag.clone()));
    self.shown.lock().unwrap().push(notification.clone());
    Ok(())
  }

  async fn close_notification(&self, tag: &str) -> Result<()> {
    self.record(HostCall::Close(tag.to_string()));
    Ok(())
  }

  async fn window_clients(&self) -> Result<Vec<WindowClient>> {
    self
      .windows
      .clone()
      .ok_or_else(|| eyre!("clients.matchAll rejected"))
  }

  async fn focus(&self, client_id: &str) -> Result<()> {
    self.record(HostCall::Focus(client_id.to_string()));
    Ok(())
  }

  async fn navigate(&self, client_id: &str, url: &Url) -> Result<()> {
    self.record(HostCall::Navigate(client_id.to_string(), url.clone()));
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    self.record(HostCall::Open(url.clone()));
    Ok(())
  }

  async fn claim(&self) -> Result<usize> {
    self.record(HostCall::Claim);
    Ok(1)
  }
}
