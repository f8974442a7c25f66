//! Platform capabilities the worker relies on for windows and notifications.

use color_eyre::Result;
use std::future::Future;
use tracing::info;
use url::Url;

use crate::notify::NotificationPayload;

/// A window belonging to the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowClient {
  pub id: String,
  pub url: String,
  pub focused: bool,
  /// Whether the platform allows redirecting this window
  pub can_navigate: bool,
}

/// Host-provided windows and system notifications.
pub trait ClientHost: Send + Sync {
  /// Display a notification; resolves once it is shown.
  fn show_notification(
    &self,
    notification: &NotificationPayload,
  ) -> impl Future<Output = Result<()>> + Send;

  /// Dismiss the notification carrying `tag`.
  fn close_notification(&self, tag: &str) -> impl Future<Output = Result<()>> + Send;

  /// Every open window, controlled by this worker or not.
  fn window_clients(&self) -> impl Future<Output = Result<Vec<WindowClient>>> + Send;

  fn focus(&self, client_id: &str) -> impl Future<Output = Result<()>> + Send;

  fn navigate(&self, client_id: &str, url: &Url) -> impl Future<Output = Result<()>> + Send;

  fn open_window(&self, url: &Url) -> impl Future<Output = Result<()>> + Send;

  /// Take control of all open windows. Returns how many were claimed.
  fn claim(&self) -> impl Future<Output = Result<usize>> + Send;
}

/// Host for the command line: notifications are printed, no windows exist.
#[derive(Debug, Default, Clone)]
pub struct ConsoleHost;

impl ClientHost for ConsoleHost {
  async fn show_notification(&self, notification: &NotificationPayload) -> Result<()> {
    info!(tag = %notification.tag, "showing notification");
    println!("[{}] {}", notification.title, notification.body);
    for action in &notification.actions {
      println!("  ({}) {}", action.action, action.title);
    }
    Ok(())
  }

  async fn close_notification(&self, tag: &str) -> Result<()> {
    info!(tag, "closing notification");
    Ok(())
  }

  async fn window_clients(&self) -> Result<Vec<WindowClient>> {
    Ok(Vec::new())
  }

  async fn focus(&self, client_id: &str) -> Result<()> {
    info!(client_id, "focus window");
    Ok(())
  }

  async fn navigate(&self, client_id: &str, url: &Url) -> Result<()> {
    info!(client_id, url = %url, "navigate window");
    Ok(())
  }

  async fn open_window(&self, url: &Url) -> Result<()> {
    println!("Open {}", url);
    Ok(())
  }

  async fn claim(&self) -> Result<usize> {
    Ok(0)
  }
}
