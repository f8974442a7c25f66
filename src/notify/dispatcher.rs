use color_eyre::Result;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use url::{Origin, Url};

use super::payload::{NotificationDefaults, NotificationPayload};
use crate::host::{ClientHost, WindowClient};

/// A click on a displayed notification.
#[derive(Debug, Clone)]
pub struct NotificationClick {
  pub tag: String,
  pub data: Value,
}

impl NotificationClick {
  /// Click on the body of `notification`
  #[allow(dead_code)]
  pub fn on(notification: &NotificationPayload) -> Self {
    Self {
      tag: notification.tag.clone(),
      data: notification.data.clone(),
    }
  }
}

/// What a click ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
  /// An existing window was focused (and navigated if it was elsewhere)
  Focused { client_id: String, navigated: bool },
  /// No usable window; a new one was opened
  Opened { url: String },
}

/// Shows push notifications and routes clicks to a window.
pub struct NotificationDispatcher<H> {
  host: Arc<H>,
  defaults: NotificationDefaults,
  origin: Url,
}

impl<H: ClientHost> NotificationDispatcher<H> {
  pub fn new(host: Arc<H>, defaults: NotificationDefaults, origin: Url) -> Self {
    Self {
      host,
      defaults,
      origin,
    }
  }

  /// Normalize a push message and display it. Waits until it is shown.
  pub async fn on_push(&self, raw: Option<&str>) -> Result<NotificationPayload> {
    let notification = NotificationPayload::from_push(raw, &self.defaults);
    self.host.show_notification(&notification).await?;
    Ok(notification)
  }

  /// Close the notification and bring the app to its target route.
  ///
  /// Searches every same-origin window, controlled or not. A window already
  /// showing the target wins, then the focused one, then the first. The
  /// chosen window is focused first and navigated second.
  pub async fn on_notification_click(&self, click: &NotificationClick) -> Result<ClickOutcome> {
    if let Err(e) = self.host.close_notification(&click.tag).await {
      warn!(tag = %click.tag, error = %e, "failed to close notification");
    }

    let target = self.target_url(&click.data);

    let window = match self.host.window_clients().await {
      Ok(clients) => self.pick_window(clients, &target),
      Err(e) => {
        warn!(error = %e, "failed to enumerate windows, opening a new one");
        None
      }
    };

    match window {
      Some(client) => {
        self.host.focus(&client.id).await?;
        let navigated = client.can_navigate && client.url != target.as_str();
        if navigated {
          self.host.navigate(&client.id, &target).await?;
        }
        debug!(client_id = %client.id, navigated, "focused existing window");
        Ok(ClickOutcome::Focused {
          client_id: client.id,
          navigated,
        })
      }
      None => {
        self.host.open_window(&target).await?;
        Ok(ClickOutcome::Opened {
          url: target.to_string(),
        })
      }
    }
  }

  /// `data.url` resolved against the origin, or the default route.
  fn target_url(&self, data: &Value) -> Url {
    let requested = data.get("url").and_then(Value::as_str);
    requested
      .and_then(|u| self.origin.join(u).ok())
      .or_else(|| self.origin.join(&self.defaults.default_url).ok())
      .unwrap_or_else(|| self.origin.clone())
  }

  fn pick_window(&self, clients: Vec<WindowClient>, target: &Url) -> Option<WindowClient> {
    let origin = self.origin.origin();
    let mut same_origin: Vec<WindowClient> = clients
      .into_iter()
      .filter(|c| is_same_origin(&c.url, &origin))
      .collect();

    let index = same_origin
      .iter()
      .position(|c| c.url == target.as_str())
      .or_else(|| same_origin.iter().position(|c| c.focused))
      .or_else(|| (!same_origin.is_empty()).then_some(0))?;

    Some(same_origin.swap_remove(index))
  }
}

fn is_same_origin(url: &str, origin: &Origin) -> bool {
  Url::parse(url).map(|u| &u.origin() == origin).unwrap_or(false)
}
