use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Template applied to every push; also carries the click landing route.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationDefaults {
  #[serde(default = "default_title")]
  pub title: String,
  #[serde(default = "default_body")]
  pub body: String,
  #[serde(default = "default_icon")]
  pub icon: String,
  #[serde(default = "default_badge")]
  pub badge: String,
  #[serde(default = "default_tag")]
  pub tag: String,
  /// Route opened on click when the notification carries no `data.url`
  #[serde(default = "default_url")]
  pub default_url: String,
}

fn default_title() -> String {
  "Floatly".to_string()
}

fn default_body() -> String {
  "You have a new notification".to_string()
}

fn default_icon() -> String {
  "/static/images/icon-192x192.png".to_string()
}

fn default_badge() -> String {
  "/static/images/icon-192x192.png".to_string()
}

fn default_tag() -> String {
  "floatly-notification".to_string()
}

fn default_url() -> String {
  "/dashboard/".to_string()
}

impl Default for NotificationDefaults {
  fn default() -> Self {
    Self {
      title: default_title(),
      body: default_body(),
      icon: default_icon(),
      badge: default_badge(),
      tag: default_tag(),
      default_url: default_url(),
    }
  }
}

/// A button shown on the notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

/// A fully populated notification, ready to display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NotificationPayload {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Replacement key at the platform level
  pub tag: String,
  pub data: Value,
  pub actions: Vec<NotificationAction>,
}

impl NotificationPayload {
  pub fn from_defaults(defaults: &NotificationDefaults) -> Self {
    Self {
      title: defaults.title.clone(),
      body: defaults.body.clone(),
      icon: defaults.icon.clone(),
      badge: defaults.badge.clone(),
      tag: defaults.tag.clone(),
      data: Value::Object(Default::default()),
      actions: Vec::new(),
    }
  }

  /// Build a notification from a raw push message.
  ///
  /// A JSON object overrides the defaults field by field; a field of the
  /// wrong type keeps its default without affecting the others. Text that
  /// is not JSON, and JSON that is not an object (`42`, `"hi"`, `[1]`), is
  /// shown verbatim as the body. An empty push shows the defaults.
  pub fn from_push(raw: Option<&str>, defaults: &NotificationDefaults) -> Self {
    let mut payload = Self::from_defaults(defaults);

    let Some(raw) = raw else {
      return payload;
    };

    let fields = match serde_json::from_str::<Value>(raw) {
      Ok(Value::Object(fields)) => fields,
      _ => {
        payload.body = raw.to_string();
        return payload;
      }
    };

    let text = |key: &str| fields.get(key).and_then(Value::as_str).map(str::to_string);

    if let Some(title) = text("title") {
      payload.title = title;
    }
    if let Some(body) = text("body") {
      payload.body = body;
    }
    if let Some(icon) = text("icon") {
      payload.icon = icon;
    }
    if let Some(badge) = text("badge") {
      payload.badge = badge;
    }
    if let Some(tag) = text("tag") {
      payload.tag = tag;
    }
    if let Some(data) = fields.get("data") {
      payload.data = data.clone();
    }
    if let Some(actions) = fields.get("actions") {
      match serde_json::from_value::<Vec<NotificationAction>>(actions.clone()) {
        Ok(actions) => payload.actions = actions,
        Err(e) => debug!(error = %e, "ignoring malformed notification actions"),
      }
    }

    payload
  }
}
