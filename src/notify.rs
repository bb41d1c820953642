//! Push notifications: payload parsing and click routing.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::config::NotificationDefaults;

/// A named button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  #[serde(default)]
  pub title: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub icon: Option<String>,
}

/// Inbound push payload. Every field is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushPayload {
  pub title: Option<String>,
  pub body: Option<String>,
  pub tag: Option<String>,
  pub data: Option<Map<String, Value>>,
  pub actions: Option<Vec<NotificationAction>>,
  pub require_interaction: Option<bool>,
  pub silent: Option<bool>,
}

/// What gets displayed for one push message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationIntent {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Notifications sharing a tag replace each other
  pub tag: String,
  pub data: Map<String, Value>,
  pub actions: Vec<NotificationAction>,
  pub require_interaction: bool,
  pub silent: bool,
}

impl NotificationIntent {
  pub fn from_payload(payload: PushPayload, defaults: &NotificationDefaults) -> Self {
    Self {
      title: payload.title.unwrap_or_else(|| defaults.title.clone()),
      body: payload.body.unwrap_or_else(|| defaults.body.clone()),
      icon: defaults.icon.clone(),
      badge: defaults.badge.clone(),
      tag: payload.tag.unwrap_or_else(|| defaults.tag.clone()),
      data: payload.data.unwrap_or_default(),
      actions: payload.actions.unwrap_or_default(),
      require_interaction: payload.require_interaction.unwrap_or(false),
      silent: payload.silent.unwrap_or(false),
    }
  }
}

/// Where a click on a notification leads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickRoute {
  /// Open an application view at this path
  Open(String),
  /// Mark the notification read on the server, opening nothing
  MarkRead(String),
}

/// Resolve a click into a route.
///
/// | action       | target                    |
/// |--------------|---------------------------|
/// | (none)       | `/`                       |
/// | `view_event` | `/events/{data.eventId}`  |
/// | `view_leave` | `/leaves/{data.leaveId}`  |
/// | `mark_read`  | mark `data.notificationId` read |
///
/// Unknown actions, and known ones whose id is missing, open `/`.
pub fn route_click(action: Option<&str>, data: &Map<String, Value>) -> ClickRoute {
  let root = || ClickRoute::Open("/".to_string());

  let Some(action) = action.filter(|a| !a.is_empty()) else {
    return root();
  };

  match action {
    "view_event" => id_field(data, "eventId")
      .map_or_else(root, |id| ClickRoute::Open(format!("/events/{}", id))),
    "view_leave" => id_field(data, "leaveId")
      .map_or_else(root, |id| ClickRoute::Open(format!("/leaves/{}", id))),
    "mark_read" => id_field(data, "notificationId").map_or_else(root, ClickRoute::MarkRead),
    _ => root(),
  }
}

/// Read an identifier that may arrive as a string or a number.
fn id_field(data: &Map<String, Value>, field: &str) -> Option<String> {
  match data.get(field)? {
    Value::String(s) if !s.is_empty() => Some(s.clone()),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}
