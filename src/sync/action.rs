//! Deferred mutating actions and how each one is replayed.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The mutating operations the application can defer while offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionKind {
  RegisterForEvent { payload: Value },
  CancelRegistration { registration_id: String },
  SubmitLeave { payload: Value },
  RecordAttendance { payload: Value },
  MarkNotificationRead { notification_id: String },
  /// Any other mutating call, replayed verbatim
  Request {
    method: String,
    path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    body: Option<Value>,
  },
}

/// The HTTP call an action replays as.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint<'a> {
  pub method: Method,
  pub path: String,
  pub body: Option<&'a Value>,
}

impl ActionKind {
  pub fn name(&self) -> &'static str {
    match self {
      Self::RegisterForEvent { .. } => "register_for_event",
      Self::CancelRegistration { .. } => "cancel_registration",
      Self::SubmitLeave { .. } => "submit_leave",
      Self::RecordAttendance { .. } => "record_attendance",
      Self::MarkNotificationRead { .. } => "mark_notification_read",
      Self::Request { .. } => "request",
    }
  }

  /// Map the action to the origin API call that performs it.
  pub fn endpoint(&self) -> Result<Endpoint<'_>> {
    let endpoint = match self {
      Self::RegisterForEvent { payload } => Endpoint {
        method: Method::POST,
        path: "/api/event-registrations/register".to_string(),
        body: Some(payload),
      },
      Self::CancelRegistration { registration_id } => Endpoint {
        method: Method::POST,
        path: format!("/api/event-registrations/{}/cancel", registration_id),
        body: None,
      },
      Self::SubmitLeave { payload } => Endpoint {
        method: Method::POST,
        path: "/api/leaves".to_string(),
        body: Some(payload),
      },
      Self::RecordAttendance { payload } => Endpoint {
        method: Method::POST,
        path: "/api/attendance".to_string(),
        body: Some(payload),
      },
      Self::MarkNotificationRead { notification_id } => Endpoint {
        method: Method::PUT,
        path: format!("/api/notifications/{}/read", notification_id),
        body: None,
      },
      Self::Request { method, path, body } => {
        let method = Method::from_bytes(method.to_uppercase().as_bytes())
          .map_err(|e| eyre!("Invalid method {}: {}", method, e))?;
        if method == Method::GET || method == Method::HEAD {
          return Err(eyre!("{} is not a mutating method", method));
        }
        Endpoint {
          method,
          path: path.clone(),
          body: body.as_ref(),
        }
      }
    };
    Ok(endpoint)
  }
}

/// One queued action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
  /// Unique id, also sent as the idempotency key on every replay
  pub id: String,
  pub kind: ActionKind,
  pub queued_at: DateTime<Utc>,
  /// Failed replay attempts so far
  pub attempts: u32,
  pub last_error: Option<String>,
}

impl PendingAction {
  pub fn new(kind: ActionKind) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      kind,
      queued_at: Utc::now(),
      attempts: 0,
      last_error: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_endpoints() {
    let register = ActionKind::RegisterForEvent {
      payload: json!({ "eventId": "42", "employeeId": "7" }),
    };
    let endpoint = register.endpoint().unwrap();
    assert_eq!(endpoint.method, Method::POST);
    assert_eq!(endpoint.path, "/api/event-registrations/register");
    assert_eq!(endpoint.body, Some(&json!({ "eventId": "42", "employeeId": "7" })));

    let cancel = ActionKind::CancelRegistration {
      registration_id: "3".to_string(),
    };
    assert_eq!(cancel.endpoint().unwrap().path, "/api/event-registrations/3/cancel");

    let read = ActionKind::MarkNotificationRead {
      notification_id: "5".to_string(),
    };
    let endpoint = read.endpoint().unwrap();
    assert_eq!(endpoint.method, Method::PUT);
    assert_eq!(endpoint.path, "/api/notifications/5/read");
    assert!(endpoint.body.is_none());
  }

  #[test]
  fn test_generic_request_must_mutate() {
    let patch = ActionKind::Request {
      method: "patch".to_string(),
      path: "/api/employees/1".to_string(),
      body: Some(json!({ "phone": "555" })),
    };
    assert_eq!(patch.endpoint().unwrap().method, Method::PATCH);

    let get = ActionKind::Request {
      method: "GET".to_string(),
      path: "/api/employees".to_string(),
      body: None,
    };
    assert!(get.endpoint().is_err());
  }

  #[test]
  fn test_kind_is_tagged() {
    let kind = ActionKind::SubmitLeave {
      payload: json!({ "days": 2 }),
    };
    let value = serde_json::to_value(&kind).unwrap();
    assert_eq!(value, json!({ "kind": "submit_leave", "payload": { "days": 2 } }));

    let parsed: ActionKind =
      serde_json::from_value(json!({ "kind": "cancel_registration", "registration_id": "8" }))
        .unwrap();
    assert_eq!(parsed.name(), "cancel_registration");
  }

  #[test]
  fn test_new_actions_get_unique_ids() {
    let a = PendingAction::new(ActionKind::SubmitLeave { payload: json!({}) });
    let b = PendingAction::new(ActionKind::SubmitLeave { payload: json!({}) });
    assert_ne!(a.id, b.id);
    assert_eq!(a.attempts, 0);
  }
}
