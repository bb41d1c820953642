//! Control channel between the hosting application and the worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// A message posted by the hosting application.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  /// Activate an installed, waiting generation immediately
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
  /// Reply with the active generation identifier
  #[serde(rename = "GET_VERSION")]
  GetVersion,
}

impl ControlMessage {
  /// Parse a posted message. Unrecognized or malformed messages yield `None`
  /// and are ignored by the worker.
  pub fn parse(message: &Value) -> Option<Self> {
    match serde_json::from_value(message.clone()) {
      Ok(msg) => Some(msg),
      Err(e) => {
        debug!(error = %e, "Ignoring control message");
        None
      }
    }
  }
}

/// Reply to `GET_VERSION`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionReply {
  pub version: String,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn test_known_messages() {
    assert_eq!(
      ControlMessage::parse(&json!({ "type": "SKIP_WAITING" })),
      Some(ControlMessage::SkipWaiting)
    );
    assert_eq!(
      ControlMessage::parse(&json!({ "type": "GET_VERSION", "extra": 1 })),
      Some(ControlMessage::GetVersion)
    );
  }

  #[test]
  fn test_unknown_messages_are_ignored() {
    assert_eq!(ControlMessage::parse(&json!({ "type": "CLEAR_CACHE" })), None);
    assert_eq!(ControlMessage::parse(&json!({ "kind": "GET_VERSION" })), None);
    assert_eq!(ControlMessage::parse(&json!("GET_VERSION")), None);
    assert_eq!(ControlMessage::parse(&Value::Null), None);
  }

  #[test]
  fn test_version_reply_shape() {
    let reply = VersionReply {
      version: "hrlead-v1.0.0".to_string(),
    };
    assert_eq!(
      serde_json::to_value(&reply).unwrap(),
      json!({ "version": "hrlead-v1.0.0" })
    );
  }
}
