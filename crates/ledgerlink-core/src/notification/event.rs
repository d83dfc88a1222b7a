use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

fn default_kind() -> String {
    "INFO".into()
}

/// A server-pushed notification.
///
/// `seen` and `toast_shown` are local bookkeeping; the server never sends
/// them, so they default to `false` on arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    #[serde(default)]
    pub id: Option<String>,
    /// Event type, e.g. `"LOAN_APPROVED"`, `"TRANSFER"`.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
    #[serde(alias = "content")]
    pub message: String,
    #[serde(default, alias = "createdAt")]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub seen: bool,
    #[serde(default)]
    pub toast_shown: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl NotificationEvent {
    /// Decode one inbound payload. Numeric ids are accepted and
    /// normalized to strings.
    pub fn decode(payload: &str) -> Result<Self, serde_json::Error> {
        let mut value: Value = serde_json::from_str(payload)?;
        if let Some(id) = value.get_mut("id") {
            if let Some(n) = id.as_i64() {
                *id = Value::String(n.to_string());
            }
        }
        serde_json::from_value(value)
    }

    /// A locally synthesized event (e.g. a client-side confirmation).
    pub fn local(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            message: message.into(),
            timestamp: Some(chrono::Utc::now().to_rfc3339()),
            seen: false,
            toast_shown: false,
            extra: Map::new(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn decodes_server_payload() {
        let event = NotificationEvent::decode(
            r#"{"id":12,"type":"LOAN_APPROVED","content":"Your loan was approved","timestamp":"2026-03-01T10:00:00Z","loanId":7}"#,
        )
        .unwrap();

        assert_eq!(event.id.as_deref(), Some("12"));
        assert_eq!(event.kind, "LOAN_APPROVED");
        assert_eq!(event.message, "Your loan was approved");
        assert!(!event.seen && !event.toast_shown);
        assert_eq!(event.extra["loanId"], 7);
    }

    #[test]
    fn missing_type_defaults_to_info() {
        let event = NotificationEvent::decode(r#"{"message":"hello"}"#).unwrap();
        assert_eq!(event.kind, "INFO");
        assert!(event.id.is_none());
    }

    #[test]
    fn missing_message_or_bad_json_is_rejected() {
        assert!(NotificationEvent::decode(r#"{"type":"INFO"}"#).is_err());
        assert!(NotificationEvent::decode("{oops").is_err());
        assert!(NotificationEvent::decode("[1,2]").is_err());
    }
}
