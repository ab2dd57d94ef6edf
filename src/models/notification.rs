use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Who a notification is addressed to: a known recipient id whose delivery
/// token must be looked up, or a raw delivery token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipient {
    User(String),
    Token(String),
}

impl Recipient {
    /// Prefers an explicit token over a recipient id, mirroring the relay's
    /// request bodies where either may be supplied.
    pub fn from_parts(user_id: Option<String>, token: Option<String>) -> Self {
        match token {
            Some(token) if !token.trim().is_empty() => Recipient::Token(token),
            _ => Recipient::User(user_id.unwrap_or_default()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Recipient::User(id) => id.trim().is_empty(),
            Recipient::Token(token) => token.trim().is_empty(),
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        match self {
            Recipient::User(id) => Some(id),
            Recipient::Token(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NotificationKind {
    General,
    HelpRequest {
        request_id: String,
        sender_name: String,
    },
    HelpResponse {
        request_id: String,
        responder_name: String,
        accepted: bool,
    },
    ChatMessage {
        sender_name: String,
        chat_id: Option<String>,
    },
    Test,
    Emergency {
        sender_name: String,
        latitude: Option<f64>,
        longitude: Option<f64>,
    },
}

impl NotificationKind {
    /// Wire value for the `type` data field.
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::General => "general",
            NotificationKind::HelpRequest { .. } => "help_request",
            NotificationKind::HelpResponse { .. } => "help_response",
            NotificationKind::ChatMessage { .. } => "chat_message",
            NotificationKind::Test => "test",
            NotificationKind::Emergency { .. } => "emergency",
        }
    }
}

/// Platform-specific delivery overrides passed through from callers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryHints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub android: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apns: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRequest {
    pub recipient: Recipient,
    pub title: String,
    pub body: String,
    pub kind: NotificationKind,
    pub data: BTreeMap<String, String>,
    pub hints: DeliveryHints,
}

impl NotificationRequest {
    pub fn new(recipient: Recipient, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            recipient,
            title: title.into(),
            body: body.into(),
            kind: NotificationKind::General,
            data: BTreeMap::new(),
            hints: DeliveryHints::default(),
        }
    }

    pub fn with_kind(mut self, kind: NotificationKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_data(mut self, data: BTreeMap<String, String>) -> Self {
        self.data.extend(data);
        self
    }

    pub fn with_hints(mut self, hints: DeliveryHints) -> Self {
        self.hints = hints;
        self
    }

    pub fn help_request(recipient: Recipient, sender_name: &str, request_id: &str) -> Self {
        Self::new(
            recipient,
            "New help request",
            format!("You have a new help request from {sender_name}"),
        )
        .with_kind(NotificationKind::HelpRequest {
            request_id: request_id.to_string(),
            sender_name: sender_name.to_string(),
        })
    }

    pub fn help_response(
        recipient: Recipient,
        responder_name: &str,
        request_id: &str,
        accepted: bool,
    ) -> Self {
        let (title, verb) = if accepted {
            ("Help request accepted", "accepted")
        } else {
            ("Help request declined", "declined")
        };
        Self::new(
            recipient,
            title,
            format!("Your help request was {verb} by {responder_name}"),
        )
        .with_kind(NotificationKind::HelpResponse {
            request_id: request_id.to_string(),
            responder_name: responder_name.to_string(),
            accepted,
        })
    }

    /// The body carries the full message; display truncation happens when the
    /// delivery payload is built.
    pub fn chat_message(
        recipient: Recipient,
        sender_name: &str,
        message_content: &str,
        chat_id: Option<String>,
    ) -> Self {
        Self::new(
            recipient,
            format!("New message from {sender_name}"),
            message_content,
        )
        .with_kind(NotificationKind::ChatMessage {
            sender_name: sender_name.to_string(),
            chat_id,
        })
    }

    pub fn test(recipient: Recipient) -> Self {
        Self::new(
            recipient,
            "Notification relay test",
            "This is a test notification from the relay",
        )
        .with_kind(NotificationKind::Test)
    }

    pub fn emergency(recipient: Recipient, sender_name: &str, location: Option<(f64, f64)>) -> Self {
        let body = match location {
            Some((lat, lon)) => format!("{sender_name} triggered an SOS alert near {lat:.5}, {lon:.5}"),
            None => format!("{sender_name} triggered an SOS alert"),
        };
        Self::new(recipient, "Emergency alert", body).with_kind(NotificationKind::Emergency {
            sender_name: sender_name.to_string(),
            latitude: location.map(|(lat, _)| lat),
            longitude: location.map(|(_, lon)| lon),
        })
    }
}

/// Per-recipient outcome. Batch dispatch yields these in input order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn delivered(message_id: impl Into<String>) -> Self {
        Self {
            success: true,
            message_id: Some(message_id.into()),
            error_code: None,
            error: None,
        }
    }

    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            message_id: None,
            error_code: Some(code.into()),
            error: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_wins_over_user_id() {
        let recipient = Recipient::from_parts(Some("u1".into()), Some("tok".into()));
        assert_eq!(recipient, Recipient::Token("tok".into()));

        let recipient = Recipient::from_parts(Some("u1".into()), Some("  ".into()));
        assert_eq!(recipient, Recipient::User("u1".into()));

        assert!(Recipient::from_parts(None, None).is_empty());
    }

    #[test]
    fn help_response_wording_follows_decision() {
        let accepted = NotificationRequest::help_response(Recipient::User("u1".into()), "Sam", "r1", true);
        assert_eq!(accepted.title, "Help request accepted");
        let declined = NotificationRequest::help_response(Recipient::User("u1".into()), "Sam", "r1", false);
        assert_eq!(declined.title, "Help request declined");
        assert!(declined.body.contains("Sam"));
    }

    #[test]
    fn dispatch_result_serializes_without_empty_fields() {
        let json = serde_json::to_value(DispatchResult::delivered("m1")).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "messageId": "m1"}));
    }
}
