use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::{json, Value};

use crate::models::{DeliveryHints, NotificationKind, NotificationRequest, Recipient};

pub const CHAT_PREVIEW_CHARS: usize = 50;
pub const CLICK_ACTION: &str = "FLUTTER_NOTIFICATION_CLICK";

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DisplayNotification {
    pub title: String,
    pub body: String,
}

/// Message in the push provider's wire shape.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeliveryPayload {
    pub token: String,
    pub notification: DisplayNotification,
    pub data: BTreeMap<String, String>,
    pub android: Value,
    pub apns: Value,
}

pub fn build_payload(
    request: &NotificationRequest,
    token: &str,
    now: DateTime<Utc>,
) -> DeliveryPayload {
    let mut data = BTreeMap::new();
    data.insert("type".to_string(), request.kind.as_str().to_string());
    data.insert(
        "timestamp".to_string(),
        now.to_rfc3339_opts(SecondsFormat::Millis, true),
    );
    data.insert("click_action".to_string(), CLICK_ACTION.to_string());
    if let Recipient::User(user_id) = &request.recipient {
        data.insert("userId".to_string(), user_id.clone());
    }
    insert_kind_fields(&request.kind, &request.body, &mut data);
    // Caller-supplied fields win over the defaults above.
    data.extend(request.data.clone());

    DeliveryPayload {
        token: token.to_string(),
        notification: DisplayNotification {
            title: request.title.clone(),
            body: display_body(&request.kind, &request.body),
        },
        data,
        android: android_config(&request.kind, &request.hints),
        apns: apns_config(&request.hints),
    }
}

fn insert_kind_fields(kind: &NotificationKind, body: &str, data: &mut BTreeMap<String, String>) {
    match kind {
        NotificationKind::General => {}
        NotificationKind::HelpRequest {
            request_id,
            sender_name,
        } => help_request_fields(request_id, sender_name, data),
        NotificationKind::HelpResponse {
            request_id,
            responder_name,
            accepted,
        } => help_response_fields(request_id, responder_name, *accepted, data),
        NotificationKind::ChatMessage {
            sender_name,
            chat_id,
        } => chat_message_fields(sender_name, chat_id.as_deref(), body, data),
        NotificationKind::Test => {
            data.insert("source".into(), "sos_relay".into());
        }
        NotificationKind::Emergency {
            sender_name,
            latitude,
            longitude,
        } => emergency_fields(sender_name, *latitude, *longitude, data),
    }
}

fn help_request_fields(request_id: &str, sender_name: &str, data: &mut BTreeMap<String, String>) {
    data.insert("requestId".into(), request_id.to_string());
    data.insert("senderName".into(), sender_name.to_string());
}

fn help_response_fields(
    request_id: &str,
    responder_name: &str,
    accepted: bool,
    data: &mut BTreeMap<String, String>,
) {
    data.insert("requestId".into(), request_id.to_string());
    data.insert("responderName".into(), responder_name.to_string());
    data.insert("accepted".into(), accepted.to_string());
}

fn chat_message_fields(
    sender_name: &str,
    chat_id: Option<&str>,
    message_content: &str,
    data: &mut BTreeMap<String, String>,
) {
    data.insert("senderName".into(), sender_name.to_string());
    data.insert("chatId".into(), chat_id.unwrap_or_default().to_string());
    data.insert("messageContent".into(), message_content.to_string());
}

fn emergency_fields(
    sender_name: &str,
    latitude: Option<f64>,
    longitude: Option<f64>,
    data: &mut BTreeMap<String, String>,
) {
    data.insert("senderName".into(), sender_name.to_string());
    if let (Some(lat), Some(lon)) = (latitude, longitude) {
        data.insert("latitude".into(), lat.to_string());
        data.insert("longitude".into(), lon.to_string());
    }
}

fn display_body(kind: &NotificationKind, body: &str) -> String {
    match kind {
        NotificationKind::ChatMessage { .. } => preview(body),
        _ => body.to_string(),
    }
}

/// First 50 characters plus an ellipsis when longer.
pub fn preview(text: &str) -> String {
    if text.chars().count() > CHAT_PREVIEW_CHARS {
        let mut short: String = text.chars().take(CHAT_PREVIEW_CHARS).collect();
        short.push_str("...");
        short
    } else {
        text.to_string()
    }
}

fn android_channel(kind: &NotificationKind) -> &'static str {
    match kind {
        NotificationKind::General | NotificationKind::Test => "sos_relay_notifications",
        NotificationKind::HelpRequest { .. } | NotificationKind::HelpResponse { .. } => {
            "help_requests"
        }
        NotificationKind::ChatMessage { .. } => "chat_messages",
        NotificationKind::Emergency { .. } => "emergency_alerts",
    }
}

fn android_config(kind: &NotificationKind, hints: &DeliveryHints) -> Value {
    hints.android.clone().unwrap_or_else(|| {
        json!({
            "priority": "high",
            "notification": {
                "sound": "default",
                "channel_id": android_channel(kind),
                "default_sound": true,
                "default_vibrate_timings": true,
            },
        })
    })
}

fn apns_config(hints: &DeliveryHints) -> Value {
    hints.apns.clone().unwrap_or_else(|| {
        json!({
            "payload": {
                "aps": {
                    "sound": "default",
                    "badge": 1,
                    "content-available": 1,
                },
            },
        })
    })
}
