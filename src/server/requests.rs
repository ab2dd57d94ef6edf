//! JSON request bodies accepted by the relay routes.
//!
//! Field names follow the mobile clients: a recipient is addressed by
//! `userId` (alias `receiverId` / `senderId`) or by a raw `token`
//! (alias `receiverToken`); extra payload fields arrive as `data`
//! (alias `additionalData`).

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::{
    dispatch::DispatchError,
    models::{DeliveryHints, NotificationRequest, Recipient},
};

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SendNotificationBody {
    #[serde(alias = "receiverId")]
    pub user_id: Option<String>,
    #[serde(alias = "receiverToken")]
    pub token: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    #[serde(alias = "additionalData")]
    pub data: Option<Map<String, Value>>,
    pub android: Option<Value>,
    pub apns: Option<Value>,
}

impl SendNotificationBody {
    pub fn into_request(self) -> NotificationRequest {
        NotificationRequest::new(
            Recipient::from_parts(self.user_id, self.token),
            self.title.unwrap_or_default(),
            self.body.unwrap_or_default(),
        )
        .with_data(stringify_data(self.data))
        .with_hints(DeliveryHints {
            android: self.android,
            apns: self.apns,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HelpRequestBody {
    #[serde(alias = "receiverId")]
    pub user_id: Option<String>,
    #[serde(alias = "receiverToken")]
    pub token: Option<String>,
    pub sender_name: Option<String>,
    pub request_id: Option<String>,
    #[serde(alias = "additionalData")]
    pub data: Option<Map<String, Value>>,
}

impl HelpRequestBody {
    pub fn into_request(self) -> Result<NotificationRequest, DispatchError> {
        let sender_name = required("senderName", self.sender_name)?;
        let request_id = required("requestId", self.request_id)?;
        Ok(NotificationRequest::help_request(
            Recipient::from_parts(self.user_id, self.token),
            &sender_name,
            &request_id,
        )
        .with_data(stringify_data(self.data)))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HelpResponseBody {
    /// The original requester, who receives the response.
    #[serde(alias = "senderId")]
    pub user_id: Option<String>,
    #[serde(alias = "receiverToken")]
    pub token: Option<String>,
    pub responder_name: Option<String>,
    pub request_id: Option<String>,
    pub accepted: Option<bool>,
    #[serde(alias = "additionalData")]
    pub data: Option<Map<String, Value>>,
}

impl HelpResponseBody {
    pub fn into_request(self) -> Result<NotificationRequest, DispatchError> {
        let responder_name = required("responderName", self.responder_name)?;
        let request_id = required("requestId", self.request_id)?;
        let accepted = self
            .accepted
            .ok_or_else(|| DispatchError::missing_field("accepted"))?;
        Ok(NotificationRequest::help_response(
            Recipient::from_parts(self.user_id, self.token),
            &responder_name,
            &request_id,
            accepted,
        )
        .with_data(stringify_data(self.data)))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatMessageBody {
    #[serde(alias = "receiverId")]
    pub user_id: Option<String>,
    #[serde(alias = "receiverToken")]
    pub token: Option<String>,
    pub sender_name: Option<String>,
    pub message_content: Option<String>,
    pub chat_id: Option<String>,
    #[serde(alias = "additionalData")]
    pub data: Option<Map<String, Value>>,
}

impl ChatMessageBody {
    pub fn into_request(self) -> Result<NotificationRequest, DispatchError> {
        let sender_name = required("senderName", self.sender_name)?;
        let content = required("messageContent", self.message_content)?;
        Ok(NotificationRequest::chat_message(
            Recipient::from_parts(self.user_id, self.token),
            &sender_name,
            &content,
            self.chat_id,
        )
        .with_data(stringify_data(self.data)))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EmergencyBody {
    #[serde(alias = "receiverId")]
    pub user_id: Option<String>,
    #[serde(alias = "receiverToken")]
    pub token: Option<String>,
    pub sender_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    #[serde(alias = "additionalData")]
    pub data: Option<Map<String, Value>>,
}

impl EmergencyBody {
    pub fn into_request(self) -> Result<NotificationRequest, DispatchError> {
        let sender_name = required("senderName", self.sender_name)?;
        let location = self.latitude.zip(self.longitude);
        Ok(NotificationRequest::emergency(
            Recipient::from_parts(self.user_id, self.token),
            &sender_name,
            location,
        )
        .with_data(stringify_data(self.data)))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestNotificationBody {
    #[serde(alias = "receiverId")]
    pub user_id: Option<String>,
    #[serde(alias = "receiverToken")]
    pub token: Option<String>,
}

impl TestNotificationBody {
    pub fn into_request(self) -> NotificationRequest {
        NotificationRequest::test(Recipient::from_parts(self.user_id, self.token))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegisterTokenBody {
    pub user_id: Option<String>,
    #[serde(alias = "fcmToken")]
    pub token: Option<String>,
    pub platform: Option<String>,
}

fn required(field: &str, value: Option<String>) -> Result<String, DispatchError> {
    value
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| DispatchError::missing_field(field))
}

/// Push data values must be strings; anything else is sent as its JSON text.
pub fn stringify_data(data: Option<Map<String, Value>>) -> BTreeMap<String, String> {
    data.unwrap_or_default()
        .into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => text,
                other => other.to_string(),
            };
            (key, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::NotificationKind;

    #[test]
    fn non_string_data_is_stringified() {
        let data = json!({"count": 3, "urgent": true, "note": "hi", "extra": null});
        let map = stringify_data(data.as_object().cloned());
        assert_eq!(map["count"], "3");
        assert_eq!(map["urgent"], "true");
        assert_eq!(map["note"], "hi");
        assert_eq!(map["extra"], "null");
    }

    #[test]
    fn receiver_aliases_are_accepted() {
        let body: HelpRequestBody = serde_json::from_value(json!({
            "receiverId": "u2",
            "senderName": "Sam",
            "requestId": "r1",
            "additionalData": {"priority": 2}
        }))
        .unwrap();
        let request = body.into_request().unwrap();
        assert_eq!(request.recipient, Recipient::User("u2".into()));
        assert_eq!(request.data["priority"], "2");
        assert!(matches!(request.kind, NotificationKind::HelpRequest { .. }));
    }

    #[test]
    fn missing_kind_fields_are_validation_errors() {
        let body: ChatMessageBody =
            serde_json::from_value(json!({"userId": "u1", "senderName": "Sam"})).unwrap();
        let err = body.into_request().unwrap_err();
        assert_eq!(err.message(), "missing required field: messageContent");

        let body: HelpResponseBody = serde_json::from_value(json!({
            "senderId": "u1", "responderName": "Ali", "requestId": "r1"
        }))
        .unwrap();
        assert!(body.into_request().is_err());
    }

    #[test]
    fn emergency_location_needs_both_coordinates() {
        let body: EmergencyBody =
            serde_json::from_value(json!({"userId": "c1", "senderName": "Sam", "latitude": 1.5}))
                .unwrap();
        match body.into_request().unwrap().kind {
            NotificationKind::Emergency { latitude, .. } => assert_eq!(latitude, None),
            other => panic!("unexpected kind {other:?}"),
        }
    }
}
