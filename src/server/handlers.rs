use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{SecondsFormat, Utc};
use log::{error, info, warn};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::{
    dispatch::{
        error::{INTERNAL_ERROR, VALIDATION_ERROR},
        DispatchError,
    },
    models::{DispatchResult, NotificationRequest},
    utils::logging::token_preview,
};

use super::{
    requests::{
        ChatMessageBody, EmergencyBody, HelpRequestBody, HelpResponseBody, RegisterTokenBody,
        SendNotificationBody, TestNotificationBody,
    },
    RelayState,
};

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn failure(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": message.into(),
            "code": code,
        })),
    )
        .into_response()
}

fn parse_json<T: DeserializeOwned>(body: &Bytes) -> Result<T, Response> {
    serde_json::from_slice(body).map_err(|err| {
        warn!("Rejecting request with invalid JSON: {err}");
        failure(
            StatusCode::BAD_REQUEST,
            VALIDATION_ERROR,
            format!("invalid JSON body: {err}"),
        )
    })
}

fn error_response(err: DispatchError) -> Response {
    let status = match &err {
        DispatchError::Validation(_) => StatusCode::BAD_REQUEST,
        DispatchError::RecipientNotFound { .. } => StatusCode::NOT_FOUND,
        DispatchError::Transport(_) | DispatchError::Lookup(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let mut body = json!({
        "success": false,
        "error": err.message(),
        "code": err.code(),
    });
    if let DispatchError::RecipientNotFound { recipient_id } = &err {
        body["userId"] = Value::String(recipient_id.clone());
    }
    (status, Json(body)).into_response()
}

async fn send_one(state: &RelayState, request: NotificationRequest) -> Response {
    let user_id = request.recipient.user_id().map(str::to_string);
    match state.dispatcher.try_dispatch(&request).await {
        Ok(receipt) => {
            let mut body = json!({
                "success": true,
                "messageId": receipt.message_id,
                "timestamp": receipt.sent_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            });
            if let Some(user_id) = user_id {
                body["userId"] = Value::String(user_id);
            }
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(err) => error_response(err),
    }
}

pub async fn send_notification(State(state): State<RelayState>, body: Bytes) -> Response {
    match parse_json::<SendNotificationBody>(&body) {
        Ok(parsed) => send_one(&state, parsed.into_request()).await,
        Err(response) => response,
    }
}

pub async fn send_help_request(State(state): State<RelayState>, body: Bytes) -> Response {
    let request = parse_json::<HelpRequestBody>(&body)
        .and_then(|parsed| parsed.into_request().map_err(error_response));
    match request {
        Ok(request) => send_one(&state, request).await,
        Err(response) => response,
    }
}

pub async fn send_help_response(State(state): State<RelayState>, body: Bytes) -> Response {
    let request = parse_json::<HelpResponseBody>(&body)
        .and_then(|parsed| parsed.into_request().map_err(error_response));
    match request {
        Ok(request) => send_one(&state, request).await,
        Err(response) => response,
    }
}

pub async fn send_chat_message(State(state): State<RelayState>, body: Bytes) -> Response {
    let request = parse_json::<ChatMessageBody>(&body)
        .and_then(|parsed| parsed.into_request().map_err(error_response));
    match request {
        Ok(request) => send_one(&state, request).await,
        Err(response) => response,
    }
}

pub async fn send_emergency(State(state): State<RelayState>, body: Bytes) -> Response {
    let request = parse_json::<EmergencyBody>(&body)
        .and_then(|parsed| parsed.into_request().map_err(error_response));
    match request {
        Ok(request) => send_one(&state, request).await,
        Err(response) => response,
    }
}

pub async fn test_notification(State(state): State<RelayState>, body: Bytes) -> Response {
    match parse_json::<TestNotificationBody>(&body) {
        Ok(parsed) => send_one(&state, parsed.into_request()).await,
        Err(response) => response,
    }
}

/// Items are parsed one by one so a malformed entry only fails its own slot.
pub async fn send_multiple(State(state): State<RelayState>, body: Bytes) -> Response {
    let parsed: Value = match parse_json(&body) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    let Some(items) = parsed.get("notifications").and_then(Value::as_array) else {
        return failure(
            StatusCode::BAD_REQUEST,
            VALIDATION_ERROR,
            "notifications array is required",
        );
    };

    let prepared: Vec<Result<NotificationRequest, DispatchResult>> = items
        .iter()
        .map(|item| {
            serde_json::from_value::<SendNotificationBody>(item.clone())
                .map(SendNotificationBody::into_request)
                .map_err(|err| {
                    DispatchResult::failed(VALIDATION_ERROR, format!("invalid notification: {err}"))
                })
        })
        .collect();

    let requests: Vec<NotificationRequest> = prepared
        .iter()
        .filter_map(|item| item.as_ref().ok().cloned())
        .collect();
    let mut dispatched = state.dispatcher.dispatch_batch(&requests).await.into_iter();

    let results: Vec<DispatchResult> = prepared
        .into_iter()
        .map(|item| match item {
            Ok(_) => dispatched
                .next()
                .unwrap_or_else(|| DispatchResult::failed(INTERNAL_ERROR, "missing batch result")),
            Err(rejected) => rejected,
        })
        .collect();

    let successful = results.iter().filter(|result| result.success).count();
    info!("Batch send: {successful}/{} delivered", results.len());

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "total": results.len(),
            "successful": successful,
            "results": results,
            "timestamp": timestamp(),
        })),
    )
        .into_response()
}

pub async fn register_token(State(state): State<RelayState>, body: Bytes) -> Response {
    let parsed: RegisterTokenBody = match parse_json(&body) {
        Ok(parsed) => parsed,
        Err(response) => return response,
    };
    let user_id = parsed.user_id.filter(|id| !id.trim().is_empty());
    let token = parsed.token.filter(|token| !token.trim().is_empty());
    let (Some(user_id), Some(token)) = (user_id, token) else {
        return failure(
            StatusCode::BAD_REQUEST,
            VALIDATION_ERROR,
            "missing required fields: userId, token",
        );
    };

    match state
        .registry
        .register(&user_id, &token, parsed.platform.as_deref())
        .await
    {
        Ok(()) => {
            info!("Registered token {} for {user_id}", token_preview(&token));
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "userId": user_id,
                    "timestamp": timestamp(),
                })),
            )
                .into_response()
        }
        Err(err) => {
            error!("Failed to register token for {user_id}: {err:#}");
            failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_ERROR,
                format!("{err:#}"),
            )
        }
    }
}

pub async fn test_connection() -> Response {
    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "message": "SOS relay is working",
            "timestamp": timestamp(),
            "version": env!("CARGO_PKG_VERSION"),
        })),
    )
        .into_response()
}

pub async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn method_not_allowed() -> Response {
    (
        StatusCode::METHOD_NOT_ALLOWED,
        Json(json!({"success": false, "error": "Method not allowed"})),
    )
        .into_response()
}

pub async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"success": false, "error": "Not found"})),
    )
        .into_response()
}
