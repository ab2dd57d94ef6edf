//! HTTP boundary for the notification relay.
//!
//! Every route answers `OPTIONS` with an empty 204 and carries permissive CORS
//! headers; methods a route does not serve get a JSON 405.

mod handlers;
pub mod requests;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    http::{
        header::{
            ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
            ACCESS_CONTROL_ALLOW_ORIGIN,
        },
        HeaderValue,
    },
    middleware,
    response::Response,
    routing::{get, post, MethodRouter},
    Router,
};
use log::info;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::dispatch::{NotificationDispatcher, TokenRegistry};

use handlers::*;

#[derive(Clone)]
pub struct RelayState {
    pub dispatcher: NotificationDispatcher,
    pub registry: Arc<dyn TokenRegistry>,
}

impl RelayState {
    pub fn new(dispatcher: NotificationDispatcher, registry: Arc<dyn TokenRegistry>) -> Self {
        Self {
            dispatcher,
            registry,
        }
    }
}

fn with_cors(route: MethodRouter<RelayState>) -> MethodRouter<RelayState> {
    route.options(preflight).fallback(method_not_allowed)
}

async fn add_cors_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}

pub fn router(state: RelayState) -> Router {
    Router::new()
        .route("/sendNotification", with_cors(post(send_notification)))
        .route("/sendMultipleNotifications", with_cors(post(send_multiple)))
        .route(
            "/sendHelpRequestNotification",
            with_cors(post(send_help_request)),
        )
        .route(
            "/sendHelpResponseNotification",
            with_cors(post(send_help_response)),
        )
        .route(
            "/sendChatMessageNotification",
            with_cors(post(send_chat_message)),
        )
        .route("/sendEmergencyNotification", with_cors(post(send_emergency)))
        .route("/testNotification", with_cors(post(test_notification)))
        .route("/registerToken", with_cors(post(register_token)))
        .route("/testConnection", with_cors(get(test_connection)))
        .fallback(not_found)
        .layer(middleware::map_response(add_cors_headers))
        .with_state(state)
}

/// Serves until `shutdown` is cancelled, then drains in-flight requests.
pub async fn serve(
    listener: TcpListener,
    state: RelayState,
    shutdown: CancellationToken,
) -> Result<()> {
    let addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!("SOS relay listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("HTTP server failed")?;

    info!("SOS relay stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, sync::Mutex};

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{Method, Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::dispatch::{
        DeliveryPayload, MemoryTokenStore, MessagingTransport, TokenResolver, TransportError,
    };

    struct StubTransport {
        reject: HashSet<String>,
        sent: Mutex<Vec<DeliveryPayload>>,
    }

    impl StubTransport {
        fn new() -> Self {
            Self {
                reject: HashSet::from(["dead-token".to_string()]),
                sent: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MessagingTransport for StubTransport {
        async fn send(&self, payload: &DeliveryPayload) -> Result<String, TransportError> {
            self.sent.lock().unwrap().push(payload.clone());
            if self.reject.contains(&payload.token) {
                return Err(TransportError::new(
                    "messaging/registration-token-not-registered",
                    "Requested entity was not found.",
                ));
            }
            Ok(format!("msg-{}", payload.token))
        }
    }

    fn state_with(store: Arc<MemoryTokenStore>) -> RelayState {
        state_recording(store).0
    }

    fn state_recording(store: Arc<MemoryTokenStore>) -> (RelayState, Arc<StubTransport>) {
        let transport = Arc::new(StubTransport::new());
        let state = RelayState::new(
            NotificationDispatcher::new(store.clone(), transport.clone()),
            store,
        );
        (state, transport)
    }

    fn seeded_store() -> Arc<MemoryTokenStore> {
        Arc::new(MemoryTokenStore::with_tokens([
            ("u1", "token-u1"),
            ("stale", "dead-token"),
        ]))
    }

    fn app() -> Router {
        router(state_with(seeded_store()))
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    #[tokio::test]
    async fn send_notification_resolves_user() {
        let (status, body) = call(
            app(),
            post_json(
                "/sendNotification",
                r#"{"userId": "u1", "title": "T", "body": "B", "data": {"n": 1}}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["messageId"], "msg-token-u1");
        assert_eq!(body["userId"], "u1");
    }

    #[tokio::test]
    async fn status_codes_follow_error_kind() {
        let (status, body) = call(
            app(),
            post_json("/sendNotification", r#"{"userId": "u1", "title": "", "body": "B"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");

        let (status, body) = call(
            app(),
            post_json("/sendNotification", r#"{"userId": "ghost", "title": "T", "body": "B"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["userId"], "ghost");

        let (status, body) = call(
            app(),
            post_json("/sendNotification", r#"{"userId": "stale", "title": "T", "body": "B"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["code"], "messaging/registration-token-not-registered");
    }

    #[tokio::test]
    async fn invalid_json_is_bad_request() {
        let (status, body) = call(app(), post_json("/sendNotification", "{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn options_returns_empty_no_content_with_cors() {
        let request = Request::builder()
            .method(Method::OPTIONS)
            .uri("/sendHelpRequestNotification")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_METHODS], "GET, POST, OPTIONS");
        assert_eq!(headers[ACCESS_CONTROL_ALLOW_HEADERS], "Content-Type, Authorization");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn unsupported_method_is_rejected() {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/sendNotification")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(), request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(body, json!({"success": false, "error": "Method not allowed"}));
    }

    #[tokio::test]
    async fn batch_reports_each_item_in_order() {
        let payload = json!({
            "notifications": [
                {"token": "t1", "title": "T", "body": "B"},
                {"token": "t2", "title": "T"},
                "not an object",
                {"userId": "u1", "title": "T", "body": "B"}
            ]
        });
        let (status, body) = call(
            app(),
            post_json("/sendMultipleNotifications", &payload.to_string()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 4);
        assert_eq!(body["successful"], 2);
        let results = body["results"].as_array().unwrap();
        assert_eq!(results[0]["messageId"], "msg-t1");
        assert_eq!(results[1]["errorCode"], "VALIDATION_ERROR");
        assert_eq!(results[2]["success"], false);
        assert_eq!(results[3]["messageId"], "msg-token-u1");
    }

    #[tokio::test]
    async fn batch_without_array_is_bad_request() {
        let (status, _) = call(
            app(),
            post_json("/sendMultipleNotifications", r#"{"notifications": "nope"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn kind_routes_build_their_payloads() {
        let (status, body) = call(
            app(),
            post_json(
                "/sendChatMessageNotification",
                r#"{"receiverToken": "t9", "senderName": "Sam", "messageContent": "hi"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messageId"], "msg-t9");

        let (status, body) = call(
            app(),
            post_json("/sendHelpRequestNotification", r#"{"receiverId": "u1", "senderName": "Sam"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing required field: requestId");
    }

    #[tokio::test]
    async fn help_response_requires_accepted_flag() {
        let (status, body) = call(
            app(),
            post_json(
                "/sendHelpResponseNotification",
                r#"{"senderId": "u1", "responderName": "Lina", "requestId": "r-7"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["error"], "missing required field: accepted");
    }

    #[tokio::test]
    async fn help_response_to_unknown_sender_is_not_found() {
        let (status, body) = call(
            app(),
            post_json(
                "/sendHelpResponseNotification",
                r#"{"senderId": "nobody", "responderName": "Lina", "requestId": "r-7", "accepted": true}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "RECIPIENT_NOT_FOUND");
        assert_eq!(body["userId"], "nobody");
    }

    #[tokio::test]
    async fn help_response_reaches_known_sender() {
        let (state, transport) = state_recording(seeded_store());
        let (status, body) = call(
            router(state),
            post_json(
                "/sendHelpResponseNotification",
                r#"{"senderId": "u1", "responderName": "Lina", "requestId": "r-7", "accepted": false}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messageId"], "msg-token-u1");

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent[0].data["type"], "help_response");
        assert_eq!(sent[0].data["requestId"], "r-7");
    }

    #[tokio::test]
    async fn emergency_route_carries_coordinates() {
        let (state, transport) = state_recording(seeded_store());
        let (status, body) = call(
            router(state),
            post_json(
                "/sendEmergencyNotification",
                r#"{"receiverId": "u1", "senderName": "Omar", "latitude": 30.0444, "longitude": 31.2357}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["messageId"], "msg-token-u1");

        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].token, "token-u1");
        assert_eq!(sent[0].data["type"], "emergency");
        assert_eq!(sent[0].data["senderName"], "Omar");
        assert_eq!(sent[0].data["latitude"], "30.0444");
        assert_eq!(sent[0].data["longitude"], "31.2357");
        assert_eq!(sent[0].android["notification"]["channel_id"], "emergency_alerts");
    }

    #[tokio::test]
    async fn emergency_route_requires_sender_name() {
        let (status, body) = call(
            app(),
            post_json("/sendEmergencyNotification", r#"{"receiverId": "u1"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "missing required field: senderName");
    }

    #[tokio::test]
    async fn registered_token_is_used_for_later_sends() {
        let store = Arc::new(MemoryTokenStore::new());
        let app = router(state_with(store.clone()));

        let (status, _) = call(
            app.clone(),
            post_json("/registerToken", r#"{"userId": "u5", "token": "token-u5"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(store.lookup("u5").await.unwrap().as_deref(), Some("token-u5"));

        let (status, body) = call(app, post_json("/testNotification", r#"{"userId": "u5"}"#)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["messageId"], "msg-token-u5");
    }

    #[tokio::test]
    async fn test_connection_answers_get() {
        let request = Request::builder()
            .uri("/testConnection")
            .body(Body::empty())
            .unwrap();
        let (status, body) = call(app(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }

    #[tokio::test]
    async fn serve_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();
        let server = tokio::spawn(serve(
            listener,
            state_with(Arc::new(MemoryTokenStore::new())),
            shutdown.clone(),
        ));

        let response = reqwest::get(format!("http://{addr}/testConnection"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        shutdown.cancel();
        server.await.unwrap().unwrap();
    }
}
