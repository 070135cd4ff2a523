//! HTTP and WebSocket handlers for the Agora server.
//!
//! The server is a thin shell around the hub: it upgrades sockets for
//! already-identified users and exposes the collaborator API over HTTP.

use crate::config::Config;
use crate::metrics;
use agora_core::{Hub, HubError};
use agora_protocol::{codec, Envelope, OnlineStatus, ProtocolError, Route, UserId};
use agora_transport::websocket;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{WebSocket, WebSocketUpgrade},
        ConnectInfo, Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

/// Shared server state.
pub struct AppState {
    /// The connection hub.
    pub hub: Arc<Hub>,
    /// Server configuration.
    pub config: Config,
}

/// Build the HTTP router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(&state.config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .route("/presence", get(presence_handler))
        .route("/presence/:user_id", get(user_presence_handler))
        .route("/events", post(publish_handler))
        .route("/users/:user_id/events", post(send_to_user_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP/WebSocket server until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the hub or the listener cannot be started.
pub async fn run_server(config: Config) -> Result<()> {
    let hub = Hub::start(config.hub_config()).context("Failed to start hub")?;

    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(&config.host, config.metrics.port) {
            warn!("Failed to start metrics server: {:#}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState {
        hub: hub.clone(),
        config,
    });
    let app = router(state.clone());

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Agora server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, state.config.transport.websocket_path
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        shutdown_signal().await;
        // Upgraded sockets are not tracked by the server; close them here.
        hub.shutdown().await;
    })
    .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Error returned by the HTTP API.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unavailable(String),
}

impl From<ProtocolError> for ApiError {
    fn from(e: ProtocolError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<HubError> for ApiError {
    fn from(e: HubError) -> Self {
        match e {
            HubError::IntakeFull | HubError::ShuttingDown => ApiError::Unavailable(e.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Identity resolved by the upstream session layer.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    #[serde(alias = "userId")]
    pub user_id: u64,
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    params: Option<Query<WsParams>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(Query(params)) = params else {
        metrics::record_rejected_upgrade("missing_identity");
        return ApiError::BadRequest("user_id is required".into()).into_response();
    };
    if state.hub.is_shutting_down() {
        metrics::record_rejected_upgrade("shutting_down");
        return ApiError::Unavailable(HubError::ShuttingDown.to_string()).into_response();
    }

    let user = UserId(params.user_id);
    let remote = connect_info.map(|ConnectInfo(addr)| addr.to_string());
    ws.max_message_size(state.config.transport.max_message_size)
        .on_upgrade(move |socket| handle_websocket(socket, state, user, remote))
}

/// Hand an upgraded socket to the hub and wait for it to disconnect.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>, user: UserId, remote: Option<String>) {
    debug!(user = %user, remote = ?remote, "WebSocket connected");

    let (reader, writer) = websocket::split(socket, remote);
    if let Err(e) = state.hub.serve(reader, writer, Some(user)).await {
        warn!(user = %user, error = %e, "WebSocket rejected by hub");
        return;
    }

    debug!(user = %user, "WebSocket disconnected");
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = if state.hub.is_shutting_down() {
        "shutting_down"
    } else {
        "ok"
    };
    Json(serde_json::json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "hub": state.hub.stats(),
    }))
}

/// Every online user.
async fn presence_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut online: Vec<UserId> = state.hub.online_user_ids().into_iter().collect();
    online.sort_unstable();
    Json(serde_json::json!({ "online": online }))
}

/// Presence of one user.
async fn user_presence_handler(
    Path(user_id): Path<u64>,
    State(state): State<Arc<AppState>>,
) -> Json<OnlineStatus> {
    let user_id = UserId(user_id);
    Json(OnlineStatus {
        user_id,
        online: state.hub.is_online(user_id),
    })
}

/// Broadcast an event to every connection.
async fn publish_handler(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let envelope = parse_event(&body)?;
    state.hub.publish(envelope)?;
    Ok(StatusCode::ACCEPTED)
}

/// Deliver an event to every connection of one user.
async fn send_to_user_handler(
    Path(user_id): Path<u64>,
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let envelope = parse_event(&body)?;
    state.hub.send_to_user(UserId(user_id), envelope)?;
    Ok(StatusCode::ACCEPTED)
}

fn parse_event(body: &[u8]) -> Result<Envelope, ApiError> {
    let envelope = codec::decode(body)?;
    if envelope.kind().route() == Route::Discard {
        return Err(ApiError::BadRequest(format!(
            "Unknown event kind: {}",
            envelope.kind()
        )));
    }
    Ok(envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use agora_core::HubConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use futures_util::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message;
    use tower::ServiceExt;

    fn state() -> Arc<AppState> {
        Arc::new(AppState {
            hub: Hub::start(HubConfig::default()).unwrap(),
            config: Config::default(),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(state());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["hub"]["connections"], 0);
    }

    #[tokio::test]
    async fn test_presence_endpoints() {
        let state = state();
        let (_conn, _rx) = state.hub.register(Some(UserId(7))).unwrap();
        let app = router(state.clone());

        let response = app
            .clone()
            .oneshot(Request::builder().uri("/presence").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_json(response).await, serde_json::json!({ "online": [7] }));

        let response = app
            .oneshot(Request::builder().uri("/presence/8").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "userId": 8, "online": false })
        );
    }

    #[tokio::test]
    async fn test_send_to_user_endpoint() {
        let state = state();
        let (_conn, mut rx) = state.hub.register(Some(UserId(2))).unwrap();
        // Own presence notice.
        rx.recv().await.unwrap();
        let app = router(state.clone());

        let response = app
            .oneshot(post_json(
                "/users/2/events",
                r#"{"type":"chat_message","payload":{"senderId":1,"receiverId":2,"content":"hi"}}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);

        let frame = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let envelope = codec::decode(&frame).unwrap();
        assert_eq!(envelope.kind().as_tag(), "chat_message");
    }

    #[tokio::test]
    async fn test_publish_rejects_bad_events() {
        let app = router(state());

        let response = app
            .clone()
            .oneshot(post_json("/events", "not json"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(post_json("/events", r#"{"type":"dance","payload":{}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(post_json("/events", r#"{"type":"new_post","payload":{"postId":1}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_is_unavailable() {
        let state = state();
        state.hub.shutdown().await;
        let response = router(state)
            .oneshot(post_json("/events", r#"{"type":"new_post","payload":{"postId":1}}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    async fn next_text(
        client: &mut tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        kind: &str,
    ) -> Envelope {
        loop {
            let message = tokio::time::timeout(Duration::from_secs(2), client.next())
                .await
                .unwrap()
                .unwrap()
                .unwrap();
            if let Message::Text(text) = message {
                for part in codec::split_batch(text.as_bytes()) {
                    let envelope = codec::decode(part).unwrap();
                    if envelope.kind().as_tag() == kind {
                        return envelope;
                    }
                }
            }
        }
    }

    #[tokio::test]
    async fn test_chat_over_websocket() {
        let state = state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let (mut alice, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws?user_id=1", addr))
            .await
            .unwrap();
        let (mut bob, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws?userId=2", addr))
            .await
            .unwrap();

        // Alice learns that Bob came online.
        let status: OnlineStatus = next_text(&mut alice, "online_status")
            .await
            .decode_payload()
            .unwrap();
        assert_eq!(status.user_id, UserId(2));

        alice
            .send(Message::Text(
                r#"{"type":"chat_message","payload":{"senderId":1,"receiverId":2,"content":"hello bob"}}"#
                    .to_string(),
            ))
            .await
            .unwrap();

        let chat: agora_protocol::ChatMessage = next_text(&mut bob, "chat_message")
            .await
            .decode_payload()
            .unwrap();
        assert_eq!(chat.content, "hello bob");
        assert!(state.hub.is_online(UserId(1)));

        state.hub.shutdown().await;
    }

    #[tokio::test]
    async fn test_upgrade_requires_identity() {
        let state = state();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state);
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        assert!(tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .is_err());
    }
}
