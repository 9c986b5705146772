//! HTTP façade
//!
//! Wires the JSON API onto the session manager. Handlers enforce, in order:
//! required fields (400), session readiness (503), then delegate to the
//! engine, mapping its failures to 500 with details attached.

use crate::ack::describe_ack;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::number::canonical_address;
use crate::session::SessionManager;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

/// Shared state injected into every handler
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<SessionManager>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(session: Arc<SessionManager>, config: Config) -> Self {
        Self {
            session,
            config: Arc::new(config),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            Error::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "error": msg }),
            ),
            Error::NotReady => (
                StatusCode::SERVICE_UNAVAILABLE,
                json!({ "success": false, "error": self.to_string() }),
            ),
            Error::Unregistered { formatted } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "success": false,
                    "error": self.to_string(),
                    "formattedNumber": formatted,
                }),
            ),
            Error::Upstream(details) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({
                    "success": false,
                    "error": "internal server error",
                    "details": details,
                }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
struct SendMessageRequest {
    number: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct CheckNumberRequest {
    number: Option<String>,
}

#[derive(Serialize)]
struct StatusResponse {
    status: &'static str,
    timestamp: String,
}

#[derive(Serialize)]
struct ClientInfo {
    name: String,
    number: String,
    platform: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClientInfoResponse {
    success: bool,
    client_info: ClientInfo,
}

#[derive(Serialize)]
struct MessagePreview {
    body: String,
    timestamp: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatSummary {
    id: String,
    name: String,
    is_group: bool,
    last_message: Option<MessagePreview>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChatsResponse {
    success: bool,
    total_chats: usize,
    recent_chats: Vec<ChatSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SendMessageResponse {
    success: bool,
    message_id: String,
    timestamp: String,
    to: String,
    formatted_number: String,
    message: String,
    ack_status: i64,
    ack_description: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CheckNumberResponse {
    success: bool,
    number: String,
    formatted_number: String,
    is_registered: bool,
}

#[derive(Serialize)]
struct ActionResponse {
    success: bool,
    message: &'static str,
    timestamp: String,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/client-info", get(client_info))
        .route("/chats", get(chats))
        .route("/send-message", post(send_message))
        .route("/check-number", post(check_number))
        .route("/reconnect", post(reconnect))
        .route("/logout", post(logout))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .layer(CatchPanicLayer::custom(handle_panic))
        .with_state(state)
}

/// Run the API until shutdown, then tear the session down
pub async fn serve(state: AppState) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let session = Arc::clone(&state.session);
    let app = router(state);

    let listener = TcpListener::bind(&addr).await?;
    info!("gateway listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down, tearing session down");
            session.shutdown().await;
        })
        .await?;

    Ok(())
}

fn handle_panic(_err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": "internal server error" })),
    )
        .into_response()
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "not found" })),
    )
        .into_response()
}

fn non_empty(field: Option<String>) -> Option<String> {
    field.filter(|s| !s.is_empty())
}

async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let session_state = state.session.state().await;
    Json(StatusResponse {
        status: session_state.connection_label(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

async fn client_info(State(state): State<AppState>) -> Result<Json<ClientInfoResponse>> {
    let engine = state.session.engine().await?;
    let info = engine.self_info().await?;

    Ok(Json(ClientInfoResponse {
        success: true,
        client_info: ClientInfo {
            name: info.pushname,
            number: info.number,
            platform: info.platform,
        },
    }))
}

async fn chats(State(state): State<AppState>) -> Result<Json<ChatsResponse>> {
    let engine = state.session.engine().await?;
    let all = engine.get_chats().await?;

    let recent = all
        .iter()
        .take(state.config.chat_list_limit)
        .map(|chat| ChatSummary {
            id: chat.id.clone(),
            name: chat.name.clone(),
            is_group: chat.is_group,
            last_message: chat.last_message.as_ref().map(|m| MessagePreview {
                body: preview(&m.body, state.config.preview_len),
                timestamp: m.timestamp,
            }),
        })
        .collect();

    Ok(Json(ChatsResponse {
        success: true,
        total_chats: all.len(),
        recent_chats: recent,
    }))
}

async fn send_message(
    State(state): State<AppState>,
    payload: Option<Json<SendMessageRequest>>,
) -> Result<Json<SendMessageResponse>> {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let (number, message) = match (non_empty(req.number), non_empty(req.message)) {
        (Some(n), Some(m)) => (n, m),
        _ => {
            return Err(Error::Validation(
                "number and message are required".to_string(),
            ))
        }
    };

    let engine = state.session.engine().await?;
    let formatted = canonical_address(&number, &state.config);

    if !engine.is_registered(&formatted).await? {
        warn!(to = %formatted, "send rejected, number not registered");
        return Err(Error::Unregistered { formatted });
    }

    let sent = engine.send_message(&formatted, &message).await?;
    info!(to = %formatted, id = %sent.id, ack = sent.ack, "message sent");

    Ok(Json(SendMessageResponse {
        success: true,
        message_id: sent.id,
        timestamp: Utc::now().to_rfc3339(),
        to: number,
        formatted_number: formatted,
        message,
        ack_status: sent.ack,
        ack_description: describe_ack(sent.ack),
    }))
}

async fn check_number(
    State(state): State<AppState>,
    payload: Option<Json<CheckNumberRequest>>,
) -> Result<Json<CheckNumberResponse>> {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let number = non_empty(req.number)
        .ok_or_else(|| Error::Validation("number is required".to_string()))?;

    let engine = state.session.engine().await?;
    let formatted = canonical_address(&number, &state.config);
    let is_registered = engine.is_registered(&formatted).await?;

    Ok(Json(CheckNumberResponse {
        success: true,
        number,
        formatted_number: formatted,
        is_registered,
    }))
}

async fn reconnect(State(state): State<AppState>) -> Result<Json<ActionResponse>> {
    info!("reconnect requested");
    state.session.reconnect().await?;

    Ok(Json(ActionResponse {
        success: true,
        message: "reconnect started, a new QR code will be issued shortly",
        timestamp: Utc::now().to_rfc3339(),
    }))
}

async fn logout(State(state): State<AppState>) -> Result<Json<ActionResponse>> {
    info!("logout requested");
    state.session.logout().await?;

    Ok(Json(ActionResponse {
        success: true,
        message: "logged out, call /reconnect to pair again",
        timestamp: Utc::now().to_rfc3339(),
    }))
}

/// Truncate a message body for the chat list
fn preview(body: &str, limit: usize) -> String {
    if body.chars().count() <= limit {
        body.to_string()
    } else {
        let truncated: String = body.chars().take(limit).collect();
        format!("{}...", truncated)
    }
}
