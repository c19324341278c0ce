//! Callpilot server library logic.
//!
//! One coherent route set over the registry, the dialer session manager,
//! call control, the hand-off path, and the dialogue engine. All state is
//! shared through [`AppState`] behind an `Arc` extension.

pub mod api_agents;
pub mod api_assignments;
pub mod api_bots;
pub mod api_calls;
pub mod api_campaigns;
pub mod api_dialogue;
pub mod api_observe;
pub mod background;
pub mod config;
pub mod middleware;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use callpilot_ami::{AmiClient, TransferConfig};
use callpilot_db::DbPool;
use callpilot_dialer::{AgentApiClient, SessionManager};
use callpilot_dialogue::DialogueEngine;
use callpilot_observe::CallEvent;
use callpilot_voice::{SttClient, TtsClient};
use middleware::RateLimiter;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

/// Maximum request body size (2 MiB) for ordinary JSON routes.
const MAX_REQUEST_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Body limit for dialogue-turn routes, which carry base64 audio (10 MiB).
const MAX_AUDIO_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Application state shared across all request handlers.
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Typed dialer Agent API client.
    pub dialer: AgentApiClient,
    /// Agent session manager (login, cache, persistence).
    pub sessions: SessionManager,
    /// PBX manager client for redirects and originations.
    pub ami: Arc<AmiClient>,
    /// Hand-off dialplan coordinates.
    pub transfer: TransferConfig,
    /// Speech-to-text client.
    pub stt: SttClient,
    /// Text-to-speech client.
    pub tts: TtsClient,
    /// Dialogue turn engine.
    pub engine: DialogueEngine,
    /// Rate limiter state.
    pub rate_limiter: RateLimiter,
    /// Requests allowed per IP per minute.
    pub rate_limit_per_minute: u32,
    /// API key guarding the API surface; `None` leaves it open.
    pub api_key: Option<String>,
    /// Password used for dialer agent accounts without one of their own.
    pub default_agent_pass: String,
    /// Broadcast channel feeding the SSE event stream.
    pub observe_tx: broadcast::Sender<CallEvent>,
}

/// Emits an event to the log and broadcasts it to the SSE stream.
///
/// Failures are logged as warnings but never block the caller — observation
/// must not break the operation being observed.
pub fn emit_and_broadcast(
    conn: &rusqlite::Connection,
    entity_id: &str,
    payload: &callpilot_observe::EventPayload,
    observe_tx: &broadcast::Sender<CallEvent>,
) {
    match callpilot_observe::emit_event(conn, entity_id, payload) {
        Ok(event) => {
            if let Err(e) = observe_tx.send(event) {
                tracing::debug!(
                    event_type = payload.event_type(),
                    "event broadcast had no receivers: {}",
                    e
                );
            }
        }
        Err(e) => {
            tracing::warn!(
                event_type = payload.event_type(),
                "failed to record event: {}",
                e
            );
        }
    }
}

/// Maps a registry error to an HTTP status, logging the unexpected ones.
pub(crate) fn registry_err_to_status(e: callpilot_registry::RegistryError) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    use callpilot_registry::RegistryError;

    match e {
        RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
        RegistryError::AlreadyExists(_) => StatusCode::CONFLICT,
        RegistryError::BotUnavailable(_) | RegistryError::InvalidScript(_) => {
            StatusCode::BAD_REQUEST
        }
        ref err => {
            tracing::error!(error = %err, "registry operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Maps a dialogue error to an HTTP status.
pub(crate) fn dialogue_err_to_status(e: callpilot_dialogue::DialogueError) -> axum::http::StatusCode {
    use axum::http::StatusCode;
    use callpilot_dialogue::DialogueError;

    match e {
        DialogueError::NotFound(_) => StatusCode::NOT_FOUND,
        DialogueError::SessionClosed(_) => StatusCode::CONFLICT,
        DialogueError::StepOutOfRange { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ref err => {
            tracing::error!(error = %err, "dialogue operation failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Maps a dialer error to an HTTP error response. Vendor `ERROR` replies
/// surface as 502 with the reply text; configuration gaps as 503.
pub(crate) fn dialer_err_to_response(
    e: callpilot_dialer::DialerError,
) -> (axum::http::StatusCode, Json<Value>) {
    use axum::http::StatusCode;
    use callpilot_dialer::DialerError;

    match e {
        DialerError::Disabled => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "dialer_not_configured",
                "message": "Set dialer.base_url (and credentials) to enable call control.",
            })),
        ),
        DialerError::Vendor(reply) => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": "dialer_error", "reply": reply })),
        ),
        DialerError::MissingSession(agent) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no_session", "agent_user": agent })),
        ),
        err => {
            tracing::error!(error = %err, "dialer call failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "dialer_unreachable" })),
            )
        }
    }
}

/// Maps a manager-interface error to an HTTP error response.
pub(crate) fn ami_err_to_response(
    e: callpilot_ami::AmiError,
) -> (axum::http::StatusCode, Json<Value>) {
    use axum::http::StatusCode;
    use callpilot_ami::AmiError;

    match e {
        AmiError::Disabled => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "error": "ami_not_configured",
                "message": "Set ami.host (and credentials) to enable hand-off.",
            })),
        ),
        AmiError::ActionFailed { action, message } => (
            StatusCode::BAD_GATEWAY,
            Json(json!({ "error": "ami_action_failed", "action": action, "message": message })),
        ),
        err => {
            tracing::error!(error = %err, "manager interface call failed");
            (
                StatusCode::BAD_GATEWAY,
                Json(json!({ "error": "ami_unreachable" })),
            )
        }
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: Arc<AppState>) -> Router {
    // Everything operational sits behind the API key (when configured).
    // Health, the public event surface, and agent authentication stay open.
    let protected_routes = Router::new()
        .route(
            "/api/bots",
            post(api_bots::create_bot_handler).get(api_bots::list_bots_handler),
        )
        .route(
            "/api/bots/{botId}",
            get(api_bots::get_bot_handler)
                .put(api_bots::update_bot_handler)
                .delete(api_bots::archive_bot_handler),
        )
        .route(
            "/api/bots/{botId}/test-voice",
            post(api_bots::test_voice_handler),
        )
        .route("/api/companies", get(api_agents::list_companies_handler))
        .route(
            "/api/agents",
            post(api_agents::create_agent_handler).get(api_agents::list_agents_handler),
        )
        .route(
            "/api/agents/{agentUser}",
            get(api_agents::get_agent_handler)
                .put(api_agents::update_agent_handler)
                .delete(api_agents::delete_agent_handler),
        )
        .route(
            "/api/agents/{agentUser}/login",
            post(api_agents::login_handler),
        )
        .route(
            "/api/agents/{agentUser}/session",
            get(api_agents::get_session_handler),
        )
        .route("/api/sessions", get(api_agents::list_sessions_handler))
        .route(
            "/api/campaigns",
            get(api_campaigns::list_campaigns_handler),
        )
        .route(
            "/api/assignments",
            get(api_assignments::list_assignments_handler),
        )
        .route(
            "/api/assignments/campaign",
            post(api_assignments::assign_campaign_handler),
        )
        .route(
            "/api/assignments/agent",
            post(api_assignments::assign_agent_handler),
        )
        .route(
            "/api/assignments/provision",
            post(api_assignments::provision_handler),
        )
        .route("/api/calls/{agentUser}/dial", post(api_calls::dial_handler))
        .route(
            "/api/calls/{agentUser}/hangup",
            post(api_calls::hangup_handler),
        )
        .route(
            "/api/calls/{agentUser}/transfer",
            post(api_calls::transfer_handler),
        )
        .route(
            "/api/calls/{agentUser}/pause",
            post(api_calls::pause_handler),
        )
        .route(
            "/api/calls/{agentUser}/status",
            post(api_calls::status_handler),
        )
        .route(
            "/api/calls/{agentUser}/recording",
            get(api_calls::recording_handler),
        )
        .route(
            "/api/calls/originate",
            post(api_calls::originate_handler),
        )
        .route("/api/transfers/closer", post(api_calls::closer_handler))
        .route(
            "/api/dialogue/sessions",
            post(api_dialogue::create_session_handler)
                .get(api_dialogue::list_sessions_handler),
        )
        .route(
            "/api/dialogue/sessions/{sessionKey}",
            get(api_dialogue::get_session_handler),
        )
        .layer(axum::middleware::from_fn(middleware::require_api_key));

    // Turn routes carry base64 audio and need a larger body allowance.
    let audio_routes = Router::new()
        .route(
            "/api/dialogue/sessions/{sessionKey}/turn",
            post(api_dialogue::turn_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_AUDIO_BODY_BYTES))
        .layer(axum::middleware::from_fn(middleware::require_api_key));

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/agents/authenticate",
            post(api_agents::authenticate_handler),
        )
        .route("/api/events", get(api_observe::get_events_handler))
        .route("/events/stream", get(api_observe::get_event_stream_handler))
        .merge(protected_routes)
        .merge(audio_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(axum::middleware::from_fn(middleware::rate_limit_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(state))
}
