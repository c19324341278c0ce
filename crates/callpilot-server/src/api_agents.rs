//! Agent CRUD, authentication, and dialer-session handlers.

use crate::{dialer_err_to_response, emit_and_broadcast, registry_err_to_status, AppState};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
};
use callpilot_dialer::AgentSession;
use callpilot_observe::EventPayload;
use callpilot_registry::{
    create_agent, delete_agent, get_agent, list_agents, list_companies, update_agent,
    verify_password, Agent, Company, CreateAgentParams, UpdateAgentParams,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Maximum length for an agent login.
const MAX_AGENT_USER_LEN: usize = 64;

#[derive(Deserialize)]
pub struct AuthenticateRequest {
    pub agent_user: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    /// Dialer campaign to log in to.
    pub campaign_id: String,
    /// Dialer-side password. Falls back to the configured default.
    pub password: Option<String>,
    /// Probe the session after login.
    #[serde(default)]
    pub verify: bool,
}

/// GET /api/companies
pub async fn list_companies_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Company>>, StatusCode> {
    let companies = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            list_companies(&conn).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(companies))
}

/// POST /api/agents
pub async fn create_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateAgentParams>,
) -> Result<(StatusCode, Json<Agent>), StatusCode> {
    if payload.agent_user.is_empty()
        || payload.agent_user.len() > MAX_AGENT_USER_LEN
        || payload.password.is_empty()
        || payload.agent_login.is_empty()
        || payload.company_name.is_empty()
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    let agent = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        let observe_tx = state.observe_tx.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            let agent = create_agent(&conn, &payload).map_err(registry_err_to_status)?;
            emit_and_broadcast(
                &conn,
                &agent.agent_user,
                &EventPayload::AgentCreated {
                    agent_user: agent.agent_user.clone(),
                    company_name: agent.company_name.clone().unwrap_or_default(),
                },
                &observe_tx,
            );
            Ok::<_, StatusCode>(agent)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /api/agents
pub async fn list_agents_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<Json<Vec<Agent>>, StatusCode> {
    let agents = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            list_agents(&conn).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(agents))
}

/// GET /api/agents/:agentUser
pub async fn get_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
) -> Result<Json<Agent>, StatusCode> {
    let agent = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            get_agent(&conn, &agent_user).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(agent))
}

/// PUT /api/agents/:agentUser
pub async fn update_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
    Json(updates): Json<UpdateAgentParams>,
) -> Result<Json<Agent>, StatusCode> {
    let agent = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            update_agent(&conn, &agent_user, &updates).map_err(registry_err_to_status)?;
            get_agent(&conn, &agent_user).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(agent))
}

/// DELETE /api/agents/:agentUser
pub async fn delete_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        let agent_user = agent_user.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            delete_agent(&conn, &agent_user).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    // The dialer session (if any) goes with the agent record.
    if let Err(e) = state.sessions.remove(&agent_user).await {
        tracing::warn!(agent_user, error = %e, "failed to drop session for deleted agent");
    }

    Ok(Json(json!({"status": "deleted"})))
}

/// POST /api/agents/authenticate
///
/// Password check for the agent UI. Invalid login and unknown agent are
/// indistinguishable to the caller.
pub async fn authenticate_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<AuthenticateRequest>,
) -> Result<Json<Value>, StatusCode> {
    if payload.agent_user.is_empty() || payload.password.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let agent = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            let ok = verify_password(&conn, &payload.agent_user, &payload.password)
                .map_err(registry_err_to_status)?;
            if !ok {
                return Err(StatusCode::UNAUTHORIZED);
            }
            get_agent(&conn, &payload.agent_user).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(json!({ "status": "ok", "agent": agent })))
}

/// POST /api/agents/:agentUser/login
///
/// Logs the agent in to the dialer and returns the acquired session.
pub async fn login_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if payload.campaign_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "campaign_id is required"})),
        ));
    }

    let password = payload
        .password
        .clone()
        .unwrap_or_else(|| state.default_agent_pass.clone());

    let session = state
        .sessions
        .login(&agent_user, &password, &payload.campaign_id)
        .await
        .map_err(dialer_err_to_response)?;

    let verified = if payload.verify {
        state
            .sessions
            .verify(&agent_user)
            .await
            .map_err(dialer_err_to_response)?
    } else {
        false
    };

    record_login_event(&state, &session);

    Ok(Json(json!({
        "status": "logged_in",
        "session": session,
        "verified": verified,
    })))
}

/// GET /api/agents/:agentUser/session
pub async fn get_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
) -> Result<Json<AgentSession>, StatusCode> {
    state
        .sessions
        .get(&agent_user)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

/// GET /api/sessions
pub async fn list_sessions_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<Vec<AgentSession>> {
    Json(state.sessions.list())
}

/// Records an `AgentLoggedIn` event without blocking the request path.
pub(crate) fn record_login_event(state: &Arc<AppState>, session: &AgentSession) {
    let pool = state.pool.clone();
    let observe_tx = state.observe_tx.clone();
    let payload = EventPayload::AgentLoggedIn {
        agent_user: session.agent_user.clone(),
        session_id: session.session_id.clone(),
        synthesized: session.synthesized,
    };
    let entity = session.agent_user.clone();

    tokio::task::spawn_blocking(move || match pool.get() {
        Ok(conn) => emit_and_broadcast(&conn, &entity, &payload, &observe_tx),
        Err(e) => tracing::warn!(error = %e, "no connection for login event"),
    });
}
