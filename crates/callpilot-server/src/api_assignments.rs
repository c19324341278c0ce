//! Assignment handlers: campaign-level, agent-level, and full provisioning.

use crate::{dialer_err_to_response, emit_and_broadcast, registry_err_to_status, AppState};
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::Json,
};
use callpilot_observe::EventPayload;
use callpilot_registry::{
    assign_bot_to_agent, assign_bot_to_campaign, list_assignments, Assignment, AssignmentFilter,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct CampaignAssignRequest {
    pub bot_id: String,
    pub campaign_id: String,
}

#[derive(Deserialize)]
pub struct AgentAssignRequest {
    pub bot_id: String,
    pub campaign_id: String,
    pub agent_user: String,
}

#[derive(Deserialize)]
pub struct ProvisionRequest {
    pub bot_id: String,
    pub campaign_id: String,
    pub agent_user: String,
    /// Dialer-side password. Falls back to the configured default.
    pub agent_pass: Option<String>,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub campaign_id: Option<String>,
    pub agent_user: Option<String>,
    pub active: Option<bool>,
}

fn emit_assignment_event(
    state: &Arc<AppState>,
    conn: &rusqlite::Connection,
    bot_id: &str,
    campaign_id: &str,
    agent_user: Option<&str>,
) {
    emit_and_broadcast(
        conn,
        bot_id,
        &EventPayload::AssignmentActivated {
            bot_id: bot_id.to_string(),
            campaign_id: campaign_id.to_string(),
            agent_user: agent_user.map(str::to_string),
        },
        &state.observe_tx,
    );
}

/// POST /api/assignments/campaign
///
/// Makes `bot_id` the campaign's active bot, deactivating the previous one.
pub async fn assign_campaign_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CampaignAssignRequest>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    if payload.bot_id.is_empty() || payload.campaign_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let assignment_id = tokio::task::spawn_blocking({
        let state = state.clone();
        move || {
            let conn = state
                .pool
                .get()
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            let id = assign_bot_to_campaign(&conn, &payload.bot_id, &payload.campaign_id)
                .map_err(registry_err_to_status)?;
            emit_assignment_event(&state, &conn, &payload.bot_id, &payload.campaign_id, None);
            Ok::<_, StatusCode>(id)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok((
        StatusCode::CREATED,
        Json(json!({"status": "assigned", "assignment_id": assignment_id})),
    ))
}

/// POST /api/assignments/agent
///
/// Makes `bot_id` the agent's active bot, deactivating the previous one.
/// Records the agent's cached dialer session ID when one exists.
pub async fn assign_agent_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<AgentAssignRequest>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    if payload.bot_id.is_empty() || payload.campaign_id.is_empty() || payload.agent_user.is_empty()
    {
        return Err(StatusCode::BAD_REQUEST);
    }

    let session_id = state
        .sessions
        .get(&payload.agent_user)
        .map(|s| s.session_id);

    let assignment_id = tokio::task::spawn_blocking({
        let state = state.clone();
        move || {
            let conn = state
                .pool
                .get()
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            let id = assign_bot_to_agent(
                &conn,
                &payload.bot_id,
                &payload.campaign_id,
                &payload.agent_user,
                session_id.as_deref(),
            )
            .map_err(registry_err_to_status)?;
            emit_assignment_event(
                &state,
                &conn,
                &payload.bot_id,
                &payload.campaign_id,
                Some(&payload.agent_user),
            );
            Ok::<_, StatusCode>(id)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok((
        StatusCode::CREATED,
        Json(json!({"status": "assigned", "assignment_id": assignment_id})),
    ))
}

/// POST /api/assignments/provision
///
/// The full provisioning flow: ensure the agent exists on the dialer, log
/// it in (acquiring a session ID), probe the session, then store the
/// assignment with the session attached. A failed probe does not abort —
/// the session may still carry calls — but it is reported in the response.
pub async fn provision_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<ProvisionRequest>,
) -> Result<(StatusCode, Json<Value>), (StatusCode, Json<Value>)> {
    if payload.bot_id.is_empty() || payload.campaign_id.is_empty() || payload.agent_user.is_empty()
    {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "bot_id, campaign_id and agent_user are required"})),
        ));
    }

    let agent_pass = payload
        .agent_pass
        .clone()
        .unwrap_or_else(|| state.default_agent_pass.clone());

    // 1. Ensure the dialer-side account exists.
    let ready = state
        .sessions
        .ensure_agent(&payload.agent_user, &agent_pass)
        .await
        .map_err(dialer_err_to_response)?;
    if !ready {
        return Err((
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": "agent_creation_failed", "agent_user": payload.agent_user})),
        ));
    }

    // 2. Log in and acquire a session ID.
    let session = state
        .sessions
        .login(&payload.agent_user, &agent_pass, &payload.campaign_id)
        .await
        .map_err(dialer_err_to_response)?;

    // 3. Probe the session.
    let verified = state
        .sessions
        .verify(&payload.agent_user)
        .await
        .unwrap_or_else(|e| {
            tracing::warn!(agent_user = %payload.agent_user, error = %e, "verification probe failed");
            false
        });

    // 4. Store the assignment with the session attached.
    let assignment_id = tokio::task::spawn_blocking({
        let state = state.clone();
        let session = session.clone();
        let payload_bot = payload.bot_id.clone();
        let payload_campaign = payload.campaign_id.clone();
        let payload_agent = payload.agent_user.clone();
        move || {
            let conn = state
                .pool
                .get()
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            let id = assign_bot_to_agent(
                &conn,
                &payload_bot,
                &payload_campaign,
                &payload_agent,
                Some(&session.session_id),
            )
            .map_err(registry_err_to_status)?;
            emit_assignment_event(
                &state,
                &conn,
                &payload_bot,
                &payload_campaign,
                Some(&payload_agent),
            );
            Ok::<_, StatusCode>(id)
        }
    })
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "internal"})),
        )
    })?
    .map_err(|status| (status, Json(json!({"error": "assignment_failed"}))))?;

    crate::api_agents::record_login_event(&state, &session);

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "provisioned",
            "assignment_id": assignment_id,
            "session": session,
            "verified": verified,
        })),
    ))
}

/// GET /api/assignments
pub async fn list_assignments_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Assignment>>, StatusCode> {
    let filter = AssignmentFilter {
        campaign_id: params.campaign_id,
        agent_user: params.agent_user,
        active: params.active,
    };

    let assignments = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            list_assignments(&conn, &filter).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(assignments))
}
