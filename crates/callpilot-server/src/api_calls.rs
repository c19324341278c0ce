//! Call-control handlers (dialer Agent API) and the closer hand-off (AMI).

use crate::{ami_err_to_response, dialer_err_to_response, emit_and_broadcast, AppState};
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::Json,
};
use callpilot_observe::EventPayload;
use callpilot_types::AgentStatus;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct DialRequest {
    pub phone_number: String,
}

#[derive(Deserialize)]
pub struct TransferRequest {
    pub phone_number: String,
}

#[derive(Deserialize)]
pub struct PauseRequest {
    pub pause: bool,
}

#[derive(Deserialize)]
pub struct StatusRequest {
    pub status: String,
}

#[derive(Deserialize)]
pub struct OriginateRequest {
    /// The bot's SIP peer name (dialed as `SIP/<extension>`).
    pub bot_extension: String,
    /// Dialplan extension to connect the bot to.
    pub destination: String,
}

#[derive(Deserialize)]
pub struct CloserRequest {
    /// The bot's live channel, e.g. `SIP/telecast-00013813`.
    pub channel: String,
    /// Campaign whose closers take the call. Falls back to the configured
    /// default.
    pub campaign_id: Option<String>,
}

/// Records a call event off the request path.
fn record_call_event(state: &Arc<AppState>, entity_id: &str, payload: EventPayload) {
    let pool = state.pool.clone();
    let observe_tx = state.observe_tx.clone();
    let entity = entity_id.to_string();

    tokio::task::spawn_blocking(move || match pool.get() {
        Ok(conn) => emit_and_broadcast(&conn, &entity, &payload, &observe_tx),
        Err(e) => tracing::warn!(error = %e, "no connection for call event"),
    });
}

fn validate_phone_number(number: &str) -> bool {
    !number.is_empty()
        && number.len() <= 20
        && number
            .chars()
            .all(|c| c.is_ascii_digit() || c == '+' || c == '*' || c == '#')
}

/// POST /api/calls/:agentUser/dial
pub async fn dial_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
    Json(payload): Json<DialRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !validate_phone_number(&payload.phone_number) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid phone_number"})),
        ));
    }

    let reply = state
        .dialer
        .external_dial(&agent_user, &payload.phone_number)
        .await
        .and_then(|r| r.into_result())
        .map_err(dialer_err_to_response)?;

    record_call_event(
        &state,
        &agent_user,
        EventPayload::CallDialed {
            agent_user: agent_user.clone(),
            phone_number: payload.phone_number.clone(),
        },
    );

    Ok(Json(json!({"status": "dialed", "reply": reply.raw})))
}

/// POST /api/calls/:agentUser/hangup
pub async fn hangup_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let reply = state
        .dialer
        .external_hangup(&agent_user)
        .await
        .and_then(|r| r.into_result())
        .map_err(dialer_err_to_response)?;

    record_call_event(
        &state,
        &agent_user,
        EventPayload::CallHungUp {
            agent_user: agent_user.clone(),
        },
    );

    Ok(Json(json!({"status": "hung_up", "reply": reply.raw})))
}

/// POST /api/calls/:agentUser/transfer
///
/// Conferences the destination in with the customer (the dialer drops the
/// bot leg once bridged).
pub async fn transfer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
    Json(payload): Json<TransferRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if !validate_phone_number(&payload.phone_number) {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid phone_number"})),
        ));
    }

    let reply = state
        .dialer
        .transfer_conference(&agent_user, &payload.phone_number)
        .await
        .and_then(|r| r.into_result())
        .map_err(dialer_err_to_response)?;

    record_call_event(
        &state,
        &agent_user,
        EventPayload::CallTransferred {
            agent_user: agent_user.clone(),
            target: payload.phone_number.clone(),
        },
    );

    Ok(Json(json!({"status": "transferred", "reply": reply.raw})))
}

/// POST /api/calls/:agentUser/pause
pub async fn pause_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
    Json(payload): Json<PauseRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let reply = state
        .dialer
        .external_pause(&agent_user, payload.pause)
        .await
        .and_then(|r| r.into_result())
        .map_err(dialer_err_to_response)?;

    Ok(Json(json!({
        "status": if payload.pause { "paused" } else { "resumed" },
        "reply": reply.raw,
    })))
}

/// POST /api/calls/:agentUser/status
pub async fn status_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
    Json(payload): Json<StatusRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let status: AgentStatus = payload.status.parse().map_err(|_| {
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("unknown status: {}", payload.status)})),
        )
    })?;

    let reply = state
        .dialer
        .external_status(&agent_user, status)
        .await
        .and_then(|r| r.into_result())
        .map_err(dialer_err_to_response)?;

    Ok(Json(json!({
        "status": "set",
        "agent_status": status.as_code(),
        "reply": reply.raw,
    })))
}

/// GET /api/calls/:agentUser/recording
pub async fn recording_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(agent_user): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let reply = state
        .dialer
        .recording_status(&agent_user)
        .await
        .map_err(dialer_err_to_response)?;

    Ok(Json(json!({
        "outcome": reply.outcome,
        "reply": reply.raw,
    })))
}

/// POST /api/calls/originate
///
/// Originates an outbound call from a bot's SIP peer.
pub async fn originate_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<OriginateRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if payload.bot_extension.trim().is_empty() || payload.destination.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "bot_extension and destination are required"})),
        ));
    }

    callpilot_ami::originate_bot_call(
        &state.ami,
        &state.transfer,
        &payload.bot_extension,
        &payload.destination,
    )
    .await
    .map_err(ami_err_to_response)?;

    Ok(Json(json!({
        "status": "originated",
        "bot_extension": payload.bot_extension,
        "destination": payload.destination,
    })))
}

/// POST /api/transfers/closer
///
/// Hands a live bot call to a human closer: park the customer in the
/// conference, originate a closer leg into it.
pub async fn closer_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CloserRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    if payload.channel.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "channel is required"})),
        ));
    }

    callpilot_ami::transfer_to_closer(
        &state.ami,
        &state.transfer,
        &payload.channel,
        payload.campaign_id.as_deref(),
    )
    .await
    .map_err(ami_err_to_response)?;

    let campaign = payload
        .campaign_id
        .clone()
        .unwrap_or_else(|| state.transfer.default_campaign.clone());

    record_call_event(
        &state,
        &payload.channel,
        EventPayload::CloserHandOff {
            channel: payload.channel.clone(),
            campaign_id: campaign.clone(),
        },
    );

    Ok(Json(json!({
        "status": "hand_off_started",
        "channel": payload.channel,
        "campaign_id": campaign,
    })))
}
