//! Bot CRUD and voice-test handlers.

use crate::{emit_and_broadcast, registry_err_to_status, AppState};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use callpilot_observe::EventPayload;
use callpilot_registry::{
    archive_bot, create_bot, get_bot, list_bots, update_bot, Bot, CreateBotParams, UpdateBotParams,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

/// Maximum length for a bot ID.
const MAX_BOT_ID_LEN: usize = 128;
/// Maximum length for a bot name.
const MAX_BOT_NAME_LEN: usize = 256;
/// Maximum number of script lines.
const MAX_SCRIPT_LINES: usize = 200;

#[derive(Deserialize)]
pub struct CreateBotRequest {
    /// Public bot ID. Generated when omitted.
    pub bot_id: Option<String>,
    pub name: String,
    pub script: Vec<String>,
    pub voice: Option<String>,
}

#[derive(Deserialize)]
pub struct ListBotsParams {
    /// Restrict to active, unarchived bots.
    pub active: Option<bool>,
}

#[derive(Deserialize)]
pub struct TestVoiceRequest {
    /// Text to speak. Defaults to the bot's first script line.
    pub text: Option<String>,
}

/// POST /api/bots
pub async fn create_bot_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateBotRequest>,
) -> Result<(StatusCode, Json<Bot>), StatusCode> {
    let bot_id = payload
        .bot_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    if bot_id.is_empty() || bot_id.len() > MAX_BOT_ID_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    if payload.name.is_empty() || payload.name.len() > MAX_BOT_NAME_LEN {
        return Err(StatusCode::BAD_REQUEST);
    }
    if payload.script.len() > MAX_SCRIPT_LINES {
        return Err(StatusCode::BAD_REQUEST);
    }

    let params = CreateBotParams {
        bot_id: bot_id.clone(),
        name: payload.name,
        script: payload.script,
        voice: payload.voice,
    };

    let bot = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        let observe_tx = state.observe_tx.clone();
        move || {
            let conn = pool.get().map_err(|e| {
                tracing::error!(error = %e, "failed to get db connection for create_bot");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            create_bot(&conn, &params).map_err(registry_err_to_status)?;
            let bot = get_bot(&conn, &params.bot_id).map_err(registry_err_to_status)?;
            emit_and_broadcast(
                &conn,
                &bot.bot_id,
                &EventPayload::BotCreated {
                    bot_id: bot.bot_id.clone(),
                    script_lines: bot.script.len(),
                },
                &observe_tx,
            );
            Ok::<_, StatusCode>(bot)
        }
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "create_bot task join error");
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok((StatusCode::CREATED, Json(bot)))
}

/// GET /api/bots
pub async fn list_bots_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListBotsParams>,
) -> Result<Json<Vec<Bot>>, StatusCode> {
    let active_only = params.active.unwrap_or(false);

    let bots = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|e| {
                tracing::error!(error = %e, "failed to get db connection for list_bots");
                StatusCode::INTERNAL_SERVER_ERROR
            })?;
            list_bots(&conn, active_only).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|e| {
        tracing::error!(error = %e, "list_bots task join error");
        StatusCode::INTERNAL_SERVER_ERROR
    })??;

    Ok(Json(bots))
}

/// GET /api/bots/:botId
pub async fn get_bot_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(bot_id): Path<String>,
) -> Result<Json<Bot>, StatusCode> {
    let bot = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            get_bot(&conn, &bot_id).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(bot))
}

/// PUT /api/bots/:botId
pub async fn update_bot_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(bot_id): Path<String>,
    Json(updates): Json<UpdateBotParams>,
) -> Result<Json<Bot>, StatusCode> {
    if let Some(name) = &updates.name {
        if name.is_empty() || name.len() > MAX_BOT_NAME_LEN {
            return Err(StatusCode::BAD_REQUEST);
        }
    }
    if let Some(script) = &updates.script {
        if script.len() > MAX_SCRIPT_LINES {
            return Err(StatusCode::BAD_REQUEST);
        }
    }

    let bot = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            update_bot(&conn, &bot_id, &updates).map_err(registry_err_to_status)?;
            get_bot(&conn, &bot_id).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(bot))
}

/// DELETE /api/bots/:botId
///
/// Archives rather than deletes: history and past assignments stay intact.
pub async fn archive_bot_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(bot_id): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        let observe_tx = state.observe_tx.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            archive_bot(&conn, &bot_id).map_err(registry_err_to_status)?;
            emit_and_broadcast(
                &conn,
                &bot_id,
                &EventPayload::BotArchived {
                    bot_id: bot_id.clone(),
                },
                &observe_tx,
            );
            Ok::<_, StatusCode>(())
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(json!({"status": "archived"})))
}

/// POST /api/bots/:botId/test-voice
///
/// Synthesizes a sample line with the bot's voice and returns the artifact
/// path.
pub async fn test_voice_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(bot_id): Path<String>,
    Json(payload): Json<TestVoiceRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let bot = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        let bot_id = bot_id.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            get_bot(&conn, &bot_id).map_err(registry_err_to_status)
        }
    })
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "internal"})),
        )
    })?
    .map_err(|status| (status, Json(json!({"error": "bot_lookup_failed"}))))?;

    let text = payload
        .text
        .or_else(|| bot.script.first().cloned())
        .filter(|t| !t.trim().is_empty())
        .ok_or((
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "nothing to speak"})),
        ))?;

    let voice = callpilot_types::TtsVoice::from_name(&bot.voice);
    let path = state.tts.synthesize(&text, Some(&voice)).await.map_err(|e| {
        tracing::warn!(bot_id, error = %e, "voice test failed");
        (
            StatusCode::BAD_GATEWAY,
            Json(json!({"error": "tts_failed", "message": e.to_string()})),
        )
    })?;

    Ok(Json(json!({
        "status": "ok",
        "voice": bot.voice,
        "audio_path": path.display().to_string(),
    })))
}
