//! Dialogue session handlers: start a conversation, process turns.

use crate::{
    dialogue_err_to_status, emit_and_broadcast, registry_err_to_status, AppState,
};
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::Json,
};
use base64::Engine;
use callpilot_dialogue::{
    create_session, get_session, list_sessions, record_turn, CallSession, TurnRecord,
};
use callpilot_observe::EventPayload;
use callpilot_registry::get_bot;
use callpilot_types::BotScript;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct CreateSessionRequest {
    pub bot_id: String,
    pub agent_user: Option<String>,
}

#[derive(Deserialize)]
pub struct TurnRequest {
    /// Base64-encoded raw PCM audio of the customer's reply.
    pub audio: Option<String>,
    /// Pre-transcribed reply text; bypasses the recognizer.
    pub transcript: Option<String>,
}

#[derive(Deserialize)]
pub struct ListParams {
    pub active: Option<bool>,
}

/// POST /api/dialogue/sessions
///
/// Starts a conversation for a bot and returns the opening line to speak.
pub async fn create_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    if payload.bot_id.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let (session, greeting) = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

            let bot = get_bot(&conn, &payload.bot_id).map_err(registry_err_to_status)?;
            if bot.is_archived || !bot.is_active {
                return Err(StatusCode::BAD_REQUEST);
            }

            let session =
                create_session(&conn, &payload.bot_id, payload.agent_user.as_deref())
                    .map_err(dialogue_err_to_status)?;
            let greeting = bot.script.first().cloned().unwrap_or_default();
            Ok::<_, StatusCode>((session, greeting))
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "session": session,
            "say": greeting,
        })),
    ))
}

/// GET /api/dialogue/sessions/:sessionKey
pub async fn get_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_key): Path<String>,
) -> Result<Json<CallSession>, StatusCode> {
    let session = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            get_session(&conn, &session_key).map_err(dialogue_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(session))
}

/// GET /api/dialogue/sessions
pub async fn list_sessions_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<CallSession>>, StatusCode> {
    let active_only = params.active.unwrap_or(false);

    let sessions = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
            list_sessions(&conn, active_only).map_err(dialogue_err_to_status)
        }
    })
    .await
    .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)??;

    Ok(Json(sessions))
}

/// POST /api/dialogue/sessions/:sessionKey/turn
///
/// One customer turn: transcribe (unless a transcript is supplied),
/// classify, run the engine, persist, and — when TTS is configured —
/// render the bot's reply to audio.
pub async fn turn_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_key): Path<String>,
    Json(payload): Json<TurnRequest>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    // 1. Obtain the transcript.
    let transcript = match (payload.transcript, payload.audio) {
        (Some(text), _) => text,
        (None, Some(audio_b64)) => {
            if !state.stt.is_enabled() {
                return Err((
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({
                        "error": "stt_not_configured",
                        "message": "Set stt.url to transcribe audio, or send a transcript.",
                    })),
                ));
            }
            let audio = base64::engine::general_purpose::STANDARD
                .decode(audio_b64.as_bytes())
                .map_err(|_| {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(json!({"error": "audio is not valid base64"})),
                    )
                })?;
            state.stt.transcribe(&audio).await.map_err(|e| {
                tracing::warn!(session_key, error = %e, "transcription failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(json!({"error": "stt_failed", "message": e.to_string()})),
                )
            })?
        }
        (None, None) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "audio or transcript is required"})),
            ));
        }
    };

    // 2. Load session + script, run the engine, persist the turn.
    let (outcome, session) = tokio::task::spawn_blocking({
        let state = state.clone();
        let session_key = session_key.clone();
        let transcript = transcript.clone();
        move || {
            let conn = state
                .pool
                .get()
                .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

            let session = get_session(&conn, &session_key).map_err(dialogue_err_to_status)?;
            if session.done {
                return Err(StatusCode::CONFLICT);
            }

            let bot = get_bot(&conn, &session.bot_id).map_err(registry_err_to_status)?;
            let script = BotScript::new(bot.script).map_err(|_| StatusCode::UNPROCESSABLE_ENTITY)?;

            let outcome = state
                .engine
                .turn(&script, session.current_step, session.reprompts, &transcript)
                .map_err(dialogue_err_to_status)?;

            let turn = TurnRecord {
                step: session.current_step,
                transcript: transcript.clone(),
                intent: outcome.intent,
            };
            let updated = record_turn(
                &conn,
                &session_key,
                &turn,
                outcome.next_step,
                outcome.reprompts,
                outcome.done,
                outcome.done.then(|| outcome.directive.action.as_str()),
            )
            .map_err(dialogue_err_to_status)?;

            emit_and_broadcast(
                &conn,
                &session_key,
                &EventPayload::DialogueTurn {
                    session_key: session_key.clone(),
                    intent: outcome.intent.as_str().to_string(),
                    action: outcome.directive.action.as_str().to_string(),
                },
                &state.observe_tx,
            );
            if outcome.done {
                emit_and_broadcast(
                    &conn,
                    &session_key,
                    &EventPayload::DialogueCompleted {
                        session_key: session_key.clone(),
                        outcome: outcome.directive.action.as_str().to_string(),
                    },
                    &state.observe_tx,
                );
            }

            Ok::<_, StatusCode>((outcome, updated))
        }
    })
    .await
    .map_err(|_| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "internal"})),
        )
    })?
    .map_err(|status| (status, Json(json!({"error": "turn_failed"}))))?;

    // 3. Render the reply when TTS is available. Best effort: a rendering
    // failure does not undo the recorded turn.
    let audio_path = match (&outcome.directive.say, state.tts.is_enabled()) {
        (Some(say), true) => {
            let voice = tokio::task::spawn_blocking({
                let pool = state.pool.clone();
                let bot_id = session.bot_id.clone();
                move || {
                    pool.get()
                        .ok()
                        .and_then(|conn| get_bot(&conn, &bot_id).ok())
                        .map(|bot| callpilot_types::TtsVoice::from_name(&bot.voice))
                }
            })
            .await
            .ok()
            .flatten();

            match state.tts.synthesize(say, voice.as_ref()).await {
                Ok(path) => Some(path.display().to_string()),
                Err(e) => {
                    tracing::warn!(session_key, error = %e, "reply rendering failed");
                    None
                }
            }
        }
        _ => None,
    };

    Ok(Json(json!({
        "session_key": session.session_key,
        "transcript": transcript,
        "intent": outcome.intent,
        "action": outcome.directive.action,
        "say": outcome.directive.say,
        "audio_path": audio_path,
        "current_step": session.current_step,
        "done": session.done,
    })))
}
