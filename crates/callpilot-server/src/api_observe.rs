//! Event log handlers.
//!
//! Provides:
//! - `GET /api/events` — paginated event retrieval with filtering
//! - `GET /events/stream` — SSE real-time stream of events

use crate::AppState;
use axum::{
    extract::{Extension, Query},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    Json,
};
use callpilot_observe::{query_events, CallEvent, EventDomain, EventFilter};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Filter by event domain (e.g., `CALL`, `DIALOGUE`).
    pub domain: Option<String>,
    /// Filter by event type (e.g., `AGENT_LOGGED_IN`).
    pub event_type: Option<String>,
    /// Filter by entity ID (bot ID, agent login, session key, channel).
    pub entity_id: Option<String>,
    /// Return events that occurred at or after this ISO 8601 timestamp.
    pub since: Option<String>,
    /// Maximum number of events to return (default: 100, max: 1000).
    pub limit: Option<i64>,
}

/// Response wrapper for paginated event retrieval.
#[derive(Debug, Serialize)]
pub struct EventsResponse {
    /// The matching events in chronological order.
    pub events: Vec<CallEvent>,
    /// The number of events returned.
    pub count: usize,
}

/// Handler for `GET /api/events`.
pub async fn get_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, Response> {
    let domain = match &params.domain {
        Some(d) => {
            let parsed: EventDomain = d.parse().map_err(|_| {
                (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({
                        "error": format!(
                            "invalid domain: {d}. Expected one of: BOT, AGENT, CALL, TRANSFER, DIALOGUE"
                        )
                    })),
                )
                    .into_response()
            })?;
            Some(parsed)
        }
        None => None,
    };

    let limit = params.limit.unwrap_or(100).clamp(1, 1000);

    let filter = EventFilter {
        domain,
        event_type: params.event_type,
        entity_id: params.entity_id,
        since: params.since,
        limit: Some(limit),
    };

    let events = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            query_events(&conn, &filter).map_err(|e| e.to_string())
        }
    })
    .await
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": format!("task join error: {e}") })),
        )
            .into_response()
    })?
    .map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": e })),
        )
            .into_response()
    })?;

    let count = events.len();
    Ok(Json(EventsResponse { events, count }))
}

/// Query parameters for `GET /events/stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    /// Filter by event domain.
    pub domain: Option<String>,
}

/// Handler for `GET /events/stream`.
///
/// Streams events in real time via SSE, optionally filtered by domain.
pub async fn get_event_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<StreamQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let domain_filter: Option<EventDomain> = params.domain.as_deref().and_then(|d| d.parse().ok());

    let rx = state.observe_tx.subscribe();
    let stream = BroadcastStream::new(rx);

    let mapped_stream = stream.filter_map(move |result| match result {
        Ok(event) => {
            if let Some(filter_domain) = domain_filter {
                if event.domain != filter_domain.as_str() {
                    return None;
                }
            }

            match serde_json::to_string(&event) {
                Ok(data) => Some(Ok(Event::default().data(data))),
                Err(e) => {
                    tracing::error!("failed to serialize event: {}", e);
                    None
                }
            }
        }
        Err(_lagged) => None,
    });

    Sse::new(mapped_stream).keep_alive(KeepAlive::default())
}
