//! Background tasks for the callpilot server.
//!
//! One periodic sync pass keeps dialer sessions live: every active
//! agent-level assignment gets a session if it lacks one, sessions past
//! their maximum age are refreshed, and the assignment row is updated with
//! the current session ID.

use crate::{emit_and_broadcast, AppState};
use callpilot_observe::EventPayload;
use callpilot_registry::{list_assignments, record_session, AssignmentFilter};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

/// Starts the assignment/session sync task.
///
/// Runs until the process exits. A zero interval disables the task.
pub async fn start_sync_task(state: Arc<AppState>, interval_seconds: u64, max_age_seconds: u64) {
    if interval_seconds == 0 {
        tracing::warn!("session sync task disabled (interval=0)");
        return;
    }
    if !state.dialer.is_enabled() {
        tracing::info!("session sync task idle: dialer is not configured");
        return;
    }

    let interval = Duration::from_secs(interval_seconds);
    tracing::info!(interval_seconds, max_age_seconds, "starting session sync task");

    loop {
        sleep(interval).await;

        if let Err(e) = sync_pass(&state, max_age_seconds).await {
            tracing::error!(error = %e, "session sync pass failed");
        }
    }
}

/// One sync pass. Failures on individual agents are logged and skipped so
/// one broken agent cannot stall the rest.
async fn sync_pass(state: &Arc<AppState>, max_age_seconds: u64) -> Result<(), String> {
    let assignments = tokio::task::spawn_blocking({
        let pool = state.pool.clone();
        move || {
            let conn = pool.get().map_err(|e| e.to_string())?;
            list_assignments(
                &conn,
                &AssignmentFilter {
                    active: Some(true),
                    ..Default::default()
                },
            )
            .map_err(|e| e.to_string())
        }
    })
    .await
    .map_err(|e| e.to_string())??;

    let now = chrono::Utc::now();

    for assignment in assignments {
        let Some(agent_user) = assignment.agent_user.clone() else {
            continue;
        };

        let session = state.sessions.get(&agent_user);
        let needs_login = match &session {
            None => true,
            Some(s) => chrono::DateTime::parse_from_rfc3339(&s.logged_in_at)
                .map(|t| (now - t.with_timezone(&chrono::Utc)).num_seconds() as u64 > max_age_seconds)
                .unwrap_or(true),
        };

        if !needs_login {
            continue;
        }

        let refreshed = match state
            .sessions
            .login(&agent_user, &state.default_agent_pass, &assignment.campaign_id)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(agent_user, error = %e, "session refresh failed, skipping agent");
                continue;
            }
        };

        tracing::info!(
            agent_user,
            session_id = %refreshed.session_id,
            "session refreshed by sync task"
        );

        let pool = state.pool.clone();
        let observe_tx = state.observe_tx.clone();
        let assignment_id = assignment.id;
        let session_id = refreshed.session_id.clone();
        let entity = agent_user.clone();
        let result = tokio::task::spawn_blocking(move || -> Result<(), String> {
            let conn = pool.get().map_err(|e| e.to_string())?;
            record_session(&conn, assignment_id, &session_id).map_err(|e| e.to_string())?;
            emit_and_broadcast(
                &conn,
                &entity,
                &EventPayload::AgentSessionRefreshed {
                    agent_user: entity.clone(),
                    session_id: session_id.clone(),
                },
                &observe_tx,
            );
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(agent_user, error = %e, "failed to record refreshed session")
            }
            Err(e) => tracing::error!(error = %e, "sync task join error"),
        }
    }

    Ok(())
}
