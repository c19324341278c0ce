//! Call-session persistence.

use crate::DialogueError;
use callpilot_types::Intent;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// One recorded customer turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TurnRecord {
    /// The script line the customer replied to.
    pub step: usize,
    /// What the recognizer heard.
    pub transcript: String,
    /// How it was classified.
    pub intent: Intent,
}

/// A persisted bot-customer conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallSession {
    /// Internal database ID.
    pub id: i64,
    /// Public session key (UUID).
    pub session_key: String,
    /// The bot running the conversation.
    pub bot_id: String,
    /// The dialer agent leg carrying the call, if known.
    pub agent_user: Option<String>,
    /// Current script position.
    pub current_step: usize,
    /// Consecutive unrecognized replies at the current position.
    pub reprompts: u32,
    /// All turns so far, oldest first.
    pub responses: Vec<TurnRecord>,
    /// Whether the conversation is over.
    pub done: bool,
    /// Final action for finished sessions (`transfer_to_agent`/`end_call`).
    pub outcome: Option<String>,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

/// Creates a new session for a bot, returning it with a fresh session key.
pub fn create_session(
    conn: &Connection,
    bot_id: &str,
    agent_user: Option<&str>,
) -> Result<CallSession, DialogueError> {
    let session_key = uuid::Uuid::new_v4().to_string();
    conn.execute(
        "INSERT INTO call_sessions (session_key, bot_id, agent_user)
         VALUES (?1, ?2, ?3)",
        params![session_key, bot_id, agent_user],
    )?;
    get_session(conn, &session_key)
}

/// Retrieves a session by its public key.
pub fn get_session(conn: &Connection, session_key: &str) -> Result<CallSession, DialogueError> {
    conn.query_row(
        "SELECT id, session_key, bot_id, agent_user, current_step, reprompts,
                responses_json, done, outcome, created_at, updated_at
         FROM call_sessions WHERE session_key = ?1",
        [session_key],
        map_row_to_session,
    )
    .optional()?
    .ok_or_else(|| DialogueError::NotFound(session_key.to_string()))
}

/// Appends a turn and advances the session state, in one transaction.
///
/// # Errors
///
/// `DialogueError::SessionClosed` when the session is already done.
pub fn record_turn(
    conn: &Connection,
    session_key: &str,
    turn: &TurnRecord,
    next_step: usize,
    reprompts: u32,
    done: bool,
    outcome: Option<&str>,
) -> Result<CallSession, DialogueError> {
    let tx = conn.unchecked_transaction()?;

    let session = get_session(&tx, session_key)?;
    if session.done {
        return Err(DialogueError::SessionClosed(session_key.to_string()));
    }

    let mut responses = session.responses;
    responses.push(turn.clone());
    let responses_json = serde_json::to_string(&responses)?;

    tx.execute(
        "UPDATE call_sessions SET
            current_step = ?1,
            reprompts = ?2,
            responses_json = ?3,
            done = ?4,
            outcome = ?5,
            updated_at = datetime('now')
         WHERE session_key = ?6",
        params![
            next_step as i64,
            reprompts,
            responses_json,
            done,
            outcome,
            session_key
        ],
    )?;
    tx.commit()?;

    get_session(conn, session_key)
}

/// Lists sessions, optionally only the ones still in progress. Newest
/// first.
pub fn list_sessions(
    conn: &Connection,
    active_only: bool,
) -> Result<Vec<CallSession>, DialogueError> {
    let sql = if active_only {
        "SELECT id, session_key, bot_id, agent_user, current_step, reprompts,
                responses_json, done, outcome, created_at, updated_at
         FROM call_sessions WHERE done = 0 ORDER BY id DESC"
    } else {
        "SELECT id, session_key, bot_id, agent_user, current_step, reprompts,
                responses_json, done, outcome, created_at, updated_at
         FROM call_sessions ORDER BY id DESC"
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map_row_to_session)?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}

fn map_row_to_session(row: &Row) -> rusqlite::Result<CallSession> {
    let responses_json: String = row.get(6)?;
    let responses: Vec<TurnRecord> = serde_json::from_str(&responses_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(CallSession {
        id: row.get(0)?,
        session_key: row.get(1)?,
        bot_id: row.get(2)?,
        agent_user: row.get(3)?,
        current_step: row.get::<_, i64>(4)? as usize,
        reprompts: row.get(5)?,
        responses,
        done: row.get(7)?,
        outcome: row.get(8)?,
        created_at: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        callpilot_db::run_migrations(&conn).expect("migrations");
        conn.execute(
            "INSERT INTO bots (bot_id, name, script_json) VALUES ('b1', 'Bot', '[\"Hello?\"]')",
            [],
        )
        .expect("seed bot");
        conn
    }

    fn sample_turn(step: usize, intent: Intent) -> TurnRecord {
        TurnRecord {
            step,
            transcript: "yes".to_string(),
            intent,
        }
    }

    #[test]
    fn create_then_get_round_trips() {
        let conn = test_conn();
        let session = create_session(&conn, "b1", Some("8024")).expect("create");

        let fetched = get_session(&conn, &session.session_key).expect("get");
        assert_eq!(fetched, session);
        assert_eq!(fetched.current_step, 0);
        assert!(fetched.responses.is_empty());
        assert!(!fetched.done);
    }

    #[test]
    fn turns_accumulate_in_order() {
        let conn = test_conn();
        let session = create_session(&conn, "b1", None).expect("create");

        record_turn(
            &conn,
            &session.session_key,
            &sample_turn(0, Intent::Repeat),
            0,
            0,
            false,
            None,
        )
        .expect("turn 1");
        let after = record_turn(
            &conn,
            &session.session_key,
            &sample_turn(0, Intent::Yes),
            1,
            0,
            false,
            None,
        )
        .expect("turn 2");

        assert_eq!(after.responses.len(), 2);
        assert_eq!(after.responses[0].intent, Intent::Repeat);
        assert_eq!(after.responses[1].intent, Intent::Yes);
        assert_eq!(after.current_step, 1);
    }

    #[test]
    fn finished_sessions_reject_further_turns() {
        let conn = test_conn();
        let session = create_session(&conn, "b1", None).expect("create");

        let done = record_turn(
            &conn,
            &session.session_key,
            &sample_turn(0, Intent::No),
            0,
            0,
            true,
            Some("end_call"),
        )
        .expect("final turn");
        assert!(done.done);
        assert_eq!(done.outcome.as_deref(), Some("end_call"));

        let err = record_turn(
            &conn,
            &session.session_key,
            &sample_turn(0, Intent::Yes),
            1,
            0,
            false,
            None,
        )
        .unwrap_err();
        assert!(matches!(err, DialogueError::SessionClosed(_)));
    }

    #[test]
    fn active_listing_excludes_finished() {
        let conn = test_conn();
        let a = create_session(&conn, "b1", None).expect("create a");
        let _b = create_session(&conn, "b1", None).expect("create b");

        record_turn(
            &conn,
            &a.session_key,
            &sample_turn(0, Intent::No),
            0,
            0,
            true,
            Some("end_call"),
        )
        .expect("finish a");

        let active = list_sessions(&conn, true).expect("list active");
        assert_eq!(active.len(), 1);

        let all = list_sessions(&conn, false).expect("list all");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn missing_session_is_not_found() {
        let conn = test_conn();
        let err = get_session(&conn, "nope").unwrap_err();
        assert!(matches!(err, DialogueError::NotFound(_)));
    }
}
