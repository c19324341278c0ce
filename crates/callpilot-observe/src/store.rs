//! Persistence operations for the event log.
//!
//! Writes go through [`emit_event`], which serializes the payload, assigns
//! a monotonically increasing sequence number, and inserts in one
//! statement. Reads go through [`query_events`] with optional filters.

use rusqlite::{params, Connection};

use crate::error::ObserveError;
use crate::event::{CallEvent, EventDomain, EventPayload};

/// Writes a single event to the log.
///
/// The sequence number is assigned inside the INSERT itself
/// (`COALESCE(MAX(seq), 0) + 1` as a subquery) so two concurrent writers
/// can never observe the same maximum and collide.
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure or
/// `ObserveError::Serialization` if the payload cannot be serialized.
pub fn emit_event(
    conn: &Connection,
    entity_id: &str,
    payload: &EventPayload,
) -> Result<CallEvent, ObserveError> {
    let payload_json = serde_json::to_string(payload)?;
    let domain = payload.domain();

    let row = conn.query_row(
        "INSERT INTO call_event_log
            (domain, event_type, entity_type, entity_id, seq, payload_json, occurred_at)
         VALUES (
            ?1, ?2, ?3, ?4,
            (SELECT COALESCE(MAX(seq), 0) + 1 FROM call_event_log),
            ?5,
            datetime('now')
         )
         RETURNING id, seq, occurred_at",
        params![
            domain.as_str(),
            payload.event_type(),
            payload.entity_type(),
            entity_id,
            payload_json,
        ],
        |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, i64>(1)?,
                row.get::<_, String>(2)?,
            ))
        },
    )?;

    let (id, seq, occurred_at) = row;

    Ok(CallEvent {
        id,
        domain: domain.as_str().to_string(),
        event_type: payload.event_type().to_string(),
        entity_type: payload.entity_type().to_string(),
        entity_id: entity_id.to_string(),
        seq,
        payload_json,
        occurred_at,
    })
}

/// Filter criteria for querying the event log.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by event domain.
    pub domain: Option<EventDomain>,
    /// Filter by event type string.
    pub event_type: Option<String>,
    /// Filter by entity ID.
    pub entity_id: Option<String>,
    /// Return events that occurred at or after this ISO 8601 timestamp.
    pub since: Option<String>,
    /// Maximum number of events to return (default: 100).
    pub limit: Option<i64>,
}

/// Queries the event log with optional filters, oldest first.
///
/// # Errors
///
/// Returns `ObserveError::Database` on SQL failure.
pub fn query_events(
    conn: &Connection,
    filter: &EventFilter,
) -> Result<Vec<CallEvent>, ObserveError> {
    // WHERE clauses and bind parameters are collected separately so nothing
    // is interpolated into the SQL text.
    let mut clauses: Vec<String> = Vec::new();
    let mut param_values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1u32;

    if let Some(domain) = filter.domain {
        clauses.push(format!("domain = ?{idx}"));
        param_values.push(Box::new(domain.as_str().to_string()));
        idx += 1;
    }
    if let Some(ref et) = filter.event_type {
        clauses.push(format!("event_type = ?{idx}"));
        param_values.push(Box::new(et.clone()));
        idx += 1;
    }
    if let Some(ref ent_id) = filter.entity_id {
        clauses.push(format!("entity_id = ?{idx}"));
        param_values.push(Box::new(ent_id.clone()));
        idx += 1;
    }
    if let Some(ref since) = filter.since {
        clauses.push(format!("occurred_at >= ?{idx}"));
        param_values.push(Box::new(since.clone()));
        idx += 1;
    }

    let limit = filter.limit.unwrap_or(100);
    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT id, domain, event_type, entity_type, entity_id, seq, payload_json, occurred_at
         FROM call_event_log
         {where_clause}
         ORDER BY seq ASC
         LIMIT ?{idx}"
    );

    param_values.push(Box::new(limit));

    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        param_values.iter().map(|p| &**p).collect();

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), |row| {
        Ok(CallEvent {
            id: row.get(0)?,
            domain: row.get(1)?,
            event_type: row.get(2)?,
            entity_type: row.get(3)?,
            entity_id: row.get(4)?,
            seq: row.get(5)?,
            payload_json: row.get(6)?,
            occurred_at: row.get(7)?,
        })
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?);
    }

    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        callpilot_db::run_migrations(&conn).expect("migrations");
        conn
    }

    #[test]
    fn events_get_monotonic_sequence_numbers() {
        let conn = test_conn();

        let first = emit_event(
            &conn,
            "b1",
            &EventPayload::BotCreated {
                bot_id: "b1".to_string(),
                script_lines: 3,
            },
        )
        .expect("emit 1");
        let second = emit_event(
            &conn,
            "8024",
            &EventPayload::AgentLoggedIn {
                agent_user: "8024".to_string(),
                session_id: "8600051".to_string(),
                synthesized: true,
            },
        )
        .expect("emit 2");

        assert_eq!(first.seq, 1);
        assert_eq!(second.seq, 2);
    }

    #[test]
    fn filters_restrict_by_domain_and_entity() {
        let conn = test_conn();

        emit_event(
            &conn,
            "b1",
            &EventPayload::BotCreated {
                bot_id: "b1".to_string(),
                script_lines: 1,
            },
        )
        .expect("bot event");
        emit_event(
            &conn,
            "8024",
            &EventPayload::CallHungUp {
                agent_user: "8024".to_string(),
            },
        )
        .expect("call event");
        emit_event(
            &conn,
            "8025",
            &EventPayload::CallHungUp {
                agent_user: "8025".to_string(),
            },
        )
        .expect("call event 2");

        let calls = query_events(
            &conn,
            &EventFilter {
                domain: Some(EventDomain::Call),
                ..Default::default()
            },
        )
        .expect("query calls");
        assert_eq!(calls.len(), 2);

        let one_agent = query_events(
            &conn,
            &EventFilter {
                domain: Some(EventDomain::Call),
                entity_id: Some("8024".to_string()),
                ..Default::default()
            },
        )
        .expect("query one agent");
        assert_eq!(one_agent.len(), 1);
        assert_eq!(one_agent[0].entity_id, "8024");
    }

    #[test]
    fn limit_caps_results_oldest_first() {
        let conn = test_conn();
        for i in 0..5 {
            emit_event(
                &conn,
                &format!("bot-{i}"),
                &EventPayload::BotArchived {
                    bot_id: format!("bot-{i}"),
                },
            )
            .expect("emit");
        }

        let events = query_events(
            &conn,
            &EventFilter {
                limit: Some(3),
                ..Default::default()
            },
        )
        .expect("query");
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].seq, 1);
        assert_eq!(events[2].seq, 3);
    }

    #[test]
    fn payload_round_trips_through_the_log() {
        let conn = test_conn();
        let payload = EventPayload::DialogueCompleted {
            session_key: "abc".to_string(),
            outcome: "transfer_to_agent".to_string(),
        };
        let event = emit_event(&conn, "abc", &payload).expect("emit");

        let back: EventPayload =
            serde_json::from_str(&event.payload_json).expect("deserialize");
        match back {
            EventPayload::DialogueCompleted { outcome, .. } => {
                assert_eq!(outcome, "transfer_to_agent")
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }
}
