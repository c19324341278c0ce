//! Bot assignments to campaigns and agents.
//!
//! Both assign operations follow the same shape: inside one transaction,
//! deactivate whatever was active for the key (campaign or agent), then
//! insert the new active row. The partial unique indexes on `assignments`
//! reject any path that would leave two active rows behind.

use crate::{bots, RegistryError};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// An assignment of a bot to a campaign, optionally pinned to an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    /// Internal database ID.
    pub id: i64,
    /// The assigned bot's public ID.
    pub bot_id: String,
    /// Dialer campaign ID.
    pub campaign_id: String,
    /// Agent login for agent-level assignments; `None` for campaign-level.
    pub agent_user: Option<String>,
    /// Dialer session ID captured at provisioning time, if any.
    pub session_id: Option<String>,
    /// Whether this is the live assignment for its key.
    pub is_active: bool,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

/// Filter criteria for listing assignments.
#[derive(Debug, Clone, Default)]
pub struct AssignmentFilter {
    /// Restrict to a campaign.
    pub campaign_id: Option<String>,
    /// Restrict to an agent.
    pub agent_user: Option<String>,
    /// Restrict to active/inactive rows.
    pub active: Option<bool>,
}

fn require_assignable_bot(conn: &Connection, bot_id: &str) -> Result<(), RegistryError> {
    let bot = bots::get_bot(conn, bot_id)?;
    if bot.is_archived || !bot.is_active {
        return Err(RegistryError::BotUnavailable(bot_id.to_string()));
    }
    Ok(())
}

/// Assigns a bot to a campaign, replacing the campaign's previous active
/// assignment. Returns the new assignment's ID.
pub fn assign_bot_to_campaign(
    conn: &Connection,
    bot_id: &str,
    campaign_id: &str,
) -> Result<i64, RegistryError> {
    require_assignable_bot(conn, bot_id)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE assignments SET is_active = 0, updated_at = datetime('now')
         WHERE campaign_id = ?1 AND agent_user IS NULL AND is_active = 1",
        [campaign_id],
    )?;
    tx.execute(
        "INSERT INTO assignments (bot_id, campaign_id) VALUES (?1, ?2)",
        params![bot_id, campaign_id],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(id)
}

/// Assigns a bot to an agent (recording the campaign), replacing the
/// agent's previous active assignment. Returns the new assignment's ID.
pub fn assign_bot_to_agent(
    conn: &Connection,
    bot_id: &str,
    campaign_id: &str,
    agent_user: &str,
    session_id: Option<&str>,
) -> Result<i64, RegistryError> {
    require_assignable_bot(conn, bot_id)?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "UPDATE assignments SET is_active = 0, updated_at = datetime('now')
         WHERE agent_user = ?1 AND is_active = 1",
        [agent_user],
    )?;
    tx.execute(
        "INSERT INTO assignments (bot_id, campaign_id, agent_user, session_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![bot_id, campaign_id, agent_user, session_id],
    )?;
    let id = tx.last_insert_rowid();
    tx.commit()?;
    Ok(id)
}

/// Records (or replaces) the dialer session ID on an assignment.
pub fn record_session(
    conn: &Connection,
    assignment_id: i64,
    session_id: &str,
) -> Result<(), RegistryError> {
    let count = conn.execute(
        "UPDATE assignments SET session_id = ?1, updated_at = datetime('now')
         WHERE id = ?2",
        params![session_id, assignment_id],
    )?;
    if count == 0 {
        return Err(RegistryError::NotFound(format!(
            "assignment {assignment_id}"
        )));
    }
    Ok(())
}

/// Lists assignments matching the filter, newest first.
pub fn list_assignments(
    conn: &Connection,
    filter: &AssignmentFilter,
) -> Result<Vec<Assignment>, RegistryError> {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1usize;

    if let Some(campaign_id) = &filter.campaign_id {
        clauses.push(format!("campaign_id = ?{idx}"));
        values.push(Box::new(campaign_id.clone()));
        idx += 1;
    }
    if let Some(agent_user) = &filter.agent_user {
        clauses.push(format!("agent_user = ?{idx}"));
        values.push(Box::new(agent_user.clone()));
        idx += 1;
    }
    if let Some(active) = filter.active {
        clauses.push(format!("is_active = ?{idx}"));
        values.push(Box::new(active));
    }

    let where_clause = if clauses.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT id, bot_id, campaign_id, agent_user, session_id, is_active,
                created_at, updated_at
         FROM assignments {where_clause} ORDER BY id DESC"
    );

    let params_refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_refs.as_slice(), map_row_to_assignment)?;
    let mut assignments = Vec::new();
    for row in rows {
        assignments.push(row?);
    }
    Ok(assignments)
}

/// Returns the agent's active assignment, if any.
pub fn active_for_agent(
    conn: &Connection,
    agent_user: &str,
) -> Result<Option<Assignment>, RegistryError> {
    Ok(conn
        .query_row(
            "SELECT id, bot_id, campaign_id, agent_user, session_id, is_active,
                    created_at, updated_at
             FROM assignments WHERE agent_user = ?1 AND is_active = 1",
            [agent_user],
            map_row_to_assignment,
        )
        .optional()?)
}

/// Returns the campaign's active campaign-level assignment, if any.
pub fn active_for_campaign(
    conn: &Connection,
    campaign_id: &str,
) -> Result<Option<Assignment>, RegistryError> {
    Ok(conn
        .query_row(
            "SELECT id, bot_id, campaign_id, agent_user, session_id, is_active,
                    created_at, updated_at
             FROM assignments
             WHERE campaign_id = ?1 AND agent_user IS NULL AND is_active = 1",
            [campaign_id],
            map_row_to_assignment,
        )
        .optional()?)
}

fn map_row_to_assignment(row: &Row) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        campaign_id: row.get(2)?,
        agent_user: row.get(3)?,
        session_id: row.get(4)?,
        is_active: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}
