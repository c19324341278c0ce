//! Agent session acquisition, caching, and persistence.
//!
//! The dialer's login reply is free text. Somewhere in it there is usually
//! a `SESSION_ID=1234567` pair; older dialer builds only expose
//! `conf_exten=…`, and some replies carry neither. The manager tries each
//! in turn and, as a last resort, synthesizes a 7-digit ID locally — the
//! dialer accepts any well-formed ID on subsequent calls, so a synthesized
//! one keeps the agent operable. Synthesized IDs are flagged on the session
//! record and in the event log.

use crate::api::AgentApiClient;
use crate::DialerError;
use callpilot_db::DbPool;
use callpilot_types::AgentStatus;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Session IDs are always exactly this many digits.
const SESSION_ID_LEN: usize = 7;

/// A logged-in dialer agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentSession {
    /// Dialer agent login.
    pub agent_user: String,
    /// The 7-digit session ID.
    pub session_id: String,
    /// Campaign the agent was logged in to.
    pub campaign_id: String,
    /// True when the ID was synthesized locally because the login reply
    /// carried none.
    pub synthesized: bool,
    /// True once a post-login probe confirmed the session works.
    pub verified: bool,
    /// Login timestamp (RFC 3339).
    pub logged_in_at: String,
}

/// Extracts a session ID from a login reply.
///
/// Tries `SESSION_ID=<digits>` first, then `conf_exten=<digits>`, both
/// case-insensitively.
fn extract_session_id(reply: &str) -> Option<String> {
    digits_after_key(reply, "session_id=").or_else(|| digits_after_key(reply, "conf_exten="))
}

/// Finds `key` case-insensitively and returns the run of ASCII digits that
/// follows it.
fn digits_after_key(text: &str, key: &str) -> Option<String> {
    let lower = text.to_ascii_lowercase();
    let start = lower.find(key)? + key.len();
    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// Returns the last `n` characters of `s` (all of it if shorter).
fn last_n(s: &str, n: usize) -> String {
    let count = s.chars().count();
    s.chars().skip(count.saturating_sub(n)).collect()
}

/// Normalizes a candidate ID to exactly seven digits: left-padded with
/// zeros when short, truncated to the trailing seven when long.
fn normalize_session_id(raw: &str) -> String {
    let tail = last_n(raw, SESSION_ID_LEN);
    format!("{:0>width$}", tail, width = SESSION_ID_LEN)
}

/// Builds a 7-digit session ID from the agent suffix, a clock-derived
/// slice, and a random component. Used when the dialer reply carries no ID.
fn synthesize_session_id(agent_user: &str) -> String {
    use rand::Rng;

    let suffix = last_n(agent_user, 2);
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
        .to_string();
    let clock = last_n(&millis, 4);
    let random = format!("{:03}", rand::thread_rng().gen_range(0..1000));
    normalize_session_id(&format!("{suffix}{clock}{random}"))
}

fn persist_session(conn: &Connection, session: &AgentSession) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO agent_sessions
            (agent_user, session_id, campaign_id, synthesized, verified, logged_in_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)
         ON CONFLICT (agent_user) DO UPDATE SET
            session_id = excluded.session_id,
            campaign_id = excluded.campaign_id,
            synthesized = excluded.synthesized,
            verified = excluded.verified,
            logged_in_at = excluded.logged_in_at",
        params![
            session.agent_user,
            session.session_id,
            session.campaign_id,
            session.synthesized,
            session.verified,
            session.logged_in_at,
        ],
    )?;
    Ok(())
}

fn load_sessions(conn: &Connection) -> rusqlite::Result<Vec<AgentSession>> {
    let mut stmt = conn.prepare(
        "SELECT agent_user, session_id, campaign_id, synthesized, verified, logged_in_at
         FROM agent_sessions ORDER BY agent_user ASC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(AgentSession {
            agent_user: row.get(0)?,
            session_id: row.get(1)?,
            campaign_id: row.get(2)?,
            synthesized: row.get(3)?,
            verified: row.get(4)?,
            logged_in_at: row.get(5)?,
        })
    })?;
    let mut sessions = Vec::new();
    for row in rows {
        sessions.push(row?);
    }
    Ok(sessions)
}

fn delete_session(conn: &Connection, agent_user: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM agent_sessions WHERE agent_user = ?1",
        [agent_user],
    )
}

/// Manages dialer agent sessions: login, verification, refresh, and the
/// in-memory/persisted session cache.
#[derive(Debug, Clone)]
pub struct SessionManager {
    client: AgentApiClient,
    pool: DbPool,
    /// All lock acquisitions are brief HashMap operations that never span
    /// `.await` points, making a synchronous lock safe here.
    cache: Arc<RwLock<HashMap<String, AgentSession>>>,
}

impl SessionManager {
    pub fn new(client: AgentApiClient, pool: DbPool) -> Self {
        Self {
            client,
            pool,
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    fn read_cache(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, AgentSession>> {
        self.cache.read().unwrap_or_else(|poisoned| {
            tracing::error!("session cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_cache(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, AgentSession>> {
        self.cache.write().unwrap_or_else(|poisoned| {
            tracing::error!("session cache lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Reloads persisted sessions into the cache. Called once at startup.
    pub async fn load_persisted(&self) -> Result<usize, DialerError> {
        let pool = self.pool.clone();
        let sessions = tokio::task::spawn_blocking(move || -> Result<_, DialerError> {
            let conn = pool.get()?;
            Ok(load_sessions(&conn)?)
        })
        .await??;

        let count = sessions.len();
        let mut cache = self.write_cache();
        for session in sessions {
            cache.insert(session.agent_user.clone(), session);
        }
        drop(cache);

        if count > 0 {
            tracing::info!(count, "restored persisted agent sessions");
        }
        Ok(count)
    }

    /// Creates the agent account on the dialer if it does not exist.
    ///
    /// The dialer replies `ERROR … duplicate` for an existing account; both
    /// that and `SUCCESS` mean the agent is ready for login.
    pub async fn ensure_agent(
        &self,
        agent_user: &str,
        agent_pass: &str,
    ) -> Result<bool, DialerError> {
        let full_name = format!("Agent {agent_user}");
        let reply = self.client.add_agent(agent_user, agent_pass, &full_name).await?;

        let ready =
            reply.outcome.is_success() || reply.raw.to_ascii_lowercase().contains("duplicate");
        if !ready {
            tracing::warn!(agent_user, reply = %reply.raw.trim_end(), "agent creation not confirmed");
        }
        Ok(ready)
    }

    /// Logs an agent in and derives its session ID.
    ///
    /// A reply without an extractable ID does not fail the login: the ID is
    /// synthesized instead, flagged, and used like a real one. The session
    /// is cached and written through to the database.
    pub async fn login(
        &self,
        agent_user: &str,
        agent_pass: &str,
        campaign_id: &str,
    ) -> Result<AgentSession, DialerError> {
        let reply = self.client.log_agent(agent_user, agent_pass, campaign_id).await?;

        if reply.outcome.is_error() {
            tracing::warn!(
                agent_user,
                reply = %reply.raw.trim_end(),
                "login reply was an error, continuing with ID extraction"
            );
        }

        let (session_id, synthesized) = match extract_session_id(&reply.raw) {
            Some(id) if id.len() >= SESSION_ID_LEN => (normalize_session_id(&id), false),
            _ => (synthesize_session_id(agent_user), true),
        };

        if synthesized {
            tracing::info!(agent_user, session_id, "synthesized session id");
        }

        let session = AgentSession {
            agent_user: agent_user.to_string(),
            session_id,
            campaign_id: campaign_id.to_string(),
            synthesized,
            verified: false,
            logged_in_at: chrono::Utc::now().to_rfc3339(),
        };

        self.store(session.clone()).await?;

        tracing::info!(
            agent_user,
            session_id = %session.session_id,
            campaign = campaign_id,
            synthesized,
            "agent logged in"
        );
        Ok(session)
    }

    /// Probes the session with a recording-status query and a READY status
    /// set. The session counts as verified if either probe is accepted.
    /// Verification failure is reported, not fatal — the session may still
    /// work for call control.
    pub async fn verify(&self, agent_user: &str) -> Result<bool, DialerError> {
        let recording = self.client.recording_status(agent_user).await?;
        let status = self
            .client
            .external_status(agent_user, AgentStatus::Ready)
            .await?;

        let verified = recording.outcome == crate::ApiOutcome::Notice
            || status.outcome.is_success();

        if let Some(mut session) = self.get(agent_user) {
            session.verified = verified;
            self.store(session).await?;
        }

        if !verified {
            tracing::warn!(agent_user, "session verification failed");
        }
        Ok(verified)
    }

    /// Re-runs login for an agent, replacing its session.
    pub async fn refresh(
        &self,
        agent_user: &str,
        agent_pass: &str,
    ) -> Result<AgentSession, DialerError> {
        let campaign_id = self
            .get(agent_user)
            .map(|s| s.campaign_id)
            .ok_or_else(|| DialerError::MissingSession(agent_user.to_string()))?;
        self.login(agent_user, agent_pass, &campaign_id).await
    }

    /// Returns the cached session for an agent.
    pub fn get(&self, agent_user: &str) -> Option<AgentSession> {
        self.read_cache().get(agent_user).cloned()
    }

    /// Returns all cached sessions, ordered by agent.
    pub fn list(&self) -> Vec<AgentSession> {
        let mut sessions: Vec<AgentSession> = self.read_cache().values().cloned().collect();
        sessions.sort_by(|a, b| a.agent_user.cmp(&b.agent_user));
        sessions
    }

    /// Drops an agent's session from the cache and the database.
    pub async fn remove(&self, agent_user: &str) -> Result<(), DialerError> {
        self.write_cache().remove(agent_user);

        let pool = self.pool.clone();
        let user = agent_user.to_string();
        tokio::task::spawn_blocking(move || -> Result<_, DialerError> {
            let conn = pool.get()?;
            delete_session(&conn, &user)?;
            Ok(())
        })
        .await??;
        Ok(())
    }

    /// Inserts into the cache and writes through to the database.
    async fn store(&self, session: AgentSession) -> Result<(), DialerError> {
        self.write_cache()
            .insert(session.agent_user.clone(), session.clone());

        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || -> Result<_, DialerError> {
            let conn = pool.get()?;
            persist_session(&conn, &session)?;
            Ok(())
        })
        .await??;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_session_id_key() {
        let reply = "SUCCESS: agent logged in|SESSION_ID=8600051|extension=8024";
        assert_eq!(extract_session_id(reply).as_deref(), Some("8600051"));
    }

    #[test]
    fn extraction_is_case_insensitive() {
        assert_eq!(
            extract_session_id("session_id=1234567").as_deref(),
            Some("1234567")
        );
        assert_eq!(
            extract_session_id("Conf_Exten=8600052").as_deref(),
            Some("8600052")
        );
    }

    #[test]
    fn falls_back_to_conf_exten() {
        let reply = "SUCCESS: logged in|conf_exten=8600052";
        assert_eq!(extract_session_id(reply).as_deref(), Some("8600052"));
    }

    #[test]
    fn no_id_yields_none() {
        assert_eq!(extract_session_id("ERROR: invalid credentials"), None);
        assert_eq!(extract_session_id("SESSION_ID=abc"), None);
    }

    #[test]
    fn normalization_pads_and_truncates() {
        assert_eq!(normalize_session_id("123"), "0000123");
        assert_eq!(normalize_session_id("8600051"), "8600051");
        assert_eq!(normalize_session_id("998600051"), "8600051");
    }

    #[test]
    fn synthesized_ids_are_seven_digits() {
        for agent in ["8024", "7", "agent-x"] {
            let id = synthesize_session_id(agent);
            assert_eq!(id.chars().count(), 7, "id {id} for agent {agent}");
        }
    }

    #[test]
    fn sessions_persist_and_reload() {
        let conn = Connection::open_in_memory().expect("open db");
        callpilot_db::run_migrations(&conn).expect("migrations");

        let session = AgentSession {
            agent_user: "8024".to_string(),
            session_id: "8600051".to_string(),
            campaign_id: "001".to_string(),
            synthesized: false,
            verified: true,
            logged_in_at: "2024-05-01T12:00:00Z".to_string(),
        };
        persist_session(&conn, &session).expect("persist");

        // Upsert replaces the row for the same agent.
        let refreshed = AgentSession {
            session_id: "8600052".to_string(),
            verified: false,
            ..session.clone()
        };
        persist_session(&conn, &refreshed).expect("upsert");

        let loaded = load_sessions(&conn).expect("load");
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].session_id, "8600052");
        assert!(!loaded[0].verified);

        assert_eq!(delete_session(&conn, "8024").expect("delete"), 1);
        assert!(load_sessions(&conn).expect("load again").is_empty());
    }

    #[tokio::test]
    async fn manager_cache_round_trips_through_db() {
        let pool = callpilot_db::create_pool(":memory:", callpilot_db::SqliteSettings::default())
            .expect("pool");
        {
            let conn = pool.get().expect("conn");
            callpilot_db::run_migrations(&conn).expect("migrations");
        }

        let client = AgentApiClient::new(crate::DialerConfig::default()).expect("client");
        let manager = SessionManager::new(client.clone(), pool.clone());

        let session = AgentSession {
            agent_user: "8025".to_string(),
            session_id: "0001234".to_string(),
            campaign_id: "002".to_string(),
            synthesized: true,
            verified: false,
            logged_in_at: "2024-05-01T12:00:00Z".to_string(),
        };
        manager.store(session.clone()).await.expect("store");

        assert_eq!(manager.get("8025"), Some(session.clone()));

        // A fresh manager over the same pool sees the session after reload.
        let manager2 = SessionManager::new(client, pool);
        assert_eq!(manager2.get("8025"), None);
        assert_eq!(manager2.load_persisted().await.expect("reload"), 1);
        assert_eq!(manager2.get("8025"), Some(session));

        manager2.remove("8025").await.expect("remove");
        assert_eq!(manager2.get("8025"), None);
        assert_eq!(manager2.load_persisted().await.expect("reload empty"), 0);
    }
}
