//! Dialer agent records: credentials, company membership, activation.
//!
//! Passwords are hashed with argon2; the hash never leaves this module.
//! Listing and retrieval return [`Agent`], which deliberately has no
//! password field.

use crate::{companies, RegistryError};
use argon2::password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A dialer agent, as exposed by the API. Never carries the password hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Agent {
    /// Internal database ID.
    pub id: i64,
    /// Unique dialer login.
    pub agent_user: String,
    /// Company login prefix used on the dialer side.
    pub agent_login: String,
    /// Company the agent belongs to, if any.
    pub company_name: Option<String>,
    /// Whether the agent may be provisioned.
    pub is_active: bool,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last password change timestamp (ISO 8601).
    pub password_changed_at: String,
}

/// Parameters for creating a new agent.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAgentParams {
    pub agent_user: String,
    pub password: String,
    pub agent_login: String,
    pub company_name: String,
}

/// Parameters for a partial agent update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAgentParams {
    pub agent_login: Option<String>,
    pub company_name: Option<String>,
    pub is_active: Option<bool>,
    /// When set, the password is re-hashed and `password_changed_at` bumps.
    pub password: Option<String>,
}

fn hash_password(password: &str) -> Result<String, RegistryError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| RegistryError::PasswordHash(e.to_string()))
}

/// Creates a new agent, ensuring its company exists, in one transaction.
pub fn create_agent(conn: &Connection, params: &CreateAgentParams) -> Result<Agent, RegistryError> {
    let exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM agents WHERE agent_user = ?1",
            [&params.agent_user],
            |row| row.get(0),
        )?;
    if exists {
        return Err(RegistryError::AlreadyExists(format!(
            "agent {}",
            params.agent_user
        )));
    }

    let password_hash = hash_password(&params.password)?;

    let tx = conn.unchecked_transaction()?;
    let company_id = companies::ensure_company(&tx, &params.company_name, &params.agent_login)?;
    tx.execute(
        "INSERT INTO agents (agent_user, password_hash, agent_login, company_id)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            params.agent_user,
            password_hash,
            params.agent_login,
            company_id
        ],
    )?;
    tx.commit()?;

    get_agent(conn, &params.agent_user)
}

/// Retrieves an agent by dialer login.
pub fn get_agent(conn: &Connection, agent_user: &str) -> Result<Agent, RegistryError> {
    conn.query_row(
        "SELECT a.id, a.agent_user, a.agent_login, c.name, a.is_active,
                a.created_at, a.password_changed_at
         FROM agents a LEFT JOIN companies c ON c.id = a.company_id
         WHERE a.agent_user = ?1",
        [agent_user],
        map_row_to_agent,
    )
    .optional()?
    .ok_or_else(|| RegistryError::NotFound(format!("agent {agent_user}")))
}

/// Lists all agents (without password hashes).
pub fn list_agents(conn: &Connection) -> Result<Vec<Agent>, RegistryError> {
    let mut stmt = conn.prepare(
        "SELECT a.id, a.agent_user, a.agent_login, c.name, a.is_active,
                a.created_at, a.password_changed_at
         FROM agents a LEFT JOIN companies c ON c.id = a.company_id
         ORDER BY a.agent_user ASC",
    )?;
    let rows = stmt.query_map([], map_row_to_agent)?;
    let mut agents = Vec::new();
    for row in rows {
        agents.push(row?);
    }
    Ok(agents)
}

/// Updates an agent. Company changes go through `ensure_company` so a new
/// company name materializes a row; password changes re-hash.
pub fn update_agent(
    conn: &Connection,
    agent_user: &str,
    updates: &UpdateAgentParams,
) -> Result<(), RegistryError> {
    // Resolve the target first so a missing agent is a clean 404 for callers.
    let current = get_agent(conn, agent_user)?;

    let tx = conn.unchecked_transaction()?;

    if let Some(company_name) = &updates.company_name {
        let login = updates
            .agent_login
            .clone()
            .unwrap_or_else(|| current.agent_login.clone());
        let company_id = companies::ensure_company(&tx, company_name, &login)?;
        tx.execute(
            "UPDATE agents SET company_id = ?1, updated_at = datetime('now')
             WHERE agent_user = ?2",
            params![company_id, agent_user],
        )?;
    }
    if let Some(agent_login) = &updates.agent_login {
        tx.execute(
            "UPDATE agents SET agent_login = ?1, updated_at = datetime('now')
             WHERE agent_user = ?2",
            params![agent_login, agent_user],
        )?;
    }
    if let Some(active) = updates.is_active {
        tx.execute(
            "UPDATE agents SET is_active = ?1, updated_at = datetime('now')
             WHERE agent_user = ?2",
            params![active, agent_user],
        )?;
    }
    if let Some(password) = &updates.password {
        let password_hash = hash_password(password)?;
        tx.execute(
            "UPDATE agents SET password_hash = ?1,
                    password_changed_at = datetime('now'),
                    updated_at = datetime('now')
             WHERE agent_user = ?2",
            params![password_hash, agent_user],
        )?;
    }

    tx.commit()?;
    Ok(())
}

/// Deletes an agent.
pub fn delete_agent(conn: &Connection, agent_user: &str) -> Result<(), RegistryError> {
    let count = conn.execute("DELETE FROM agents WHERE agent_user = ?1", [agent_user])?;
    if count == 0 {
        return Err(RegistryError::NotFound(format!("agent {agent_user}")));
    }
    Ok(())
}

/// Checks a password against the stored hash.
///
/// Returns `Ok(false)` both for a wrong password and for an unknown agent,
/// so callers cannot distinguish the two.
pub fn verify_password(
    conn: &Connection,
    agent_user: &str,
    password: &str,
) -> Result<bool, RegistryError> {
    let hash: Option<String> = conn
        .query_row(
            "SELECT password_hash FROM agents WHERE agent_user = ?1",
            [agent_user],
            |row| row.get(0),
        )
        .optional()?;

    let Some(hash) = hash else {
        return Ok(false);
    };

    let parsed =
        PasswordHash::new(&hash).map_err(|e| RegistryError::PasswordHash(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn map_row_to_agent(row: &Row) -> rusqlite::Result<Agent> {
    Ok(Agent {
        id: row.get(0)?,
        agent_user: row.get(1)?,
        agent_login: row.get(2)?,
        company_name: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
        password_changed_at: row.get(6)?,
    })
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

    fn sample_params(agent_user: &str) -> CreateAgentParams {
        CreateAgentParams {
            agent_user: agent_user.to_string(),
            password: "hello123".to_string(),
            agent_login: "alg".to_string(),
            company_name: "Allegient".to_string(),
        }
    }

    #[test]
    fn create_materializes_company_and_round_trips() {
        let conn = test_conn();
        let agent = create_agent(&conn, &sample_params("8024")).expect("create");

        assert_eq!(agent.agent_user, "8024");
        assert_eq!(agent.company_name.as_deref(), Some("Allegient"));
        assert!(agent.is_active);

        let company = companies::get_company_by_name(&conn, "Allegient").expect("company");
        assert_eq!(company.agent_login, "alg");
    }

    #[test]
    fn duplicate_agent_rejected() {
        let conn = test_conn();
        create_agent(&conn, &sample_params("8024")).expect("create");
        let err = create_agent(&conn, &sample_params("8024")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[test]
    fn password_verifies_and_rejects() {
        let conn = test_conn();
        create_agent(&conn, &sample_params("8024")).expect("create");

        assert!(verify_password(&conn, "8024", "hello123").expect("verify"));
        assert!(!verify_password(&conn, "8024", "wrong").expect("verify wrong"));
        assert!(!verify_password(&conn, "nobody", "hello123").expect("verify unknown"));
    }

    #[test]
    fn password_update_rehashes() {
        let conn = test_conn();
        create_agent(&conn, &sample_params("8024")).expect("create");

        update_agent(
            &conn,
            "8024",
            &UpdateAgentParams {
                password: Some("newpass".to_string()),
                ..Default::default()
            },
        )
        .expect("update");

        assert!(!verify_password(&conn, "8024", "hello123").expect("old rejected"));
        assert!(verify_password(&conn, "8024", "newpass").expect("new accepted"));
    }

    #[test]
    fn listing_never_exposes_hash() {
        let conn = test_conn();
        create_agent(&conn, &sample_params("8024")).expect("create");

        let agents = list_agents(&conn).expect("list");
        let json = serde_json::to_string(&agents).expect("serialize");
        assert!(!json.contains("argon2"), "serialized agent leaked a hash");
        assert!(!json.contains("password"), "serialized agent mentions password");
    }

    #[test]
    fn delete_then_get_is_not_found() {
        let conn = test_conn();
        create_agent(&conn, &sample_params("8024")).expect("create");
        delete_agent(&conn, "8024").expect("delete");

        let err = get_agent(&conn, "8024").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
