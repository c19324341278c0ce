//! Company records. Companies are created implicitly when an agent names a
//! new one, so the primary write path is an upsert.

use crate::RegistryError;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A company an agent belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Company {
    /// Internal database ID.
    pub id: i64,
    /// Unique company name.
    pub name: String,
    /// Shared dialer login prefix for the company's agents.
    pub agent_login: String,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
}

/// Ensures a company row exists and carries the given login, returning its
/// ID. An existing company with a different `agent_login` is updated.
pub fn ensure_company(
    conn: &Connection,
    name: &str,
    agent_login: &str,
) -> Result<i64, RegistryError> {
    if let Some(existing) = conn
        .query_row(
            "SELECT id, agent_login FROM companies WHERE name = ?1",
            [name],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
        )
        .optional()?
    {
        let (id, current_login) = existing;
        if current_login != agent_login {
            conn.execute(
                "UPDATE companies SET agent_login = ?1, updated_at = datetime('now')
                 WHERE id = ?2",
                params![agent_login, id],
            )?;
        }
        return Ok(id);
    }

    conn.execute(
        "INSERT INTO companies (name, agent_login) VALUES (?1, ?2)",
        params![name, agent_login],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Retrieves a company by name.
pub fn get_company_by_name(conn: &Connection, name: &str) -> Result<Company, RegistryError> {
    conn.query_row(
        "SELECT id, name, agent_login, created_at FROM companies WHERE name = ?1",
        [name],
        map_row_to_company,
    )
    .optional()?
    .ok_or_else(|| RegistryError::NotFound(format!("company {name}")))
}

/// Lists all companies.
pub fn list_companies(conn: &Connection) -> Result<Vec<Company>, RegistryError> {
    let mut stmt =
        conn.prepare("SELECT id, name, agent_login, created_at FROM companies ORDER BY name ASC")?;
    let rows = stmt.query_map([], map_row_to_company)?;
    let mut companies = Vec::new();
    for row in rows {
        companies.push(row?);
    }
    Ok(companies)
}

fn map_row_to_company(row: &Row) -> rusqlite::Result<Company> {
    Ok(Company {
        id: row.get(0)?,
        name: row.get(1)?,
        agent_login: row.get(2)?,
        created_at: row.get(3)?,
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

    #[test]
    fn ensure_is_idempotent_and_updates_login() {
        let conn = test_conn();

        let first = ensure_company(&conn, "Allegient", "alg").expect("first ensure");
        let second = ensure_company(&conn, "Allegient", "alg").expect("second ensure");
        assert_eq!(first, second);

        let third = ensure_company(&conn, "Allegient", "alg2").expect("third ensure");
        assert_eq!(first, third);

        let company = get_company_by_name(&conn, "Allegient").expect("get");
        assert_eq!(company.agent_login, "alg2");
    }

    #[test]
    fn list_orders_by_name() {
        let conn = test_conn();
        ensure_company(&conn, "Zenith", "z").expect("zenith");
        ensure_company(&conn, "Acme", "a").expect("acme");

        let companies = list_companies(&conn).expect("list");
        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].name, "Acme");
        assert_eq!(companies[1].name, "Zenith");
    }

    #[test]
    fn missing_company_is_not_found() {
        let conn = test_conn();
        let err = get_company_by_name(&conn, "Nobody").unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
