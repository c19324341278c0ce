//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time and applied
//! sequentially, tracked by the `_callpilot_migrations` table. Each
//! migration runs exactly once; re-running the set is a no-op.

use rusqlite::Connection;
use thiserror::Error;

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_init",
        sql: include_str!("migrations/000_init.sql"),
    },
    Migration {
        name: "001_assignments",
        sql: include_str!("migrations/001_assignments.sql"),
    },
    Migration {
        name: "002_call_sessions",
        sql: include_str!("migrations/002_call_sessions.sql"),
    },
    Migration {
        name: "003_event_log",
        sql: include_str!("migrations/003_event_log.sql"),
    },
    Migration {
        name: "004_agent_sessions",
        sql: include_str!("migrations/004_agent_sessions.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Runs all pending migrations against the given connection.
///
/// Already-applied migrations (tracked in `_callpilot_migrations`) are
/// skipped. Each pending migration runs inside its own transaction so a
/// failure leaves no partial schema behind.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// tracking table cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, MIGRATIONS)
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _callpilot_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| MigrationError::ExecutionFailed {
        name: "_callpilot_migrations_bootstrap".to_string(),
        source: e,
    })?;

    let mut applied = 0;

    for migration in migrations {
        let already_applied: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM _callpilot_migrations WHERE name = ?1",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;

        if already_applied {
            tracing::debug!(
                migration = migration.name,
                "migration already applied, skipping"
            );
            continue;
        }

        tracing::info!(migration = migration.name, "applying migration");

        let tx = conn
            .unchecked_transaction()
            .map_err(|e| MigrationError::ExecutionFailed {
                name: migration.name.to_string(),
                source: e,
            })?;

        tx.execute_batch(migration.sql)
            .map_err(|e| MigrationError::ExecutionFailed {
                name: migration.name.to_string(),
                source: e,
            })?;

        tx.execute(
            "INSERT INTO _callpilot_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(|e| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source: e,
        })?;

        tx.commit().map_err(|e| MigrationError::ExecutionFailed {
            name: migration.name.to_string(),
            source: e,
        })?;

        applied += 1;
    }

    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn run_migrations_on_fresh_db() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let applied = run_migrations(&conn).expect("migrations should succeed");
        assert_eq!(applied, 5);

        let count: i32 = conn
            .query_row("SELECT COUNT(*) FROM _callpilot_migrations", [], |row| {
                row.get(0)
            })
            .expect("should query migration count");
        assert_eq!(count, 5);
    }

    #[test]
    fn run_migrations_idempotent() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");

        let first = run_migrations(&conn).expect("first run should succeed");
        assert_eq!(first, 5);

        let second = run_migrations(&conn).expect("second run should succeed");
        assert_eq!(second, 0, "no new migrations to apply");
    }

    #[test]
    fn all_tables_exist_after_migration() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");

        for table in [
            "bots",
            "companies",
            "agents",
            "assignments",
            "call_sessions",
            "call_event_log",
            "agent_sessions",
        ] {
            let exists: bool = conn
                .query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
                    [table],
                    |row| row.get(0),
                )
                .expect("should query sqlite_master");
            assert!(exists, "table {table} should exist");
        }
    }

    #[test]
    fn one_active_assignment_per_agent_is_enforced_by_index() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        run_migrations(&conn).expect("migrations should succeed");

        // Satisfy the assignments.bot_id -> bots.bot_id foreign key. The
        // bundled SQLite enforces foreign keys by default, so the referenced
        // bots must exist before inserting assignments.
        conn.execute_batch(
            "INSERT INTO bots (bot_id, name, script_json) VALUES ('b1', 'Bot 1', '[]');
             INSERT INTO bots (bot_id, name, script_json) VALUES ('b2', 'Bot 2', '[]');",
        )
        .expect("seed parent bots");

        conn.execute(
            "INSERT INTO assignments (bot_id, campaign_id, agent_user, is_active)
             VALUES ('b1', '001', '8024', 1)",
            [],
        )
        .expect("first active assignment");

        let dup = conn.execute(
            "INSERT INTO assignments (bot_id, campaign_id, agent_user, is_active)
             VALUES ('b2', '002', '8024', 1)",
            [],
        );
        assert!(dup.is_err(), "second active assignment for the same agent must be rejected");

        // An inactive row for the same agent is fine.
        conn.execute(
            "INSERT INTO assignments (bot_id, campaign_id, agent_user, is_active)
             VALUES ('b2', '002', '8024', 0)",
            [],
        )
        .expect("inactive duplicate is allowed");
    }

    #[test]
    fn migration_side_effects_roll_back_on_tracking_conflict() {
        let conn = Connection::open_in_memory().expect("should open in-memory db");
        let migrations = [Migration {
            name: "001_tracking_conflict",
            sql: "
                CREATE TABLE rollback_probe (id INTEGER PRIMARY KEY);
                INSERT INTO _callpilot_migrations (name) VALUES ('001_tracking_conflict');
            ",
        }];

        let err = run_migrations_from_list(&conn, &migrations)
            .expect_err("tracking insert conflict should fail migration");

        match err {
            MigrationError::ExecutionFailed { name, .. } => {
                assert_eq!(name, "001_tracking_conflict")
            }
            other => panic!("unexpected error type: {other:?}"),
        }

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'rollback_probe')",
                [],
                |row| row.get(0),
            )
            .expect("should query sqlite_master");
        assert!(!exists, "schema side effects must roll back with the failed migration");
    }
}
