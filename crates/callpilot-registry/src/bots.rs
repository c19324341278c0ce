//! Bot CRUD: scripts, voices, activation, archiving.

use crate::RegistryError;
use callpilot_types::BotScript;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

/// A voicebot: an ordered script plus the voice it speaks with.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Bot {
    /// Internal database ID.
    pub id: i64,
    /// Unique public ID.
    pub bot_id: String,
    /// Display name.
    pub name: String,
    /// Script lines in speaking order.
    pub script: Vec<String>,
    /// TTS voice name.
    pub voice: String,
    /// Whether the bot can be assigned.
    pub is_active: bool,
    /// Archived bots are kept for history but never assigned.
    pub is_archived: bool,
    /// Creation timestamp (ISO 8601).
    pub created_at: String,
    /// Last update timestamp (ISO 8601).
    pub updated_at: String,
}

/// Parameters for creating a new bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateBotParams {
    pub bot_id: String,
    pub name: String,
    pub script: Vec<String>,
    /// Defaults to the standard voice when `None`.
    pub voice: Option<String>,
}

/// Parameters for a partial bot update. `None` fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateBotParams {
    pub name: Option<String>,
    pub script: Option<Vec<String>>,
    pub voice: Option<String>,
    pub is_active: Option<bool>,
}

/// Creates a new bot.
///
/// The script is validated (non-empty, blank lines dropped) before
/// anything is written.
pub fn create_bot(conn: &Connection, params: &CreateBotParams) -> Result<(), RegistryError> {
    let script = BotScript::new(params.script.clone())?;
    let script_json = serde_json::to_string(script.lines())?;
    let voice = params
        .voice
        .clone()
        .unwrap_or_else(|| callpilot_types::TtsVoice::default().name);

    let inserted = conn.execute(
        "INSERT OR IGNORE INTO bots (bot_id, name, script_json, voice)
         VALUES (?1, ?2, ?3, ?4)",
        params![params.bot_id, params.name, script_json, voice],
    )?;
    if inserted == 0 {
        return Err(RegistryError::AlreadyExists(format!(
            "bot {}",
            params.bot_id
        )));
    }
    Ok(())
}

/// Retrieves a bot by its public ID.
pub fn get_bot(conn: &Connection, bot_id: &str) -> Result<Bot, RegistryError> {
    conn.query_row(
        "SELECT id, bot_id, name, script_json, voice, is_active, is_archived,
                created_at, updated_at
         FROM bots WHERE bot_id = ?1",
        [bot_id],
        map_row_to_bot,
    )
    .optional()?
    .ok_or_else(|| RegistryError::NotFound(format!("bot {bot_id}")))
}

/// Lists bots. With `active_only`, returns only bots that are active and
/// not archived (the set eligible for assignment).
pub fn list_bots(conn: &Connection, active_only: bool) -> Result<Vec<Bot>, RegistryError> {
    let sql = if active_only {
        "SELECT id, bot_id, name, script_json, voice, is_active, is_archived,
                created_at, updated_at
         FROM bots WHERE is_active = 1 AND is_archived = 0 ORDER BY bot_id ASC"
    } else {
        "SELECT id, bot_id, name, script_json, voice, is_active, is_archived,
                created_at, updated_at
         FROM bots ORDER BY bot_id ASC"
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map([], map_row_to_bot)?;
    let mut bots = Vec::new();
    for row in rows {
        bots.push(row?);
    }
    Ok(bots)
}

/// Updates a bot with a single atomic UPDATE statement.
///
/// Only fields that are `Some` are modified, avoiding the read-modify-write
/// race of fetch/mutate/store.
pub fn update_bot(
    conn: &Connection,
    bot_id: &str,
    updates: &UpdateBotParams,
) -> Result<(), RegistryError> {
    let mut set_parts: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    let mut idx = 1usize;

    if let Some(name) = &updates.name {
        set_parts.push(format!("name = ?{idx}"));
        values.push(Box::new(name.clone()));
        idx += 1;
    }
    if let Some(script) = &updates.script {
        let script = BotScript::new(script.clone())?;
        set_parts.push(format!("script_json = ?{idx}"));
        values.push(Box::new(serde_json::to_string(script.lines())?));
        idx += 1;
    }
    if let Some(voice) = &updates.voice {
        set_parts.push(format!("voice = ?{idx}"));
        values.push(Box::new(voice.clone()));
        idx += 1;
    }
    if let Some(active) = updates.is_active {
        set_parts.push(format!("is_active = ?{idx}"));
        values.push(Box::new(active));
        idx += 1;
    }

    if set_parts.is_empty() {
        // Nothing to change; still report a missing bot.
        let _ = get_bot(conn, bot_id)?;
        return Ok(());
    }

    set_parts.push("updated_at = datetime('now')".to_string());

    let sql = format!(
        "UPDATE bots SET {} WHERE bot_id = ?{}",
        set_parts.join(", "),
        idx
    );
    values.push(Box::new(bot_id.to_string()));

    let params: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(|v| v.as_ref()).collect();
    let count = conn.execute(&sql, params.as_slice())?;
    if count == 0 {
        return Err(RegistryError::NotFound(format!("bot {bot_id}")));
    }
    Ok(())
}

/// Archives a bot: it stays in the table for history but is deactivated
/// and excluded from assignment. Existing assignments are not touched.
pub fn archive_bot(conn: &Connection, bot_id: &str) -> Result<(), RegistryError> {
    let count = conn.execute(
        "UPDATE bots SET is_archived = 1, is_active = 0, updated_at = datetime('now')
         WHERE bot_id = ?1",
        [bot_id],
    )?;
    if count == 0 {
        return Err(RegistryError::NotFound(format!("bot {bot_id}")));
    }
    Ok(())
}

fn map_row_to_bot(row: &Row) -> rusqlite::Result<Bot> {
    let script_json: String = row.get(3)?;
    let script: Vec<String> = serde_json::from_str(&script_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(Bot {
        id: row.get(0)?,
        bot_id: row.get(1)?,
        name: row.get(2)?,
        script,
        voice: row.get(4)?,
        is_active: row.get(5)?,
        is_archived: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
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

    fn sample_params(bot_id: &str) -> CreateBotParams {
        CreateBotParams {
            bot_id: bot_id.to_string(),
            name: "Solar Outreach".to_string(),
            script: vec![
                "Hi, this is a quick call about your energy bill.".to_string(),
                "Would you like to speak with a specialist?".to_string(),
            ],
            voice: None,
        }
    }

    #[test]
    fn create_then_get_returns_same_fields() {
        let conn = test_conn();
        create_bot(&conn, &sample_params("solar_1")).expect("create");

        let bot = get_bot(&conn, "solar_1").expect("get");
        assert_eq!(bot.bot_id, "solar_1");
        assert_eq!(bot.name, "Solar Outreach");
        assert_eq!(bot.script.len(), 2);
        assert_eq!(bot.voice, "en-US-Wavenet-F");
        assert!(bot.is_active);
        assert!(!bot.is_archived);
    }

    #[test]
    fn duplicate_bot_id_rejected() {
        let conn = test_conn();
        create_bot(&conn, &sample_params("dup")).expect("create");
        let err = create_bot(&conn, &sample_params("dup")).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyExists(_)));
    }

    #[test]
    fn empty_script_rejected() {
        let conn = test_conn();
        let mut params = sample_params("empty");
        params.script = vec!["  ".to_string()];
        let err = create_bot(&conn, &params).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidScript(_)));
    }

    #[test]
    fn active_listing_excludes_archived() {
        let conn = test_conn();
        create_bot(&conn, &sample_params("a")).expect("create a");
        create_bot(&conn, &sample_params("b")).expect("create b");
        archive_bot(&conn, "b").expect("archive b");

        let active = list_bots(&conn, true).expect("list active");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].bot_id, "a");

        let all = list_bots(&conn, false).expect("list all");
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn partial_update_leaves_other_fields() {
        let conn = test_conn();
        create_bot(&conn, &sample_params("upd")).expect("create");

        update_bot(
            &conn,
            "upd",
            &UpdateBotParams {
                voice: Some("en-GB-Wavenet-B".to_string()),
                ..Default::default()
            },
        )
        .expect("update");

        let bot = get_bot(&conn, "upd").expect("get");
        assert_eq!(bot.voice, "en-GB-Wavenet-B");
        assert_eq!(bot.name, "Solar Outreach");
    }

    #[test]
    fn update_missing_bot_is_not_found() {
        let conn = test_conn();
        let err = update_bot(
            &conn,
            "ghost",
            &UpdateBotParams {
                name: Some("x".to_string()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
    }
}
