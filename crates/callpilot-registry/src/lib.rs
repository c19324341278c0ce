//! Registry for bots, companies, dialer agents, and bot assignments.
//!
//! Implements CRUD over the callpilot datastore as plain functions taking a
//! `&rusqlite::Connection`. Callers own pooling and blocking-context
//! concerns; everything here is synchronous SQL.
//!
//! The assignment operations carry the service's one real invariant: after
//! any assign call there is **exactly one** active assignment per agent
//! (respectively per campaign for campaign-level assignments). The
//! deactivate-previous/insert-new pair runs in a single transaction and a
//! partial unique index backstops it.

mod agents;
mod assignments;
mod bots;
mod companies;

pub use agents::{
    create_agent, delete_agent, get_agent, list_agents, update_agent, verify_password, Agent,
    CreateAgentParams, UpdateAgentParams,
};
pub use assignments::{
    active_for_agent, active_for_campaign, assign_bot_to_agent, assign_bot_to_campaign,
    list_assignments, record_session, Assignment, AssignmentFilter,
};
pub use bots::{archive_bot, create_bot, get_bot, list_bots, update_bot, Bot, CreateBotParams,
    UpdateBotParams};
pub use companies::{ensure_company, get_company_by_name, list_companies, Company};

use callpilot_types::EmptyScriptError;
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("bot {0} is archived or inactive")]
    BotUnavailable(String),

    #[error("invalid bot script: {0}")]
    InvalidScript(#[from] EmptyScriptError),

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("password hashing error: {0}")]
    PasswordHash(String),
}
