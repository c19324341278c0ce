//! Bot-script playback: intent classification, the turn engine, and
//! call-session persistence.
//!
//! A bot walks a customer through its script one line at a time. Each turn
//! takes the customer's transcribed reply, classifies it into the
//! yes/no/repeat/unrecognized vocabulary, and decides what the bot does
//! next: advance, repeat, reprompt, end the call, or hand off to a human.
//! The engine itself is pure; persistence lives in the session store.

mod classify;
mod engine;
mod store;

pub use classify::classify_intent;
pub use engine::{DialogueEngine, EngineConfig, TurnOutcome};
pub use store::{
    create_session, get_session, list_sessions, record_turn, CallSession, TurnRecord,
};

use thiserror::Error;

/// Errors that can occur during dialogue operations.
#[derive(Debug, Error)]
pub enum DialogueError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("session {0} not found")]
    NotFound(String),

    #[error("session {0} is already finished")]
    SessionClosed(String),

    #[error("step {step} is outside the script ({len} lines)")]
    StepOutOfRange {
        /// The offending step index.
        step: usize,
        /// Script length.
        len: usize,
    },
}
