//! Shared types, error definitions, and constants for the callpilot service.
//!
//! This crate provides the foundational types used across all callpilot
//! crates: dialer agent statuses, classified customer intents, dialogue
//! actions, and the validated bot script container.
//!
//! No crate in the workspace depends on anything *except* `callpilot-types`
//! for cross-cutting type definitions. This keeps the dependency graph clean
//! and prevents circular dependencies.

use serde::{Deserialize, Serialize};

pub mod voice;

pub use voice::TtsVoice;

/// Dialer-side agent state.
///
/// The string codes match what the dialer's Agent API expects in
/// `external_status` / `external_pause` calls and reports back in status
/// queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentStatus {
    /// Agent is ready to take calls.
    Ready,
    /// Agent is paused (no calls routed).
    Paused,
    /// Agent is on a live call.
    Incall,
    /// Agent is available between calls.
    Avail,
    /// Agent is not logged in to the dialer.
    LoggedOut,
}

impl AgentStatus {
    /// Returns the dialer wire code for this status.
    pub fn as_code(self) -> &'static str {
        match self {
            Self::Ready => "READY",
            Self::Paused => "PAUSED",
            Self::Incall => "INCALL",
            Self::Avail => "AVAIL",
            Self::LoggedOut => "LOGOUT",
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = ParseAgentStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "READY" => Ok(Self::Ready),
            "PAUSED" | "PAUSE" => Ok(Self::Paused),
            "INCALL" => Ok(Self::Incall),
            "AVAIL" | "AVAILABLE" => Ok(Self::Avail),
            "LOGOUT" | "LOGGED_OUT" => Ok(Self::LoggedOut),
            _ => Err(ParseAgentStatusError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown agent status code.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown agent status: {0}")]
pub struct ParseAgentStatusError(pub String);

/// A customer reply, classified into the small vocabulary the dialogue
/// engine branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Affirmative reply.
    Yes,
    /// Negative reply.
    No,
    /// The customer asked for the last line again.
    Repeat,
    /// Nothing usable was recognized.
    Unrecognized,
}

impl Intent {
    /// Returns the canonical label for this intent.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yes => "yes",
            Self::No => "no",
            Self::Repeat => "repeat",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the dialogue engine decided to do after a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogueAction {
    /// Move to the next script line and speak it.
    Advance,
    /// Hand the call to a live human agent.
    TransferToAgent,
    /// End the call politely.
    EndCall,
    /// Repeat the current script line.
    Repeat,
    /// Ask the customer to say it again.
    Reprompt,
}

impl DialogueAction {
    /// Returns the canonical label for this action.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::TransferToAgent => "transfer_to_agent",
            Self::EndCall => "end_call",
            Self::Repeat => "repeat",
            Self::Reprompt => "reprompt",
        }
    }
}

/// The directive handed to the telephony layer after a dialogue turn:
/// the action taken plus the text the bot should speak next (if any).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDirective {
    /// The action the engine chose.
    pub action: DialogueAction,
    /// What the bot says next. `None` when the call is over and nothing
    /// more is spoken.
    pub say: Option<String>,
}

/// An ordered, non-empty list of script lines a bot walks through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct BotScript {
    lines: Vec<String>,
}

impl BotScript {
    /// Builds a script from raw lines.
    ///
    /// # Errors
    ///
    /// Returns `EmptyScriptError` if `lines` is empty or every line is
    /// blank.
    pub fn new(lines: Vec<String>) -> Result<Self, EmptyScriptError> {
        let lines: Vec<String> = lines
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        if lines.is_empty() {
            return Err(EmptyScriptError);
        }
        Ok(Self { lines })
    }

    /// Returns the line at `index`, if it exists.
    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    /// Number of lines in the script.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// A script is never empty by construction.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// All lines in order.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl TryFrom<Vec<String>> for BotScript {
    type Error = EmptyScriptError;

    fn try_from(lines: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(lines)
    }
}

impl From<BotScript> for Vec<String> {
    fn from(script: BotScript) -> Self {
        script.lines
    }
}

/// Error returned when a bot script has no usable lines.
#[derive(Debug, Clone, Copy, thiserror::Error)]
#[error("bot script must contain at least one non-empty line")]
pub struct EmptyScriptError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_status_round_trips_through_code() {
        for status in [
            AgentStatus::Ready,
            AgentStatus::Paused,
            AgentStatus::Incall,
            AgentStatus::Avail,
            AgentStatus::LoggedOut,
        ] {
            let code = status.as_code();
            let parsed: AgentStatus = code.parse().expect("code should parse");
            assert_eq!(parsed, status, "status {code} should round-trip");
        }
    }

    #[test]
    fn agent_status_rejects_unknown_code() {
        let err = "DIALING".parse::<AgentStatus>().unwrap_err();
        assert_eq!(err.0, "DIALING");
    }

    #[test]
    fn bot_script_rejects_empty() {
        assert!(BotScript::new(vec![]).is_err());
        assert!(BotScript::new(vec!["   ".to_string(), "".to_string()]).is_err());
    }

    #[test]
    fn bot_script_trims_and_indexes() {
        let script = BotScript::new(vec![
            "  Hello, this is an automated call.  ".to_string(),
            "Would you like to hear more?".to_string(),
        ])
        .expect("script should build");

        assert_eq!(script.len(), 2);
        assert_eq!(script.line(0), Some("Hello, this is an automated call."));
        assert_eq!(script.line(2), None);
    }

    #[test]
    fn bot_script_serde_as_plain_array() {
        let script = BotScript::new(vec!["Hi".to_string()]).unwrap();
        let json = serde_json::to_string(&script).unwrap();
        assert_eq!(json, r#"["Hi"]"#);

        let back: BotScript = serde_json::from_str(&json).unwrap();
        assert_eq!(back, script);

        let empty: Result<BotScript, _> = serde_json::from_str("[]");
        assert!(empty.is_err(), "empty array should fail validation");
    }
}
