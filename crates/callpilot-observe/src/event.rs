//! Event domain, payload, and record types for the event log.

use serde::{Deserialize, Serialize};

/// Event domains. Each groups related event types for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventDomain {
    /// Bot lifecycle: creation, archiving.
    #[serde(rename = "BOT")]
    Bot,
    /// Agent lifecycle: creation, dialer logins, session refresh.
    #[serde(rename = "AGENT")]
    Agent,
    /// Call control: dial, hangup, conference transfer.
    #[serde(rename = "CALL")]
    Call,
    /// Hand-off and assignment activity.
    #[serde(rename = "TRANSFER")]
    Transfer,
    /// Dialogue turns and completions.
    #[serde(rename = "DIALOGUE")]
    Dialogue,
}

impl EventDomain {
    /// Returns the canonical string label for this domain.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bot => "BOT",
            Self::Agent => "AGENT",
            Self::Call => "CALL",
            Self::Transfer => "TRANSFER",
            Self::Dialogue => "DIALOGUE",
        }
    }
}

impl std::fmt::Display for EventDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventDomain {
    type Err = ParseEventDomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOT" => Ok(Self::Bot),
            "AGENT" => Ok(Self::Agent),
            "CALL" => Ok(Self::Call),
            "TRANSFER" => Ok(Self::Transfer),
            "DIALOGUE" => Ok(Self::Dialogue),
            _ => Err(ParseEventDomainError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown event domain string.
#[derive(Debug, Clone)]
pub struct ParseEventDomainError(pub String);

impl std::fmt::Display for ParseEventDomainError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event domain: {}", self.0)
    }
}

impl std::error::Error for ParseEventDomainError {}

/// Structured event payloads, serialized into the `payload_json` column.
/// Each variant corresponds to an `event_type` string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    // ── Bot domain ───────────────────────────────────────────────────
    /// A bot was created.
    BotCreated {
        /// Public bot ID.
        bot_id: String,
        /// Number of script lines.
        script_lines: usize,
    },

    /// A bot was archived.
    BotArchived {
        /// Public bot ID.
        bot_id: String,
    },

    // ── Agent domain ─────────────────────────────────────────────────
    /// An agent record was created.
    AgentCreated {
        /// Dialer login.
        agent_user: String,
        /// Company the agent belongs to.
        company_name: String,
    },

    /// An agent logged in to the dialer.
    AgentLoggedIn {
        /// Dialer login.
        agent_user: String,
        /// The acquired 7-digit session ID.
        session_id: String,
        /// Whether the ID was synthesized locally.
        synthesized: bool,
    },

    /// An agent's dialer session was refreshed by the background task.
    AgentSessionRefreshed {
        /// Dialer login.
        agent_user: String,
        /// The new session ID.
        session_id: String,
    },

    // ── Call domain ──────────────────────────────────────────────────
    /// A manual outbound call was placed.
    CallDialed {
        /// Dialer login placing the call.
        agent_user: String,
        /// Destination number.
        phone_number: String,
    },

    /// The agent's live call was hung up.
    CallHungUp {
        /// Dialer login.
        agent_user: String,
    },

    /// The live call was conferenced out to another number.
    CallTransferred {
        /// Dialer login.
        agent_user: String,
        /// Transfer destination.
        target: String,
    },

    // ── Transfer domain ──────────────────────────────────────────────
    /// A live bot call was handed to a human closer.
    CloserHandOff {
        /// The bot's live channel.
        channel: String,
        /// Campaign whose closers were dialed.
        campaign_id: String,
    },

    /// A new assignment became the active one for its key.
    AssignmentActivated {
        /// Assigned bot.
        bot_id: String,
        /// Campaign.
        campaign_id: String,
        /// Agent, for agent-level assignments.
        agent_user: Option<String>,
    },

    // ── Dialogue domain ──────────────────────────────────────────────
    /// One customer turn was processed.
    DialogueTurn {
        /// Session key.
        session_key: String,
        /// Classified intent.
        intent: String,
        /// Action the engine chose.
        action: String,
    },

    /// A dialogue session finished.
    DialogueCompleted {
        /// Session key.
        session_key: String,
        /// Final action (`transfer_to_agent`/`end_call`).
        outcome: String,
    },
}

impl EventPayload {
    /// The domain this payload belongs to.
    pub fn domain(&self) -> EventDomain {
        match self {
            Self::BotCreated { .. } | Self::BotArchived { .. } => EventDomain::Bot,
            Self::AgentCreated { .. }
            | Self::AgentLoggedIn { .. }
            | Self::AgentSessionRefreshed { .. } => EventDomain::Agent,
            Self::CallDialed { .. } | Self::CallHungUp { .. } | Self::CallTransferred { .. } => {
                EventDomain::Call
            }
            Self::CloserHandOff { .. } | Self::AssignmentActivated { .. } => EventDomain::Transfer,
            Self::DialogueTurn { .. } | Self::DialogueCompleted { .. } => EventDomain::Dialogue,
        }
    }

    /// The `event_type` string recorded for this payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::BotCreated { .. } => "BOT_CREATED",
            Self::BotArchived { .. } => "BOT_ARCHIVED",
            Self::AgentCreated { .. } => "AGENT_CREATED",
            Self::AgentLoggedIn { .. } => "AGENT_LOGGED_IN",
            Self::AgentSessionRefreshed { .. } => "AGENT_SESSION_REFRESHED",
            Self::CallDialed { .. } => "CALL_DIALED",
            Self::CallHungUp { .. } => "CALL_HUNG_UP",
            Self::CallTransferred { .. } => "CALL_TRANSFERRED",
            Self::CloserHandOff { .. } => "CLOSER_HAND_OFF",
            Self::AssignmentActivated { .. } => "ASSIGNMENT_ACTIVATED",
            Self::DialogueTurn { .. } => "DIALOGUE_TURN",
            Self::DialogueCompleted { .. } => "DIALOGUE_COMPLETED",
        }
    }

    /// The `entity_type` string recorded for this payload.
    pub fn entity_type(&self) -> &'static str {
        match self.domain() {
            EventDomain::Bot => "bot",
            EventDomain::Agent => "agent",
            EventDomain::Call => "call",
            EventDomain::Transfer => "transfer",
            EventDomain::Dialogue => "session",
        }
    }
}

/// A recorded event as read back from the log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CallEvent {
    /// Internal database ID.
    pub id: i64,
    /// Domain label.
    pub domain: String,
    /// Event type label.
    pub event_type: String,
    /// Entity type label.
    pub entity_type: String,
    /// ID of the entity the event concerns.
    pub entity_id: String,
    /// Monotonic sequence number.
    pub seq: i64,
    /// The serialized payload.
    pub payload_json: String,
    /// Timestamp (ISO 8601).
    pub occurred_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_round_trips_through_label() {
        for domain in [
            EventDomain::Bot,
            EventDomain::Agent,
            EventDomain::Call,
            EventDomain::Transfer,
            EventDomain::Dialogue,
        ] {
            let parsed: EventDomain = domain.as_str().parse().expect("parse");
            assert_eq!(parsed, domain);
        }
        assert!("PIZZA".parse::<EventDomain>().is_err());
    }

    #[test]
    fn payload_domain_and_type_are_consistent() {
        let payload = EventPayload::AgentLoggedIn {
            agent_user: "8024".to_string(),
            session_id: "8600051".to_string(),
            synthesized: false,
        };
        assert_eq!(payload.domain(), EventDomain::Agent);
        assert_eq!(payload.event_type(), "AGENT_LOGGED_IN");
        assert_eq!(payload.entity_type(), "agent");
    }

    #[test]
    fn payload_serializes_with_event_tag() {
        let payload = EventPayload::CloserHandOff {
            channel: "SIP/telecast-00013813".to_string(),
            campaign_id: "002".to_string(),
        };
        let json = serde_json::to_string(&payload).expect("serialize");
        assert!(json.contains(r#""event":"CLOSER_HAND_OFF""#));
        assert!(json.contains(r#""campaign_id":"002""#));
    }
}
