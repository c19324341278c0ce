//! Call-center event log.
//!
//! Every significant action the service takes — bot lifecycle, agent
//! logins, call control, hand-offs, dialogue turns — is recorded in an
//! append-only event log that operators query through the API or follow
//! live over SSE.
//!
//! # Event domains
//!
//! | Domain | Example events |
//! |--------|---------------|
//! | `BOT` | `BOT_CREATED`, `BOT_ARCHIVED` |
//! | `AGENT` | `AGENT_CREATED`, `AGENT_LOGGED_IN`, `AGENT_SESSION_REFRESHED` |
//! | `CALL` | `CALL_DIALED`, `CALL_HUNG_UP`, `CALL_TRANSFERRED` |
//! | `TRANSFER` | `CLOSER_HAND_OFF`, `ASSIGNMENT_ACTIVATED` |
//! | `DIALOGUE` | `DIALOGUE_TURN`, `DIALOGUE_COMPLETED` |

mod error;
mod event;
mod store;

pub use error::ObserveError;
pub use event::{CallEvent, EventDomain, EventPayload, ParseEventDomainError};
pub use store::{emit_event, query_events, EventFilter};
