//! Typed client for the dialer's Agent API plus agent session management.
//!
//! The dialer exposes a single form-encoded PHP endpoint whose replies are
//! free text beginning with `SUCCESS`, `ERROR`, or `NOTICE`. This crate
//! wraps every function the service uses in one typed method each
//! ([`AgentApiClient`]) and classifies replies into [`ApiOutcome`] instead
//! of scattering substring checks.
//!
//! [`SessionManager`] owns the hardest part of talking to this vendor:
//! acquiring and keeping the per-agent session ID. Login replies sometimes
//! carry `SESSION_ID=…`, sometimes only `conf_exten=…`, and sometimes
//! neither — in the last case a 7-digit ID is synthesized locally (and
//! flagged as such). Sessions are cached in memory for speed and written
//! through to the `agent_sessions` table so a restart does not strand
//! logged-in agents.

mod api;
mod error;
mod session;

pub use api::{AgentApiClient, ApiOutcome, ApiReply, Campaign, DialerConfig};
pub use error::DialerError;
pub use session::{AgentSession, SessionManager};
