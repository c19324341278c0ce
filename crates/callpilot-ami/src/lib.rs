//! Asterisk Manager Interface client for call redirection and origination.
//!
//! The AMI wire format is CRLF-separated `Key: Value` lines, one blank line
//! between frames. This crate implements the small subset the service
//! needs: `Login`, `Redirect`, `Originate`, `Hangup`, and `Logoff`, plus
//! the two composed operations built on them — handing a live bot call to
//! a human closer, and originating an outbound call to a bot's SIP peer.
//!
//! The client holds one connection, serializes actions through it, and
//! reconnects on demand: a dropped socket surfaces as an error for the
//! in-flight action and the next action re-establishes the session.

mod client;
mod protocol;
mod transfer;

pub use client::{AmiClient, AmiConfig};
pub use protocol::{Action, AmiResponse};
pub use transfer::{originate_bot_call, transfer_to_closer, TransferConfig};

use thiserror::Error;

/// Errors that can occur when talking to the PBX manager interface.
#[derive(Debug, Error)]
pub enum AmiError {
    /// Socket-level failure.
    #[error("ami io error: {0}")]
    Io(#[from] std::io::Error),

    /// The manager rejected our credentials.
    #[error("ami login failed: {0}")]
    LoginFailed(String),

    /// An action was answered with `Response: Error`.
    #[error("ami action {action} failed: {message}")]
    ActionFailed {
        /// The action name.
        action: String,
        /// The manager's `Message` field, if any.
        message: String,
    },

    /// A frame could not be interpreted.
    #[error("ami protocol error: {0}")]
    Protocol(String),

    /// The manager interface is not configured (empty host).
    #[error("ami is not configured")]
    Disabled,

    /// Connect or read deadline exceeded.
    #[error("ami operation timed out")]
    Timeout,
}
