use thiserror::Error;

/// Errors that can occur when talking to the dialer.
#[derive(Debug, Error)]
pub enum DialerError {
    /// The HTTP request itself failed (connect, timeout, TLS).
    #[error("dialer http error: {0}")]
    Http(#[from] reqwest::Error),

    /// The dialer is not configured (empty base URL).
    #[error("dialer is not configured")]
    Disabled,

    /// The dialer replied with an `ERROR` line.
    #[error("dialer replied with an error: {0}")]
    Vendor(String),

    /// The dialer reply could not be interpreted.
    #[error("invalid dialer reply: {0}")]
    InvalidReply(String),

    /// No cached or persisted session exists for the agent.
    #[error("no session for agent {0}")]
    MissingSession(String),

    /// Session persistence failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Could not check out a pooled connection.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A blocking persistence task panicked or was cancelled.
    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}
