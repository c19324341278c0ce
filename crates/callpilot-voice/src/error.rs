use thiserror::Error;

/// Errors that can occur during speech processing.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// Speech-to-text failure (connect, wire, or decode).
    #[error("stt error: {0}")]
    Stt(String),

    /// Text-to-speech failure (request or decode).
    #[error("tts error: {0}")]
    Tts(String),

    /// A client was called while unconfigured or misconfigured.
    #[error("voice configuration error: {0}")]
    Config(String),

    /// HTTP transport failure.
    #[error("voice http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Audio artifact could not be written.
    #[error("voice io error: {0}")]
    Io(#[from] std::io::Error),
}
