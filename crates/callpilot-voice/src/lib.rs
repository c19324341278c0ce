//! Speech in and speech out for the voicebot.
//!
//! [`SttClient`] talks to a speech-to-text server over its WebSocket wire
//! protocol: binary PCM chunks in, JSON result objects out, `{"eof": 1}`
//! to flush the final hypothesis.
//!
//! [`TtsClient`] calls a cloud text-to-speech REST endpoint and writes the
//! returned MP3 audio under a unique filename in the audio artifacts
//! directory.
//!
//! Both clients are disabled gracefully when their URL is left empty, so
//! the service starts (and the rest of the API works) on machines without
//! speech infrastructure.

mod error;
mod stt;
mod tts;

pub use error::VoiceError;
pub use stt::{SttClient, SttConfig};
pub use tts::{TtsClient, TtsConfig};
