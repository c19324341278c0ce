//! Speech-to-text over the recognizer's WebSocket protocol.

use crate::VoiceError;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Maximum audio input size (10 MiB). Prevents OOM from oversized payloads.
const MAX_STT_INPUT_BYTES: usize = 10 * 1024 * 1024;

/// The end-of-stream marker the recognizer expects after the last chunk.
const EOF_MARKER: &str = r#"{"eof": 1}"#;

/// Settings for the STT WebSocket client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SttConfig {
    /// Recognizer WebSocket URL (e.g. `ws://127.0.0.1:2700`). Empty
    /// disables the client.
    pub url: String,
    /// PCM sample rate the recognizer is configured for.
    pub sample_rate: u32,
    /// Bytes per binary frame sent to the recognizer.
    pub chunk_bytes: usize,
    /// Overall deadline for one transcription, in seconds.
    pub timeout_secs: u64,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            sample_rate: 16_000,
            chunk_bytes: 8_000,
            timeout_secs: 30,
        }
    }
}

/// One recognizer result object. Partial hypotheses come as `partial`,
/// finalized segments as `text`.
#[derive(Debug, Deserialize)]
struct RecognizerResult {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    partial: Option<String>,
}

/// Extracts the finalized text from one recognizer message, ignoring
/// partial hypotheses and unparseable frames.
fn final_text(message: &str) -> Option<String> {
    let result: RecognizerResult = serde_json::from_str(message).ok()?;
    if result.partial.is_some() && result.text.is_none() {
        return None;
    }
    result.text.filter(|t| !t.trim().is_empty())
}

/// Client for a Vosk-protocol speech-to-text server.
#[derive(Debug, Clone)]
pub struct SttClient {
    config: SttConfig,
}

impl SttClient {
    pub fn new(config: SttConfig) -> Self {
        Self { config }
    }

    /// Whether a recognizer URL is configured.
    pub fn is_enabled(&self) -> bool {
        !self.config.url.is_empty()
    }

    /// The sample rate callers must deliver PCM at.
    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    /// Transcribes a buffer of raw PCM (s16le) audio.
    ///
    /// Streams the audio in chunks, flushes with the end-of-stream marker,
    /// and concatenates every finalized segment the recognizer returns.
    ///
    /// # Errors
    ///
    /// `VoiceError::Config` when disabled, `VoiceError::Stt` for oversized
    /// input, transport failures, or a deadline overrun.
    pub async fn transcribe(&self, audio: &[u8]) -> Result<String, VoiceError> {
        if !self.is_enabled() {
            return Err(VoiceError::Config(
                "stt url is not configured".to_string(),
            ));
        }
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Stt(format!(
                "audio exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let deadline = Duration::from_secs(self.config.timeout_secs);
        tokio::time::timeout(deadline, self.transcribe_inner(audio))
            .await
            .map_err(|_| {
                VoiceError::Stt(format!(
                    "transcription timed out after {} seconds",
                    self.config.timeout_secs
                ))
            })?
    }

    async fn transcribe_inner(&self, audio: &[u8]) -> Result<String, VoiceError> {
        let (mut ws, _) = connect_async(self.config.url.as_str())
            .await
            .map_err(|e| VoiceError::Stt(format!("recognizer connect failed: {e}")))?;

        for chunk in audio.chunks(self.config.chunk_bytes.max(1)) {
            ws.send(Message::binary(chunk.to_vec()))
                .await
                .map_err(|e| VoiceError::Stt(format!("audio send failed: {e}")))?;
        }
        ws.send(Message::text(EOF_MARKER))
            .await
            .map_err(|e| VoiceError::Stt(format!("eof send failed: {e}")))?;

        let mut segments: Vec<String> = Vec::new();
        while let Some(frame) = ws.next().await {
            let frame = frame.map_err(|e| VoiceError::Stt(format!("recognizer read failed: {e}")))?;
            match frame {
                Message::Text(payload) => {
                    if let Some(text) = final_text(payload.as_ref()) {
                        segments.push(text);
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }

        let transcript = segments.join(" ").trim().to_string();
        tracing::debug!(
            bytes = audio.len(),
            transcript = %transcript,
            "transcription complete"
        );
        Ok(transcript)
    }
}
