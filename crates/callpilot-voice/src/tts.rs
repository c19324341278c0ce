//! Cloud text-to-speech client.

use crate::VoiceError;
use base64::Engine;
use callpilot_types::TtsVoice;
use serde::Deserialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum text input size (64 KiB). Prevents resource exhaustion from
/// oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Settings for the cloud TTS client.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TtsConfig {
    /// Synthesis endpoint URL (a `text:synthesize`-style REST endpoint).
    /// Empty disables the client.
    pub url: String,
    /// API key passed as the `key` query parameter.
    pub api_key: String,
    /// Default voice when the caller does not pick one.
    pub voice: TtsVoice,
    /// Directory synthesized MP3 files are written to.
    pub audio_dir: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            voice: TtsVoice::default(),
            audio_dir: "audio".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SynthesizeResponse {
    #[serde(rename = "audioContent")]
    audio_content: String,
}

/// Builds the provider request body for one synthesis call.
fn build_request_body(text: &str, voice: &TtsVoice) -> serde_json::Value {
    json!({
        "input": { "text": text },
        "voice": {
            "languageCode": voice.language_code,
            "name": voice.name,
        },
        "audioConfig": { "audioEncoding": "MP3" },
    })
}

/// Client for a cloud text-to-speech REST API.
#[derive(Debug, Clone)]
pub struct TtsClient {
    config: TtsConfig,
    http: reqwest::Client,
}

impl TtsClient {
    /// Builds a client with the configured timeout.
    pub fn new(config: TtsConfig) -> Result<Self, VoiceError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { config, http })
    }

    /// Whether a synthesis endpoint is configured.
    pub fn is_enabled(&self) -> bool {
        !self.config.url.is_empty()
    }

    /// The configured default voice.
    pub fn default_voice(&self) -> &TtsVoice {
        &self.config.voice
    }

    /// Synthesizes `text` to an MP3 file and returns its path.
    ///
    /// The file lands in the audio directory under a unique name; callers
    /// serve or play it and may delete it afterwards.
    ///
    /// # Errors
    ///
    /// `VoiceError::Config` when disabled or keyless, `VoiceError::Tts` for
    /// oversized input or a provider error body, `Http`/`Io` for transport
    /// and filesystem failures.
    pub async fn synthesize(
        &self,
        text: &str,
        voice: Option<&TtsVoice>,
    ) -> Result<PathBuf, VoiceError> {
        if !self.is_enabled() {
            return Err(VoiceError::Config("tts url is not configured".to_string()));
        }
        if self.config.api_key.is_empty() {
            return Err(VoiceError::Config("tts api key is not configured".to_string()));
        }
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Tts(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }

        let voice = voice.unwrap_or(&self.config.voice);
        let body = build_request_body(text, voice);

        let response = self
            .http
            .post(&self.config.url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Tts(format!(
                "provider returned {status}: {}",
                detail.trim()
            )));
        }

        let payload: SynthesizeResponse = response.json().await?;
        let audio = base64::engine::general_purpose::STANDARD
            .decode(payload.audio_content.as_bytes())
            .map_err(|e| VoiceError::Tts(format!("audio content decode failed: {e}")))?;

        let path = self.write_artifact(&audio).await?;
        tracing::debug!(
            voice = %voice.name,
            chars = text.len(),
            bytes = audio.len(),
            path = %path.display(),
            "synthesis complete"
        );
        Ok(path)
    }

    async fn write_artifact(&self, audio: &[u8]) -> Result<PathBuf, VoiceError> {
        let dir = Path::new(&self.config.audio_dir);
        tokio::fs::create_dir_all(dir).await?;

        let filename = format!("tts_{}.mp3", uuid::Uuid::new_v4());
        let path = dir.join(filename);
        tokio::fs::write(&path, audio).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_voice_and_encoding() {
        let voice = TtsVoice::from_name("en-GB-Wavenet-B");
        let body = build_request_body("Hello there", &voice);

        assert_eq!(body["input"]["text"], "Hello there");
        assert_eq!(body["voice"]["languageCode"], "en-GB");
        assert_eq!(body["voice"]["name"], "en-GB-Wavenet-B");
        assert_eq!(body["audioConfig"]["audioEncoding"], "MP3");
    }

    #[tokio::test]
    async fn disabled_client_refuses_synthesis() {
        let client = TtsClient::new(TtsConfig::default()).expect("client");
        let err = client.synthesize("hi", None).await.unwrap_err();
        assert!(matches!(err, VoiceError::Config(_)));
    }

    #[tokio::test]
    async fn missing_api_key_is_a_config_error() {
        let client = TtsClient::new(TtsConfig {
            url: "https://tts.example.com/v1/text:synthesize".to_string(),
            ..TtsConfig::default()
        })
        .expect("client");
        let err = client.synthesize("hi", None).await.unwrap_err();
        match err {
            VoiceError::Config(msg) => assert!(msg.contains("api key")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_text_is_rejected_before_any_request() {
        let client = TtsClient::new(TtsConfig {
            url: "https://tts.example.com/v1/text:synthesize".to_string(),
            api_key: "k".to_string(),
            ..TtsConfig::default()
        })
        .expect("client");

        let text = "a".repeat(MAX_TTS_INPUT_BYTES + 1);
        let err = client.synthesize(&text, None).await.unwrap_err();
        match err {
            VoiceError::Tts(msg) => assert!(msg.contains("maximum size")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn artifacts_land_in_the_audio_dir_with_unique_names() {
        let dir = tempfile::tempdir().expect("tempdir");
        let client = TtsClient::new(TtsConfig {
            audio_dir: dir.path().to_string_lossy().into_owned(),
            ..TtsConfig::default()
        })
        .expect("client");

        let a = client.write_artifact(b"mp3-bytes").await.expect("write a");
        let b = client.write_artifact(b"mp3-bytes").await.expect("write b");

        assert_ne!(a, b, "artifact names must be unique");
        assert_eq!(tokio::fs::read(&a).await.expect("read"), b"mp3-bytes");
        assert!(a.extension().is_some_and(|e| e == "mp3"));
    }
}
