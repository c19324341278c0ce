//! Text-to-speech voice selection.
//!
//! A `TtsVoice` names the cloud voice a bot speaks with. The default matches
//! what most production bots were provisioned with.

use serde::{Deserialize, Serialize};

/// A cloud TTS voice: BCP-47 language code plus the provider's voice name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtsVoice {
    /// BCP-47 language code, e.g. `en-US`.
    pub language_code: String,
    /// Provider voice name, e.g. `en-US-Wavenet-F`.
    pub name: String,
}

impl TtsVoice {
    /// Builds a voice from a provider voice name, deriving the language code
    /// from its leading `xx-YY` segment.
    pub fn from_name(name: &str) -> Self {
        let language_code = name
            .splitn(3, '-')
            .take(2)
            .collect::<Vec<_>>()
            .join("-");
        Self {
            language_code: if language_code.contains('-') {
                language_code
            } else {
                "en-US".to_string()
            },
            name: name.to_string(),
        }
    }
}

impl Default for TtsVoice {
    fn default() -> Self {
        Self {
            language_code: "en-US".to_string(),
            name: "en-US-Wavenet-F".to_string(),
        }
    }
}
