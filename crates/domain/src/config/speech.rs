use serde::{Deserialize, Serialize};

use super::AuthConfig;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Speech-to-text
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// OpenAI-compatible `audio/transcriptions` endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_base_url")]
    pub base_url: String,
    #[serde(default = "d_model")]
    pub model: String,
    /// ISO-639-1 hint passed to the transcriber.
    #[serde(default)]
    pub language: Option<String>,
    /// Uploads larger than this are refused before any network call.
    #[serde(default = "d_max_bytes")]
    pub max_bytes: usize,
    #[serde(default = "d_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: d_base_url(),
            model: d_model(),
            language: None,
            max_bytes: d_max_bytes(),
            timeout_ms: d_timeout_ms(),
            auth: AuthConfig::default(),
        }
    }
}

fn d_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn d_model() -> String {
    "whisper-1".into()
}
fn d_max_bytes() -> usize {
    25 * 1024 * 1024
}
fn d_timeout_ms() -> u64 {
    60_000
}
