//! Speech-to-text.
//!
//! Voice turns are transcribed before they reach the session layer, so the
//! dialog only ever sees text. The bundled adapter speaks the OpenAI
//! `audio/transcriptions` contract (Whisper and compatible servers).

use crate::util::resolve_api_key;
use pt_domain::config::SpeechConfig;
use pt_domain::error::{Error, Result};

/// Why a voice message could not be turned into text.
#[derive(Debug, thiserror::Error)]
pub enum TranscriptionError {
    #[error("audio is {size} bytes, the limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("transcription service unavailable: {0}")]
    Unavailable(String),
    #[error("no speech detected")]
    NoSpeech,
}

#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe one audio clip. `filename` carries the container format
    /// (`voice.ogg`, `memo.m4a`).
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
    ) -> std::result::Result<String, TranscriptionError>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Whisper adapter
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct WhisperTranscriber {
    url: String,
    model: String,
    language: Option<String>,
    max_bytes: usize,
    api_key: String,
    client: reqwest::Client,
}

impl WhisperTranscriber {
    pub fn from_config(cfg: &SpeechConfig) -> Result<Self> {
        let api_key = resolve_api_key(&cfg.auth)?;
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            url: format!("{}/audio/transcriptions", cfg.base_url.trim_end_matches('/')),
            model: cfg.model.clone(),
            language: cfg.language.clone(),
            max_bytes: cfg.max_bytes,
            api_key,
            client,
        })
    }
}

#[async_trait::async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
    ) -> std::result::Result<String, TranscriptionError> {
        if audio.len() > self.max_bytes {
            return Err(TranscriptionError::TooLarge {
                size: audio.len(),
                limit: self.max_bytes,
            });
        }

        let size = audio.len();
        let part = reqwest::multipart::Part::bytes(audio).file_name(filename.to_owned());
        let mut form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "text");
        if let Some(lang) = &self.language {
            form = form.text("language", lang.clone());
        }

        tracing::debug!(url = %self.url, bytes = size, "transcription request");

        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| TranscriptionError::Unavailable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| TranscriptionError::Unavailable(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), body = %body, "transcription failed");
            return Err(TranscriptionError::Unavailable(format!(
                "HTTP {}",
                status.as_u16()
            )));
        }

        normalize_transcript(&body)
    }
}

fn normalize_transcript(raw: &str) -> std::result::Result<String, TranscriptionError> {
    let text = raw.trim();
    if text.is_empty() {
        Err(TranscriptionError::NoSpeech)
    } else {
        Ok(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pt_domain::config::AuthConfig;

    fn transcriber(max_bytes: usize) -> WhisperTranscriber {
        let cfg = SpeechConfig {
            max_bytes,
            auth: AuthConfig {
                key: Some("sk-test".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        WhisperTranscriber::from_config(&cfg).unwrap()
    }

    #[test]
    fn url_points_at_transcriptions_endpoint() {
        let t = transcriber(10);
        assert_eq!(t.url, "https://api.openai.com/v1/audio/transcriptions");
        assert_eq!(t.model, "whisper-1");
    }

    #[tokio::test]
    async fn oversized_audio_is_rejected_before_upload() {
        let t = transcriber(4);
        let err = t.transcribe(vec![0u8; 10], "voice.ogg").await.unwrap_err();
        match err {
            TranscriptionError::TooLarge { size, limit } => {
                assert_eq!(size, 10);
                assert_eq!(limit, 4);
            }
            other => panic!("expected TooLarge, got {other:?}"),
        }
    }

    #[test]
    fn blank_transcript_means_no_speech() {
        assert!(matches!(
            normalize_transcript("  \n"),
            Err(TranscriptionError::NoSpeech)
        ));
        assert_eq!(normalize_transcript(" hello \n").unwrap(), "hello");
    }
}
