//! ElevenLabs text-to-speech.
//!
//! The REST endpoint returns MP3 bytes and no timing information, so the
//! narrator falls back to probing or estimating the clip duration.

use super::{Speech, SpeechEngine};
use crate::error::ServiceError;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.elevenlabs.io";
const MODEL_ID: &str = "eleven_multilingual_v2";

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

/// [`SpeechEngine`] backed by the ElevenLabs API.
pub struct ElevenLabsEngine {
    http: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    timeout: Duration,
}

impl ElevenLabsEngine {
    pub fn new(api_key: Option<String>, timeout_secs: u64) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SpeechEngine for ElevenLabsEngine {
    async fn synthesize(&self, text: &str, voice: &str) -> Result<Speech, ServiceError> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ServiceError::NotConfigured("ELEVENLABS_API_KEY is not set".into()))?;

        let body = SynthesisRequest {
            text,
            model_id: MODEL_ID,
            voice_settings: VoiceSettings::default(),
        };

        let response = self
            .http
            .post(format!("{}/v1/text-to-speech/{}", self.base_url, voice))
            .header("xi-api-key", key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let audio = response.bytes().await?.to_vec();
        if audio.is_empty() {
            return Err(ServiceError::Malformed("empty audio body".into()));
        }
        debug!("ElevenLabs returned {} bytes for voice {}", audio.len(), voice);

        Ok(Speech {
            audio,
            extension: "mp3".to_string(),
            duration_secs: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = SynthesisRequest {
            text: "Hello",
            model_id: MODEL_ID,
            voice_settings: VoiceSettings::default(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model_id"], "eleven_multilingual_v2");
        assert_eq!(json["voice_settings"]["stability"], 0.5);
        assert_eq!(json["voice_settings"]["similarity_boost"], 0.75);
        assert_eq!(json["voice_settings"]["use_speaker_boost"], true);
    }

    #[tokio::test]
    async fn missing_key_is_not_configured() {
        let engine = ElevenLabsEngine::new(None, 10);
        let err = engine.synthesize("hi", "voice").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotConfigured(_)));
    }
}
