//! Text-to-speech via the ElevenLabs API.
//!
//! Responses come back as raw 16-bit little-endian PCM at the configured
//! rate (no container), decoded here into `f32` samples for playback.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SpeechConfig;

// ---------------------------------------------------------------------------
// SynthError
// ---------------------------------------------------------------------------

/// Errors that can occur during speech synthesis.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("synthesis request timed out")]
    Timeout,

    #[error("synthesis returned no audio")]
    EmptyAudio,
}

impl From<reqwest::Error> for SynthError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SynthError::Timeout
        } else {
            SynthError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// SpeechSynth trait
// ---------------------------------------------------------------------------

/// Rendered speech ready for the output device.
#[derive(Debug, Clone)]
pub struct SpokenAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Async trait for text-to-speech backends.
#[async_trait]
pub trait SpeechSynth: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<SpokenAudio, SynthError>;
}

// ---------------------------------------------------------------------------
// PCM decoding
// ---------------------------------------------------------------------------

/// Decode 16-bit little-endian PCM bytes to `f32` samples.
///
/// A trailing odd byte is ignored.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

// ---------------------------------------------------------------------------
// ApiSynth
// ---------------------------------------------------------------------------

/// [`SpeechSynth`] backed by the ElevenLabs `/v1/text-to-speech` endpoint.
pub struct ApiSynth {
    client: reqwest::Client,
    config: SpeechConfig,
}

impl ApiSynth {
    pub fn from_config(config: &SpeechConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            config: config.clone(),
        }
    }
}

#[async_trait]
impl SpeechSynth for ApiSynth {
    async fn synthesize(&self, text: &str) -> Result<SpokenAudio, SynthError> {
        let url = format!(
            "{}/v1/text-to-speech/{}?output_format=pcm_{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.voice_id,
            self.config.output_rate,
        );

        let body = serde_json::json!({
            "text": text,
            "model_id": self.config.tts_model,
        });

        let mut req = self.client.post(&url).json(&body);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.header("xi-api-key", key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthError::Request(format!("HTTP {status}: {body}")));
        }

        let bytes = response.bytes().await?;
        let samples = pcm16le_to_f32(&bytes);
        if samples.is_empty() {
            return Err(SynthError::EmptyAudio);
        }

        Ok(SpokenAudio {
            samples,
            sample_rate: self.config.output_rate,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pcm_decoding_roundtrips_known_values() {
        // 0x0000 = 0, 0x7FFF ≈ 1.0, 0x8000 = -1.0
        let bytes = [0x00, 0x00, 0xFF, 0x7F, 0x00, 0x80];
        let samples = pcm16le_to_f32(&bytes);
        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 0.0).abs() < 1e-6);
        assert!((samples[1] - 0.99997).abs() < 1e-4);
        assert!((samples[2] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn pcm_decoding_ignores_trailing_odd_byte() {
        let samples = pcm16le_to_f32(&[0x00, 0x00, 0xAB]);
        assert_eq!(samples.len(), 1);
    }

    #[test]
    fn pcm_decoding_of_empty_input() {
        assert!(pcm16le_to_f32(&[]).is_empty());
    }

    #[test]
    fn from_config_builds_without_panic() {
        let _synth = ApiSynth::from_config(&SpeechConfig::default());
    }
}
