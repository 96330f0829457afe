//! Speech-to-text via an external transcription API.
//!
//! Utterance samples are encoded as 16-bit PCM WAV in memory with `hound`
//! and uploaded as multipart form data.  The transcript then passes through
//! [`looks_like_noise`], which drops fillers and parenthesised annotations
//! ("(coughing)") so they never reach the response generator as user turns.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::SpeechConfig;

// ---------------------------------------------------------------------------
// TranscribeError
// ---------------------------------------------------------------------------

/// Errors that can occur during transcription.
#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("transcription request timed out")]
    Timeout,

    #[error("failed to parse transcription response: {0}")]
    Parse(String),

    #[error("failed to encode audio: {0}")]
    Encode(String),
}

impl From<reqwest::Error> for TranscribeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TranscribeError::Timeout
        } else {
            TranscribeError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Async trait for speech-to-text backends.
///
/// Returns `Ok(None)` when the audio contained no usable speech (empty or
/// noise-only transcript); the session loop treats that as a no-input event
/// and re-prompts the current state.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Option<String>, TranscribeError>;
}

// ---------------------------------------------------------------------------
// WAV encoding
// ---------------------------------------------------------------------------

/// Encode mono `f32` samples as an in-memory 16-bit PCM WAV file.
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>, TranscribeError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| TranscribeError::Encode(e.to_string()))?;

        for &sample in samples {
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| TranscribeError::Encode(e.to_string()))?;
        }

        writer
            .finalize()
            .map_err(|e| TranscribeError::Encode(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

// ---------------------------------------------------------------------------
// Noise filtering
// ---------------------------------------------------------------------------

const FILLER_WORDS: &[&str] = &["huh", "what", "um", "uh", "ah", "hmm", "mm"];

/// True when a transcript is too short or filler-only to be a real turn.
///
/// STT services often emit sound-effect annotations in parentheses or
/// brackets for non-speech audio; those are stripped before judging.
pub fn looks_like_noise(transcript: &str) -> bool {
    let mut cleaned = String::with_capacity(transcript.len());
    let mut depth = 0u32;
    for c in transcript.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth = depth.saturating_sub(1),
            _ if depth == 0 => cleaned.push(c),
            _ => {}
        }
    }

    let cleaned = cleaned.trim();
    if cleaned.len() < 3 {
        return true;
    }

    let lowered = cleaned.to_lowercase();
    let words: Vec<&str> = lowered
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation()))
        .filter(|w| !w.is_empty())
        .collect();

    words.is_empty() || words.iter().all(|w| FILLER_WORDS.contains(w))
}

// ---------------------------------------------------------------------------
// ApiTranscriber
// ---------------------------------------------------------------------------

/// [`Transcriber`] backed by the ElevenLabs `/v1/speech-to-text` endpoint.
pub struct ApiTranscriber {
    client: reqwest::Client,
    config: SpeechConfig,
}

impl ApiTranscriber {
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
impl Transcriber for ApiTranscriber {
    async fn transcribe(
        &self,
        samples: &[f32],
        sample_rate: u32,
    ) -> Result<Option<String>, TranscribeError> {
        let wav = samples_to_wav(samples, sample_rate)?;

        let url = format!(
            "{}/v1/speech-to-text",
            self.config.base_url.trim_end_matches('/')
        );

        let part = reqwest::multipart::Part::bytes(wav)
            .file_name("utterance.wav")
            .mime_str("audio/wav")
            .map_err(|e| TranscribeError::Request(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("model_id", self.config.stt_model.clone())
            .part("file", part);

        let mut req = self.client.post(&url).multipart(form);
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.header("xi-api-key", key);
        }

        let response = req.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TranscribeError::Request(format!("HTTP {status}: {body}")));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| TranscribeError::Parse(e.to_string()))?;

        let text = json["text"]
            .as_str()
            .ok_or_else(|| TranscribeError::Parse("missing text field".into()))?
            .trim()
            .to_string();

        if looks_like_noise(&text) {
            log::debug!("dropping noise transcript: {text:?}");
            return Ok(None);
        }
        Ok(Some(text))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // ---- samples_to_wav ---

    #[test]
    fn wav_header_is_valid() {
        let wav = samples_to_wav(&[0.0, 0.5, -0.5], 16_000).unwrap();
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        // 44-byte header + 3 samples * 2 bytes
        assert_eq!(wav.len(), 44 + 6);
    }

    #[test]
    fn wav_clamps_out_of_range_samples() {
        // Must not panic on out-of-range floats.
        let wav = samples_to_wav(&[2.0, -2.0], 16_000).unwrap();
        assert_eq!(wav.len(), 44 + 4);
    }

    #[test]
    fn empty_wav_is_header_only() {
        let wav = samples_to_wav(&[], 16_000).unwrap();
        assert_eq!(wav.len(), 44);
    }

    // ---- looks_like_noise ---

    #[test]
    fn short_transcripts_are_noise() {
        assert!(looks_like_noise(""));
        assert!(looks_like_noise("a"));
        assert!(looks_like_noise("  hm "));
    }

    #[test]
    fn filler_only_transcripts_are_noise() {
        assert!(looks_like_noise("um"));
        assert!(looks_like_noise("Uh, um..."));
        assert!(looks_like_noise("huh? what?"));
    }

    #[test]
    fn annotations_are_stripped_before_judging() {
        assert!(looks_like_noise("(coughing)"));
        assert!(looks_like_noise("[background noise] um"));
        assert!(!looks_like_noise("(sigh) I cut my finger"));
    }

    #[test]
    fn real_speech_is_not_noise() {
        assert!(!looks_like_noise("I cut my finger"));
        assert!(!looks_like_noise("yes"));
        assert!(!looks_like_noise("step complete"));
    }
}
