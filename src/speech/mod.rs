//! External speech services: transcription, synthesis, playback.
//!
//! ```text
//! Utterance ──▶ Transcriber (WAV upload) ──▶ text
//! response text ──▶ SpeechSynth (PCM) ──▶ AudioPlayback ──▶ speaker
//! ```
//!
//! Both service boundaries are traits so the session loop can be tested
//! with deterministic mocks and the provider can be swapped from config.

pub mod playback;
pub mod speaker;
pub mod stt;
pub mod tts;

pub use playback::{AudioPlayback, PlaybackError};
pub use speaker::{DeviceSpeaker, Speaker};
pub use stt::{looks_like_noise, samples_to_wav, ApiTranscriber, TranscribeError, Transcriber};
pub use tts::{pcm16le_to_f32, ApiSynth, SpeechSynth, SpokenAudio, SynthError};
