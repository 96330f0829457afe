//! Solstis — hands-free first-aid voice assistant.
//!
//! The crate is the conversation and procedure controller of a smart
//! first-aid kit: it decides when the user is speaking, what their words
//! mean for the session, and what the device should do next.  Heavy
//! inference (speech-to-text, response generation, text-to-speech,
//! wake-word acoustics) runs in external services behind trait seams.
//!
//! # Pipeline
//!
//! ```text
//! microphone ──▶ audio::EndpointDetector ──▶ Utterance
//!     Utterance ──▶ speech::Transcriber ──▶ text
//!     text ──▶ session::SessionRunner ──▶ llm::ResponseGenerator ──▶ response
//!     response ──▶ classify::OutcomeClassifier ──▶ state transition
//!     response ──▶ speech::Speaker ──▶ loudspeaker
//! ```
//!
//! The kit-box lid ([`hardware`]) and the wake phrases ([`wake`]) inject
//! asynchronous events that can preempt any point of the pipeline.

pub mod audio;
pub mod classify;
pub mod config;
pub mod hardware;
pub mod llm;
pub mod session;
pub mod speech;
pub mod status;
pub mod wake;
