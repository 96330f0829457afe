//! Audio pipeline — microphone capture → resampling → endpoint detection.
//!
//! # Pipeline
//!
//! ```text
//! Microphone → cpal callback → AudioChunk (mpsc) → stereo_to_mono
//!           → resample_to_16k → FrameAssembler → EndpointDetector → Utterance
//! ```
//!
//! The capture side runs on dedicated threads and never blocks on the
//! network; completed utterances are handed to the session event loop as
//! events.

pub mod capture;
pub mod endpoint;
pub mod resample;

pub use capture::{AudioCapture, AudioChunk, CaptureError, StreamHandle};
pub use endpoint::{EndpointDetector, EndpointSignal, FrameAssembler, Utterance};
pub use resample::{resample_to_16k, stereo_to_mono};
