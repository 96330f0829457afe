//! Events consumed by the session loop.
//!
//! Everything the loop reacts to arrives as a [`SessionEvent`] on a single
//! channel, except box lid transitions which use a dedicated interrupt
//! channel so they preempt queued work.  Events produced by spawned
//! pipeline tasks carry the session generation they were started under;
//! the loop drops any event whose generation is no longer current.

use crate::audio::Utterance;
use crate::classify::ClassificationResult;
use crate::wake::WakeWordEvent;

/// Pipeline stage that produced a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeStage {
    Transcription,
    Generation,
}

impl ExchangeStage {
    pub fn label(&self) -> &'static str {
        match self {
            ExchangeStage::Transcription => "transcription",
            ExchangeStage::Generation => "generation",
        }
    }
}

/// An input to the session loop.
#[derive(Debug)]
pub enum SessionEvent {
    /// The endpoint detector finished capturing a complete utterance.
    UtteranceCaptured(Utterance),
    /// A wake phrase was heard.
    WakeWord(WakeWordEvent),
    /// A spawned transcription task produced usable text.
    TranscriptReady { generation: u64, text: String },
    /// A spawned transcription task found no usable speech in the audio.
    NoInput { generation: u64 },
    /// A spawned generation task produced and classified a response.
    ExchangeComplete {
        generation: u64,
        response: String,
        classification: ClassificationResult,
    },
    /// A pipeline stage failed past its retry budget.
    ExchangeFailed {
        generation: u64,
        stage: ExchangeStage,
        message: String,
    },
    /// The capture stream died and will not recover.
    AudioFault(String),
    /// Stop the loop cleanly (sent on process shutdown).
    Shutdown,
}
