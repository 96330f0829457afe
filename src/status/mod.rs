//! Coarse assistant status for visual feedback.
//!
//! The session loop pushes status changes through a [`StatusSink`];
//! rendering (LED ring patterns on the device) happens outside this crate.
//! Notifications are fire-and-forget: nothing the sink does feeds back into
//! session logic.

/// What the assistant is currently doing, at LED granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssistantStatus {
    /// No session, or parked waiting for a wake word.
    Idle,
    /// Capturing and waiting on user speech.
    Listening,
    /// Processing a turn or playing synthesized speech.
    Speaking,
}

impl AssistantStatus {
    pub fn label(&self) -> &'static str {
        match self {
            AssistantStatus::Idle => "idle",
            AssistantStatus::Listening => "listening",
            AssistantStatus::Speaking => "speaking",
        }
    }
}

/// Receives status changes from the session loop.
pub trait StatusSink: Send + Sync {
    fn status_changed(&self, status: AssistantStatus);
}

/// Default sink: writes status changes to the log.
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn status_changed(&self, status: AssistantStatus) {
        log::info!("status: {}", status.label());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
