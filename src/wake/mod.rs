//! Wake-word gate: turning acoustic triggers into session events.
//!
//! The acoustic models run in an external detector; this module owns only
//! the arbitration logic.  A trigger is forwarded to the state machine only
//! when it is meaningful in the current state:
//!
//! * `SessionStart` always wins.  From `Idle` it starts a session; from any
//!   other state it force-resets and starts over (interrupt semantics, not
//!   enqueue semantics).
//! * `StepComplete` only matters in `WaitingForStepComplete`; anywhere else
//!   it is logged and dropped.  Triggers never queue.

use std::time::Instant;

use crate::session::ConversationState;

// ---------------------------------------------------------------------------
// WakeWordEvent
// ---------------------------------------------------------------------------

/// Which wake phrase fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeWordKind {
    /// "Hey Solstis" — start or restart a session.
    SessionStart,
    /// "Step complete" — the user finished the current physical step.
    StepComplete,
}

/// A trigger emitted by the external acoustic detector.
#[derive(Debug, Clone, Copy)]
pub struct WakeWordEvent {
    pub kind: WakeWordKind,
    pub at: Instant,
}

impl WakeWordEvent {
    pub fn now(kind: WakeWordKind) -> Self {
        Self {
            kind,
            at: Instant::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// GateAction
// ---------------------------------------------------------------------------

/// What the state machine should do with an admitted trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateAction {
    /// Open a fresh session from `Idle`.
    StartSession,
    /// Reset the live session and open a fresh one.
    ForceRestart,
    /// Resume assistance with the next procedural step.
    StepComplete,
}

// ---------------------------------------------------------------------------
// WakeWordGate
// ---------------------------------------------------------------------------

/// Scan a transcript for a wake phrase.
///
/// Used for utterances captured in the parked states, where speech is
/// transcribed only to look for these phrases.  A session-start phrase
/// wins if both appear.
pub fn scan_phrase(text: &str) -> Option<WakeWordKind> {
    let lowered = text.to_lowercase();
    if lowered.contains("solstis") {
        Some(WakeWordKind::SessionStart)
    } else if lowered.contains("step complete") {
        Some(WakeWordKind::StepComplete)
    } else {
        None
    }
}

/// Stateless arbitration between wake phrases and session state.
pub struct WakeWordGate;

impl WakeWordGate {
    /// Decide whether `event` is meaningful in `state`.
    ///
    /// Returns `None` for triggers that should be discarded.
    pub fn admit(state: ConversationState, event: WakeWordEvent) -> Option<GateAction> {
        match (event.kind, state) {
            (WakeWordKind::SessionStart, ConversationState::Idle) => {
                log::info!("wake word: starting session");
                Some(GateAction::StartSession)
            }
            (WakeWordKind::SessionStart, current) => {
                log::info!("wake word during {}: force restart", current.label());
                Some(GateAction::ForceRestart)
            }
            (WakeWordKind::StepComplete, ConversationState::WaitingForStepComplete) => {
                log::info!("step complete confirmed");
                Some(GateAction::StepComplete)
            }
            (WakeWordKind::StepComplete, current) => {
                // Not waiting on a step; drop it rather than queue it.
                log::debug!("ignoring step-complete trigger in {}", current.label());
                None
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
