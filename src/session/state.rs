//! Conversation states, session data, and transition bookkeeping.
//!
//! [`ConversationState`] drives the session event loop's state machine.
//! [`Session`] is the single source of truth for the active conversation:
//! state, bounded turn history, emergency flag, and the generation counter
//! used to discard late-arriving results after a reset.
//!
//! ```text
//! Idle ──session start / box open──▶ Opening
//! Opening ──user affirms──▶ ActiveAssistance
//!         ──declines / timeout──▶ WaitingForWakeWord
//! ActiveAssistance ──NEED_MORE_INFO──▶ ActiveAssistance   (keep listening)
//!                  ──USER_ACTION_REQUIRED──▶ WaitingForStepComplete
//!                  ──PROCEDURE_DONE──▶ WaitingForWakeWord
//!                  ──EMERGENCY──▶ ActiveAssistance        (flag set)
//! WaitingForStepComplete ──step complete──▶ ActiveAssistance
//! any state ──box close──▶ Idle (history discarded)
//! ```

use std::collections::VecDeque;
use std::time::Instant;

use crate::classify::ClassificationResult;

/// Turns retained for context; older turns are dropped from the front.
pub const HISTORY_LIMIT: usize = 20;

// ---------------------------------------------------------------------------
// ConversationState
// ---------------------------------------------------------------------------

/// States of the conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationState {
    /// No session; the box is closed and nothing is listening for speech.
    Idle,

    /// The opening prompt was spoken; waiting for the user to affirm they
    /// need help.
    Opening,

    /// Actively conversing; every user turn goes through the full
    /// transcribe / generate / classify pipeline.
    ActiveAssistance,

    /// A physical step was issued; waiting for the "step complete" trigger.
    WaitingForStepComplete,

    /// Session parked; only the session-start wake word revives it.
    WaitingForWakeWord,
}

impl ConversationState {
    /// Returns `true` when captured utterances should be transcribed.
    ///
    /// In the parked states the microphone still runs for the wake-word
    /// detector, but free speech is not sent to STT.
    pub fn accepts_speech(&self) -> bool {
        matches!(
            self,
            ConversationState::Opening | ConversationState::ActiveAssistance
        )
    }

    /// A short human-readable label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ConversationState::Idle => "idle",
            ConversationState::Opening => "opening",
            ConversationState::ActiveAssistance => "active-assistance",
            ConversationState::WaitingForStepComplete => "waiting-for-step-complete",
            ConversationState::WaitingForWakeWord => "waiting-for-wake-word",
        }
    }
}

impl Default for ConversationState {
    fn default() -> Self {
        ConversationState::Idle
    }
}

// ---------------------------------------------------------------------------
// TimeoutKind
// ---------------------------------------------------------------------------

/// Named timeout durations; the state machine selects one per state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutKind {
    /// Opening exchange.
    Short,
    /// Conversational follow-up.
    Normal,
    /// Physical step in progress.
    Long,
}

// ---------------------------------------------------------------------------
// Turn
// ---------------------------------------------------------------------------

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

/// One exchange in the conversation.  Immutable once appended.
#[derive(Debug, Clone)]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    pub at: Instant,
    /// For assistant turns, the classification that drove the following
    /// transition.
    pub classification: Option<ClassificationResult>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            at: Instant::now(),
            classification: None,
        }
    }

    pub fn assistant(text: impl Into<String>, classification: ClassificationResult) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
            at: Instant::now(),
            classification: Some(classification),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// The single active conversation.
///
/// Owned exclusively by the session event loop; the audio and API tasks
/// only enqueue events, they never touch this struct.
pub struct Session {
    pub state: ConversationState,
    /// Chronological turn history, bounded to [`HISTORY_LIMIT`].
    history: VecDeque<Turn>,
    /// Set when any turn classified as an emergency; sticky until reset.
    pub emergency: bool,
    /// When the current session opened; `None` while idle.
    pub opened_at: Option<Instant>,
    /// Incremented on every reset.  In-flight pipeline results carry the
    /// generation they were started under; stale results are discarded.
    generation: u64,
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: ConversationState::Idle,
            history: VecDeque::new(),
            emergency: false,
            opened_at: None,
            generation: 0,
        }
    }

    /// Current generation; stamped onto spawned pipeline work.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True when a result produced under `generation` is still applicable.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Begin a fresh session in `Opening`.
    pub fn open(&mut self) {
        self.reset();
        self.state = ConversationState::Opening;
        self.opened_at = Some(Instant::now());
    }

    /// Reset to `Idle`, discarding history and invalidating in-flight work.
    pub fn reset(&mut self) {
        self.state = ConversationState::Idle;
        self.history.clear();
        self.emergency = false;
        self.opened_at = None;
        self.generation += 1;
    }

    /// Append a turn, evicting the oldest past [`HISTORY_LIMIT`].
    pub fn push_turn(&mut self, turn: Turn) {
        self.history.push_back(turn);
        while self.history.len() > HISTORY_LIMIT {
            self.history.pop_front();
        }
    }

    pub fn history(&self) -> impl Iterator<Item = &Turn> {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Texts of the most recent assistant turns (oldest first), used for the
    /// classifier's context bonus.
    pub fn recent_assistant_texts(&self, window: usize) -> Vec<String> {
        let mut texts: Vec<String> = self
            .history
            .iter()
            .rev()
            .filter(|t| t.speaker == Speaker::Assistant)
            .take(window)
            .map(|t| t.text.clone())
            .collect();
        texts.reverse();
        texts
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ClassifierSource, Outcome};

    fn result(outcome: Outcome) -> ClassificationResult {
        ClassificationResult::new(outcome, 0.9, ClassifierSource::Keyword, "test")
    }

    // ---- ConversationState ---

    #[test]
    fn default_state_is_idle() {
        assert_eq!(ConversationState::default(), ConversationState::Idle);
    }

    #[test]
    fn only_conversing_states_accept_speech() {
        assert!(!ConversationState::Idle.accepts_speech());
        assert!(ConversationState::Opening.accepts_speech());
        assert!(ConversationState::ActiveAssistance.accepts_speech());
        assert!(!ConversationState::WaitingForStepComplete.accepts_speech());
        assert!(!ConversationState::WaitingForWakeWord.accepts_speech());
    }

    // ---- Session lifecycle ---

    #[test]
    fn open_starts_in_opening_with_clean_history() {
        let mut session = Session::new();
        session.push_turn(Turn::user("leftover"));
        session.open();
        assert_eq!(session.state, ConversationState::Opening);
        assert_eq!(session.history_len(), 0);
        assert!(session.opened_at.is_some());
        assert!(!session.emergency);
    }

    #[test]
    fn reset_clears_everything_and_bumps_generation() {
        let mut session = Session::new();
        session.open();
        session.push_turn(Turn::user("help"));
        session.emergency = true;
        let before = session.generation();

        session.reset();
        assert_eq!(session.state, ConversationState::Idle);
        assert_eq!(session.history_len(), 0);
        assert!(!session.emergency);
        assert!(session.opened_at.is_none());
        assert!(session.generation() > before);
    }

    #[test]
    fn stale_generation_is_not_current() {
        let mut session = Session::new();
        let stamped = session.generation();
        assert!(session.is_current(stamped));
        session.reset();
        assert!(!session.is_current(stamped));
    }

    // ---- history ---

    #[test]
    fn history_is_bounded() {
        let mut session = Session::new();
        for i in 0..(HISTORY_LIMIT + 10) {
            session.push_turn(Turn::user(format!("turn {i}")));
        }
        assert_eq!(session.history_len(), HISTORY_LIMIT);
        // Oldest turns were evicted from the front.
        let first = session.history().next().unwrap();
        assert_eq!(first.text, "turn 10");
    }

    #[test]
    fn recent_assistant_texts_filters_and_orders() {
        let mut session = Session::new();
        session.push_turn(Turn::user("one"));
        session.push_turn(Turn::assistant("a", result(Outcome::NeedMoreInfo)));
        session.push_turn(Turn::user("two"));
        session.push_turn(Turn::assistant("b", result(Outcome::NeedMoreInfo)));
        session.push_turn(Turn::assistant("c", result(Outcome::UserActionRequired)));

        let recent = session.recent_assistant_texts(2);
        assert_eq!(recent, vec!["b".to_string(), "c".to_string()]);
    }
}
