//! Outcome categories and classification results.
//!
//! Every assistant response is reduced to exactly one [`Outcome`], which the
//! session state machine uses to pick its next state.  [`ClassificationResult`]
//! carries the confidence and the cascade tier that produced the decision so
//! transitions are auditable from the logs.

use std::fmt;

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// Procedural classification of an assistant response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Outcome {
    /// The assistant asked a clarifying question; keep listening.
    NeedMoreInfo,
    /// The assistant issued a physical step; wait for "step complete".
    UserActionRequired,
    /// The procedure is finished; park the session on the wake word.
    ProcedureDone,
    /// The response contains emergency guidance; flag and preempt.
    Emergency,
}

impl Outcome {
    /// All categories in tie-break priority order, highest first.
    ///
    /// Equal scores resolve toward the earlier entry, so an unresolved
    /// emergency signal always beats a completion signal.
    pub const PRIORITY: [Outcome; 4] = [
        Outcome::Emergency,
        Outcome::UserActionRequired,
        Outcome::ProcedureDone,
        Outcome::NeedMoreInfo,
    ];

    /// Numeric rank used for tie-breaking; higher wins.
    pub fn priority(&self) -> u8 {
        match self {
            Outcome::Emergency => 3,
            Outcome::UserActionRequired => 2,
            Outcome::ProcedureDone => 1,
            Outcome::NeedMoreInfo => 0,
        }
    }

    /// Short label used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::NeedMoreInfo => "need-more-info",
            Outcome::UserActionRequired => "user-action-required",
            Outcome::ProcedureDone => "procedure-done",
            Outcome::Emergency => "emergency",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// ClassifierSource
// ---------------------------------------------------------------------------

/// Which cascade tier produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierSource {
    /// Embedding-similarity tier.
    Semantic,
    /// Weighted-keyword tier.
    Keyword,
    /// Conservative fallback when no tier reached its threshold.
    Default,
}

impl ClassifierSource {
    pub fn label(&self) -> &'static str {
        match self {
            ClassifierSource::Semantic => "semantic",
            ClassifierSource::Keyword => "keyword",
            ClassifierSource::Default => "default",
        }
    }
}

// ---------------------------------------------------------------------------
// ClassificationResult
// ---------------------------------------------------------------------------

/// The single result of one classification attempt.
///
/// The cascade is total: every attempt yields exactly one of these, never
/// "no decision".
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationResult {
    pub outcome: Outcome,
    /// Confidence in `[0, 1]`.
    pub confidence: f32,
    pub source: ClassifierSource,
    /// Diagnostic only; never shown to the user.
    pub rationale: String,
}

impl ClassificationResult {
    pub fn new(
        outcome: Outcome,
        confidence: f32,
        source: ClassifierSource,
        rationale: impl Into<String>,
    ) -> Self {
        Self {
            outcome,
            confidence: confidence.clamp(0.0, 1.0),
            source,
            rationale: rationale.into(),
        }
    }
}

impl fmt::Display for ClassificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({:.2}, {})",
            self.outcome,
            self.confidence,
            self.source.label()
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
