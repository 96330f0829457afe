//! The outcome classification cascade.
//!
//! Tiers, tried in order, first confident result wins:
//!
//! ```text
//! response text ──▶ [emergency override]  keyword emergency score ≥ low bar?
//!                   [tier 1: semantic]    embedding similarity ≥ 0.7?
//!                   [tier 2: keyword]     weighted phrase score ≥ 0.5?
//!                   [tier 3: default]     NEED_MORE_INFO, fixed low confidence
//! ```
//!
//! The cascade is total: every call returns exactly one
//! [`ClassificationResult`], never an error.  A semantic-tier failure
//! (network, parse) is logged and falls through to the keyword tier.
//!
//! The emergency override sits in front of everything because under-triggering
//! on emergencies is the one unacceptable failure mode; its acceptance bar is
//! lower than every other category's.

use crate::config::ClassifierConfig;

use super::keywords;
use super::outcome::{ClassificationResult, ClassifierSource, Outcome};
use super::semantic::SemanticScorer;

// ---------------------------------------------------------------------------
// Context bonus
// ---------------------------------------------------------------------------

/// Continuity phrases: if a recent assistant turn contains one of these, the
/// associated category gets a small score bonus in both scoring tiers.
fn context_patterns(outcome: Outcome) -> &'static [&'static str] {
    match outcome {
        // A recent question makes a follow-up clarification more likely.
        Outcome::NeedMoreInfo => &["where", "describe", "how did", "what happened"],
        // A recent instruction makes another instruction more likely.
        Outcome::UserActionRequired => &["apply", "place", "wrap", "hold", "clean"],
        // A recent step instruction biases toward completion next.
        Outcome::ProcedureDone => &["let me know when", "step complete"],
        Outcome::Emergency => &[],
    }
}

fn context_bonus(outcome: Outcome, context: &[String], bonus: f32) -> f32 {
    let patterns = context_patterns(outcome);
    if patterns.is_empty() {
        return 0.0;
    }
    for turn in context {
        let lower = turn.to_lowercase();
        if patterns.iter().any(|p| lower.contains(p)) {
            return bonus;
        }
    }
    0.0
}

// ---------------------------------------------------------------------------
// OutcomeClassifier
// ---------------------------------------------------------------------------

/// Runs the cascade.  Constructed once at startup; the semantic scorer is
/// optional so the device degrades to keyword-only classification when no
/// embedding backend is configured.
pub struct OutcomeClassifier {
    config: ClassifierConfig,
    semantic: Option<SemanticScorer>,
}

impl OutcomeClassifier {
    pub fn new(config: ClassifierConfig, semantic: Option<SemanticScorer>) -> Self {
        Self { config, semantic }
    }

    /// Classify an assistant response given the most recent assistant turns
    /// (newest last).  Total: always returns exactly one result.
    pub async fn classify(&self, response: &str, context: &[String]) -> ClassificationResult {
        let keyword_scores = keywords::score_all(response);

        // Emergency override: a lower bar, checked before any tier ordering.
        let emergency = &keyword_scores[0];
        debug_assert_eq!(emergency.outcome, Outcome::Emergency);
        if emergency.score >= self.config.emergency_threshold {
            let rationale = match emergency.best_phrase {
                Some(phrase) => format!("emergency override: matched \"{phrase}\""),
                None => "emergency override".to_string(),
            };
            log::warn!("classification: {rationale} (score {:.2})", emergency.score);
            return ClassificationResult::new(
                Outcome::Emergency,
                emergency.score,
                ClassifierSource::Keyword,
                rationale,
            );
        }

        // Tier 1: semantic similarity.
        if let Some(scorer) = &self.semantic {
            match scorer.score(response).await {
                Ok(scores) => {
                    let mut best: Option<(Outcome, f32)> = None;
                    for s in &scores {
                        let adjusted =
                            s.score + context_bonus(s.outcome, context, self.config.context_bonus);
                        if s.outcome == Outcome::Emergency
                            && adjusted >= self.config.emergency_threshold
                        {
                            return ClassificationResult::new(
                                Outcome::Emergency,
                                adjusted,
                                ClassifierSource::Semantic,
                                format!("emergency similarity {adjusted:.2}"),
                            );
                        }
                        // Strict > keeps the earlier (higher-priority) entry
                        // on ties.
                        if best.map_or(true, |(_, b)| adjusted > b) {
                            best = Some((s.outcome, adjusted));
                        }
                    }
                    if let Some((outcome, score)) = best {
                        if score >= self.config.semantic_threshold {
                            log::debug!(
                                "classification: semantic {outcome} at {score:.2}"
                            );
                            return ClassificationResult::new(
                                outcome,
                                score,
                                ClassifierSource::Semantic,
                                format!("similarity {score:.2}"),
                            );
                        }
                    }
                }
                Err(err) => {
                    log::warn!("semantic tier failed, falling back to keywords: {err}");
                }
            }
        }

        // Tier 2: weighted keywords.  `keyword_scores` is already in priority
        // order, so strict > implements the tie-break rule.
        let mut best: Option<(usize, f32)> = None;
        for (i, s) in keyword_scores.iter().enumerate() {
            let adjusted = s.score + context_bonus(s.outcome, context, self.config.context_bonus);
            if s.matches > 0 && best.map_or(true, |(_, b)| adjusted > b) {
                best = Some((i, adjusted));
            }
        }
        if let Some((i, score)) = best {
            if score >= self.config.keyword_threshold {
                let s = &keyword_scores[i];
                let rationale = match s.best_phrase {
                    Some(phrase) => format!("matched \"{phrase}\" ({} total)", s.matches),
                    None => "keyword match".to_string(),
                };
                log::debug!("classification: keyword {} at {score:.2}", s.outcome);
                return ClassificationResult::new(
                    s.outcome,
                    score,
                    ClassifierSource::Keyword,
                    rationale,
                );
            }
        }

        // Tier 3: conservative default.  Asking for clarification is always
        // safer than guessing an action or a completion.
        log::debug!("classification: no tier reached threshold, defaulting");
        ClassificationResult::new(
            Outcome::NeedMoreInfo,
            self.config.default_confidence,
            ClassifierSource::Default,
            "no tier reached threshold",
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
