//! Weighted-keyword scoring tier.
//!
//! Each outcome category carries a table of trigger phrases with fixed
//! confidence weights.  A response's score for a category is the maximum
//! matched weight plus a small bonus per additional distinct match, capped
//! at 1.0.  Multiple weak matches therefore raise confidence without ever
//! summing past a strong single match unboundedly.
//!
//! Matching is case-insensitive substring matching on the lowercased
//! response; phrases are chosen long enough that substring collisions with
//! unrelated words do not occur in practice.

use super::outcome::Outcome;

/// Bonus added per distinct match beyond the first.
const MULTI_MATCH_BONUS: f32 = 0.05;

// ---------------------------------------------------------------------------
// Phrase tables
// ---------------------------------------------------------------------------

/// Phrases signalling the assistant asked for more information.
const NEED_MORE_INFO: &[(&str, f32)] = &[
    ("where exactly", 0.9),
    ("can you describe", 0.9),
    ("can you tell me", 0.85),
    ("how did it happen", 0.8),
    ("how deep", 0.8),
    ("how large", 0.8),
    ("what happened", 0.75),
    ("is it bleeding", 0.8),
    ("is the wound", 0.75),
    ("do you feel", 0.75),
    ("are you able to", 0.7),
    ("which part of", 0.7),
    ("can you show me", 0.7),
    ("tell me more", 0.7),
];

/// Phrases signalling the assistant issued a physical step to perform.
const USER_ACTION_REQUIRED: &[(&str, f32)] = &[
    ("say step complete", 0.95),
    ("step complete", 0.9),
    ("let me know when", 0.9),
    ("tell me when", 0.9),
    ("when you're done", 0.8),
    ("when you are done", 0.8),
    ("once you've", 0.75),
    ("once you have", 0.75),
    ("apply the", 0.7),
    ("apply pressure", 0.75),
    ("place the", 0.7),
    ("wrap the", 0.7),
    ("clean the", 0.7),
    ("rinse the", 0.7),
    ("hold it", 0.65),
    ("press firmly", 0.7),
    ("take the", 0.6),
    ("grab the", 0.6),
];

/// Phrases signalling the procedure is finished.
const PROCEDURE_DONE: &[(&str, f32)] = &[
    ("procedure is complete", 0.95),
    ("treatment is complete", 0.9),
    ("you're all set", 0.9),
    ("you are all set", 0.9),
    ("all taken care of", 0.85),
    ("we're all done", 0.85),
    ("that completes", 0.8),
    ("you should be fine", 0.75),
    ("feel better", 0.7),
    ("take care of yourself", 0.7),
    ("glad i could help", 0.7),
];

/// Phrases signalling emergency guidance.  Scored against a deliberately
/// lower bar than the other categories.
const EMERGENCY: &[(&str, f32)] = &[
    ("call 911", 0.95),
    ("call 9-1-1", 0.95),
    ("call emergency services", 0.95),
    ("life-threatening", 0.9),
    ("severe bleeding", 0.9),
    ("emergency room", 0.85),
    ("go to the hospital", 0.85),
    ("seek immediate", 0.85),
    ("unconscious", 0.8),
    ("not breathing", 0.9),
    ("chest pain", 0.8),
    ("urgent", 0.7),
    ("call a doctor", 0.6),
];

/// Phrase table for one category.
pub fn table_for(outcome: Outcome) -> &'static [(&'static str, f32)] {
    match outcome {
        Outcome::NeedMoreInfo => NEED_MORE_INFO,
        Outcome::UserActionRequired => USER_ACTION_REQUIRED,
        Outcome::ProcedureDone => PROCEDURE_DONE,
        Outcome::Emergency => EMERGENCY,
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Result of scoring one category against a response.
#[derive(Debug, Clone, PartialEq)]
pub struct KeywordScore {
    pub outcome: Outcome,
    /// Accumulated score in `[0, 1]`; `0.0` when nothing matched.
    pub score: f32,
    /// Number of distinct phrases that matched.
    pub matches: usize,
    /// The highest-weighted phrase that matched, for diagnostics.
    pub best_phrase: Option<&'static str>,
}

/// Score a single category against lowercased response text.
pub fn score_category(outcome: Outcome, lowercased: &str) -> KeywordScore {
    let mut best_weight = 0.0f32;
    let mut best_phrase = None;
    let mut matches = 0usize;

    for &(phrase, weight) in table_for(outcome) {
        if lowercased.contains(phrase) {
            matches += 1;
            if weight > best_weight {
                best_weight = weight;
                best_phrase = Some(phrase);
            }
        }
    }

    let score = if matches == 0 {
        0.0
    } else {
        (best_weight + MULTI_MATCH_BONUS * (matches - 1) as f32).min(1.0)
    };

    KeywordScore {
        outcome,
        score,
        matches,
        best_phrase,
    }
}

/// Score every category against a response.  Returned in priority order so
/// a caller scanning for the max with strict `>` implements the tie-break
/// rule for free.
pub fn score_all(response: &str) -> [KeywordScore; 4] {
    let lowercased = response.to_lowercase();
    [
        score_category(Outcome::Emergency, &lowercased),
        score_category(Outcome::UserActionRequired, &lowercased),
        score_category(Outcome::ProcedureDone, &lowercased),
        score_category(Outcome::NeedMoreInfo, &lowercased),
    ]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_instruction_scores_high() {
        let scores = score_all("Apply the bandage and let me know when you're done.");
        let action = scores
            .iter()
            .find(|s| s.outcome == Outcome::UserActionRequired)
            .unwrap();
        // "let me know when" (0.9) plus bonuses for "when you're done" and
        // "apply the".
        assert!(action.score >= 0.9, "score was {}", action.score);
        assert_eq!(action.best_phrase, Some("let me know when"));
    }

    #[test]
    fn clarifying_question_scores_high() {
        let scores = score_all("Where exactly is the injury?");
        let info = scores
            .iter()
            .find(|s| s.outcome == Outcome::NeedMoreInfo)
            .unwrap();
        assert!(info.score >= 0.9);
    }

    #[test]
    fn completion_phrase_matches() {
        let scores = score_all("The treatment is complete and you should be fine.");
        let done = scores
            .iter()
            .find(|s| s.outcome == Outcome::ProcedureDone)
            .unwrap();
        assert!(done.score >= 0.9);
        assert_eq!(done.matches, 2);
    }

    #[test]
    fn emergency_phrase_matches() {
        let scores = score_all("Call 911 immediately.");
        let emergency = scores
            .iter()
            .find(|s| s.outcome == Outcome::Emergency)
            .unwrap();
        assert!(emergency.score >= 0.95);
        assert_eq!(emergency.best_phrase, Some("call 911"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let scores = score_all("CALL 911 NOW");
        let emergency = scores
            .iter()
            .find(|s| s.outcome == Outcome::Emergency)
            .unwrap();
        assert!(emergency.matches >= 1);
    }

    #[test]
    fn ambiguous_text_scores_nothing() {
        for score in score_all("That sounds good.") {
            assert_eq!(score.score, 0.0);
            assert_eq!(score.matches, 0);
        }
    }

    #[test]
    fn empty_text_scores_nothing() {
        for score in score_all("") {
            assert_eq!(score.score, 0.0);
        }
    }

    #[test]
    fn multi_match_bonus_is_capped() {
        // Stack several action phrases; score must never exceed 1.0.
        let scores = score_all(
            "Apply the gauze, place the wrap, clean the wound, rinse the area, \
             press firmly, and say step complete when you're done. Let me know when ready.",
        );
        let action = scores
            .iter()
            .find(|s| s.outcome == Outcome::UserActionRequired)
            .unwrap();
        assert!(action.matches > 3);
        assert!(action.score <= 1.0);
    }

    #[test]
    fn all_weights_within_declared_range() {
        for outcome in Outcome::PRIORITY {
            for &(phrase, weight) in table_for(outcome) {
                assert!(
                    (0.6..=0.95).contains(&weight),
                    "{phrase:?} weight {weight} out of range"
                );
                assert_eq!(phrase, phrase.to_lowercase(), "{phrase:?} not lowercase");
            }
        }
    }

    #[test]
    fn score_all_is_in_priority_order() {
        let scores = score_all("anything");
        let ranks: Vec<u8> = scores.iter().map(|s| s.outcome.priority()).collect();
        assert_eq!(ranks, vec![3, 2, 1, 0]);
    }
}
