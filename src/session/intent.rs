//! Yes/no intent detection for the opening exchange.
//!
//! When the assistant asks "is there something I can help you with?", the
//! reply is judged locally with weighted keywords instead of a round trip
//! to the generation API.  Word and short-phrase weights accumulate into a
//! yes score and a no score; both are damped for long replies so a single
//! "no" inside a long injury description does not read as a decline.
//! Anything unclear is treated as a request for help and forwarded to the
//! full pipeline, which is the safe direction to be wrong in.

/// Detected intent of an opening-exchange reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Affirmation {
    Yes,
    No,
    Unclear,
}

/// Score at or above which a yes/no verdict is accepted.
const THRESHOLD: f32 = 0.3;

const YES_WEIGHTS: &[(&str, f32)] = &[
    // Direct affirmations.
    ("yes", 1.0),
    ("yeah", 0.9),
    ("yep", 0.9),
    ("yup", 0.9),
    ("sure", 0.8),
    ("absolutely", 0.9),
    ("definitely", 0.9),
    ("of course", 0.8),
    // Help requests.
    ("help", 0.8),
    ("assistance", 0.8),
    ("need", 0.7),
    ("i do", 0.8),
    ("i need", 0.8),
    ("please", 0.6),
    // Injury vocabulary: describing a problem is an implicit yes.
    ("hurt", 0.9),
    ("hurts", 0.9),
    ("injured", 0.9),
    ("pain", 0.8),
    ("bleeding", 0.9),
    ("cut", 0.8),
    ("wound", 0.8),
    ("burn", 0.8),
    ("emergency", 0.9),
    ("first aid", 0.9),
];

const NO_WEIGHTS: &[(&str, f32)] = &[
    ("no", 1.0),
    ("nope", 0.9),
    ("nah", 0.8),
    ("nothing", 0.8),
    ("fine", 0.8),
    ("good", 0.7),
    ("no thanks", 0.9),
    ("no thank you", 0.9),
    ("not really", 0.8),
    ("not right now", 0.8),
    ("i'm good", 0.8),
    ("i'm fine", 0.8),
    ("i'm okay", 0.7),
    ("all good", 0.7),
    ("all set", 0.8),
];

fn accumulate(words: &[&str], table: &[(&str, f32)]) -> f32 {
    let mut score = 0.0;

    for &word in words {
        for &(key, weight) in table {
            if !key.contains(' ') && key == word {
                score += weight;
            }
        }
    }

    // Two- and three-word phrases.
    for window in 2..=3usize {
        if words.len() < window {
            continue;
        }
        for chunk in words.windows(window) {
            let phrase = chunk.join(" ");
            for &(key, weight) in table {
                if key == phrase {
                    score += weight;
                }
            }
        }
    }

    score
}

/// Word weights for the "are you all set?" confirmation.  Polarity is the
/// inverse of the opening exchange: injury vocabulary means the user is
/// NOT all set, and "fine" / "all set" phrasing means they are.
const SET_WEIGHTS: &[(&str, f32)] = &[
    ("yes", 1.0),
    ("yeah", 0.9),
    ("yep", 0.9),
    ("yup", 0.9),
    ("sure", 0.8),
    ("all set", 0.9),
    ("all good", 0.8),
    ("i'm good", 0.8),
    ("i'm fine", 0.8),
    ("i'm okay", 0.7),
    ("that's all", 0.8),
    ("thank you", 0.6),
    ("thanks", 0.6),
];

const NOT_SET_WEIGHTS: &[(&str, f32)] = &[
    ("no", 1.0),
    ("nope", 0.9),
    ("not", 0.7),
    ("still", 0.7),
    ("help", 0.8),
    ("need", 0.7),
    ("hurt", 0.9),
    ("hurts", 0.9),
    ("pain", 0.8),
    ("bleeding", 0.9),
    ("cut", 0.8),
    ("wound", 0.8),
    ("burn", 0.8),
    ("worse", 0.8),
];

fn split_words(text: &str) -> Vec<&str> {
    text.split_whitespace()
        .map(|w| w.trim_matches(|c: char| c.is_ascii_punctuation() && c != '\''))
        .filter(|w| !w.is_empty())
        .collect()
}

fn verdict(yes: f32, no: f32) -> Affirmation {
    if yes > no && yes >= THRESHOLD {
        Affirmation::Yes
    } else if no > yes && no >= THRESHOLD {
        Affirmation::No
    } else {
        Affirmation::Unclear
    }
}

/// Judge whether `text` affirms or declines the opening offer of help.
pub fn detect_affirmation(text: &str) -> Affirmation {
    let lowered = text.to_lowercase();
    let words = split_words(&lowered);
    if words.is_empty() {
        return Affirmation::Unclear;
    }

    // Damp scores for long replies.
    let length_factor = (15.0 / words.len() as f32).min(1.0);
    let yes = accumulate(&words, YES_WEIGHTS) * length_factor;
    let no = accumulate(&words, NO_WEIGHTS) * length_factor;

    log::debug!("affirmation scores: yes {yes:.2}, no {no:.2} for {text:?}");
    verdict(yes, no)
}

/// Judge the reply to "are you all set with the treatment?".
///
/// `Yes` means the session can park; anything else resumes assistance,
/// which is the safe direction to be wrong in.
pub fn detect_all_set(text: &str) -> Affirmation {
    let lowered = text.to_lowercase();
    let words = split_words(&lowered);
    if words.is_empty() {
        return Affirmation::Unclear;
    }

    let length_factor = (15.0 / words.len() as f32).min(1.0);
    let set = accumulate(&words, SET_WEIGHTS) * length_factor;
    let not_set = accumulate(&words, NOT_SET_WEIGHTS) * length_factor;

    log::debug!("all-set scores: set {set:.2}, not-set {not_set:.2} for {text:?}");
    verdict(set, not_set)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
