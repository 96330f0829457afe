//! Outcome classification for assistant responses.
//!
//! Turns generated response text (plus recent conversation context) into one
//! of four procedural outcomes with a confidence score and the tier that
//! decided it.  See [`cascade::OutcomeClassifier`] for the decision
//! procedure.

pub mod cascade;
pub mod keywords;
pub mod outcome;
pub mod semantic;

pub use cascade::OutcomeClassifier;
pub use outcome::{ClassificationResult, ClassifierSource, Outcome};
pub use semantic::{ApiEmbedder, EmbedError, Embedder, SemanticScorer};
