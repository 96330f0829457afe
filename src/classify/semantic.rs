//! Semantic similarity tier: embedding-space matching against reference
//! phrases.
//!
//! Each outcome category has a handful of reference phrases.  The response
//! text and the phrases are embedded via an [`Embedder`] and compared by
//! cosine similarity; a category's score is its best phrase similarity.
//!
//! Any transport or parse failure here is a *tier* failure, not a pipeline
//! failure: the cascade logs it and falls through to the keyword tier.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::OnceCell;

use crate::config::LlmConfig;

use super::outcome::Outcome;

// ---------------------------------------------------------------------------
// Reference phrases
// ---------------------------------------------------------------------------

const NEED_MORE_INFO_REFS: &[&str] = &[
    "Where exactly is the injury located?",
    "Can you describe what the wound looks like?",
    "How did this happen?",
    "Is it still bleeding right now?",
];

const USER_ACTION_REFS: &[&str] = &[
    "Apply the bandage and let me know when you're done.",
    "Clean the wound with the antiseptic wipe, then say step complete.",
    "Hold pressure on the cut for two minutes.",
];

const PROCEDURE_DONE_REFS: &[&str] = &[
    "The treatment is complete and you should be fine.",
    "You're all set, take care of yourself.",
    "That completes the procedure, you're all taken care of.",
];

const EMERGENCY_REFS: &[&str] = &[
    "Call 911 immediately, this is a medical emergency.",
    "This is life-threatening, seek immediate medical attention.",
    "Go to the emergency room right away.",
];

fn refs_for(outcome: Outcome) -> &'static [&'static str] {
    match outcome {
        Outcome::NeedMoreInfo => NEED_MORE_INFO_REFS,
        Outcome::UserActionRequired => USER_ACTION_REFS,
        Outcome::ProcedureDone => PROCEDURE_DONE_REFS,
        Outcome::Emergency => EMERGENCY_REFS,
    }
}

// ---------------------------------------------------------------------------
// EmbedError
// ---------------------------------------------------------------------------

/// Errors from the embedding backend.
#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding request timed out")]
    Timeout,

    #[error("failed to parse embedding response: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for EmbedError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            EmbedError::Timeout
        } else {
            EmbedError::Request(err.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Embedder trait
// ---------------------------------------------------------------------------

/// Abstraction over an embedding backend.
///
/// Behind a trait so tests can substitute a deterministic mock and the
/// cascade stays agnostic of the provider.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed each input text into a dense vector.  The output length and
    /// order must match the input.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError>;
}

// ---------------------------------------------------------------------------
// ApiEmbedder
// ---------------------------------------------------------------------------

/// [`Embedder`] backed by an OpenAI-compatible `/v1/embeddings` endpoint.
pub struct ApiEmbedder {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

impl ApiEmbedder {
    pub fn new(config: &LlmConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.embedding_model.clone(),
        }
    }
}

#[async_trait]
impl Embedder for ApiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
        let url = format!("{}/v1/embeddings", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = self.api_key.as_deref().filter(|k| !k.is_empty()) {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EmbedError::Request(format!("HTTP {status}: {text}")));
        }

        let json: serde_json::Value = response.json().await?;
        let data = json["data"]
            .as_array()
            .ok_or_else(|| EmbedError::Parse("missing data array".into()))?;

        let mut vectors = Vec::with_capacity(data.len());
        for entry in data {
            let embedding = entry["embedding"]
                .as_array()
                .ok_or_else(|| EmbedError::Parse("missing embedding field".into()))?
                .iter()
                .map(|v| v.as_f64().map(|f| f as f32))
                .collect::<Option<Vec<f32>>>()
                .ok_or_else(|| EmbedError::Parse("non-numeric embedding value".into()))?;
            vectors.push(embedding);
        }

        if vectors.len() != texts.len() {
            return Err(EmbedError::Parse(format!(
                "expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        Ok(vectors)
    }
}

// ---------------------------------------------------------------------------
// Cosine similarity
// ---------------------------------------------------------------------------

/// Cosine similarity of two vectors; `0.0` for mismatched or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ---------------------------------------------------------------------------
// SemanticScorer
// ---------------------------------------------------------------------------

/// Per-category similarity scores for one response.
#[derive(Debug, Clone)]
pub struct SemanticScore {
    pub outcome: Outcome,
    pub score: f32,
    /// Index into the category's reference list that scored best.
    pub best_ref: usize,
}

/// Scores responses against the reference phrases of every category.
///
/// Reference embeddings are fetched once on first use and cached for the
/// lifetime of the scorer.
pub struct SemanticScorer {
    embedder: Box<dyn Embedder>,
    reference_cache: OnceCell<Vec<(Outcome, Vec<Vec<f32>>)>>,
}

impl SemanticScorer {
    pub fn new(embedder: Box<dyn Embedder>) -> Self {
        Self {
            embedder,
            reference_cache: OnceCell::new(),
        }
    }

    async fn reference_embeddings(&self) -> Result<&Vec<(Outcome, Vec<Vec<f32>>)>, EmbedError> {
        self.reference_cache
            .get_or_try_init(|| async {
                let mut flat: Vec<String> = Vec::new();
                for outcome in Outcome::PRIORITY {
                    flat.extend(refs_for(outcome).iter().map(|s| s.to_string()));
                }

                let vectors = self.embedder.embed(&flat).await?;

                let mut grouped = Vec::with_capacity(4);
                let mut offset = 0;
                for outcome in Outcome::PRIORITY {
                    let count = refs_for(outcome).len();
                    grouped.push((outcome, vectors[offset..offset + count].to_vec()));
                    offset += count;
                }
                Ok(grouped)
            })
            .await
    }

    /// Score a response against every category, in priority order.
    pub async fn score(&self, response: &str) -> Result<Vec<SemanticScore>, EmbedError> {
        let references = self.reference_embeddings().await?;
        let response_vec = self
            .embedder
            .embed(std::slice::from_ref(&response.to_string()))
            .await?;
        let response_vec = response_vec
            .first()
            .ok_or_else(|| EmbedError::Parse("empty embedding response".into()))?;

        let mut scores = Vec::with_capacity(4);
        for (outcome, refs) in references {
            let mut best = 0.0f32;
            let mut best_ref = 0usize;
            for (i, reference) in refs.iter().enumerate() {
                let similarity = cosine_similarity(response_vec, reference);
                if similarity > best {
                    best = similarity;
                    best_ref = i;
                }
            }
            scores.push(SemanticScore {
                outcome: *outcome,
                score: best,
                best_ref,
            });
        }
        Ok(scores)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
