//! Response generation for the Solstis assistant.
//!
//! This module provides:
//! * [`ResponseGenerator`] — async trait implemented by all generation backends.
//! * [`ApiGenerator`] — OpenAI-compatible `/v1/chat/completions` backend.
//! * [`RetryGenerator`] — wraps any generator with a bounded retry budget.
//! * [`ChatMessage`] / [`ChatRole`] — the wire-shape of conversation turns.
//! * [`GenError`] — error variants for generation operations.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use solstis::config::AppConfig;
//! use solstis::llm::{ApiGenerator, ResponseGenerator, RetryGenerator};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = AppConfig::default();
//!     let generator = RetryGenerator::new(
//!         ApiGenerator::from_config(&config.llm, &config.user_name),
//!         config.llm.max_retries,
//!     );
//!
//!     let reply = generator.generate(&[], "I cut my finger").await.unwrap();
//!     println!("{reply}");
//! }
//! ```

pub mod generator;
pub mod prompt;

pub use generator::{
    ApiGenerator, ChatMessage, ChatRole, GenError, ResponseGenerator, RetryGenerator,
};
pub use prompt::{system_prompt, KIT_CONTENTS};
