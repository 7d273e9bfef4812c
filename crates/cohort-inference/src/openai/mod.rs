//! OpenAI-compatible embedding backend.
//!
//! Works with any endpoint that speaks the OpenAI `/embeddings` API:
//! OpenAI itself, Azure OpenAI, Ollama in compatibility mode, vLLM, LocalAI.
//!
//! # Example
//!
//! ```rust,no_run
//! use cohort_inference::openai::{OpenAIBackend, OpenAIConfig};
//! use cohort_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::new(OpenAIConfig::from_env()).unwrap();
//!     let vector = backend.embed_text("Name: Ann\nTitle: Designer").await.unwrap();
//!     assert_eq!(vector.len(), backend.config().embed_dimension);
//! }
//! ```

mod backend;
mod error;
mod types;

pub use backend::{
    truncate_chars, OpenAIBackend, OpenAIConfig, DEFAULT_OPENAI_URL, MAX_INPUT_CHARS,
};
pub use error::{to_provider_error, OpenAIErrorCode};
pub use types::*;
