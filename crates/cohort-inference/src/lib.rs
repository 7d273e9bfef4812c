//! # cohort-inference
//!
//! Embedding provider backends for cohort.
//!
//! - [`openai::OpenAIBackend`]: any OpenAI-compatible `/embeddings` endpoint
//! - [`mock::MockEmbeddingBackend`]: deterministic vectors for tests
//!   (feature `mock`)
//!
//! Backends never retry; the batch embedding job leaves failed items for the
//! next run.

#[cfg(feature = "openai")]
pub mod openai;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use cohort_core::*;

#[cfg(feature = "openai")]
pub use openai::{truncate_chars, OpenAIBackend, OpenAIConfig};

#[cfg(feature = "mock")]
pub use mock::MockEmbeddingBackend;
