//! # cohort-match
//!
//! Candidate generation for notifications.
//!
//! - Categorical match: a posting's category (expanded through a
//!   [`CategoryTaxonomy`]) and required tags against profile tags.
//! - Similarity match: nearest neighbors of a subject's embedding.
//!
//! Matching is read-only; it produces [`MatchCandidate`]s and never writes.
//!
//! ```ignore
//! use cohort_match::{CategoryTaxonomy, MatchingEngine, SimilarityScope};
//!
//! let engine = MatchingEngine::new(entities, vectors, CategoryTaxonomy::builtin());
//! let candidates = engine
//!     .candidates_for_posting(&posting, 5, SimilarityScope::CrossPopulation)
//!     .await?;
//! ```

pub mod engine;
pub mod taxonomy;

pub use cohort_core::*;

pub use engine::{MatchingEngine, SimilarityScope};
pub use taxonomy::CategoryTaxonomy;
