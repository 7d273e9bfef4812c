//! # cohort-core
//!
//! Core types, traits, and abstractions for cohort.
//!
//! This crate provides the domain model shared by the other crates (entities,
//! match candidates, notification records), the error taxonomy, the trait
//! seams for stores, providers, and delivery channels, and the pure helpers
//! for embedding text and vector serialization.

pub mod defaults;
pub mod embedding_text;
pub mod error;
pub mod logging;
pub mod models;
pub mod traits;
pub mod vector_codec;

// Re-export commonly used types at crate root
pub use embedding_text::build_text;
pub use error::{Error, ErrorKind, Result};
pub use models::*;
pub use traits::*;
