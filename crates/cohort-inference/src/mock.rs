//! Mock embedding backend for deterministic testing.
//!
//! ```rust,ignore
//! use cohort_inference::mock::MockEmbeddingBackend;
//!
//! let backend = MockEmbeddingBackend::new().with_dimension(8).fail_on("broken");
//! let vector = backend.embed_text("Name: Ann").await?;
//! assert_eq!(backend.calls(), vec!["Name: Ann".to_string()]);
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use cohort_core::{EmbeddingBackend, Error, Result};

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    fail_substrings: Vec<String>,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 16,
            fail_substrings: Vec::new(),
        }
    }
}

/// Embedding backend that derives vectors from the input text.
///
/// Records every input it receives. Clones share the call log.
#[derive(Clone, Default)]
pub struct MockEmbeddingBackend {
    config: Arc<MockConfig>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockEmbeddingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Fail any input containing `needle` with a provider error.
    pub fn fail_on(mut self, needle: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config)
            .fail_substrings
            .push(needle.into());
        self
    }

    /// Inputs received so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }

    /// Deterministic unit vector for `text`.
    pub fn vector_for(text: &str, dimension: usize) -> Vec<f32> {
        let mut vec = vec![0.0_f32; dimension.max(1)];
        let len = vec.len();
        for (i, c) in text.chars().enumerate() {
            vec[(c as usize + i) % len] += 0.1;
        }
        let magnitude: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            vec.iter_mut().for_each(|x| *x /= magnitude);
        }
        vec
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        self.calls
            .lock()
            .map_err(|_| Error::Internal("mock call log poisoned".into()))?
            .push(text.to_string());

        if self
            .config
            .fail_substrings
            .iter()
            .any(|needle| text.contains(needle.as_str()))
        {
            return Err(Error::Provider("simulated provider failure".into()));
        }

        Ok(Self::vector_for(text, self.config.dimension))
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_is_deterministic() {
        let backend = MockEmbeddingBackend::new().with_dimension(32);
        let a = backend.embed_text("quantum computing").await.unwrap();
        let b = backend.embed_text("quantum computing").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_failure_injection() {
        let backend = MockEmbeddingBackend::new().fail_on("broken");
        let err = backend.embed_text("a broken profile").await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        assert!(backend.embed_text("fine").await.is_ok());
        assert_eq!(backend.calls(), vec!["a broken profile", "fine"]);
    }

    #[tokio::test]
    async fn test_clones_share_call_log() {
        let backend = MockEmbeddingBackend::new();
        let clone = backend.clone();
        clone.embed_text("x").await.unwrap();
        assert_eq!(backend.call_count(), 1);
    }
}
