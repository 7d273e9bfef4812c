//! Core traits for cohort.
//!
//! These are the seams between the jobs and their collaborators: the entity
//! store, the vector store, the notification dedup table, the embedding
//! provider, and the delivery channel. PostgreSQL, in-memory, HTTP and mock
//! implementations live in the downstream crates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::*;
use crate::{Error, Result};

// =============================================================================
// ENTITY REPOSITORY
// =============================================================================

/// Read access to profiles and postings.
#[async_trait]
pub trait EntityRepository: Send + Sync {
    /// Fetch a single entity.
    async fn get(&self, id: Uuid) -> Result<Option<Entity>>;

    /// Entities that satisfy `filter`, in a stable order (oldest first).
    async fn list_pending_embedding(&self, filter: &PendingEmbeddingFilter) -> Result<Vec<Entity>>;

    /// Publishable profiles whose tag set intersects `tags` (case-insensitive).
    async fn list_profiles_with_any_tag(&self, tags: &[String]) -> Result<Vec<Entity>>;

    /// Publishable postings created at or after `since`, oldest first.
    async fn list_postings_since(&self, since: DateTime<Utc>) -> Result<Vec<Entity>>;
}

// =============================================================================
// VECTOR STORE
// =============================================================================

/// One embedding per entity, with L2 nearest-neighbor retrieval.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Replace the embedding for `entity_id` and stamp the entity's
    /// `embedding_updated_at`, atomically.
    ///
    /// Fails with [`Error::EntityNotFound`] if the entity does not exist.
    async fn upsert(&self, entity_id: Uuid, vector: &[f32]) -> Result<()>;

    /// Stored embedding for an entity, if any.
    async fn get_vector(&self, entity_id: Uuid) -> Result<Option<Vec<f32>>>;

    /// At most `k` publishable entities by ascending L2 distance to `query`,
    /// optionally restricted to one population.
    async fn knn(&self, query: &[f32], k: usize, kind: Option<EntityKind>)
        -> Result<Vec<Neighbor>>;

    /// KNN seeded with the subject's own stored embedding.
    ///
    /// Fails with [`Error::EmbeddingNotFound`] if the subject has none yet.
    /// The subject itself is not filtered out.
    async fn knn_by_entity(
        &self,
        subject_id: Uuid,
        k: usize,
        kind: Option<EntityKind>,
    ) -> Result<Vec<Neighbor>> {
        let query = self
            .get_vector(subject_id)
            .await?
            .ok_or(Error::EmbeddingNotFound(subject_id))?;
        self.knn(&query, k, kind).await
    }

    /// Remove an embedding. Returns whether one existed.
    async fn delete(&self, entity_id: Uuid) -> Result<bool>;

    /// Number of stored embeddings.
    async fn count(&self) -> Result<i64>;
}

// =============================================================================
// NOTIFICATION DEDUP
// =============================================================================

/// Persisted notification dedup records.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Insert a record unless one already exists for the key.
    ///
    /// Returns the new record when this call created it, `None` when the key
    /// was already present. This is the only dedup guarantee and must be a
    /// single atomic conditional insert.
    async fn try_create(&self, notification: NewNotification)
        -> Result<Option<NotificationRecord>>;

    /// Stamp `sent_at` on a `Created` record. Returns false if the record is
    /// missing or already sent.
    async fn mark_sent(&self, key: &NotificationKey) -> Result<bool>;

    /// Fetch a record by key.
    async fn get(&self, key: &NotificationKey) -> Result<Option<NotificationRecord>>;

    /// `Created` records older than `older_than`, oldest first.
    async fn list_unsent(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>>;
}

// =============================================================================
// INFERENCE TRAITS
// =============================================================================

/// Backend for generating text embeddings.
///
/// Implementations must be safe to call concurrently and must not retry
/// internally.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate one embedding for `text`.
    async fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// DELIVERY
// =============================================================================

/// External messaging channel.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    /// Deliver one message. No retry or backoff.
    async fn deliver(&self, message: &OutboundMessage) -> Result<()>;

    /// Channel name for logs.
    fn name(&self) -> &str;
}
