//! In-memory store.
//!
//! Implements the entity, vector, and notification traits over plain maps
//! behind one mutex, so every operation is atomic with respect to the others
//! just as a database transaction would be. Embeddings are held as encoded
//! little-endian f32 blobs and decoded on every query.
//!
//! Each `MemoryStore::new()` is independent; tests construct as many as they
//! need.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use cohort_core::vector_codec;
use cohort_core::{
    Entity, EntityKind, EntityRepository, Error, Neighbor, NewNotification, NotificationKey,
    NotificationRecord, NotificationRepository, PendingEmbeddingFilter, Result, VectorStore,
    Visibility,
};

#[derive(Default)]
struct MemoryState {
    entities: HashMap<Uuid, Entity>,
    embeddings: HashMap<Uuid, Vec<u8>>,
    notifications: HashMap<NotificationKey, NotificationRecord>,
}

/// Shared in-memory store. Clones share state.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| Error::Internal("memory store lock poisoned".into()))
    }

    /// Insert or replace an entity.
    pub fn insert_entity(&self, entity: Entity) -> Result<()> {
        self.state()?.entities.insert(entity.id, entity);
        Ok(())
    }

    /// Delete an entity and, with it, its embedding.
    pub fn remove_entity(&self, id: Uuid) -> Result<bool> {
        let mut state = self.state()?;
        state.embeddings.remove(&id);
        Ok(state.entities.remove(&id).is_some())
    }

    /// Change an entity's visibility in place.
    pub fn set_visibility(&self, id: Uuid, visibility: Visibility) -> Result<()> {
        let mut state = self.state()?;
        let entity = state
            .entities
            .get_mut(&id)
            .ok_or(Error::EntityNotFound(id))?;
        entity.visibility = visibility;
        Ok(())
    }

    /// Snapshot of an entity.
    pub fn entity(&self, id: Uuid) -> Result<Option<Entity>> {
        Ok(self.state()?.entities.get(&id).cloned())
    }

    /// Raw stored blob for an entity's embedding.
    pub fn embedding_blob(&self, id: Uuid) -> Result<Option<Vec<u8>>> {
        Ok(self.state()?.embeddings.get(&id).cloned())
    }

    /// Number of notification records.
    pub fn notification_count(&self) -> Result<usize> {
        Ok(self.state()?.notifications.len())
    }
}

fn sorted_by_age(mut entities: Vec<Entity>) -> Vec<Entity> {
    entities.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
    entities
}

#[async_trait]
impl EntityRepository for MemoryStore {
    async fn get(&self, id: Uuid) -> Result<Option<Entity>> {
        self.entity(id)
    }

    async fn list_pending_embedding(&self, filter: &PendingEmbeddingFilter) -> Result<Vec<Entity>> {
        let state = self.state()?;
        let matching: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        let mut sorted = sorted_by_age(matching);
        if filter.limit > 0 {
            sorted.truncate(filter.limit);
        }
        Ok(sorted)
    }

    async fn list_profiles_with_any_tag(&self, tags: &[String]) -> Result<Vec<Entity>> {
        let wanted: Vec<String> = tags.iter().map(|t| t.trim().to_lowercase()).collect();
        let state = self.state()?;
        let matching: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| e.kind == EntityKind::Profile && e.is_publishable())
            .filter(|e| {
                e.tags
                    .iter()
                    .any(|t| wanted.contains(&t.trim().to_lowercase()))
            })
            .cloned()
            .collect();
        Ok(sorted_by_age(matching))
    }

    async fn list_postings_since(&self, since: DateTime<Utc>) -> Result<Vec<Entity>> {
        let state = self.state()?;
        let matching: Vec<Entity> = state
            .entities
            .values()
            .filter(|e| e.kind == EntityKind::Posting && e.is_publishable())
            .filter(|e| e.created_at >= since)
            .cloned()
            .collect();
        Ok(sorted_by_age(matching))
    }
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn upsert(&self, entity_id: Uuid, vector: &[f32]) -> Result<()> {
        if vector.is_empty() {
            return Err(Error::InvalidInput("cannot store an empty vector".into()));
        }
        let mut state = self.state()?;
        let blob = vector_codec::encode(vector);
        let entity = state
            .entities
            .get_mut(&entity_id)
            .ok_or(Error::EntityNotFound(entity_id))?;
        entity.embedding_updated_at = Some(Utc::now());
        state.embeddings.insert(entity_id, blob);
        Ok(())
    }

    async fn get_vector(&self, entity_id: Uuid) -> Result<Option<Vec<f32>>> {
        let state = self.state()?;
        state
            .embeddings
            .get(&entity_id)
            .map(|blob| vector_codec::decode(blob))
            .transpose()
    }

    async fn knn(
        &self,
        query: &[f32],
        k: usize,
        kind: Option<EntityKind>,
    ) -> Result<Vec<Neighbor>> {
        if k == 0 || query.is_empty() {
            return Ok(Vec::new());
        }
        let state = self.state()?;
        let mut neighbors = Vec::new();
        for (id, blob) in &state.embeddings {
            let Some(entity) = state.entities.get(id) else {
                continue;
            };
            if !entity.is_publishable() || kind.is_some_and(|want| want != entity.kind) {
                continue;
            }
            let stored = vector_codec::decode(blob)?;
            let distance = vector_codec::l2_distance(query, &stored)?;
            neighbors.push(Neighbor {
                entity_id: *id,
                kind: entity.kind,
                distance,
            });
        }
        neighbors.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then(a.entity_id.cmp(&b.entity_id))
        });
        neighbors.truncate(k);
        Ok(neighbors)
    }

    async fn delete(&self, entity_id: Uuid) -> Result<bool> {
        let mut state = self.state()?;
        if let Some(entity) = state.entities.get_mut(&entity_id) {
            entity.embedding_updated_at = None;
        }
        Ok(state.embeddings.remove(&entity_id).is_some())
    }

    async fn count(&self) -> Result<i64> {
        Ok(self.state()?.embeddings.len() as i64)
    }
}

#[async_trait]
impl NotificationRepository for MemoryStore {
    async fn try_create(
        &self,
        notification: NewNotification,
    ) -> Result<Option<NotificationRecord>> {
        let mut state = self.state()?;
        if state.notifications.contains_key(&notification.key) {
            return Ok(None);
        }
        let record = NotificationRecord {
            key: notification.key,
            created_at: Utc::now(),
            sent_at: None,
            text: notification.text,
            image_ref: notification.image_ref,
        };
        state.notifications.insert(record.key, record.clone());
        Ok(Some(record))
    }

    async fn mark_sent(&self, key: &NotificationKey) -> Result<bool> {
        let mut state = self.state()?;
        match state.notifications.get_mut(key) {
            Some(record) if record.sent_at.is_none() => {
                record.sent_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn get(&self, key: &NotificationKey) -> Result<Option<NotificationRecord>> {
        Ok(self.state()?.notifications.get(key).cloned())
    }

    async fn list_unsent(
        &self,
        older_than: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<NotificationRecord>> {
        let state = self.state()?;
        let mut records: Vec<NotificationRecord> = state
            .notifications
            .values()
            .filter(|r| r.sent_at.is_none() && r.created_at < older_than)
            .cloned()
            .collect();
        records.sort_by_key(|r| r.created_at);
        records.truncate(limit.max(0) as usize);
        Ok(records)
    }
}
