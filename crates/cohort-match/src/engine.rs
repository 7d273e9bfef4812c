//! Matching engine.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, instrument, trace, warn};

use cohort_core::{
    Entity, EntityKind, EntityRepository, Error, MatchCandidate, Result, VectorStore,
};

/// Which population similarity search looks in.
///
/// Profiles and postings share one text builder and one embedding model, so
/// their vectors are comparable and cross-population search is meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimilarityScope {
    /// Neighbors of the subject's own kind.
    SamePopulation,
    /// Neighbors of the other kind (postings to profiles and back).
    #[default]
    CrossPopulation,
}

impl SimilarityScope {
    fn target_kind(self, subject: EntityKind) -> EntityKind {
        match self {
            SimilarityScope::SamePopulation => subject,
            SimilarityScope::CrossPopulation => subject.other(),
        }
    }
}

/// Produces match candidates from the entity and vector stores.
#[derive(Clone)]
pub struct MatchingEngine {
    entities: Arc<dyn EntityRepository>,
    vectors: Arc<dyn VectorStore>,
    taxonomy: crate::CategoryTaxonomy,
}

impl MatchingEngine {
    pub fn new(
        entities: Arc<dyn EntityRepository>,
        vectors: Arc<dyn VectorStore>,
        taxonomy: crate::CategoryTaxonomy,
    ) -> Self {
        Self {
            entities,
            vectors,
            taxonomy,
        }
    }

    pub fn taxonomy(&self) -> &crate::CategoryTaxonomy {
        &self.taxonomy
    }

    /// Publishable profiles whose tags intersect the posting's category
    /// (through the taxonomy) or its required tags.
    ///
    /// Returns every qualifying profile; order is not meaningful.
    #[instrument(
        skip(self, posting),
        fields(
            subsystem = "matching",
            component = "engine",
            op = "categorical",
            subject_id = %posting.id
        )
    )]
    pub async fn categorical(&self, posting: &Entity) -> Result<Vec<MatchCandidate>> {
        if posting.kind != EntityKind::Posting {
            return Err(Error::InvalidInput(format!(
                "categorical match needs a posting, got {}",
                posting.kind
            )));
        }

        let mut wanted = posting
            .category
            .as_deref()
            .map(|c| self.taxonomy.tags_for(c))
            .unwrap_or_default();
        wanted.extend(
            posting
                .tags
                .iter()
                .map(|t| t.trim().to_lowercase())
                .filter(|t| !t.is_empty()),
        );
        if wanted.is_empty() {
            return Ok(Vec::new());
        }

        let wanted: Vec<String> = wanted.into_iter().collect();
        let profiles = self.entities.list_profiles_with_any_tag(&wanted).await?;

        let candidates: Vec<MatchCandidate> = profiles
            .into_iter()
            .filter(|p| p.id != posting.id)
            .map(|p| MatchCandidate::categorical(p.id, posting.id))
            .collect();

        debug!(result_count = candidates.len(), "Categorical match complete");
        Ok(candidates)
    }

    /// Up to `k` nearest entities to `subject` in the given scope.
    ///
    /// The subject never matches itself. A subject without a stored
    /// embedding yields no candidates; the batch job will embed it later.
    #[instrument(
        skip(self, subject),
        fields(
            subsystem = "matching",
            component = "engine",
            op = "similar",
            subject_id = %subject.id
        )
    )]
    pub async fn similar(
        &self,
        subject: &Entity,
        k: usize,
        scope: SimilarityScope,
    ) -> Result<Vec<MatchCandidate>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let target = scope.target_kind(subject.kind);

        // Same-population results contain the subject itself; ask for one more.
        let neighbors = match self
            .vectors
            .knn_by_entity(subject.id, k + 1, Some(target))
            .await
        {
            Ok(neighbors) => neighbors,
            Err(Error::EmbeddingNotFound(_)) => {
                debug!("Subject has no embedding yet, no similarity candidates");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let candidates: Vec<MatchCandidate> = neighbors
            .into_iter()
            .filter(|n| n.entity_id != subject.id)
            .take(k)
            .inspect(|n| trace!(neighbor_id = %n.entity_id, distance = n.distance, "Neighbor"))
            .map(|n| MatchCandidate::similarity(n.entity_id, subject.id, n.distance))
            .collect();

        debug!(
            result_count = candidates.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Similarity match complete"
        );
        Ok(candidates)
    }

    /// Categorical candidates for a posting, plus up to `similarity_k`
    /// similarity candidates for profiles not already matched categorically.
    ///
    /// A similarity failure (store error, stale vector of another dimension)
    /// is logged and the categorical candidates are returned alone.
    pub async fn candidates_for_posting(
        &self,
        posting: &Entity,
        similarity_k: usize,
        scope: SimilarityScope,
    ) -> Result<Vec<MatchCandidate>> {
        let mut candidates = self.categorical(posting).await?;
        if similarity_k == 0 {
            return Ok(candidates);
        }

        let similar = match self.similar(posting, similarity_k, scope).await {
            Ok(similar) => similar,
            Err(e) => {
                warn!(
                    subsystem = "matching",
                    component = "engine",
                    subject_id = %posting.id,
                    error_kind = %e.kind(),
                    error = %e,
                    "Similarity match failed, using categorical candidates only"
                );
                return Ok(candidates);
            }
        };
        let matched: HashSet<_> = candidates.iter().map(|c| c.recipient_id).collect();
        candidates.extend(
            similar
                .into_iter()
                .filter(|c| !matched.contains(&c.recipient_id)),
        );
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CategoryTaxonomy;
    use cohort_db::MemoryStore;
    use cohort_core::{MatchSource, Visibility};
    use uuid::Uuid;

    fn engine(store: &MemoryStore) -> MatchingEngine {
        MatchingEngine::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            CategoryTaxonomy::builtin(),
        )
    }

    fn profile(name: &str, tags: &[&str]) -> Entity {
        Entity::profile(Uuid::new_v4(), name).with_tags(tags.iter().copied())
    }

    #[tokio::test]
    async fn test_design_posting_matches_ux_profile_only() {
        let store = MemoryStore::new();
        let u1 = profile("U1", &["ux"]);
        let u2 = profile("U2", &["sales"]);
        let p1 = Entity::posting(Uuid::new_v4(), "design", "Landing page", "Need a designer");
        store.insert_entity(u1.clone()).unwrap();
        store.insert_entity(u2.clone()).unwrap();
        store.insert_entity(p1.clone()).unwrap();

        let candidates = engine(&store).categorical(&p1).await.unwrap();
        assert_eq!(candidates, vec![MatchCandidate::categorical(u1.id, p1.id)]);
    }

    #[tokio::test]
    async fn test_categorical_skips_hidden_profiles() {
        let store = MemoryStore::new();
        let hidden = profile("Hidden", &["figma"]).with_visibility(Visibility::Hidden);
        let verified = profile("Verified", &["Figma"]).with_visibility(Visibility::Verified);
        let p1 = Entity::posting(Uuid::new_v4(), "design", "Logo", "Need a logo");
        store.insert_entity(hidden).unwrap();
        store.insert_entity(verified.clone()).unwrap();

        let candidates = engine(&store).categorical(&p1).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].recipient_id, verified.id);
    }

    #[tokio::test]
    async fn test_categorical_uses_posting_tags() {
        let store = MemoryStore::new();
        let rustacean = profile("R", &["rust"]);
        store.insert_entity(rustacean.clone()).unwrap();
        let posting = Entity::posting(Uuid::new_v4(), "pottery", "Kiln firmware", "Embedded work")
            .with_tags(["Rust"]);

        let candidates = engine(&store).categorical(&posting).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].recipient_id, rustacean.id);
    }

    #[tokio::test]
    async fn test_categorical_rejects_profile_subject() {
        let store = MemoryStore::new();
        let err = engine(&store)
            .categorical(&profile("Ann", &["ux"]))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_similar_without_embedding_is_empty() {
        let store = MemoryStore::new();
        let posting = Entity::posting(Uuid::new_v4(), "design", "Logo", "Need a logo");
        store.insert_entity(posting.clone()).unwrap();

        let candidates = engine(&store)
            .similar(&posting, 3, SimilarityScope::CrossPopulation)
            .await
            .unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_similar_cross_population_orders_by_distance() {
        let store = MemoryStore::new();
        let posting = Entity::posting(Uuid::new_v4(), "design", "Logo", "Need a logo");
        let near = profile("Near", &[]);
        let far = profile("Far", &[]);
        let other_posting = Entity::posting(Uuid::new_v4(), "design", "Icon", "Need icons");
        for e in [&posting, &near, &far, &other_posting] {
            store.insert_entity(e.clone()).unwrap();
        }
        store.upsert(posting.id, &[0.0, 0.0]).await.unwrap();
        store.upsert(near.id, &[1.0, 0.0]).await.unwrap();
        store.upsert(far.id, &[4.0, 0.0]).await.unwrap();
        store.upsert(other_posting.id, &[0.0, 0.5]).await.unwrap();

        let candidates = engine(&store)
            .similar(&posting, 5, SimilarityScope::CrossPopulation)
            .await
            .unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.recipient_id).collect();
        assert_eq!(ids, vec![near.id, far.id]);
        assert_eq!(candidates[0].distance, Some(1.0));
        assert!(candidates.iter().all(|c| c.subject_id == posting.id));
    }

    #[tokio::test]
    async fn test_similar_same_population_excludes_subject() {
        let store = MemoryStore::new();
        let a = profile("A", &[]);
        let b = profile("B", &[]);
        let c = profile("C", &[]);
        for e in [&a, &b, &c] {
            store.insert_entity(e.clone()).unwrap();
        }
        store.upsert(a.id, &[0.0]).await.unwrap();
        store.upsert(b.id, &[1.0]).await.unwrap();
        store.upsert(c.id, &[2.0]).await.unwrap();

        let candidates = engine(&store)
            .similar(&a, 2, SimilarityScope::SamePopulation)
            .await
            .unwrap();
        let ids: Vec<_> = candidates.iter().map(|c| c.recipient_id).collect();
        assert_eq!(ids, vec![b.id, c.id]);
    }

    #[tokio::test]
    async fn test_similarity_failure_keeps_categorical_candidates() {
        let store = MemoryStore::new();
        let designer = profile("Designer", &["ux"]);
        let stale = profile("Stale", &["cooking"]);
        let posting = Entity::posting(Uuid::new_v4(), "design", "Logo", "Need a logo");
        for e in [&designer, &stale, &posting] {
            store.insert_entity(e.clone()).unwrap();
        }
        store.upsert(posting.id, &[0.0, 0.0]).await.unwrap();
        // Left over from a model with another dimension.
        store.upsert(stale.id, &[0.0, 0.0, 0.0]).await.unwrap();

        let engine = engine(&store);
        assert!(engine
            .similar(&posting, 3, SimilarityScope::CrossPopulation)
            .await
            .is_err());

        let candidates = engine
            .candidates_for_posting(&posting, 3, SimilarityScope::CrossPopulation)
            .await
            .unwrap();
        assert_eq!(
            candidates,
            vec![MatchCandidate::categorical(designer.id, posting.id)]
        );
    }

    #[tokio::test]
    async fn test_combined_prefers_categorical() {
        let store = MemoryStore::new();
        let designer = profile("Designer", &["ux"]);
        let neighbor = profile("Neighbor", &["cooking"]);
        let posting = Entity::posting(Uuid::new_v4(), "design", "Logo", "Need a logo");
        for e in [&designer, &neighbor, &posting] {
            store.insert_entity(e.clone()).unwrap();
        }
        store.upsert(posting.id, &[0.0]).await.unwrap();
        store.upsert(designer.id, &[0.1]).await.unwrap();
        store.upsert(neighbor.id, &[0.2]).await.unwrap();

        let candidates = engine(&store)
            .candidates_for_posting(&posting, 5, SimilarityScope::CrossPopulation)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].recipient_id, designer.id);
        assert_eq!(candidates[0].source, MatchSource::Categorical);
        assert_eq!(candidates[1].recipient_id, neighbor.id);
        assert_eq!(candidates[1].source, MatchSource::Similarity);
    }
}
