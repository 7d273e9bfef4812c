//! Batch embedding job.
//!
//! Selects entities that have all required text and no embedding yet, then
//! for each one builds its text, calls the embedding provider, and upserts
//! the vector. Items within a batch run sequentially; batches are separated
//! by a fixed delay so provider call volume stays predictable.
//!
//! Per-item failures are logged and counted, never propagated: the item keeps
//! its null `embedding_updated_at` and is picked up again on the next run.
//! Only a failure to list candidates aborts the run.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use cohort_core::defaults::{
    BACKFILL_BATCH_DELAY_MS, BACKFILL_BATCH_SIZE, BACKFILL_INTERVAL_SECS, BACKFILL_LIMIT,
};
use cohort_core::{
    build_text, EmbeddingBackend, Entity, EntityKind, EntityRepository, Error,
    PendingEmbeddingFilter, Result, VectorStore, Visibility,
};

use crate::job::{is_shutdown, PeriodicJob, ShutdownSignal, TickContext, TickSummary};
use crate::scheduler::effective_interval;

/// Which populations a run covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Population {
    Profiles,
    Postings,
    #[default]
    Both,
}

impl Population {
    pub fn kinds(&self) -> Vec<EntityKind> {
        match self {
            Population::Profiles => vec![EntityKind::Profile],
            Population::Postings => vec![EntityKind::Posting],
            Population::Both => vec![EntityKind::Profile, EntityKind::Posting],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Population::Profiles => "profiles",
            Population::Postings => "postings",
            Population::Both => "both",
        }
    }
}

impl fmt::Display for Population {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Population {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "profiles" | "profile" => Ok(Population::Profiles),
            "postings" | "posting" => Ok(Population::Postings),
            "both" | "all" => Ok(Population::Both),
            other => Err(Error::Config(format!("unknown population: {}", other))),
        }
    }
}

/// Configuration for the batch embedding job.
#[derive(Debug, Clone)]
pub struct BackfillConfig {
    pub population: Population,
    /// Items per batch (at least 1).
    pub batch_size: usize,
    /// Sleep between batches.
    pub batch_delay: Duration,
    /// Maximum entities per run (0 = unbounded).
    pub limit: usize,
    /// Select and preview only; no provider calls, no writes.
    pub dry_run: bool,
    /// Only embed verified entities.
    pub verified_only: bool,
    /// Scheduler interval.
    pub interval: Duration,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            population: Population::Both,
            batch_size: BACKFILL_BATCH_SIZE,
            batch_delay: Duration::from_millis(BACKFILL_BATCH_DELAY_MS),
            limit: BACKFILL_LIMIT,
            dry_run: false,
            verified_only: false,
            interval: Duration::from_secs(BACKFILL_INTERVAL_SECS),
        }
    }
}

impl BackfillConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `EMBED_BATCH_SIZE` | `10` | Items per batch |
    /// | `EMBED_BATCH_DELAY_MS` | `1000` | Sleep between batches |
    /// | `EMBED_LIMIT` | `0` | Max entities per run (0 = all) |
    /// | `EMBED_INTERVAL_SECS` | `300` | Scheduler interval |
    /// | `EMBED_POPULATION` | `both` | `profiles`, `postings` or `both` |
    /// | `EMBED_VERIFIED_ONLY` | `false` | Restrict to verified entities |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let batch_size = std::env::var("EMBED_BATCH_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.batch_size)
            .max(1);
        let batch_delay = std::env::var("EMBED_BATCH_DELAY_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.batch_delay);
        let limit = std::env::var("EMBED_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults.limit);
        let interval = std::env::var("EMBED_INTERVAL_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .map(|s| Duration::from_secs(s.max(1)))
            .unwrap_or(defaults.interval);
        let population = std::env::var("EMBED_POPULATION")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.population);
        let verified_only = std::env::var("EMBED_VERIFIED_ONLY")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            population,
            batch_size,
            batch_delay,
            limit,
            dry_run: false,
            verified_only,
            interval,
        }
    }

    pub fn with_population(mut self, population: Population) -> Self {
        self.population = population;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_verified_only(mut self, verified_only: bool) -> Self {
        self.verified_only = verified_only;
        self
    }

    /// Set the scheduler interval, clamped to [`MIN_INTERVAL`](crate::scheduler::MIN_INTERVAL).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = effective_interval(interval);
        self
    }

    /// Selection filter for this configuration.
    pub fn filter(&self) -> PendingEmbeddingFilter {
        let visibilities = if self.verified_only {
            vec![Visibility::Verified]
        } else {
            Vec::new()
        };
        PendingEmbeddingFilter::new(self.population.kinds())
            .with_visibilities(visibilities)
            .with_limit(self.limit)
    }
}

/// One entity that a dry run would embed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreviewItem {
    pub entity_id: Uuid,
    pub kind: EntityKind,
    pub label: String,
    pub text_len: usize,
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BackfillReport {
    /// Entities selected.
    pub found: usize,
    /// Entities embedded and stored.
    pub processed: usize,
    /// Entities skipped after an error.
    pub failed: usize,
    pub dry_run: bool,
    /// Stopped early because shutdown was requested.
    pub interrupted: bool,
    /// Filled in dry-run mode only.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub preview: Vec<PreviewItem>,
}

/// Embeds entities that do not have an embedding yet.
pub struct BatchEmbeddingJob {
    entities: Arc<dyn EntityRepository>,
    vectors: Arc<dyn VectorStore>,
    backend: Arc<dyn EmbeddingBackend>,
    config: BackfillConfig,
}

impl BatchEmbeddingJob {
    pub fn new(
        entities: Arc<dyn EntityRepository>,
        vectors: Arc<dyn VectorStore>,
        backend: Arc<dyn EmbeddingBackend>,
        config: BackfillConfig,
    ) -> Self {
        Self {
            entities,
            vectors,
            backend,
            config,
        }
    }

    pub fn config(&self) -> &BackfillConfig {
        &self.config
    }

    /// Run once. Stops before the next batch when `shutdown` is set.
    #[instrument(
        skip(self, shutdown),
        fields(
            subsystem = "jobs",
            component = "backfill",
            op = "run",
            population = %self.config.population,
            dry_run = self.config.dry_run,
        )
    )]
    pub async fn run(&self, shutdown: &ShutdownSignal) -> Result<BackfillReport> {
        let start = Instant::now();
        let pending = self
            .entities
            .list_pending_embedding(&self.config.filter())
            .await?;

        let mut report = BackfillReport {
            found: pending.len(),
            dry_run: self.config.dry_run,
            ..Default::default()
        };

        if pending.is_empty() {
            debug!("No entities pending embedding");
            return Ok(report);
        }

        if self.config.dry_run {
            report.preview = pending.iter().map(preview).collect();
            info!(found = report.found, "Dry run, nothing embedded");
            return Ok(report);
        }

        let batch_size = self.config.batch_size.max(1);
        for (index, batch) in pending.chunks(batch_size).enumerate() {
            if index > 0 && !self.config.batch_delay.is_zero() {
                tokio::time::sleep(self.config.batch_delay).await;
            }
            if is_shutdown(shutdown) {
                info!(
                    batches_done = index,
                    "Shutdown requested, not starting next batch"
                );
                report.interrupted = true;
                break;
            }

            debug!(batch = index + 1, size = batch.len(), "Processing batch");
            for entity in batch {
                match self.embed_one(entity).await {
                    Ok(()) => report.processed += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(
                            entity_id = %entity.id,
                            entity_kind = %entity.kind,
                            error_kind = %e.kind(),
                            error = %e,
                            "Embedding failed, entity left for next run"
                        );
                    }
                }
            }
        }

        info!(
            found = report.found,
            processed = report.processed,
            failed = report.failed,
            interrupted = report.interrupted,
            duration_ms = start.elapsed().as_millis() as u64,
            "Embedding backfill complete"
        );
        Ok(report)
    }

    async fn embed_one(&self, entity: &Entity) -> Result<()> {
        let text = build_text(entity);
        if text.trim().is_empty() {
            return Err(Error::InvalidInput("entity renders to empty text".into()));
        }
        let vector = self.backend.embed_text(&text).await?;
        self.vectors.upsert(entity.id, &vector).await?;
        debug!(
            entity_id = %entity.id,
            input_chars = text.chars().count(),
            "Entity embedded"
        );
        Ok(())
    }
}

fn preview(entity: &Entity) -> PreviewItem {
    PreviewItem {
        entity_id: entity.id,
        kind: entity.kind,
        label: entity.label().to_string(),
        text_len: build_text(entity).chars().count(),
    }
}

#[async_trait]
impl PeriodicJob for BatchEmbeddingJob {
    fn name(&self) -> &str {
        "embedding_backfill"
    }

    fn interval(&self) -> Duration {
        self.config.interval
    }

    async fn run_tick(&self, ctx: TickContext) -> Result<TickSummary> {
        let report = self.run(&ctx.shutdown).await?;
        Ok(TickSummary {
            found: report.found,
            processed: report.processed,
            failed: report.failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::shutdown_channel;
    use cohort_db::MemoryStore;
    use cohort_inference::MockEmbeddingBackend;

    fn job(
        store: &MemoryStore,
        backend: &MockEmbeddingBackend,
        config: BackfillConfig,
    ) -> BatchEmbeddingJob {
        BatchEmbeddingJob::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(backend.clone()),
            config.with_batch_delay(Duration::ZERO),
        )
    }

    fn ann() -> Entity {
        Entity::profile(Uuid::new_v4(), "Ann")
            .with_title("Designer")
            .with_tags(["ux", "figma"])
    }

    #[tokio::test]
    async fn test_single_profile_batch_of_one() {
        let store = MemoryStore::new();
        let backend = MockEmbeddingBackend::new();
        let u1 = ann();
        store.insert_entity(u1.clone()).unwrap();

        let (_tx, rx) = shutdown_channel();
        let config = BackfillConfig::default().with_batch_size(1);
        let report = job(&store, &backend, config).run(&rx).await.unwrap();

        assert_eq!(report.found, 1);
        assert_eq!(report.processed, 1);
        assert_eq!(
            backend.calls(),
            vec!["Name: Ann\nTitle: Designer\nSkills: ux, figma".to_string()]
        );
        let stored = store.entity(u1.id).unwrap().unwrap();
        assert!(stored.embedding_updated_at.is_some());
        assert!(store.get_vector(u1.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_second_run_makes_no_calls() {
        let store = MemoryStore::new();
        let backend = MockEmbeddingBackend::new();
        for i in 0..5 {
            store
                .insert_entity(Entity::profile(Uuid::new_v4(), format!("p{}", i)))
                .unwrap();
        }
        let config = BackfillConfig::default().with_batch_size(2);
        let job = job(&store, &backend, config);
        let (_tx, rx) = shutdown_channel();

        let first = job.run(&rx).await.unwrap();
        assert_eq!(first.processed, 5);
        assert_eq!(backend.call_count(), 5);

        let second = job.run(&rx).await.unwrap();
        assert_eq!(second.found, 0);
        assert_eq!(backend.call_count(), 5);
    }

    #[tokio::test]
    async fn test_item_failure_does_not_abort_batch() {
        let store = MemoryStore::new();
        let backend = MockEmbeddingBackend::new().fail_on("Broken");
        let broken = Entity::profile(Uuid::new_v4(), "Broken");
        let fine = Entity::profile(Uuid::new_v4(), "Fine");
        store.insert_entity(broken.clone()).unwrap();
        store.insert_entity(fine.clone()).unwrap();

        let (_tx, rx) = shutdown_channel();
        let report = job(&store, &backend, BackfillConfig::default())
            .run(&rx)
            .await
            .unwrap();

        assert_eq!(report.found, 2);
        assert_eq!(report.processed, 1);
        assert_eq!(report.failed, 1);
        let broken = store.entity(broken.id).unwrap().unwrap();
        let fine = store.entity(fine.id).unwrap().unwrap();
        assert!(broken.embedding_updated_at.is_none());
        assert!(fine.embedding_updated_at.is_some());
    }

    #[tokio::test]
    async fn test_dry_run_previews_without_side_effects() {
        let store = MemoryStore::new();
        let backend = MockEmbeddingBackend::new();
        let u1 = ann();
        store.insert_entity(u1.clone()).unwrap();

        let (_tx, rx) = shutdown_channel();
        let config = BackfillConfig::default().with_dry_run(true);
        let report = job(&store, &backend, config).run(&rx).await.unwrap();

        assert!(report.dry_run);
        assert_eq!(report.found, 1);
        assert_eq!(report.processed, 0);
        assert_eq!(report.preview.len(), 1);
        assert_eq!(report.preview[0].entity_id, u1.id);
        assert_eq!(backend.call_count(), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_population_and_limit() {
        let store = MemoryStore::new();
        let backend = MockEmbeddingBackend::new();
        store
            .insert_entity(Entity::profile(Uuid::new_v4(), "Ann"))
            .unwrap();
        for i in 0..3 {
            store
                .insert_entity(Entity::posting(
                    Uuid::new_v4(),
                    "design",
                    format!("Posting {}", i),
                    "Details",
                ))
                .unwrap();
        }

        let (_tx, rx) = shutdown_channel();
        let config = BackfillConfig::default()
            .with_population(Population::Postings)
            .with_limit(2);
        let report = job(&store, &backend, config).run(&rx).await.unwrap();

        assert_eq!(report.found, 2);
        assert_eq!(report.processed, 2);
        assert!(backend
            .calls()
            .iter()
            .all(|t| t.starts_with("Title: Posting")));
    }

    #[tokio::test]
    async fn test_verified_only() {
        let store = MemoryStore::new();
        let backend = MockEmbeddingBackend::new();
        let verified = Entity::profile(Uuid::new_v4(), "V").with_visibility(Visibility::Verified);
        store.insert_entity(verified.clone()).unwrap();
        store
            .insert_entity(Entity::profile(Uuid::new_v4(), "P"))
            .unwrap();

        let (_tx, rx) = shutdown_channel();
        let config = BackfillConfig::default().with_verified_only(true);
        let report = job(&store, &backend, config).run(&rx).await.unwrap();
        assert_eq!(report.processed, 1);
        assert!(store.get_vector(verified.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_shutdown_stops_before_next_batch() {
        let store = MemoryStore::new();
        let backend = MockEmbeddingBackend::new();
        for i in 0..4 {
            store
                .insert_entity(Entity::profile(Uuid::new_v4(), format!("p{}", i)))
                .unwrap();
        }

        let (tx, rx) = shutdown_channel();
        tx.send(true).unwrap();
        let config = BackfillConfig::default().with_batch_size(2);
        let report = job(&store, &backend, config).run(&rx).await.unwrap();

        assert!(report.interrupted);
        assert_eq!(report.processed, 0);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_batches_are_separated_by_delay() {
        let store = MemoryStore::new();
        let backend = MockEmbeddingBackend::new();
        for i in 0..3 {
            store
                .insert_entity(Entity::profile(Uuid::new_v4(), format!("p{}", i)))
                .unwrap();
        }
        let job = BatchEmbeddingJob::new(
            Arc::new(store.clone()),
            Arc::new(store.clone()),
            Arc::new(backend.clone()),
            BackfillConfig::default()
                .with_batch_size(1)
                .with_batch_delay(Duration::from_secs(1)),
        );

        let (_tx, rx) = shutdown_channel();
        let started = tokio::time::Instant::now();
        let report = job.run(&rx).await.unwrap();

        assert_eq!(report.processed, 3);
        assert!(started.elapsed() >= Duration::from_secs(2));
    }

    #[test]
    fn test_population_parsing() {
        assert_eq!(
            "profiles".parse::<Population>().unwrap(),
            Population::Profiles
        );
        assert_eq!("Both".parse::<Population>().unwrap(), Population::Both);
        assert!("teams".parse::<Population>().is_err());
    }

    #[test]
    fn test_config_filter() {
        let filter = BackfillConfig::default()
            .with_population(Population::Profiles)
            .with_verified_only(true)
            .with_limit(7)
            .filter();
        assert_eq!(filter.kinds, vec![EntityKind::Profile]);
        assert_eq!(filter.visibilities, vec![Visibility::Verified]);
        assert_eq!(filter.limit, 7);
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = BackfillConfig::default().with_interval(Duration::ZERO);
        assert_eq!(config.interval, Duration::from_millis(1));
    }
}
