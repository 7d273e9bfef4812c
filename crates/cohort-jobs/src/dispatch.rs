//! Notification dispatch job.
//!
//! Each tick:
//! 1. list publishable postings created within the lookback window
//! 2. produce match candidates for each posting
//! 3. for each candidate, atomically create the dedup record
//! 4. only when this tick created the record, deliver and stamp `sent_at`
//!
//! Creating the record before delivery means a key is attempted at most
//! once. A failed delivery leaves the record unsent; `cohort stuck` lists
//! those for manual reconciliation.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, trace, warn};

use cohort_core::defaults::{
    DISPATCH_INTERVAL_SECS, DISPATCH_LOOKBACK_HOURS, DISPATCH_SIMILARITY_K,
};
use cohort_core::{
    DeliveryChannel, Entity, EntityKind, EntityRepository, MatchCandidate, NewNotification,
    NotificationKey, NotificationKind, NotificationRepository, OutboundMessage, Result,
};
use cohort_match::{MatchingEngine, SimilarityScope};

use crate::job::{PeriodicJob, TickContext, TickSummary};
use crate::scheduler::effective_interval;

/// Configuration for the dispatch job.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Scheduler interval.
    pub interval: Duration,
    /// Postings created within this window are considered.
    pub lookback: chrono::Duration,
    /// Similarity candidates per posting (0 = categorical only).
    pub similarity_k: usize,
    pub similarity_scope: SimilarityScope,
    /// Prefix for the action link attached to each message.
    pub action_base_url: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DISPATCH_INTERVAL_SECS),
            lookback: chrono::Duration::hours(DISPATCH_LOOKBACK_HOURS),
            similarity_k: DISPATCH_SIMILARITY_K,
            similarity_scope: SimilarityScope::CrossPopulation,
            action_base_url: None,
        }
    }
}

impl DispatchConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DISPATCH_INTERVAL_SECS` | `60` | Scheduler interval |
    /// | `DISPATCH_LOOKBACK_HOURS` | `24` | Posting age window |
    /// | `DISPATCH_SIMILARITY_K` | `0` | Similarity candidates per posting |
    /// | `DISPATCH_ACTION_BASE_URL` | (none) | Action link prefix |
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            interval: std::env::var("DISPATCH_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(|s| Duration::from_secs(s.max(1)))
                .unwrap_or(defaults.interval),
            lookback: std::env::var("DISPATCH_LOOKBACK_HOURS")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .map(chrono::Duration::hours)
                .unwrap_or(defaults.lookback),
            similarity_k: std::env::var("DISPATCH_SIMILARITY_K")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.similarity_k),
            similarity_scope: defaults.similarity_scope,
            action_base_url: std::env::var("DISPATCH_ACTION_BASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }

    /// Set the scheduler interval, clamped to [`MIN_INTERVAL`](crate::scheduler::MIN_INTERVAL).
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = effective_interval(interval);
        self
    }

    pub fn with_lookback(mut self, lookback: chrono::Duration) -> Self {
        self.lookback = lookback;
        self
    }

    pub fn with_similarity(mut self, k: usize, scope: SimilarityScope) -> Self {
        self.similarity_k = k;
        self.similarity_scope = scope;
        self
    }

    pub fn with_action_base_url(mut self, url: impl Into<String>) -> Self {
        self.action_base_url = Some(url.into());
        self
    }
}

/// Outcome of one dispatch tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    /// Postings inside the lookback window.
    pub postings: usize,
    pub candidates: usize,
    /// Dedup records created by this tick.
    pub created: usize,
    /// Candidates whose key already had a record.
    pub duplicates: usize,
    pub delivered: usize,
    /// Deliveries that failed; their records stay unsent.
    pub failed: usize,
    /// Recipients missing, hidden, or without a contact address.
    pub skipped: usize,
}

/// Render the notification text for a posting.
pub fn render_message(kind: NotificationKind, posting: &Entity) -> String {
    let headline = match kind {
        NotificationKind::CollabPublished => "New collaboration in your field",
        NotificationKind::CollabSuggested => "A collaboration you might like",
    };
    let mut lines = vec![format!("{}: {}", headline, posting.label())];
    if let Some(category) = posting.category.as_deref().filter(|c| !c.trim().is_empty()) {
        lines.push(format!("Category: {}", category.trim()));
    }
    if let Some(location) = posting.location.as_deref().filter(|l| !l.trim().is_empty()) {
        lines.push(format!("Location: {}", location.trim()));
    }
    if let Some(description) = posting
        .description
        .as_deref()
        .filter(|d| !d.trim().is_empty())
    {
        lines.push(String::new());
        lines.push(description.trim().to_string());
    }
    lines.join("\n")
}

enum DeliveryOutcome {
    Delivered,
    DeliveredNotMarked,
    Failed,
}

/// Turns match candidates into delivered notifications.
pub struct DispatchJob {
    entities: Arc<dyn EntityRepository>,
    notifications: Arc<dyn NotificationRepository>,
    engine: MatchingEngine,
    channel: Arc<dyn DeliveryChannel>,
    config: DispatchConfig,
}

impl DispatchJob {
    pub fn new(
        entities: Arc<dyn EntityRepository>,
        notifications: Arc<dyn NotificationRepository>,
        engine: MatchingEngine,
        channel: Arc<dyn DeliveryChannel>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            entities,
            notifications,
            engine,
            channel,
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Run one tick.
    ///
    /// Failing to list postings aborts the tick. Failures for a single
    /// posting or candidate are logged and skipped.
    #[instrument(
        skip(self),
        fields(
            subsystem = "jobs",
            component = "dispatch",
            op = "tick",
            channel = %self.channel.name()
        )
    )]
    pub async fn run_once(&self) -> Result<DispatchReport> {
        let start = Instant::now();
        let since = Utc::now() - self.config.lookback;
        let postings = self.entities.list_postings_since(since).await?;

        let mut report = DispatchReport {
            postings: postings.len(),
            ..Default::default()
        };
        let mut deliveries: JoinSet<(NotificationKey, DeliveryOutcome)> = JoinSet::new();

        for posting in &postings {
            let candidates = match self
                .engine
                .candidates_for_posting(
                    posting,
                    self.config.similarity_k,
                    self.config.similarity_scope,
                )
                .await
            {
                Ok(c) => c,
                Err(e) => {
                    warn!(
                        subject_id = %posting.id,
                        error_kind = %e.kind(),
                        error = %e,
                        "Matching failed for posting, skipping"
                    );
                    continue;
                }
            };
            report.candidates += candidates.len();

            for candidate in candidates {
                trace!(
                    recipient_id = %candidate.recipient_id,
                    subject_id = %candidate.subject_id,
                    source = ?candidate.source,
                    "Candidate"
                );
                match self.prepare(&candidate, posting).await {
                    Ok(Prepared::Skipped) => report.skipped += 1,
                    Ok(Prepared::Duplicate) => report.duplicates += 1,
                    Ok(Prepared::Created(key, message)) => {
                        report.created += 1;
                        let channel = self.channel.clone();
                        let notifications = self.notifications.clone();
                        deliveries.spawn(async move {
                            let outcome = deliver(channel, notifications, &key, &message).await;
                            (key, outcome)
                        });
                    }
                    Err(e) => {
                        report.skipped += 1;
                        warn!(
                            recipient_id = %candidate.recipient_id,
                            subject_id = %candidate.subject_id,
                            error_kind = %e.kind(),
                            error = %e,
                            "Candidate skipped"
                        );
                    }
                }
            }
        }

        while let Some(joined) = deliveries.join_next().await {
            match joined {
                Ok((_, DeliveryOutcome::Delivered)) => report.delivered += 1,
                Ok((_, DeliveryOutcome::DeliveredNotMarked)) => report.delivered += 1,
                Ok((_, DeliveryOutcome::Failed)) => report.failed += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(error = ?e, "Delivery task panicked");
                }
            }
        }

        info!(
            postings = report.postings,
            candidates = report.candidates,
            created = report.created,
            duplicates = report.duplicates,
            delivered = report.delivered,
            failed = report.failed,
            skipped = report.skipped,
            duration_ms = start.elapsed().as_millis() as u64,
            "Dispatch tick complete"
        );
        Ok(report)
    }

    /// Resolve the recipient and create the dedup record.
    async fn prepare(&self, candidate: &MatchCandidate, posting: &Entity) -> Result<Prepared> {
        let recipient = match self.entities.get(candidate.recipient_id).await? {
            Some(r) if r.kind == EntityKind::Profile && r.is_publishable() => r,
            _ => {
                debug!(
                    recipient_id = %candidate.recipient_id,
                    "Recipient missing or not publishable"
                );
                return Ok(Prepared::Skipped);
            }
        };
        let destination = match recipient.contact.as_deref().map(str::trim) {
            Some(c) if !c.is_empty() => c.to_string(),
            _ => {
                debug!(recipient_id = %recipient.id, "Recipient has no contact address");
                return Ok(Prepared::Skipped);
            }
        };

        let kind = NotificationKind::for_source(candidate.source);
        let key = NotificationKey::new(recipient.id, kind, posting.id);
        let text = render_message(kind, posting);

        let created = self
            .notifications
            .try_create(NewNotification {
                key,
                text: text.clone(),
                image_ref: posting.image_ref.clone(),
            })
            .await?;

        if created.is_none() {
            debug!(key = %key, "Notification already recorded");
            return Ok(Prepared::Duplicate);
        }

        let action_link = self
            .config
            .action_base_url
            .as_deref()
            .map(|base| format!("{}/postings/{}", base.trim_end_matches('/'), posting.id));

        Ok(Prepared::Created(
            key,
            OutboundMessage {
                destination,
                text,
                image_ref: posting.image_ref.clone(),
                action_link,
            },
        ))
    }
}

enum Prepared {
    Skipped,
    Duplicate,
    Created(NotificationKey, OutboundMessage),
}

async fn deliver(
    channel: Arc<dyn DeliveryChannel>,
    notifications: Arc<dyn NotificationRepository>,
    key: &NotificationKey,
    message: &OutboundMessage,
) -> DeliveryOutcome {
    if let Err(e) = channel.deliver(message).await {
        error!(
            key = %key,
            channel = channel.name(),
            error_kind = %e.kind(),
            error = %e,
            "Delivery failed, notification left unsent"
        );
        return DeliveryOutcome::Failed;
    }
    match notifications.mark_sent(key).await {
        Ok(true) => DeliveryOutcome::Delivered,
        Ok(false) => {
            warn!(key = %key, "Delivered but record was not in created state");
            DeliveryOutcome::DeliveredNotMarked
        }
        Err(e) => {
            error!(key = %key, error = %e, "Delivered but failed to stamp sent_at");
            DeliveryOutcome::DeliveredNotMarked
        }
    }
}

#[async_trait]
impl PeriodicJob for DispatchJob {
    fn name(&self) -> &str {
        "notification_dispatch"
    }

    fn interval(&self) -> Duration {
        self.config.interval
    }

    async fn run_tick(&self, _ctx: TickContext) -> Result<TickSummary> {
        let report = self.run_once().await?;
        Ok(TickSummary {
            found: report.candidates,
            processed: report.delivered,
            failed: report.failed,
        })
    }
}
