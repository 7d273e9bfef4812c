//! # cohort-jobs
//!
//! Periodic jobs for cohort.
//!
//! - [`BatchEmbeddingJob`]: embeds entities that lack an embedding
//! - [`DispatchJob`]: turns match candidates into delivered notifications,
//!   deduplicated per (recipient, kind, subject)
//! - [`Scheduler`]: runs each job on its own ticker until shutdown
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cohort_jobs::{BackfillConfig, BatchEmbeddingJob, Scheduler};
//!
//! let backfill = BatchEmbeddingJob::new(entities, vectors, backend, BackfillConfig::from_env());
//! let handle = Scheduler::new().with_job(Arc::new(backfill)).start();
//! tokio::signal::ctrl_c().await?;
//! handle.shutdown().await?;
//! ```

pub mod backfill;
pub mod delivery;
pub mod dispatch;
pub mod job;
pub mod scheduler;

pub use cohort_core::*;

pub use backfill::{BackfillConfig, BackfillReport, BatchEmbeddingJob, Population, PreviewItem};
pub use delivery::{channel_from_env, LogChannel, WebhookChannel, WebhookConfig};
pub use dispatch::{render_message, DispatchConfig, DispatchJob, DispatchReport};
pub use job::{
    is_shutdown, shutdown_channel, PeriodicJob, ShutdownSignal, TickContext, TickSummary,
};
pub use scheduler::{Scheduler, SchedulerEvent, SchedulerHandle};
