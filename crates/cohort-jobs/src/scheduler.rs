//! Periodic job scheduler.
//!
//! One long-lived task per job, each with its own ticker. Every tick runs in
//! a spawned task so an error or a panic ends that tick only; the ticker
//! and sibling jobs keep going. A shared watch flag stops all of them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument};

use cohort_core::defaults::EVENT_BUS_CAPACITY;
use cohort_core::Result;

use crate::job::{is_shutdown, PeriodicJob, ShutdownSignal, TickContext, TickSummary};

/// Event emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A tick finished successfully.
    TickCompleted {
        job: String,
        tick: u64,
        summary: TickSummary,
        duration_ms: u64,
    },
    /// A tick returned an error or panicked.
    TickFailed {
        job: String,
        tick: u64,
        error: String,
    },
    /// A job loop exited after shutdown.
    JobStopped { job: String },
}

/// Builder for a set of periodic jobs.
pub struct Scheduler {
    jobs: Vec<Arc<dyn PeriodicJob>>,
    event_tx: broadcast::Sender<SchedulerEvent>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self {
            jobs: Vec::new(),
            event_tx,
        }
    }

    /// Add a job.
    pub fn with_job(mut self, job: Arc<dyn PeriodicJob>) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn job_names(&self) -> Vec<String> {
        self.jobs.iter().map(|j| j.name().to_string()).collect()
    }

    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_tx.subscribe()
    }

    /// Spawn one task per job and return a handle for control.
    pub fn start(self) -> SchedulerHandle {
        let (shutdown_tx, _) = watch::channel(false);
        let event_rx = self.event_tx.subscribe();
        let mut tasks = JoinSet::new();

        info!(
            subsystem = "scheduler",
            jobs = ?self.job_names(),
            "Scheduler started"
        );

        for job in self.jobs {
            let shutdown = shutdown_tx.subscribe();
            let event_tx = self.event_tx.clone();
            tasks.spawn(run_job(job, shutdown, event_tx));
        }

        SchedulerHandle {
            shutdown_tx,
            tasks,
            event_rx,
        }
    }
}

/// Handle for controlling running jobs.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: JoinSet<()>,
    event_rx: broadcast::Receiver<SchedulerEvent>,
}

impl SchedulerHandle {
    /// Get a receiver for scheduler events.
    pub fn events(&self) -> broadcast::Receiver<SchedulerEvent> {
        self.event_rx.resubscribe()
    }

    /// A receiver for the shared shutdown flag.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown_tx.subscribe()
    }

    /// Signal every job to stop and wait for the loops to exit.
    ///
    /// In-flight ticks run to completion; the batch job stops before its
    /// next batch.
    pub async fn shutdown(mut self) -> Result<()> {
        self.shutdown_tx.send_replace(true);
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                error!(subsystem = "scheduler", error = ?e, "Job loop panicked");
            }
        }
        info!(subsystem = "scheduler", "Scheduler stopped");
        Ok(())
    }
}

/// Shortest interval a job loop will tick at.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Clamp a configured interval to [`MIN_INTERVAL`].
pub fn effective_interval(interval: Duration) -> Duration {
    interval.max(MIN_INTERVAL)
}

#[instrument(skip_all, fields(subsystem = "scheduler", job = %job.name()))]
async fn run_job(
    job: Arc<dyn PeriodicJob>,
    mut shutdown: ShutdownSignal,
    event_tx: broadcast::Sender<SchedulerEvent>,
) {
    let name = job.name().to_string();
    let period = effective_interval(job.interval());
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut tick: u64 = 0;

    debug!(interval_ms = period.as_millis() as u64, "Job loop started");

    loop {
        tokio::select! {
            biased;
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {}
        }
        if is_shutdown(&shutdown) {
            break;
        }

        tick += 1;
        let start = Instant::now();
        let ctx = TickContext::new(tick, shutdown.clone());
        let tick_job = job.clone();
        let joined = tokio::spawn(async move { tick_job.run_tick(ctx).await }).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let event = match joined {
            Ok(Ok(summary)) => {
                debug!(tick, duration_ms, found = summary.found, "Tick complete");
                SchedulerEvent::TickCompleted {
                    job: name.clone(),
                    tick,
                    summary,
                    duration_ms,
                }
            }
            Ok(Err(e)) => {
                error!(
                    tick,
                    duration_ms,
                    error_kind = %e.kind(),
                    error = %e,
                    "Tick aborted"
                );
                SchedulerEvent::TickFailed {
                    job: name.clone(),
                    tick,
                    error: e.to_string(),
                }
            }
            Err(e) => {
                error!(tick, error = ?e, "Tick panicked");
                SchedulerEvent::TickFailed {
                    job: name.clone(),
                    tick,
                    error: if e.is_panic() {
                        "tick panicked".to_string()
                    } else {
                        "tick cancelled".to_string()
                    },
                }
            }
        };
        let _ = event_tx.send(event);
    }

    let _ = event_tx.send(SchedulerEvent::JobStopped { job: name });
    info!("Job loop stopped");
}
