//! Periodic job abstraction.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;

use cohort_core::Result;

/// Receiver side of the process-wide shutdown flag.
pub type ShutdownSignal = watch::Receiver<bool>;

/// Create a shutdown flag, initially unset.
pub fn shutdown_channel() -> (watch::Sender<bool>, ShutdownSignal) {
    watch::channel(false)
}

/// Whether shutdown has been requested.
pub fn is_shutdown(signal: &ShutdownSignal) -> bool {
    *signal.borrow()
}

/// Context provided to a job for one tick.
#[derive(Clone)]
pub struct TickContext {
    /// Tick counter for this job, starting at 1.
    pub tick: u64,
    /// Long-running ticks check this between units of work.
    pub shutdown: ShutdownSignal,
}

impl TickContext {
    pub fn new(tick: u64, shutdown: ShutdownSignal) -> Self {
        Self { tick, shutdown }
    }

    pub fn is_shutdown(&self) -> bool {
        is_shutdown(&self.shutdown)
    }
}

/// Counts reported by a finished tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    pub found: usize,
    pub processed: usize,
    pub failed: usize,
}

/// A job the scheduler runs on a fixed interval.
#[async_trait]
pub trait PeriodicJob: Send + Sync {
    /// Stable name used in logs and events.
    fn name(&self) -> &str;

    /// Time between tick starts.
    fn interval(&self) -> Duration;

    /// Run one tick. An error aborts this tick only.
    async fn run_tick(&self, ctx: TickContext) -> Result<TickSummary>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shutdown_flag() {
        let (tx, rx) = shutdown_channel();
        let ctx = TickContext::new(1, rx);
        assert!(!ctx.is_shutdown());
        tx.send(true).unwrap();
        assert!(ctx.is_shutdown());
    }
}
