//! Centralized default constants for cohort.
//!
//! Every crate and the CLI reference these instead of defining their own
//! magic numbers.

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model (OpenAI-compatible endpoint).
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension for text-embedding-3-small.
pub const EMBED_DIMENSION: usize = 1536;

/// Maximum characters sent to the provider; longer input is cut.
pub const EMBED_MAX_INPUT_CHARS: usize = 8000;

/// Provider request timeout in seconds.
pub const EMBED_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// BATCH EMBEDDING JOB
// =============================================================================

/// Items per batch.
pub const BACKFILL_BATCH_SIZE: usize = 10;

/// Sleep between batches in milliseconds.
pub const BACKFILL_BATCH_DELAY_MS: u64 = 1000;

/// Maximum entities per run (0 = unbounded).
pub const BACKFILL_LIMIT: usize = 0;

/// Scheduler interval for the backfill job in seconds.
pub const BACKFILL_INTERVAL_SECS: u64 = 300;

// =============================================================================
// DISPATCH JOB
// =============================================================================

/// Scheduler interval for the dispatch job in seconds.
pub const DISPATCH_INTERVAL_SECS: u64 = 60;

/// Postings created within this window are considered for dispatch.
pub const DISPATCH_LOOKBACK_HOURS: i64 = 24;

/// Similarity candidates per subject (0 disables similarity matching).
pub const DISPATCH_SIMILARITY_K: usize = 0;

/// Delivery channel request timeout in seconds.
pub const DELIVERY_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// SCHEDULER
// =============================================================================

/// Broadcast channel capacity for scheduler events.
pub const EVENT_BUS_CAPACITY: usize = 256;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for operator listings (stuck notifications).
pub const PAGE_LIMIT: i64 = 50;
