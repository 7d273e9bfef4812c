//! Structured logging field name constants for cohort.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation can query by the same names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Job tick aborted, delivery failed, requires operator attention |
//! | WARN  | Per-item failure skipped, retried on the next run |
//! | INFO  | Lifecycle events (startup, shutdown), job completion counts |
//! | DEBUG | Decision points, config choices |
//! | TRACE | Per-candidate iteration |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "inference", "matching", "jobs", "scheduler"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "vector_store", "openai", "backfill", "dispatch"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "upsert", "knn", "embed_text", "tick"
pub const OPERATION: &str = "op";

/// Periodic job name.
pub const JOB: &str = "job";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Profile or posting UUID being operated on.
pub const ENTITY_ID: &str = "entity_id";

/// Entity population ("profile" or "posting").
pub const ENTITY_KIND: &str = "entity_kind";

/// Notification recipient UUID.
pub const RECIPIENT_ID: &str = "recipient_id";

/// Notification subject UUID.
pub const SUBJECT_ID: &str = "subject_id";

/// Notification kind.
pub const NOTIFICATION_KIND: &str = "notification_kind";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of items selected by a query.
pub const FOUND: &str = "found";

/// Number of items successfully processed.
pub const PROCESSED: &str = "processed";

/// Number of items that failed and were skipped.
pub const FAILED: &str = "failed";

/// Number of results returned by a KNN or match query.
pub const RESULT_COUNT: &str = "result_count";

/// Character length of an embedding input.
pub const INPUT_CHARS: &str = "input_chars";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Error category (see `ErrorKind`).
pub const ERROR_KIND: &str = "error_kind";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
