//! Typed error taxonomy for the engine.
//!
//! Every failure mode callers are expected to branch on is a dedicated
//! variant carrying structured payloads, so change lists, conflict lists and
//! remote status codes are accessible without string parsing. Compile-time
//! errors (invalid IR, missing tenant context, unsupported combinations)
//! abort immediately and are never retried; transient driver errors can be
//! retried through [`crate::db::retry`].

use thiserror::Error;

/// Core error type for the engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Tenant injection is configured but no context was supplied.
    #[error("tenant context required but not provided")]
    TenantContextMissing,

    /// A tenant context field is blank or malformed.
    #[error("invalid tenant context: {0}")]
    TenantContextInvalid(String),

    /// An identifier or IR fragment cannot be compiled safely.
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// Template key failed the path-safety check.
    #[error("invalid template key {0:?}: only [A-Za-z0-9_-] is allowed")]
    InvalidTemplateKey(String),

    /// Operation is not supported by the selected backend.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A migration file does not match the required grammar.
    #[error("invalid migration file: {0}")]
    InvalidMigrationFile(String),

    /// On-disk content no longer matches the applied checksum.
    #[error("checksum mismatch for migration {version}: expected {expected}, found {actual}")]
    MigrationChecksumMismatch {
        version: i64,
        expected: String,
        actual: String,
    },

    /// An applied migration's file is no longer present.
    #[error("migration file missing for applied version {0}")]
    MigrationFileMissing(i64),

    /// Rollback requested for a migration with no stored down SQL.
    #[error("no down migration available for version {0}")]
    NoDownAvailable(i64),

    /// A schema definition failed validation.
    #[error("invalid schema: {0}")]
    SchemaInvalid(String),

    /// The diff contains breaking changes and `force` was not set.
    #[error("{} breaking schema change(s) detected", changes.len())]
    BreakingChange {
        changes: Vec<crate::schema::diff::SchemaChange>,
    },

    /// A merge or sync has unresolved conflicts.
    #[error("{} unresolved conflict(s)", conflicts.len())]
    Conflict {
        conflicts: Vec<crate::branch::diff::MergeConflict>,
    },

    /// The remote schema authority returned a non-retryable error.
    #[error("remote schema service error (status {status}): {message}")]
    SchemaRemote { status: u16, message: String },

    /// Authentication with the remote authority failed.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The caller aborted the operation.
    #[error("operation cancelled by user")]
    UserCancelled,

    /// Drain did not reach zero active queries before the timeout.
    #[error("drain timed out with {active} query(ies) still active")]
    DrainTimeout { active: usize },

    /// Pool acquire timed out; all connections are busy.
    #[error("connection pool exhausted")]
    PoolExhausted,

    /// The driver is draining and rejects new work. Retryable.
    #[error("driver is draining, no new queries accepted")]
    Draining,

    /// A transient driver failure (connection reset, deadlock,
    /// serialization failure). Retryable.
    #[error("transient driver error: {0}")]
    DriverTransient(String),

    /// Branch lookup failed.
    #[error("branch not found: {0}")]
    BranchNotFound(String),

    /// Deleting a protected branch without `force`.
    #[error("branch {0:?} is protected")]
    BranchProtected(String),

    /// Seed dependency graph contains a cycle.
    #[error("seed dependency cycle involving {0:?}")]
    SeedCycle(String),

    /// SQL driver errors
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Document driver errors
    #[error("mongodb error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// Remote transport errors
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization errors
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O errors
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether the operation that produced this error may be retried.
    ///
    /// Matches the classification used by [`crate::db::retry`]: draining and
    /// explicit transient failures are retryable, as are driver errors whose
    /// message carries a known transient signature.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Draining | Error::DriverTransient(_) | Error::PoolExhausted => true,
            Error::Sqlx(e) => is_transient_message(&e.to_string()),
            _ => false,
        }
    }
}

/// Transient signatures shared by the three SQL backends.
fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["connection reset", "connection refused", "deadlock", "serialization failure", "could not serialize", "broken pipe", "timed out"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Result type alias using the engine's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
