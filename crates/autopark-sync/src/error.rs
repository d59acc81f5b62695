//! # Sync Error Types
//!
//! Error types for the offline-first store.
//!
//! ## The One Distinction That Matters
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │            "Definitely failed" vs. "Unreachable, queued"               │
//! │                                                                         │
//! │  RemoteError::Rejected       RemoteError::Unavailable                  │
//! │  ─────────────────────       ────────────────────────                  │
//! │  The remote store saw the    The remote store never saw the           │
//! │  request and refused it      request (timeout, connect error,         │
//! │  (4xx-class response).       5xx outage).                             │
//! │                                                                        │
//! │  → surfaces to the caller    → absorbed by the offline queue;         │
//! │    as StoreError::Rejected     caller sees a queued/pending result    │
//! │                                                                        │
//! │  Collapsing these two is the most common bug class in offline-first   │
//! │  stores; they are separate variants so call sites must choose.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use autopark_core::{CoreError, ValidationError};
use autopark_db::DbError;

// =============================================================================
// Remote Error
// =============================================================================

/// Outcome classification for a remote store call.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The remote store could not be reached: connect failure, timeout,
    /// or a server-side outage. The operation may not have been observed
    /// at all, so it is safe and required to queue it for replay.
    #[error("Remote store unreachable: {0}")]
    Unavailable(String),

    /// The remote store received the request and refused it. Retrying the
    /// identical request will not succeed; this must surface to the
    /// caller, never be queued.
    #[error("Remote store rejected the request: {0}")]
    Rejected(String),
}

impl RemoteError {
    /// Whether queueing for replay is the correct reaction.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RemoteError::Unavailable(_))
    }
}

// =============================================================================
// Store Error
// =============================================================================

/// Errors surfaced by [`crate::ParkingStore`] to its callers.
///
/// Transient connectivity problems never appear here: they are absorbed
/// into the offline queue (`register_entry` still succeeds with a queued
/// id, `process_exit` returns a pending outcome).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A domain rule was violated (duplicate active session, missing
    /// session, duplicate username, validation failure, conflict on
    /// exit). Returned synchronously for user-facing messaging.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// The remote store definitively refused the operation.
    #[error("Remote store rejected the request: {0}")]
    Rejected(String),

    /// Local database failure.
    #[error("Database error: {0}")]
    Db(#[from] DbError),

    /// Invalid store configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save the config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Internal store error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for StoreError {
    fn from(err: ValidationError) -> Self {
        StoreError::Domain(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Internal(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for StoreError {
    fn from(err: toml::de::Error) -> Self {
        StoreError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for StoreError {
    fn from(err: toml::ser::Error) -> Self {
        StoreError::ConfigSaveFailed(err.to_string())
    }
}

impl From<url::ParseError> for StoreError {
    fn from(err: url::ParseError) -> Self {
        StoreError::InvalidConfig(err.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
