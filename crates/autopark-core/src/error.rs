//! # Error Types
//!
//! Domain-specific error types for autopark-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  autopark-core errors (this file)                                      │
//! │  ├── CoreError        - Domain rule violations                         │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  autopark-db errors (separate crate)                                   │
//! │  └── DbError          - Database operation failures                    │
//! │                                                                         │
//! │  autopark-sync errors (separate crate)                                 │
//! │  ├── RemoteError      - Unreachable vs. rejected remote calls          │
//! │  └── StoreError       - What callers of the store see                  │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → StoreError → Caller     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (plate, username, id)
//! 3. Errors are enum variants, never String
//! 4. Each error variant maps to a user-facing message

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core business logic errors.
///
/// These errors represent business rule violations. They are returned
/// synchronously to the caller for user-facing messaging and are never
/// absorbed by the offline-queue machinery.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A vehicle with this plate already has an open session.
    ///
    /// ## When This Occurs
    /// - Registering an entry while a `parked` session exists for the plate
    ///
    /// ## User Workflow
    /// ```text
    /// Scan plate "ABC-123"
    ///      │
    ///      ▼
    /// Lookup: parked session already exists
    ///      │
    ///      ▼
    /// DuplicateActiveSession { plate: "ABC-123" }
    ///      │
    ///      ▼
    /// UI shows: "ABC-123 is already parked"
    /// ```
    #[error("Vehicle {plate} already has an active parking session")]
    DuplicateActiveSession { plate: String },

    /// No active session found for the plate.
    ///
    /// ## When This Occurs
    /// - Processing an exit for a plate that is not currently parked
    /// - The session was already exited
    #[error("No active session for vehicle {plate}")]
    SessionNotFound { plate: String },

    /// Username is already taken.
    #[error("Username '{username}' already exists")]
    DuplicateUsername { username: String },

    /// Operator id does not resolve to a user.
    #[error("Operator not found: {id}")]
    OperatorNotFound { id: String },

    /// An exit update matched no `parked` row.
    ///
    /// ## When This Occurs
    /// - The guarded exit UPDATE affected zero rows, meaning the session
    ///   flipped state underneath us (partial write detected)
    #[error("Exit update for session {id} found no parked row")]
    PersistenceConflict { id: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These errors occur when caller input does not meet requirements.
/// Used for early validation before domain logic runs.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g., bad characters in a plate).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Monetary amounts in tariffs must not be negative.
    #[error("{field} must not be negative")]
    NegativeAmount { field: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
