//! # Domain Types
//!
//! Core domain types used throughout AutoPark.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ VehicleSession  │   │      User       │   │ QueuedOperation │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID, also │       │
//! │  │  plate_number   │   │  username (uniq)│   │   idempotency   │       │
//! │  │  entry/exit     │   │  password_hash  │   │   key)          │       │
//! │  │  amount_cents   │   │  role           │   │  op (payload)   │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐                             │
//! │  │ SessionStatus   │   │      Role       │                             │
//! │  │  Parked         │   │  Admin          │                             │
//! │  │  Exited (term.) │   │  Operator       │                             │
//! │  └─────────────────┘   └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! Every entity id is a client-generated UUID v4: globally unique without
//! coordination, which is what makes offline creation safe. The session id
//! doubles as the idempotency key when a queued entry replays.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Session Status
// =============================================================================

/// The lifecycle state of a parking session.
///
/// `Exited` is terminal: once a session has an exit time, a duration, and
/// an amount, no further transitions happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Vehicle is inside the facility.
    Parked,
    /// Vehicle left; fee computed and frozen.
    Exited,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Parked
    }
}

// =============================================================================
// Vehicle Session
// =============================================================================

/// One continuous parked interval for a single plate, from entry to exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct VehicleSession {
    /// Unique identifier (UUID v4, client-generated).
    pub id: String,

    /// Normalized uppercase plate; business key for active lookups.
    pub plate_number: String,

    /// When the vehicle entered.
    pub entry_time: DateTime<Utc>,

    /// When the vehicle left; `None` while parked.
    pub exit_time: Option<DateTime<Utc>>,

    /// Billable minutes, derived once at exit. May be 0 for near-instant
    /// exits.
    pub duration_minutes: Option<i64>,

    /// Fee in cents, computed once at exit, immutable thereafter.
    pub amount_cents: Option<i64>,

    /// Lifecycle state.
    pub status: SessionStatus,

    /// OCR confidence [0,1]. Advisory only; never blocks registration.
    pub confidence: f64,

    /// Operator who registered the entry. `None` only on degraded paths.
    pub operator_id: Option<String>,

    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

impl VehicleSession {
    /// Returns the fee as a Money value, if the session has exited.
    #[inline]
    pub fn amount(&self) -> Option<Money> {
        self.amount_cents.map(Money::from_cents)
    }

    /// Whether this session still occupies a spot.
    #[inline]
    pub fn is_parked(&self) -> bool {
        self.status == SessionStatus::Parked
    }
}

// =============================================================================
// Users & Operators
// =============================================================================

/// Access role for a staff account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Manages operators, tariffs, and reports.
    Admin,
    /// Registers entries and exits.
    Operator,
}

/// A staff account as stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: String,
    pub username: String,
    /// Argon2 hash; never the plaintext password.
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub is_active: bool,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// The slice of a user exposed after a successful login.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub username: String,
    pub name: String,
    pub role: Role,
}

/// An operator row with usage aggregates recomputed from session history.
///
/// Aggregates are derived, never stored: re-joining exited sessions avoids
/// counter drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OperatorSummary {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub is_active: bool,
    pub total_vehicles_processed: i64,
    pub total_earnings_cents: i64,
}

impl OperatorSummary {
    /// Total earnings as Money.
    #[inline]
    pub fn total_earnings(&self) -> Money {
        Money::from_cents(self.total_earnings_cents)
    }
}

/// Input for creating an operator account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOperator {
    pub username: String,
    /// Plaintext password; hashed before storage. A default is assigned
    /// when empty.
    pub password: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Editable fields of an existing operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorUpdate {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

// =============================================================================
// OCR Collaborator DTO
// =============================================================================

/// Result of the plate-detection collaborator.
///
/// The OCR engine is a black box; only its output shape matters here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlateDetection {
    pub plate_number: String,
    pub confidence: f64,
    pub success: bool,
}

// =============================================================================
// Reporting
// =============================================================================

/// Per-day facility totals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct DailySummary {
    pub total_vehicles: i64,
    pub vehicles_parked: i64,
    pub total_earnings_cents: i64,
    pub average_stay_minutes: f64,
}

/// Filter for the session report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportFilter {
    /// Restrict to a single operator; `None` means all.
    pub operator_id: Option<String>,
    /// Inclusive lower bound on the entry date.
    pub start_date: Option<NaiveDate>,
    /// Inclusive upper bound on the entry date.
    pub end_date: Option<NaiveDate>,
}

/// One row of the session report, with the operator name resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ReportRow {
    pub id: String,
    pub plate_number: String,
    /// Display name; inactive operators still resolve. Sessions without an
    /// operator render as "Sistema".
    pub operator_name: String,
    pub entry_time: DateTime<Utc>,
    pub exit_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub amount_cents: i64,
    pub status: SessionStatus,
}

// =============================================================================
// Queued Operations
// =============================================================================

/// A mutating operation captured for later replay against the remote store.
///
/// Serialized as the JSON payload of an `offline_queue` row. The envelope
/// id (a UUID) is the idempotency key the remote deduplicates on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum QueuedOp {
    /// Entry registered while offline; carries the full local row.
    RegisterEntry { session: VehicleSession },

    /// Exit intent captured while offline. The fee is NOT computed here:
    /// it depends on authoritative tariff state and is resolved at replay,
    /// using the physical exit time recorded below.
    ProcessExit {
        plate_number: String,
        requested_at: DateTime<Utc>,
    },

    /// Single setting write.
    SetSetting { key: String, value: String },

    /// Batched settings write.
    SaveSettings {
        entries: std::collections::BTreeMap<String, String>,
    },

    /// Operator created offline (password already hashed).
    AddOperator { user: User },

    /// Operator profile edit.
    UpdateOperator { update: OperatorUpdate },

    /// Operator soft activation toggle.
    SetOperatorStatus { id: String, is_active: bool },
}

impl QueuedOp {
    /// Short machine name used in the queue table and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            QueuedOp::RegisterEntry { .. } => "register_entry",
            QueuedOp::ProcessExit { .. } => "process_exit",
            QueuedOp::SetSetting { .. } => "set_setting",
            QueuedOp::SaveSettings { .. } => "save_settings",
            QueuedOp::AddOperator { .. } => "add_operator",
            QueuedOp::UpdateOperator { .. } => "update_operator",
            QueuedOp::SetOperatorStatus { .. } => "set_operator_status",
        }
    }
}

/// A queued operation as persisted, with replay bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Envelope id; doubles as the idempotency key.
    pub id: String,

    /// The captured operation.
    pub op: QueuedOp,

    /// Replay attempts so far.
    pub attempts: i64,

    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,

    /// Append time; replay order is FIFO on this column.
    pub created_at: DateTime<Utc>,

    /// Most recent attempt time.
    pub attempted_at: Option<DateTime<Utc>>,

    /// Set once the remote accepted the operation; synced entries are
    /// kept only until cleanup.
    pub synced_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_session() -> VehicleSession {
        VehicleSession {
            id: "c5a8e1a2-0000-4000-8000-000000000001".to_string(),
            plate_number: "ABC-123".to_string(),
            entry_time: Utc.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap(),
            exit_time: None,
            duration_minutes: None,
            amount_cents: None,
            status: SessionStatus::Parked,
            confidence: 0.92,
            operator_id: Some("op-1".to_string()),
            created_at: Utc.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&SessionStatus::Parked).unwrap(),
            "\"parked\""
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Exited).unwrap(),
            "\"exited\""
        );
        assert_eq!(serde_json::to_string(&Role::Operator).unwrap(), "\"operator\"");
    }

    #[test]
    fn test_session_amount_helper() {
        let mut session = sample_session();
        assert!(session.is_parked());
        assert_eq!(session.amount(), None);

        session.amount_cents = Some(800);
        session.status = SessionStatus::Exited;
        assert!(!session.is_parked());
        assert_eq!(session.amount(), Some(Money::from_cents(800)));
    }

    #[test]
    fn test_queued_op_round_trips_through_json() {
        let op = QueuedOp::RegisterEntry {
            session: sample_session(),
        };
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"op\":\"register_entry\""));

        let back: QueuedOp = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn test_queued_op_kinds() {
        let op = QueuedOp::SetSetting {
            key: "tariff_first_hour".to_string(),
            value: "6.00".to_string(),
        };
        assert_eq!(op.kind(), "set_setting");

        let op = QueuedOp::ProcessExit {
            plate_number: "ABC-123".to_string(),
            requested_at: Utc.with_ymd_and_hms(2026, 3, 11, 12, 0, 0).unwrap(),
        };
        assert_eq!(op.kind(), "process_exit");
    }
}
