//! # Remote Store Backend
//!
//! The pluggable interface to the remote relational store.
//!
//! ## Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     RemoteStore Contract                                │
//! │                                                                         │
//! │  • Every method classifies failure as Unavailable (never observed,     │
//! │    safe to replay) or Rejected (observed and refused, surface it).     │
//! │                                                                         │
//! │  • insert_session deduplicates on the client-generated session id:     │
//! │    replaying an insert that already landed MUST NOT create a second    │
//! │    row. The returned id is canonical; callers re-key their mirror      │
//! │    when it differs.                                                    │
//! │                                                                         │
//! │  • complete_exit only flips rows still in 'parked'; a session that     │
//! │    already exited is left untouched.                                   │
//! │                                                                         │
//! │  Implementations: RestRemote (production), scripted fakes (tests).     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use autopark_core::{OperatorUpdate, User, VehicleSession};

use crate::error::RemoteError;

/// Result alias for remote calls.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// The remote relational store, abstracted per backend.
///
/// Selected at store construction time: REST-backed for production,
/// in-process fakes for tests. Object-safe so the store can hold
/// `Arc<dyn RemoteStore>`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Cheap reachability probe used by the replay worker.
    async fn ping(&self) -> RemoteResult<()>;

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Inserts a session, deduplicating on its id.
    ///
    /// ## Returns
    /// The canonical remote id. Usually the client id; a remote that
    /// assigns its own keys returns the replacement and the caller
    /// re-keys its mirror.
    async fn insert_session(&self, session: &VehicleSession) -> RemoteResult<String>;

    /// Completes an exit in one atomic update, guarded on parked status.
    async fn complete_exit(
        &self,
        id: &str,
        exit_time: DateTime<Utc>,
        duration_minutes: i64,
        amount_cents: i64,
    ) -> RemoteResult<()>;

    /// The active session for a plate, if any.
    async fn fetch_active_by_plate(&self, plate: &str) -> RemoteResult<Option<VehicleSession>>;

    /// All currently parked sessions.
    async fn fetch_active_sessions(&self) -> RemoteResult<Vec<VehicleSession>>;

    // =========================================================================
    // Settings
    // =========================================================================

    /// Upserts one setting.
    async fn upsert_setting(&self, key: &str, value: &str) -> RemoteResult<()>;

    /// Every stored setting as flat pairs.
    async fn fetch_settings(&self) -> RemoteResult<Vec<(String, String)>>;

    // =========================================================================
    // Users
    // =========================================================================

    /// Inserts a user, deduplicating on id. A duplicate *username* on a
    /// different id is a rejection.
    async fn insert_user(&self, user: &User) -> RemoteResult<()>;

    /// Updates an operator's profile fields.
    async fn update_operator(&self, update: &OperatorUpdate) -> RemoteResult<()>;

    /// Soft activation toggle.
    async fn set_operator_status(&self, id: &str, is_active: bool) -> RemoteResult<()>;

    /// Every user row (for mirror refresh).
    async fn fetch_users(&self) -> RemoteResult<Vec<User>>;
}
