//! # Parking Store
//!
//! The offline-first facade every collaborator talks to.
//!
//! ## Resilient Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │              One write path for every mutating call                     │
//! │                                                                         │
//! │  register_entry / set_setting / add_operator / ...                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ATTEMPT_REMOTE (bounded by tuning.remote_timeout)                     │
//! │       │                                                                 │
//! │       ├── success ────────► apply to local mirror ──► done             │
//! │       │                                                                 │
//! │       ├── Rejected ───────► surface to caller (definite failure)       │
//! │       │                                                                 │
//! │       └── Unavailable ────► mark disconnected                          │
//! │                              apply to local mirror                     │
//! │                              ENQUEUE_LOCAL (idempotency key = row id)  │
//! │                              caller gets a queued/pending result       │
//! │                                                                         │
//! │  The replay worker later drains the queue FIFO through the same        │
//! │  apply_remote() used here, so direct and replayed writes cannot        │
//! │  drift apart.                                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Availability Over Consistency
//! An operator must never be blocked from recording a physical event by a
//! network outage: entries register locally and queue. The one exception
//! is `process_exit`, whose fee depends on authoritative tariff state; it
//! returns a pending outcome offline rather than a fabricated amount.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use autopark_core::tariff::{compute_fee, duration_minutes};
use autopark_core::validation::{
    clamp_confidence, normalize_plate, validate_display_name, validate_tariff_schedule,
    validate_username,
};
use autopark_core::{
    AllSettings, AuthUser, CoreError, DailySummary, NewOperator, OperatorSummary, OperatorUpdate,
    QueuedOp, ReportFilter, ReportRow, Role, SessionStatus, TariffSchedule, User, VehicleSession,
    DEFAULT_OPERATOR_PASSWORD,
};
use autopark_db::{hash_password, Database, DbError};

use crate::config::StoreTuning;
use crate::connectivity::Connectivity;
use crate::error::{RemoteError, StoreError, StoreResult};
use crate::remote::{RemoteResult, RemoteStore};

// =============================================================================
// Backend Selection
// =============================================================================

/// Storage backend, chosen once at construction.
#[derive(Clone)]
pub enum Backend {
    /// SQLite only: writes apply directly, nothing queues.
    LocalOnly,

    /// Remote-backed: remote first, queue on unavailability.
    Remote(Arc<dyn RemoteStore>),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::LocalOnly => write!(f, "LocalOnly"),
            Backend::Remote(_) => write!(f, "Remote"),
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of registering an entry.
#[derive(Debug, Clone)]
pub struct EntryOutcome {
    /// The stored session. When `queued` is true the id is locally
    /// generated and may be re-keyed once the remote assigns its own.
    pub session: VehicleSession,

    /// Whether the write is awaiting replay.
    pub queued: bool,
}

/// Result of processing an exit.
#[derive(Debug, Clone)]
pub enum ExitOutcome {
    /// Fee computed and persisted; the session is terminal.
    Completed(VehicleSession),

    /// The remote store was unreachable. The intent is queued with the
    /// physical exit time; no fee has been computed. The UI must treat
    /// this distinctly from a completed exit.
    Pending {
        plate_number: String,
        queued_at: DateTime<Utc>,
    },
}

/// Summary of one queue drain pass.
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    /// Entries applied remotely and marked synced.
    pub applied: usize,
    /// Entries past the attempts cap, left in place.
    pub skipped: usize,
    /// Entries that failed this pass.
    pub failed: usize,
    /// Pending entries left after the pass.
    pub remaining: i64,
}

/// What a successfully applied remote operation changed.
enum RemoteApplied {
    /// Nothing further to reconcile locally.
    Done,
    /// Session landed remotely under this canonical id.
    SessionInserted { canonical_id: String },
    /// Exit completed remotely with these computed values.
    ExitCompleted {
        session_id: String,
        exit_time: DateTime<Utc>,
        duration_minutes: i64,
        amount_cents: i64,
    },
    /// The remote already shows the session exited; nothing to re-apply.
    ExitAlreadyApplied,
}

// =============================================================================
// Parking Store
// =============================================================================

/// The store facade: session lifecycle, settings, operators, offline
/// queue.
///
/// Constructed once at process start and passed by reference to all
/// consumers. No global state: tests build isolated instances around
/// in-memory databases and scripted remotes.
#[derive(Debug, Clone)]
pub struct ParkingStore {
    db: Database,
    backend: Backend,
    connectivity: Connectivity,
    tuning: StoreTuning,
}

impl ParkingStore {
    /// Builds a local-only store (no remote, no queue).
    pub async fn local_only(db: Database) -> StoreResult<Self> {
        Self::new(db, Backend::LocalOnly, StoreTuning::default()).await
    }

    /// Builds a remote-backed store.
    pub async fn with_remote(
        db: Database,
        remote: Arc<dyn RemoteStore>,
        tuning: StoreTuning,
    ) -> StoreResult<Self> {
        Self::new(db, Backend::Remote(remote), tuning).await
    }

    /// Builds a store over the given backend, seeding first-run data.
    pub async fn new(db: Database, backend: Backend, tuning: StoreTuning) -> StoreResult<Self> {
        db.seed_defaults().await?;

        Ok(ParkingStore {
            db,
            backend,
            connectivity: Connectivity::default(),
            tuning,
        })
    }

    /// The underlying database handle.
    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Shared connectivity handle.
    pub fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    /// Whether remote calls are currently being attempted.
    pub fn is_connected(&self) -> bool {
        match self.backend {
            Backend::LocalOnly => false,
            Backend::Remote(_) => self.connectivity.is_connected(),
        }
    }

    /// Runtime tuning values.
    pub fn tuning(&self) -> &StoreTuning {
        &self.tuning
    }

    // =========================================================================
    // Vehicle Session Lifecycle
    // =========================================================================

    /// Registers a vehicle entry.
    ///
    /// ## Errors
    /// - `Validation` for a malformed plate
    /// - `DuplicateActiveSession` when the plate is already parked
    /// - `Rejected` when the remote definitively refuses the insert
    ///
    /// Unreachable-remote is NOT an error: the entry lands in the mirror
    /// and the offline queue, and the outcome reports `queued = true`.
    pub async fn register_entry(
        &self,
        plate_number: &str,
        operator_id: Option<&str>,
        confidence: f64,
    ) -> StoreResult<EntryOutcome> {
        let plate = normalize_plate(plate_number)?;
        let confidence = clamp_confidence(confidence);

        // The mirror sees every write-through and queued entry, so it is
        // the authority for the one-parked-per-plate check.
        if self
            .db
            .sessions()
            .find_active_by_plate(&plate)
            .await?
            .is_some()
        {
            return Err(CoreError::DuplicateActiveSession { plate }.into());
        }

        let now = Utc::now();
        let mut session = VehicleSession {
            id: Uuid::new_v4().to_string(),
            plate_number: plate.clone(),
            entry_time: now,
            exit_time: None,
            duration_minutes: None,
            amount_cents: None,
            status: SessionStatus::Parked,
            confidence,
            operator_id: operator_id.map(str::to_string),
            created_at: now,
        };

        match &self.backend {
            Backend::LocalOnly => {
                self.insert_session_locally(&session).await?;
                info!(plate = %plate, id = %session.id, "Entry registered (local)");
                Ok(EntryOutcome {
                    session,
                    queued: false,
                })
            }

            Backend::Remote(remote) if self.connectivity.is_connected() => {
                match self.bounded(remote.insert_session(&session)).await {
                    Ok(canonical_id) => {
                        if canonical_id != session.id {
                            debug!(local = %session.id, remote = %canonical_id, "Remote assigned id");
                            session.id = canonical_id;
                        }
                        self.insert_session_locally(&session).await?;
                        info!(plate = %plate, id = %session.id, "Entry registered");
                        Ok(EntryOutcome {
                            session,
                            queued: false,
                        })
                    }
                    Err(RemoteError::Rejected(reason)) => Err(StoreError::Rejected(reason)),
                    Err(RemoteError::Unavailable(reason)) => {
                        self.go_offline(&reason);
                        self.register_entry_queued(session).await
                    }
                }
            }

            Backend::Remote(_) => self.register_entry_queued(session).await,
        }
    }

    /// Offline path: mirror write + queue append.
    async fn register_entry_queued(&self, session: VehicleSession) -> StoreResult<EntryOutcome> {
        self.insert_session_locally(&session).await?;
        self.db
            .queue()
            .enqueue(&QueuedOp::RegisterEntry {
                session: session.clone(),
            })
            .await?;

        info!(plate = %session.plate_number, id = %session.id, "Entry registered (queued)");
        Ok(EntryOutcome {
            session,
            queued: true,
        })
    }

    async fn insert_session_locally(&self, session: &VehicleSession) -> StoreResult<()> {
        self.db.sessions().insert(session).await.map_err(|e| {
            if e.is_unique_violation() {
                StoreError::Domain(CoreError::DuplicateActiveSession {
                    plate: session.plate_number.clone(),
                })
            } else if matches!(e, DbError::ForeignKeyViolation { .. }) {
                StoreError::Domain(CoreError::OperatorNotFound {
                    id: session.operator_id.clone().unwrap_or_default(),
                })
            } else {
                e.into()
            }
        })
    }

    /// Processes a vehicle exit.
    ///
    /// Connected: fee computed against the remote's tariff state and
    /// persisted atomically on both sides.
    ///
    /// Disconnected: the intent is queued with the physical exit time and
    /// [`ExitOutcome::Pending`] is returned. The session stays parked
    /// locally (it still occupies a spot) until replay completes it.
    pub async fn process_exit(&self, plate_number: &str) -> StoreResult<ExitOutcome> {
        let plate = normalize_plate(plate_number)?;

        let session = self
            .db
            .sessions()
            .find_active_by_plate(&plate)
            .await?
            .ok_or_else(|| {
                StoreError::from(CoreError::SessionNotFound {
                    plate: plate.clone(),
                })
            })?;

        let now = Utc::now();

        match &self.backend {
            Backend::LocalOnly => {
                let completed = self.complete_exit_locally(&session, now).await?;
                Ok(ExitOutcome::Completed(completed))
            }

            Backend::Remote(remote) if self.connectivity.is_connected() => {
                // The entry itself may still be waiting in the queue; its
                // exit must replay after it, not jump ahead of it.
                if self.session_awaits_sync(&session.id).await? {
                    return self.queue_exit_intent(&plate, now).await;
                }

                // Authoritative tariff state comes from the remote.
                let tariffs = match self.bounded(remote.fetch_settings()).await {
                    Ok(pairs) => {
                        let map: HashMap<String, String> = pairs.into_iter().collect();
                        TariffSchedule::from_settings(&map)
                    }
                    Err(RemoteError::Rejected(reason)) => {
                        return Err(StoreError::Rejected(reason));
                    }
                    Err(RemoteError::Unavailable(reason)) => {
                        self.go_offline(&reason);
                        return self.queue_exit_intent(&plate, now).await;
                    }
                };

                let minutes = duration_minutes(session.entry_time, now);
                let amount = compute_fee(session.entry_time, now, &tariffs);

                match self
                    .bounded(remote.complete_exit(&session.id, now, minutes, amount.cents()))
                    .await
                {
                    Ok(()) => {
                        self.db
                            .sessions()
                            .complete_exit(&session.id, now, minutes, amount.cents())
                            .await
                            .map_err(|e| match e {
                                DbError::NotFound { .. } => {
                                    StoreError::Domain(CoreError::PersistenceConflict {
                                        id: session.id.clone(),
                                    })
                                }
                                other => other.into(),
                            })?;

                        let completed = self
                            .db
                            .sessions()
                            .get_by_id(&session.id)
                            .await?
                            .ok_or_else(|| {
                                StoreError::from(CoreError::PersistenceConflict {
                                    id: session.id.clone(),
                                })
                            })?;

                        info!(plate = %plate, amount = %amount, "Exit processed");
                        Ok(ExitOutcome::Completed(completed))
                    }
                    Err(RemoteError::Rejected(_)) => {
                        Err(StoreError::Domain(CoreError::PersistenceConflict {
                            id: session.id.clone(),
                        }))
                    }
                    Err(RemoteError::Unavailable(reason)) => {
                        self.go_offline(&reason);
                        self.queue_exit_intent(&plate, now).await
                    }
                }
            }

            Backend::Remote(_) => self.queue_exit_intent(&plate, now).await,
        }
    }

    /// Completes an exit against local tariff state (local-only backend
    /// and replay reconciliation).
    async fn complete_exit_locally(
        &self,
        session: &VehicleSession,
        exit_time: DateTime<Utc>,
    ) -> StoreResult<VehicleSession> {
        let settings = self.db.settings().all().await?;
        let tariffs = TariffSchedule::from_settings(&settings);

        let minutes = duration_minutes(session.entry_time, exit_time);
        let amount = compute_fee(session.entry_time, exit_time, &tariffs);

        self.db
            .sessions()
            .complete_exit(&session.id, exit_time, minutes, amount.cents())
            .await
            .map_err(|e| match e {
                DbError::NotFound { .. } => StoreError::Domain(CoreError::PersistenceConflict {
                    id: session.id.clone(),
                }),
                other => other.into(),
            })?;

        let completed = self
            .db
            .sessions()
            .get_by_id(&session.id)
            .await?
            .ok_or_else(|| {
                StoreError::from(CoreError::PersistenceConflict {
                    id: session.id.clone(),
                })
            })?;

        info!(plate = %session.plate_number, amount = %amount, "Exit processed (local)");
        Ok(completed)
    }

    /// Queues an exit intent, deduplicating per plate.
    async fn queue_exit_intent(
        &self,
        plate: &str,
        requested_at: DateTime<Utc>,
    ) -> StoreResult<ExitOutcome> {
        // A second exit tap while one is pending reports the original
        // intent instead of queueing a duplicate.
        for entry in self.db.queue().pending(self.tuning.queue_batch_size).await? {
            if let QueuedOp::ProcessExit {
                plate_number,
                requested_at: original,
            } = &entry.op
            {
                if plate_number == plate {
                    return Ok(ExitOutcome::Pending {
                        plate_number: plate.to_string(),
                        queued_at: *original,
                    });
                }
            }
        }

        self.db
            .queue()
            .enqueue(&QueuedOp::ProcessExit {
                plate_number: plate.to_string(),
                requested_at,
            })
            .await?;

        info!(plate = %plate, "Exit queued for replay");
        Ok(ExitOutcome::Pending {
            plate_number: plate.to_string(),
            queued_at: requested_at,
        })
    }

    /// Whether a session's registration is still waiting in the queue.
    async fn session_awaits_sync(&self, session_id: &str) -> StoreResult<bool> {
        for entry in self.db.queue().pending(self.tuning.queue_batch_size).await? {
            if let QueuedOp::RegisterEntry { session } = &entry.op {
                if session.id == session_id {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    // =========================================================================
    // Vehicle Session Reads
    // =========================================================================

    /// The active session for a plate, if any. Absence is `None`, never
    /// an error.
    pub async fn get_active_vehicle(
        &self,
        plate_number: &str,
    ) -> StoreResult<Option<VehicleSession>> {
        let plate = normalize_plate(plate_number)?;
        self.refresh_active_mirror().await;
        Ok(self.db.sessions().find_active_by_plate(&plate).await?)
    }

    /// All currently parked vehicles, newest entry first.
    ///
    /// Served from the mirror; when connected the mirror is refreshed
    /// from the remote first, so locally queued entries and remote state
    /// are both visible.
    pub async fn get_active_vehicles(&self) -> StoreResult<Vec<VehicleSession>> {
        self.refresh_active_mirror().await;
        Ok(self.db.sessions().active_sessions().await?)
    }

    /// Facility totals for one calendar day.
    pub async fn daily_summary(&self, date: NaiveDate) -> StoreResult<DailySummary> {
        Ok(self.db.sessions().daily_summary(date).await?)
    }

    /// Session report with operator names resolved.
    pub async fn reports(&self, filter: &ReportFilter) -> StoreResult<Vec<ReportRow>> {
        Ok(self.db.sessions().reports(filter).await?)
    }

    // =========================================================================
    // Settings
    // =========================================================================

    /// A single raw setting value. Typed defaults are applied by the
    /// grouped accessor, not here.
    pub async fn get_setting(&self, key: &str) -> StoreResult<Option<String>> {
        self.refresh_settings_mirror().await;
        Ok(self.db.settings().get(key).await?)
    }

    /// Multiple raw settings in one call.
    pub async fn get_settings(&self, keys: &[String]) -> StoreResult<HashMap<String, String>> {
        self.refresh_settings_mirror().await;
        Ok(self.db.settings().get_many(keys).await?)
    }

    /// Every setting, parsed into the typed groups with defaults applied
    /// for absent keys.
    pub async fn get_all_settings(&self) -> StoreResult<AllSettings> {
        self.refresh_settings_mirror().await;
        let flat = self.db.settings().all().await?;
        Ok(AllSettings::from_settings(&flat))
    }

    /// Writes a single setting through the resilient path.
    pub async fn set_setting(&self, key: &str, value: &str) -> StoreResult<bool> {
        self.resilient_write(QueuedOp::SetSetting {
            key: key.to_string(),
            value: value.to_string(),
        })
        .await
    }

    /// Writes a settings batch through the resilient path.
    ///
    /// ## Returns
    /// `true` when the write was queued for replay rather than applied
    /// remotely.
    pub async fn save_settings(&self, entries: BTreeMap<String, String>) -> StoreResult<bool> {
        self.resilient_write(QueuedOp::SaveSettings { entries }).await
    }

    /// Typed tariff update: validates, then writes the tariff keys.
    pub async fn save_tariffs(&self, schedule: &TariffSchedule) -> StoreResult<bool> {
        validate_tariff_schedule(schedule)?;

        let entries: BTreeMap<String, String> = schedule
            .to_entries()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        self.save_settings(entries).await
    }

    // =========================================================================
    // Operators
    // =========================================================================

    /// Lists operators with aggregates recomputed from session history.
    pub async fn get_operators(&self) -> StoreResult<Vec<OperatorSummary>> {
        self.refresh_users_mirror().await;
        Ok(self.db.users().operators().await?)
    }

    /// Creates an operator account.
    ///
    /// The password is argon2-hashed before it leaves this method; blank
    /// passwords fall back to the documented default.
    pub async fn add_operator(&self, operator: NewOperator) -> StoreResult<User> {
        let username = validate_username(&operator.username)?;
        let name = validate_display_name(&operator.name)?;

        if self.db.users().get_by_username(&username).await?.is_some() {
            return Err(CoreError::DuplicateUsername { username }.into());
        }

        let password = operator
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_OPERATOR_PASSWORD);

        let user = User {
            id: Uuid::new_v4().to_string(),
            username,
            password_hash: hash_password(password)?,
            name,
            role: Role::Operator,
            is_active: true,
            email: operator.email.filter(|e| !e.is_empty()),
            phone: operator.phone.filter(|p| !p.is_empty()),
            created_at: Utc::now(),
        };

        self.resilient_write(QueuedOp::AddOperator { user: user.clone() })
            .await?;
        Ok(user)
    }

    /// Updates an operator's profile fields.
    pub async fn update_operator(&self, update: OperatorUpdate) -> StoreResult<bool> {
        let update = OperatorUpdate {
            username: validate_username(&update.username)?,
            name: validate_display_name(&update.name)?,
            ..update
        };
        self.resilient_write(QueuedOp::UpdateOperator { update }).await
    }

    /// Soft activation toggle; never deletes.
    pub async fn set_operator_status(&self, id: &str, is_active: bool) -> StoreResult<bool> {
        self.resilient_write(QueuedOp::SetOperatorStatus {
            id: id.to_string(),
            is_active,
        })
        .await
    }

    /// Verifies credentials against the local mirror.
    ///
    /// The auth collaborator delegates here; a `None` covers unknown
    /// users, wrong passwords, and deactivated accounts alike.
    pub async fn login(&self, username: &str, password: &str) -> StoreResult<Option<AuthUser>> {
        Ok(self.db.users().authenticate(username, password).await?)
    }

    // =========================================================================
    // Queue & Connectivity
    // =========================================================================

    /// Pending queue length.
    pub async fn queue_pending_count(&self) -> StoreResult<i64> {
        Ok(self.db.queue().count_pending().await?)
    }

    /// Probes the remote store and records the result.
    ///
    /// ## Returns
    /// Whether the remote is reachable. Local-only stores always report
    /// false.
    pub async fn probe_remote(&self) -> bool {
        let Backend::Remote(remote) = &self.backend else {
            return false;
        };

        match self.bounded(remote.ping()).await {
            Ok(()) => {
                self.connectivity.set_connected(true);
                true
            }
            Err(RemoteError::Rejected(reason)) => {
                // The remote answered; the probe itself was refused.
                // Connectivity-wise that still counts as reachable.
                warn!(reason = %reason, "Remote probe rejected");
                self.connectivity.set_connected(true);
                true
            }
            Err(RemoteError::Unavailable(reason)) => {
                debug!(reason = %reason, "Remote probe failed");
                self.connectivity.set_connected(false);
                false
            }
        }
    }

    /// Drains the offline queue, oldest first, one entry at a time.
    ///
    /// Stops at the first failure to preserve the causal order of a
    /// single operator's actions (an entry must land before its exit).
    /// Entries past the attempts cap are skipped with a warning so one
    /// poisoned entry cannot wedge the queue forever.
    pub async fn drain_queue_once(&self) -> StoreResult<DrainReport> {
        let Backend::Remote(remote) = &self.backend else {
            return Ok(DrainReport::default());
        };

        let pending = self.db.queue().pending(self.tuning.queue_batch_size).await?;
        let mut report = DrainReport::default();

        if pending.is_empty() {
            return Ok(report);
        }

        info!(count = pending.len(), "Draining offline queue");

        for entry in pending {
            if entry.attempts >= self.tuning.max_replay_attempts {
                warn!(
                    id = %entry.id,
                    kind = %entry.op.kind(),
                    attempts = entry.attempts,
                    "Skipping queue entry past the attempts cap"
                );
                report.skipped += 1;
                continue;
            }

            match self.bounded(self.apply_remote(remote.as_ref(), &entry.op)).await {
                Ok(applied) => {
                    self.reconcile_after_replay(&entry.op, applied).await;
                    self.db.queue().mark_synced(&entry.id).await?;
                    report.applied += 1;
                    debug!(id = %entry.id, kind = %entry.op.kind(), "Queue entry replayed");
                }
                Err(RemoteError::Unavailable(reason)) => {
                    self.go_offline(&reason);
                    self.db.queue().mark_failed(&entry.id, &reason).await?;
                    report.failed += 1;
                    break;
                }
                Err(RemoteError::Rejected(reason)) => {
                    warn!(
                        id = %entry.id,
                        kind = %entry.op.kind(),
                        reason = %reason,
                        "Queue entry rejected by remote"
                    );
                    self.db.queue().mark_failed(&entry.id, &reason).await?;
                    report.failed += 1;
                    // Later entries may depend on this one; stop and let
                    // the attempts cap eventually clear it.
                    break;
                }
            }
        }

        if report.applied > 0 {
            // Reads prefer the freshest state after a successful replay.
            self.refresh_active_mirror().await;
            self.refresh_settings_mirror().await;
        }

        report.remaining = self.db.queue().count_pending().await?;
        Ok(report)
    }

    // =========================================================================
    // Remote Application (shared by direct writes and replay)
    // =========================================================================

    /// Applies one queued operation against the remote store.
    ///
    /// This is the single place that knows how each operation maps onto
    /// the backend, used by both the direct path and queue replay.
    async fn apply_remote(
        &self,
        remote: &dyn RemoteStore,
        op: &QueuedOp,
    ) -> RemoteResult<RemoteApplied> {
        match op {
            QueuedOp::RegisterEntry { session } => {
                let canonical_id = remote.insert_session(session).await?;
                Ok(RemoteApplied::SessionInserted { canonical_id })
            }

            QueuedOp::ProcessExit {
                plate_number,
                requested_at,
            } => {
                let Some(session) = remote.fetch_active_by_plate(plate_number).await? else {
                    // Already exited (or the earlier attempt landed after
                    // appearing to fail): nothing to re-apply.
                    return Ok(RemoteApplied::ExitAlreadyApplied);
                };

                let pairs = remote.fetch_settings().await?;
                let map: HashMap<String, String> = pairs.into_iter().collect();
                let tariffs = TariffSchedule::from_settings(&map);

                let minutes = duration_minutes(session.entry_time, *requested_at);
                let amount = compute_fee(session.entry_time, *requested_at, &tariffs);

                remote
                    .complete_exit(&session.id, *requested_at, minutes, amount.cents())
                    .await?;

                Ok(RemoteApplied::ExitCompleted {
                    session_id: session.id,
                    exit_time: *requested_at,
                    duration_minutes: minutes,
                    amount_cents: amount.cents(),
                })
            }

            QueuedOp::SetSetting { key, value } => {
                remote.upsert_setting(key, value).await?;
                Ok(RemoteApplied::Done)
            }

            QueuedOp::SaveSettings { entries } => {
                for (key, value) in entries {
                    remote.upsert_setting(key, value).await?;
                }
                Ok(RemoteApplied::Done)
            }

            QueuedOp::AddOperator { user } => {
                remote.insert_user(user).await?;
                Ok(RemoteApplied::Done)
            }

            QueuedOp::UpdateOperator { update } => {
                remote.update_operator(update).await?;
                Ok(RemoteApplied::Done)
            }

            QueuedOp::SetOperatorStatus { id, is_active } => {
                remote.set_operator_status(id, *is_active).await?;
                Ok(RemoteApplied::Done)
            }
        }
    }

    /// Folds a replayed operation's remote outcome back into the mirror.
    async fn reconcile_after_replay(&self, op: &QueuedOp, applied: RemoteApplied) {
        match applied {
            RemoteApplied::Done | RemoteApplied::ExitAlreadyApplied => {}

            RemoteApplied::SessionInserted { canonical_id } => {
                if let QueuedOp::RegisterEntry { session } = op {
                    if canonical_id != session.id {
                        // Remote wins on identity; point the mirror row at
                        // the canonical id.
                        if let Err(e) = self.db.sessions().rekey(&session.id, &canonical_id).await {
                            debug!(id = %session.id, error = %e, "Mirror re-key skipped");
                        }
                    }
                }
            }

            RemoteApplied::ExitCompleted {
                session_id,
                exit_time,
                duration_minutes,
                amount_cents,
            } => {
                if let Err(e) = self
                    .db
                    .sessions()
                    .complete_exit(&session_id, exit_time, duration_minutes, amount_cents)
                    .await
                {
                    // Already exited in the mirror is fine; refresh covers
                    // anything else.
                    debug!(id = %session_id, error = %e, "Mirror exit reconcile skipped");
                }
            }
        }
    }

    // =========================================================================
    // Resilient Write (settings and operators)
    // =========================================================================

    /// The shared write path for operations whose local application is a
    /// straight repository call.
    ///
    /// ## Returns
    /// `true` when the operation was queued for replay.
    async fn resilient_write(&self, op: QueuedOp) -> StoreResult<bool> {
        match &self.backend {
            Backend::LocalOnly => {
                self.apply_local(&op).await?;
                Ok(false)
            }

            Backend::Remote(remote) if self.connectivity.is_connected() => {
                match self.bounded(self.apply_remote(remote.as_ref(), &op)).await {
                    Ok(_) => {
                        // Write-through: the mirror must never show a value
                        // the remote did not accept.
                        self.apply_local(&op).await?;
                        Ok(false)
                    }
                    Err(RemoteError::Rejected(reason)) => {
                        Err(self.map_rejection(&op, reason))
                    }
                    Err(RemoteError::Unavailable(reason)) => {
                        self.go_offline(&reason);
                        self.apply_local(&op).await?;
                        self.db.queue().enqueue(&op).await?;
                        Ok(true)
                    }
                }
            }

            Backend::Remote(_) => {
                self.apply_local(&op).await?;
                self.db.queue().enqueue(&op).await?;
                Ok(true)
            }
        }
    }

    /// Applies an operation to the local mirror.
    async fn apply_local(&self, op: &QueuedOp) -> StoreResult<()> {
        match op {
            QueuedOp::SetSetting { key, value } => {
                self.db.settings().set(key, value).await?;
            }

            QueuedOp::SaveSettings { entries } => {
                self.db.settings().save_many(entries).await?;
            }

            QueuedOp::AddOperator { user } => {
                self.db.users().insert(user).await.map_err(|e| {
                    if e.is_unique_violation() {
                        StoreError::Domain(CoreError::DuplicateUsername {
                            username: user.username.clone(),
                        })
                    } else {
                        e.into()
                    }
                })?;
            }

            QueuedOp::UpdateOperator { update } => {
                self.db.users().update_operator(update).await.map_err(|e| {
                    match e {
                        DbError::UniqueViolation { .. } => {
                            StoreError::Domain(CoreError::DuplicateUsername {
                                username: update.username.clone(),
                            })
                        }
                        DbError::NotFound { .. } => {
                            StoreError::Domain(CoreError::OperatorNotFound {
                                id: update.id.clone(),
                            })
                        }
                        other => other.into(),
                    }
                })?;
            }

            QueuedOp::SetOperatorStatus { id, is_active } => {
                self.db
                    .users()
                    .set_status(id, *is_active)
                    .await
                    .map_err(|e| match e {
                        DbError::NotFound { .. } => {
                            StoreError::Domain(CoreError::OperatorNotFound { id: id.clone() })
                        }
                        other => other.into(),
                    })?;
            }

            QueuedOp::RegisterEntry { session } => {
                self.insert_session_locally(session).await?;
            }

            QueuedOp::ProcessExit { .. } => {
                // Exit intents carry no fee; they resolve through replay,
                // never through a plain local apply.
                return Err(StoreError::Internal(
                    "exit intents cannot be applied locally".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Gives remote rejections a domain-shaped error where one exists.
    fn map_rejection(&self, op: &QueuedOp, reason: String) -> StoreError {
        match op {
            QueuedOp::AddOperator { user } => CoreError::DuplicateUsername {
                username: user.username.clone(),
            }
            .into(),
            QueuedOp::UpdateOperator { update } if reason.contains("username") => {
                CoreError::DuplicateUsername {
                    username: update.username.clone(),
                }
                .into()
            }
            _ => StoreError::Rejected(reason),
        }
    }

    // =========================================================================
    // Mirror Refresh (best effort)
    // =========================================================================

    /// Pulls parked sessions from the remote into the mirror.
    ///
    /// Best effort: unavailability flips connectivity and falls back to
    /// the mirror; it never fails the read.
    async fn refresh_active_mirror(&self) {
        let Backend::Remote(remote) = &self.backend else {
            return;
        };
        if !self.connectivity.is_connected() {
            return;
        }

        match self.bounded(remote.fetch_active_sessions()).await {
            Ok(sessions) => {
                for session in &sessions {
                    if let Err(e) = self.db.sessions().upsert(session).await {
                        warn!(id = %session.id, error = %e, "Mirror session upsert failed");
                    }
                }
            }
            Err(RemoteError::Unavailable(reason)) => self.go_offline(&reason),
            Err(RemoteError::Rejected(reason)) => {
                warn!(reason = %reason, "Active-session refresh rejected");
            }
        }
    }

    /// Pulls settings from the remote into the mirror.
    async fn refresh_settings_mirror(&self) {
        let Backend::Remote(remote) = &self.backend else {
            return;
        };
        if !self.connectivity.is_connected() {
            return;
        }

        match self.bounded(remote.fetch_settings()).await {
            Ok(pairs) => {
                let entries: BTreeMap<String, String> = pairs.into_iter().collect();
                if entries.is_empty() {
                    return;
                }
                if let Err(e) = self.db.settings().save_many(&entries).await {
                    warn!(error = %e, "Mirror settings refresh failed");
                }
            }
            Err(RemoteError::Unavailable(reason)) => self.go_offline(&reason),
            Err(RemoteError::Rejected(reason)) => {
                warn!(reason = %reason, "Settings refresh rejected");
            }
        }
    }

    /// Pulls user rows from the remote into the mirror.
    async fn refresh_users_mirror(&self) {
        let Backend::Remote(remote) = &self.backend else {
            return;
        };
        if !self.connectivity.is_connected() {
            return;
        }

        match self.bounded(remote.fetch_users()).await {
            Ok(users) => {
                for user in &users {
                    if let Err(e) = self.db.users().upsert(user).await {
                        warn!(id = %user.id, error = %e, "Mirror user upsert failed");
                    }
                }
            }
            Err(RemoteError::Unavailable(reason)) => self.go_offline(&reason),
            Err(RemoteError::Rejected(reason)) => {
                warn!(reason = %reason, "User refresh rejected");
            }
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Bounds a remote call by the configured timeout; expiry counts as
    /// unavailability.
    async fn bounded<T, F>(&self, call: F) -> RemoteResult<T>
    where
        F: Future<Output = RemoteResult<T>>,
    {
        match tokio::time::timeout(self.tuning.remote_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Unavailable(format!(
                "remote call timed out after {:?}",
                self.tuning.remote_timeout
            ))),
        }
    }

    fn go_offline(&self, reason: &str) {
        debug!(reason = %reason, "Remote unavailable");
        self.connectivity.set_connected(false);
    }
}

// =============================================================================
// Unit Tests (local-only backend; the remote protocol is covered by the
// integration suite)
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use autopark_db::DbConfig;

    async fn local_store() -> ParkingStore {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        ParkingStore::local_only(db).await.unwrap()
    }

    #[tokio::test]
    async fn test_register_then_lookup() {
        let store = local_store().await;

        let outcome = store.register_entry(" abc-123 ", None, 0.87).await.unwrap();
        assert!(!outcome.queued);
        assert_eq!(outcome.session.plate_number, "ABC-123");
        assert_eq!(outcome.session.status, SessionStatus::Parked);

        let active = store.get_active_vehicle("abc-123").await.unwrap().unwrap();
        assert_eq!(active.id, outcome.session.id);
        assert!((Utc::now() - active.entry_time).num_seconds() < 5);
    }

    #[tokio::test]
    async fn test_duplicate_entry_is_domain_conflict() {
        let store = local_store().await;

        store.register_entry("ABC-123", None, 0.9).await.unwrap();
        let err = store.register_entry("abc-123", None, 0.9).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(CoreError::DuplicateActiveSession { ref plate }) if plate == "ABC-123"
        ));

        // Still exactly one active session
        assert_eq!(store.get_active_vehicles().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_exit_without_session_fails_and_mutates_nothing() {
        let store = local_store().await;

        let err = store.process_exit("GHOST-1").await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(CoreError::SessionNotFound { .. })
        ));
        assert_eq!(store.queue_pending_count().await.unwrap(), 0);
        assert!(store.get_active_vehicles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_exit_computes_fee_from_settings() {
        let store = local_store().await;

        store.register_entry("ABC-123", None, 0.9).await.unwrap();
        let outcome = store.process_exit("ABC-123").await.unwrap();

        let ExitOutcome::Completed(session) = outcome else {
            panic!("local-only exit must complete");
        };
        assert_eq!(session.status, SessionStatus::Exited);
        // Sub-minute stay: ceil to 1 minute, flat first hour
        assert_eq!(session.duration_minutes, Some(1));
        assert_eq!(session.amount_cents, Some(500));
        assert!(session.exit_time.is_some());
    }

    #[tokio::test]
    async fn test_exit_uses_updated_tariff() {
        let store = local_store().await;

        store.set_setting("tariff_first_hour", "6.00").await.unwrap();
        store.register_entry("ABC-123", None, 0.9).await.unwrap();

        let ExitOutcome::Completed(session) = store.process_exit("ABC-123").await.unwrap() else {
            panic!("local-only exit must complete");
        };
        assert_eq!(session.amount_cents, Some(600));
    }

    #[tokio::test]
    async fn test_settings_round_trip_through_store() {
        let store = local_store().await;

        let queued = store.set_setting("tariff_first_hour", "6.00").await.unwrap();
        assert!(!queued); // local-only never queues

        let all = store.get_all_settings().await.unwrap();
        assert_eq!(all.tariffs.first_hour.to_decimal_string(), "6.00");
    }

    #[tokio::test]
    async fn test_save_tariffs_rejects_negative() {
        let store = local_store().await;

        let bad = TariffSchedule {
            first_hour: autopark_core::Money::from_cents(-100),
            ..TariffSchedule::default()
        };
        assert!(matches!(
            store.save_tariffs(&bad).await.unwrap_err(),
            StoreError::Domain(CoreError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_operator_crud_and_login() {
        let store = local_store().await;

        let user = store
            .add_operator(NewOperator {
                username: "maria".to_string(),
                password: Some("claveM1".to_string()),
                name: "María Quispe".to_string(),
                email: None,
                phone: None,
            })
            .await
            .unwrap();

        // Duplicate username is a synchronous domain error
        let err = store
            .add_operator(NewOperator {
                username: "maria".to_string(),
                password: None,
                name: "Other".to_string(),
                email: None,
                phone: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Domain(CoreError::DuplicateUsername { .. })
        ));

        let auth = store.login("maria", "claveM1").await.unwrap().unwrap();
        assert_eq!(auth.id, user.id);
        assert_eq!(auth.role, Role::Operator);

        store.set_operator_status(&user.id, false).await.unwrap();
        assert!(store.login("maria", "claveM1").await.unwrap().is_none());

        // Still listed for reports and reactivation
        let operators = store.get_operators().await.unwrap();
        assert!(operators.iter().any(|o| o.id == user.id && !o.is_active));
    }

    #[tokio::test]
    async fn test_blank_password_gets_default() {
        let store = local_store().await;

        store
            .add_operator(NewOperator {
                username: "pedro".to_string(),
                password: Some(String::new()),
                name: "Pedro Mamani".to_string(),
                email: None,
                phone: None,
            })
            .await
            .unwrap();

        assert!(store
            .login("pedro", DEFAULT_OPERATOR_PASSWORD)
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_local_only_never_queues() {
        let store = local_store().await;

        store.register_entry("ABC-123", None, 0.9).await.unwrap();
        store.set_setting("system_language", "en").await.unwrap();
        store.process_exit("ABC-123").await.unwrap();

        assert_eq!(store.queue_pending_count().await.unwrap(), 0);
        assert!(!store.is_connected());
    }
}
