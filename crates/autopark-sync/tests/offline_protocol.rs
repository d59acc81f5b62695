//! Integration tests for the offline cache & sync queue protocol,
//! exercised against a scriptable in-process remote.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autopark_core::{CoreError, NewOperator, OperatorUpdate, SessionStatus, User, VehicleSession};
use autopark_db::{Database, DbConfig};
use autopark_sync::{
    ExitOutcome, ParkingStore, RemoteError, RemoteResult, RemoteStore, StoreError, StoreTuning,
};

// ── Scriptable remote ───────────────────────────────────────────────

/// In-process remote store with togglable availability and failure modes.
#[derive(Default)]
struct MockRemote {
    online: AtomicBool,
    assign_server_ids: AtomicBool,
    reject_inserts: AtomicBool,
    reject_settings: AtomicBool,
    response_delay_ms: AtomicUsize,
    server_id_counter: AtomicUsize,
    insert_attempts: AtomicUsize,
    sessions: Mutex<HashMap<String, VehicleSession>>,
    settings: Mutex<HashMap<String, String>>,
    users: Mutex<HashMap<String, User>>,
}

impl MockRemote {
    fn new() -> Arc<Self> {
        let remote = MockRemote::default();
        remote.online.store(true, Ordering::SeqCst);
        Arc::new(remote)
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    async fn gate(&self) -> RemoteResult<()> {
        let delay = self.response_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unavailable("connection refused".into()))
        }
    }

    fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }

    fn session(&self, id: &str) -> Option<VehicleSession> {
        self.sessions.lock().unwrap().get(id).cloned()
    }

    fn seed_session(&self, session: VehicleSession) {
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id.clone(), session);
    }

    fn setting(&self, key: &str) -> Option<String> {
        self.settings.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn ping(&self) -> RemoteResult<()> {
        self.gate().await
    }

    async fn insert_session(&self, session: &VehicleSession) -> RemoteResult<String> {
        self.gate().await?;
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);

        if self.reject_inserts.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected("insert refused".into()));
        }

        let mut sessions = self.sessions.lock().unwrap();

        // Dedupe on the client id: a replayed insert is a no-op
        if sessions.contains_key(&session.id) {
            return Ok(session.id.clone());
        }
        if let Some(existing) = sessions
            .values()
            .find(|s| s.id != session.id && s.plate_number == session.plate_number && s.is_parked())
        {
            return Err(RemoteError::Rejected(format!(
                "plate {} already parked as {}",
                existing.plate_number, existing.id
            )));
        }

        let id = if self.assign_server_ids.load(Ordering::SeqCst) {
            format!("srv-{}", self.server_id_counter.fetch_add(1, Ordering::SeqCst) + 1)
        } else {
            session.id.clone()
        };

        let mut stored = session.clone();
        stored.id = id.clone();
        sessions.insert(id.clone(), stored);
        Ok(id)
    }

    async fn complete_exit(
        &self,
        id: &str,
        exit_time: DateTime<Utc>,
        duration_minutes: i64,
        amount_cents: i64,
    ) -> RemoteResult<()> {
        self.gate().await?;

        let mut sessions = self.sessions.lock().unwrap();
        match sessions.get_mut(id) {
            Some(session) if session.is_parked() => {
                session.exit_time = Some(exit_time);
                session.duration_minutes = Some(duration_minutes);
                session.amount_cents = Some(amount_cents);
                session.status = SessionStatus::Exited;
                Ok(())
            }
            _ => Err(RemoteError::Rejected(format!(
                "no parked session matched id {id}"
            ))),
        }
    }

    async fn fetch_active_by_plate(&self, plate: &str) -> RemoteResult<Option<VehicleSession>> {
        self.gate().await?;
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .find(|s| s.plate_number == plate && s.is_parked())
            .cloned())
    }

    async fn fetch_active_sessions(&self) -> RemoteResult<Vec<VehicleSession>> {
        self.gate().await?;
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.is_parked())
            .cloned()
            .collect())
    }

    async fn upsert_setting(&self, key: &str, value: &str) -> RemoteResult<()> {
        self.gate().await?;
        if self.reject_settings.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected("settings are read only".into()));
        }
        self.settings
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn fetch_settings(&self) -> RemoteResult<Vec<(String, String)>> {
        self.gate().await?;
        Ok(self
            .settings
            .lock()
            .unwrap()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn insert_user(&self, user: &User) -> RemoteResult<()> {
        self.gate().await?;
        let mut users = self.users.lock().unwrap();
        if users.contains_key(&user.id) {
            return Ok(());
        }
        if users
            .values()
            .any(|u| u.id != user.id && u.username == user.username)
        {
            return Err(RemoteError::Rejected(format!(
                "username {} taken",
                user.username
            )));
        }
        users.insert(user.id.clone(), user.clone());
        Ok(())
    }

    async fn update_operator(&self, update: &OperatorUpdate) -> RemoteResult<()> {
        self.gate().await?;
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(&update.id)
            .ok_or_else(|| RemoteError::Rejected(format!("user {} not found", update.id)))?;
        user.username = update.username.clone();
        user.name = update.name.clone();
        user.email = update.email.clone();
        user.phone = update.phone.clone();
        Ok(())
    }

    async fn set_operator_status(&self, id: &str, is_active: bool) -> RemoteResult<()> {
        self.gate().await?;
        let mut users = self.users.lock().unwrap();
        let user = users
            .get_mut(id)
            .ok_or_else(|| RemoteError::Rejected(format!("user {id} not found")))?;
        user.is_active = is_active;
        Ok(())
    }

    async fn fetch_users(&self) -> RemoteResult<Vec<User>> {
        self.gate().await?;
        Ok(self.users.lock().unwrap().values().cloned().collect())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

async fn remote_store(remote: Arc<MockRemote>) -> ParkingStore {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    ParkingStore::with_remote(db, remote, StoreTuning::default())
        .await
        .unwrap()
}

// ── Write-through (connected) ───────────────────────────────────────

#[tokio::test]
async fn test_connected_register_writes_through() {
    let remote = MockRemote::new();
    let store = remote_store(remote.clone()).await;

    let outcome = store.register_entry("ABC-123", None, 0.9).await.unwrap();
    assert!(!outcome.queued);

    // Landed on both sides, nothing queued
    assert_eq!(remote.session_count(), 1);
    assert_eq!(store.queue_pending_count().await.unwrap(), 0);
    assert!(store
        .get_active_vehicle("ABC-123")
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_connected_exit_uses_remote_tariffs() {
    let remote = MockRemote::new();
    // The remote's tariff state differs from the seeded local default
    remote
        .upsert_setting("tariff_first_hour", "9.00")
        .await
        .unwrap();

    let store = remote_store(remote.clone()).await;
    let outcome = store.register_entry("ABC-123", None, 0.9).await.unwrap();

    let ExitOutcome::Completed(session) = store.process_exit("ABC-123").await.unwrap() else {
        panic!("connected exit must complete");
    };
    assert_eq!(session.amount_cents, Some(900));
    assert_eq!(session.status, SessionStatus::Exited);

    // The remote row carries the same atomic update
    let remote_session = remote.session(&outcome.session.id).unwrap();
    assert_eq!(remote_session.amount_cents, Some(900));
    assert_eq!(remote_session.status, SessionStatus::Exited);
}

#[tokio::test]
async fn test_rejected_register_surfaces_and_mutates_nothing() {
    let remote = MockRemote::new();
    remote.reject_inserts.store(true, Ordering::SeqCst);

    let store = remote_store(remote.clone()).await;
    let err = store.register_entry("ABC-123", None, 0.9).await.unwrap_err();

    // A definite refusal is not absorbed into the queue
    assert!(matches!(err, StoreError::Rejected(_)));
    assert_eq!(store.queue_pending_count().await.unwrap(), 0);
    assert!(store.get_active_vehicles().await.unwrap().is_empty());
}

// ── Offline queueing ────────────────────────────────────────────────

#[tokio::test]
async fn test_offline_register_queues_then_replays_without_duplicates() {
    let remote = MockRemote::new();
    let store = remote_store(remote.clone()).await;

    // Disconnect: the first failing call flips connectivity
    remote.set_online(false);

    let outcome = store.register_entry("ABC-123", None, 0.9).await.unwrap();
    assert!(outcome.queued);
    assert!(!store.is_connected());

    // Exactly one queue entry; the vehicle is visible locally
    assert_eq!(store.queue_pending_count().await.unwrap(), 1);
    assert!(store
        .get_active_vehicle("ABC-123")
        .await
        .unwrap()
        .is_some());
    assert_eq!(remote.session_count(), 0);

    // Reconnect and drain
    remote.set_online(true);
    assert!(store.probe_remote().await);
    let report = store.drain_queue_once().await.unwrap();

    assert_eq!(report.applied, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(store.queue_pending_count().await.unwrap(), 0);

    // Exactly one session remotely, still resolvable locally
    assert_eq!(remote.session_count(), 1);
    let active = store.get_active_vehicle("ABC-123").await.unwrap().unwrap();
    assert_eq!(active.plate_number, "ABC-123");

    // Replaying a drained queue does nothing
    let report = store.drain_queue_once().await.unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(remote.session_count(), 1);
}

#[tokio::test]
async fn test_duplicate_plate_blocked_while_offline() {
    let remote = MockRemote::new();
    let store = remote_store(remote.clone()).await;

    remote.set_online(false);
    store.register_entry("ABC-123", None, 0.9).await.unwrap();

    let err = store.register_entry("ABC-123", None, 0.9).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::Domain(CoreError::DuplicateActiveSession { .. })
    ));
    assert_eq!(store.queue_pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_offline_exit_returns_pending_and_replays_in_order() {
    let remote = MockRemote::new();
    let store = remote_store(remote.clone()).await;

    // Both the entry and its exit happen while offline
    remote.set_online(false);
    let entry = store.register_entry("ABC-123", None, 0.9).await.unwrap();
    assert!(entry.queued);

    let outcome = store.process_exit("ABC-123").await.unwrap();
    let ExitOutcome::Pending { plate_number, .. } = outcome else {
        panic!("offline exit must be pending, not fabricate a fee");
    };
    assert_eq!(plate_number, "ABC-123");

    // The session still occupies its spot locally until replay
    assert!(store
        .get_active_vehicle("ABC-123")
        .await
        .unwrap()
        .is_some());

    // A second exit tap reuses the queued intent
    let again = store.process_exit("ABC-123").await.unwrap();
    assert!(matches!(again, ExitOutcome::Pending { .. }));
    assert_eq!(store.queue_pending_count().await.unwrap(), 2);

    // Reconnect: entry replays before its exit (FIFO), fee computed from
    // the remote's tariff state at replay time
    remote
        .settings
        .lock()
        .unwrap()
        .insert("tariff_first_hour".to_string(), "7.00".to_string());
    remote.set_online(true);
    assert!(store.probe_remote().await);

    let report = store.drain_queue_once().await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(report.remaining, 0);

    let remote_session = remote.session(&entry.session.id).unwrap();
    assert_eq!(remote_session.status, SessionStatus::Exited);
    assert_eq!(remote_session.amount_cents, Some(700));

    // Mirror reconciled: the plate is free again
    assert!(store
        .get_active_vehicle("ABC-123")
        .await
        .unwrap()
        .is_none());
    let mirrored = store.db().sessions().get_by_id(&entry.session.id).await.unwrap().unwrap();
    assert_eq!(mirrored.amount_cents, Some(700));
}

#[tokio::test]
async fn test_exit_replay_is_idempotent_when_remote_already_exited() {
    let remote = MockRemote::new();
    let store = remote_store(remote.clone()).await;

    let entry = store.register_entry("ABC-123", None, 0.9).await.unwrap();

    // Exit goes through remotely, then the device flips offline before
    // observing it and queues a duplicate intent
    remote
        .complete_exit(&entry.session.id, Utc::now(), 30, 500)
        .await
        .unwrap();
    remote.set_online(false);

    let outcome = store.process_exit("ABC-123").await.unwrap();
    assert!(matches!(outcome, ExitOutcome::Pending { .. }));

    remote.set_online(true);
    store.probe_remote().await;
    let report = store.drain_queue_once().await.unwrap();

    // Acked without re-applying; the fee was not charged twice
    assert_eq!(report.applied, 1);
    let remote_session = remote.session(&entry.session.id).unwrap();
    assert_eq!(remote_session.amount_cents, Some(500));
    assert_eq!(remote_session.duration_minutes, Some(30));
}

#[tokio::test]
async fn test_remote_assigned_id_rekeys_the_mirror() {
    let remote = MockRemote::new();
    remote.assign_server_ids.store(true, Ordering::SeqCst);

    let store = remote_store(remote.clone()).await;

    remote.set_online(false);
    let outcome = store.register_entry("ABC-123", None, 0.9).await.unwrap();
    let temp_id = outcome.session.id.clone();

    remote.set_online(true);
    store.probe_remote().await;
    store.drain_queue_once().await.unwrap();

    // The temporary id is gone; the canonical remote id resolves
    assert!(store.db().sessions().get_by_id(&temp_id).await.unwrap().is_none());
    let active = store.get_active_vehicle("ABC-123").await.unwrap().unwrap();
    assert!(active.id.starts_with("srv-"));
    assert_eq!(remote.session(&active.id).unwrap().plate_number, "ABC-123");
}

#[tokio::test]
async fn test_timeout_counts_as_unavailable() {
    let remote = MockRemote::new();
    remote.response_delay_ms.store(200, Ordering::SeqCst);

    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    let tuning = StoreTuning {
        remote_timeout: Duration::from_millis(50),
        ..StoreTuning::default()
    };
    let store = ParkingStore::with_remote(db, remote.clone(), tuning)
        .await
        .unwrap();

    let outcome = store.register_entry("ABC-123", None, 0.9).await.unwrap();
    assert!(outcome.queued);
    assert!(!store.is_connected());
    assert_eq!(store.queue_pending_count().await.unwrap(), 1);
}

// ── Settings through the store ──────────────────────────────────────

#[tokio::test]
async fn test_settings_write_through_and_offline_queue() {
    let remote = MockRemote::new();
    let store = remote_store(remote.clone()).await;

    // Connected: remote first, then mirror
    let queued = store.set_setting("tariff_first_hour", "6.00").await.unwrap();
    assert!(!queued);
    assert_eq!(remote.setting("tariff_first_hour").as_deref(), Some("6.00"));

    let all = store.get_all_settings().await.unwrap();
    assert_eq!(all.tariffs.first_hour.to_decimal_string(), "6.00");

    // Offline: mirror + queue
    remote.set_online(false);
    let queued = store.set_setting("tariff_first_hour", "6.50").await.unwrap();
    assert!(queued);
    assert_eq!(remote.setting("tariff_first_hour").as_deref(), Some("6.00"));

    let all = store.get_all_settings().await.unwrap();
    assert_eq!(all.tariffs.first_hour.to_decimal_string(), "6.50");

    // Replay converges the remote
    remote.set_online(true);
    store.probe_remote().await;
    store.drain_queue_once().await.unwrap();
    assert_eq!(remote.setting("tariff_first_hour").as_deref(), Some("6.50"));
}

#[tokio::test]
async fn test_rejected_queue_entry_stops_drain_and_is_retried() {
    let remote = MockRemote::new();
    let store = remote_store(remote.clone()).await;

    remote.set_online(false);
    store.set_setting("system_language", "en").await.unwrap();
    store.set_setting("system_sound_alerts", "false").await.unwrap();
    assert_eq!(store.queue_pending_count().await.unwrap(), 2);

    // First drain: the remote refuses settings writes entirely
    remote.set_online(true);
    remote.reject_settings.store(true, Ordering::SeqCst);
    store.probe_remote().await;

    let report = store.drain_queue_once().await.unwrap();
    assert_eq!(report.applied, 0);
    assert_eq!(report.failed, 1);
    assert_eq!(report.remaining, 2); // FIFO preserved, nothing lost

    // Once the remote relents, both entries apply in order
    remote.reject_settings.store(false, Ordering::SeqCst);
    let report = store.drain_queue_once().await.unwrap();
    assert_eq!(report.applied, 2);
    assert_eq!(report.remaining, 0);
    assert_eq!(remote.setting("system_language").as_deref(), Some("en"));
}

// ── Reads ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reads_refresh_mirror_from_remote() {
    let remote = MockRemote::new();

    // A session that exists only remotely (e.g., written before this
    // device was swapped in)
    let now = Utc::now();
    remote.seed_session(VehicleSession {
        id: "remote-1".to_string(),
        plate_number: "ZZZ-999".to_string(),
        entry_time: now,
        exit_time: None,
        duration_minutes: None,
        amount_cents: None,
        status: SessionStatus::Parked,
        confidence: 0.8,
        operator_id: None,
        created_at: now,
    });

    let store = remote_store(remote.clone()).await;

    let active = store.get_active_vehicles().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].plate_number, "ZZZ-999");

    // The mirror now serves the same row offline
    remote.set_online(false);
    let active = store.get_active_vehicles().await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, "remote-1");
}

// ── Operators through the store ─────────────────────────────────────

#[tokio::test]
async fn test_operator_mutations_queue_offline_and_replay() {
    let remote = MockRemote::new();
    let store = remote_store(remote.clone()).await;

    remote.set_online(false);
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

    // Local login works while the account is still queued
    assert!(store.login("maria", "claveM1").await.unwrap().is_some());
    assert_eq!(store.queue_pending_count().await.unwrap(), 1);
    assert!(remote.users.lock().unwrap().is_empty());

    store.set_operator_status(&user.id, false).await.unwrap();
    assert_eq!(store.queue_pending_count().await.unwrap(), 2);

    remote.set_online(true);
    store.probe_remote().await;
    let report = store.drain_queue_once().await.unwrap();
    assert_eq!(report.applied, 2);

    let remote_user = remote.users.lock().unwrap().get(&user.id).cloned().unwrap();
    assert_eq!(remote_user.username, "maria");
    assert!(!remote_user.is_active);
}
