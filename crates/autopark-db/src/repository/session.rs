//! # Session Repository
//!
//! Database operations for vehicle parking sessions.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Session Lifecycle                                  │
//! │                                                                         │
//! │  1. ENTRY                                                              │
//! │     └── insert() → VehicleSession { status: Parked }                   │
//! │                                                                         │
//! │  2. OCCUPANCY                                                          │
//! │     └── find_active_by_plate() / active_sessions()                     │
//! │                                                                         │
//! │  3. EXIT                                                               │
//! │     └── complete_exit() → exit_time + duration + amount + status       │
//! │         flip together in ONE guarded UPDATE (never partially)          │
//! │                                                                         │
//! │  Terminal: an exited session never transitions again.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use autopark_core::{
    DailySummary, ReportFilter, ReportRow, VehicleSession, SYSTEM_OPERATOR_NAME,
};

/// Repository for vehicle session database operations.
#[derive(Debug, Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

const SESSION_COLUMNS: &str = "id, plate_number, entry_time, exit_time, duration_minutes, \
     amount_cents, status, confidence, operator_id, created_at";

impl SessionRepository {
    /// Creates a new SessionRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SessionRepository { pool }
    }

    /// Inserts a new session row.
    ///
    /// The caller is responsible for the one-parked-per-plate check; the
    /// partial unique index backs it up and surfaces as UniqueViolation.
    pub async fn insert(&self, session: &VehicleSession) -> DbResult<()> {
        debug!(id = %session.id, plate = %session.plate_number, "Inserting session");

        sqlx::query(
            r#"
            INSERT INTO vehicle_entries (
                id, plate_number, entry_time, exit_time, duration_minutes,
                amount_cents, status, confidence, operator_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&session.id)
        .bind(&session.plate_number)
        .bind(session.entry_time)
        .bind(session.exit_time)
        .bind(session.duration_minutes)
        .bind(session.amount_cents)
        .bind(session.status)
        .bind(session.confidence)
        .bind(&session.operator_id)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts or replaces a session row (mirror refresh from the remote).
    pub async fn upsert(&self, session: &VehicleSession) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO vehicle_entries (
                id, plate_number, entry_time, exit_time, duration_minutes,
                amount_cents, status, confidence, operator_id, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (id) DO UPDATE SET
                plate_number = excluded.plate_number,
                entry_time = excluded.entry_time,
                exit_time = excluded.exit_time,
                duration_minutes = excluded.duration_minutes,
                amount_cents = excluded.amount_cents,
                status = excluded.status,
                confidence = excluded.confidence,
                operator_id = excluded.operator_id
            "#,
        )
        .bind(&session.id)
        .bind(&session.plate_number)
        .bind(session.entry_time)
        .bind(session.exit_time)
        .bind(session.duration_minutes)
        .bind(session.amount_cents)
        .bind(session.status)
        .bind(session.confidence)
        .bind(&session.operator_id)
        .bind(session.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a session by ID.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<VehicleSession>> {
        let session = sqlx::query_as::<_, VehicleSession>(&format!(
            "SELECT {SESSION_COLUMNS} FROM vehicle_entries WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Gets the active (parked) session for a plate, if any.
    ///
    /// Absence is a valid outcome, not an error.
    pub async fn find_active_by_plate(&self, plate: &str) -> DbResult<Option<VehicleSession>> {
        let session = sqlx::query_as::<_, VehicleSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM vehicle_entries
            WHERE plate_number = ?1 AND status = 'parked'
            ORDER BY entry_time DESC
            LIMIT 1
            "#
        ))
        .bind(plate)
        .fetch_optional(&self.pool)
        .await?;

        Ok(session)
    }

    /// Gets all currently parked sessions, newest entry first.
    pub async fn active_sessions(&self) -> DbResult<Vec<VehicleSession>> {
        let sessions = sqlx::query_as::<_, VehicleSession>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
            FROM vehicle_entries
            WHERE status = 'parked'
            ORDER BY entry_time DESC
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(sessions)
    }

    /// Completes an exit: exit_time, duration, amount, and the status flip
    /// are written together.
    ///
    /// The UPDATE is guarded on `status = 'parked'`: if the row flipped
    /// underneath us the update matches nothing and the caller gets
    /// NotFound instead of a partial write.
    pub async fn complete_exit(
        &self,
        id: &str,
        exit_time: DateTime<Utc>,
        duration_minutes: i64,
        amount_cents: i64,
    ) -> DbResult<()> {
        debug!(id = %id, duration = duration_minutes, amount = amount_cents, "Completing exit");

        let result = sqlx::query(
            r#"
            UPDATE vehicle_entries SET
                exit_time = ?2,
                duration_minutes = ?3,
                amount_cents = ?4,
                status = 'exited'
            WHERE id = ?1 AND status = 'parked'
            "#,
        )
        .bind(id)
        .bind(exit_time)
        .bind(duration_minutes)
        .bind(amount_cents)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Parked session", id));
        }

        Ok(())
    }

    /// Re-keys a locally created session to the id the remote assigned.
    ///
    /// Used during queue replay when the remote store is authoritative for
    /// identifiers. No-op safe: replaying with an unchanged id matches the
    /// same row.
    pub async fn rekey(&self, old_id: &str, new_id: &str) -> DbResult<()> {
        debug!(old_id = %old_id, new_id = %new_id, "Re-keying session");

        let result = sqlx::query("UPDATE vehicle_entries SET id = ?2 WHERE id = ?1")
            .bind(old_id)
            .bind(new_id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Session", old_id));
        }

        Ok(())
    }

    /// Facility totals for one calendar day (entry-date based).
    pub async fn daily_summary(&self, date: NaiveDate) -> DbResult<DailySummary> {
        let summary = sqlx::query_as::<_, DailySummary>(
            r#"
            SELECT
                COUNT(*) AS total_vehicles,
                COALESCE(SUM(CASE WHEN status = 'parked' THEN 1 ELSE 0 END), 0)
                    AS vehicles_parked,
                COALESCE(SUM(CASE WHEN status = 'exited' THEN amount_cents ELSE 0 END), 0)
                    AS total_earnings_cents,
                CAST(COALESCE(AVG(CASE WHEN status = 'exited' AND duration_minutes > 0
                    THEN duration_minutes END), 0) AS REAL)
                    AS average_stay_minutes
            FROM vehicle_entries
            WHERE DATE(entry_time) = ?1
            "#,
        )
        .bind(date.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(summary)
    }

    /// Session report with operator names resolved.
    ///
    /// Inactive operators still resolve (LEFT JOIN on id, not on
    /// is_active); sessions without an operator render under the system
    /// name.
    pub async fn reports(&self, filter: &ReportFilter) -> DbResult<Vec<ReportRow>> {
        let mut sql = String::from(
            r#"
            SELECT
                ve.id,
                ve.plate_number,
                COALESCE(u.name, ?) AS operator_name,
                ve.entry_time,
                ve.exit_time,
                ve.duration_minutes,
                COALESCE(ve.amount_cents, 0) AS amount_cents,
                ve.status
            FROM vehicle_entries ve
            LEFT JOIN users u ON ve.operator_id = u.id
            WHERE 1=1
            "#,
        );

        if filter.operator_id.is_some() {
            sql.push_str(" AND ve.operator_id = ?");
        }
        if filter.start_date.is_some() {
            sql.push_str(" AND DATE(ve.entry_time) >= ?");
        }
        if filter.end_date.is_some() {
            sql.push_str(" AND DATE(ve.entry_time) <= ?");
        }
        sql.push_str(" ORDER BY ve.entry_time DESC");

        let mut query = sqlx::query_as::<_, ReportRow>(&sql).bind(SYSTEM_OPERATOR_NAME);
        if let Some(ref operator_id) = filter.operator_id {
            query = query.bind(operator_id.clone());
        }
        if let Some(start) = filter.start_date {
            query = query.bind(start.to_string());
        }
        if let Some(end) = filter.end_date {
            query = query.bind(end.to_string());
        }

        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use autopark_core::SessionStatus;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    async fn test_db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    fn session(plate: &str, entry: DateTime<Utc>) -> VehicleSession {
        VehicleSession {
            id: Uuid::new_v4().to_string(),
            plate_number: plate.to_string(),
            entry_time: entry,
            exit_time: None,
            duration_minutes: None,
            amount_cents: None,
            status: SessionStatus::Parked,
            confidence: 0.9,
            operator_id: None,
            created_at: entry,
        }
    }

    fn entry_at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 11, h, m, 0).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_find_active() {
        let db = test_db().await;
        let repo = db.sessions();

        let s = session("ABC-123", entry_at(10, 0));
        repo.insert(&s).await.unwrap();

        let found = repo.find_active_by_plate("ABC-123").await.unwrap().unwrap();
        assert_eq!(found.id, s.id);
        assert_eq!(found.status, SessionStatus::Parked);
        assert_eq!(found.entry_time, s.entry_time);

        assert!(repo.find_active_by_plate("ZZZ-000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_parked_row_violates_unique_index() {
        let db = test_db().await;
        let repo = db.sessions();

        repo.insert(&session("ABC-123", entry_at(10, 0))).await.unwrap();
        let err = repo
            .insert(&session("ABC-123", entry_at(11, 0)))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation(), "got {err:?}");
    }

    #[tokio::test]
    async fn test_complete_exit_flips_everything_together() {
        let db = test_db().await;
        let repo = db.sessions();

        let s = session("DEF-456", entry_at(10, 0));
        repo.insert(&s).await.unwrap();

        let exit = s.entry_time + Duration::minutes(90);
        repo.complete_exit(&s.id, exit, 90, 800).await.unwrap();

        let stored = repo.get_by_id(&s.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Exited);
        assert_eq!(stored.exit_time, Some(exit));
        assert_eq!(stored.duration_minutes, Some(90));
        assert_eq!(stored.amount_cents, Some(800));

        // Plate is free again
        assert!(repo.find_active_by_plate("DEF-456").await.unwrap().is_none());

        // Terminal: a second exit matches no parked row
        let err = repo
            .complete_exit(&s.id, exit + Duration::minutes(5), 95, 800)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_active_sessions_ordering() {
        let db = test_db().await;
        let repo = db.sessions();

        repo.insert(&session("AAA-111", entry_at(8, 0))).await.unwrap();
        repo.insert(&session("BBB-222", entry_at(9, 30))).await.unwrap();

        let active = repo.active_sessions().await.unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].plate_number, "BBB-222"); // newest first
    }

    #[tokio::test]
    async fn test_rekey() {
        let db = test_db().await;
        let repo = db.sessions();

        let s = session("GHI-789", entry_at(10, 0));
        repo.insert(&s).await.unwrap();

        repo.rekey(&s.id, "remote-id-42").await.unwrap();
        assert!(repo.get_by_id(&s.id).await.unwrap().is_none());
        assert!(repo.get_by_id("remote-id-42").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_daily_summary() {
        let db = test_db().await;
        let repo = db.sessions();

        let a = session("AAA-111", entry_at(8, 0));
        repo.insert(&a).await.unwrap();
        repo.complete_exit(&a.id, entry_at(9, 0), 60, 500).await.unwrap();

        repo.insert(&session("BBB-222", entry_at(9, 30))).await.unwrap();

        let summary = repo
            .daily_summary(NaiveDate::from_ymd_opt(2026, 3, 11).unwrap())
            .await
            .unwrap();
        assert_eq!(summary.total_vehicles, 2);
        assert_eq!(summary.vehicles_parked, 1);
        assert_eq!(summary.total_earnings_cents, 500);
        assert!((summary.average_stay_minutes - 60.0).abs() < f64::EPSILON);

        // Empty day
        let empty = repo
            .daily_summary(NaiveDate::from_ymd_opt(2026, 3, 12).unwrap())
            .await
            .unwrap();
        assert_eq!(empty.total_vehicles, 0);
        assert_eq!(empty.total_earnings_cents, 0);
    }

    #[tokio::test]
    async fn test_reports_resolve_missing_operator_as_system() {
        let db = test_db().await;
        let repo = db.sessions();

        repo.insert(&session("AAA-111", entry_at(8, 0))).await.unwrap();

        let rows = repo.reports(&ReportFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].operator_name, SYSTEM_OPERATOR_NAME);
        assert_eq!(rows[0].amount_cents, 0);
    }

    #[tokio::test]
    async fn test_reports_date_filter() {
        let db = test_db().await;
        let repo = db.sessions();

        repo.insert(&session("AAA-111", entry_at(8, 0))).await.unwrap();

        let filter = ReportFilter {
            start_date: NaiveDate::from_ymd_opt(2026, 3, 12),
            ..ReportFilter::default()
        };
        assert!(repo.reports(&filter).await.unwrap().is_empty());

        let filter = ReportFilter {
            start_date: NaiveDate::from_ymd_opt(2026, 3, 11),
            end_date: NaiveDate::from_ymd_opt(2026, 3, 11),
            ..ReportFilter::default()
        };
        assert_eq!(repo.reports(&filter).await.unwrap().len(), 1);
    }
}
