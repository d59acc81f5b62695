//! # User Repository
//!
//! Staff accounts: admins and operators.
//!
//! ## Credential Handling
//! Passwords are argon2-hashed before storage and verified on login.
//! The plaintext never touches the database.
//!
//! ## Operator Aggregates
//! `total_vehicles_processed` and `total_earnings_cents` are recomputed
//! from exited sessions on every read. Storing them would drift the moment
//! a replay re-keys or re-applies a session.

use argon2::password_hash::{
    rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
};
use argon2::Argon2;
use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use autopark_core::{AuthUser, OperatorSummary, OperatorUpdate, Role, User};

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

const USER_COLUMNS: &str =
    "id, username, password_hash, name, role, is_active, email, phone, created_at";

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool) -> Self {
        UserRepository { pool }
    }

    /// Inserts a user row.
    ///
    /// A duplicate username surfaces as `DbError::UniqueViolation`.
    pub async fn insert(&self, user: &User) -> DbResult<()> {
        debug!(id = %user.id, username = %user.username, "Inserting user");

        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, password_hash, name, role,
                is_active, email, phone, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role)
        .bind(user.is_active)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Inserts or replaces a user row (mirror refresh from the remote).
    pub async fn upsert(&self, user: &User) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO users (
                id, username, password_hash, name, role,
                is_active, email, phone, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT (id) DO UPDATE SET
                username = excluded.username,
                password_hash = excluded.password_hash,
                name = excluded.name,
                role = excluded.role,
                is_active = excluded.is_active,
                email = excluded.email,
                phone = excluded.phone
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.role)
        .bind(user.is_active)
        .bind(&user.email)
        .bind(&user.phone)
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets a user by id.
    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Gets a user by username.
    pub async fn get_by_username(&self, username: &str) -> DbResult<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(user)
    }

    /// Lists operator accounts with usage aggregates.
    ///
    /// Inactive operators are included: admins toggle them back and
    /// reports keep resolving them either way.
    pub async fn operators(&self) -> DbResult<Vec<OperatorSummary>> {
        let operators = sqlx::query_as::<_, OperatorSummary>(
            r#"
            SELECT
                u.id,
                u.username,
                u.name,
                u.email,
                u.phone,
                u.is_active,
                COALESCE(stats.total_vehicles, 0) AS total_vehicles_processed,
                COALESCE(stats.total_earnings, 0) AS total_earnings_cents
            FROM users u
            LEFT JOIN (
                SELECT
                    operator_id,
                    COUNT(*) AS total_vehicles,
                    SUM(COALESCE(amount_cents, 0)) AS total_earnings
                FROM vehicle_entries
                WHERE status = 'exited' AND operator_id IS NOT NULL
                GROUP BY operator_id
            ) stats ON u.id = stats.operator_id
            WHERE u.role = 'operator'
            ORDER BY u.name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(operators)
    }

    /// Updates an operator's editable profile fields.
    pub async fn update_operator(&self, update: &OperatorUpdate) -> DbResult<()> {
        debug!(id = %update.id, "Updating operator");

        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = ?2, username = ?3, email = ?4, phone = ?5
            WHERE id = ?1
            "#,
        )
        .bind(&update.id)
        .bind(&update.name)
        .bind(&update.username)
        .bind(&update.email)
        .bind(&update.phone)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", &update.id));
        }

        Ok(())
    }

    /// Soft activation toggle.
    ///
    /// Never deletes: historical sessions keep referencing the operator id
    /// and reports must still resolve the display name.
    pub async fn set_status(&self, id: &str, is_active: bool) -> DbResult<()> {
        debug!(id = %id, is_active = is_active, "Setting operator status");

        let result = sqlx::query("UPDATE users SET is_active = ?2 WHERE id = ?1")
            .bind(id)
            .bind(is_active)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("User", id));
        }

        Ok(())
    }

    /// Verifies credentials against the stored hash.
    ///
    /// Inactive accounts never authenticate. Absence and a bad password
    /// are indistinguishable to the caller.
    pub async fn authenticate(&self, username: &str, password: &str) -> DbResult<Option<AuthUser>> {
        let user = match self.get_by_username(username).await? {
            Some(user) if user.is_active => user,
            _ => return Ok(None),
        };

        if !verify_password(password, &user.password_hash) {
            return Ok(None);
        }

        Ok(Some(AuthUser {
            id: user.id,
            username: user.username,
            name: user.name,
            role: user.role,
        }))
    }

    /// Seeds the default accounts when the table is empty.
    pub async fn seed_defaults(&self) -> DbResult<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;

        if count > 0 {
            return Ok(());
        }

        let now = Utc::now();
        let defaults = [
            ("admin", "admin123", "Administrador del Sistema", Role::Admin),
            ("operador", "operador123", "Operador Principal", Role::Operator),
        ];

        for (username, password, name, role) in defaults {
            let user = User {
                id: Uuid::new_v4().to_string(),
                username: username.to_string(),
                password_hash: hash_password(password)?,
                name: name.to_string(),
                role,
                is_active: true,
                email: None,
                phone: None,
                created_at: now,
            };
            self.insert(&user).await?;
        }

        info!("Default accounts seeded");
        Ok(())
    }
}

// =============================================================================
// Password Hashing
// =============================================================================

/// Hashes a plaintext password with argon2 and a fresh salt.
pub fn hash_password(plain: &str) -> DbResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DbError::Credential(e.to_string()))
}

/// Verifies a plaintext password against a stored argon2 hash.
///
/// A malformed stored hash verifies as false rather than erroring; it is
/// treated the same as a wrong password.
pub fn verify_password(plain: &str, hash: &str) -> bool {
    PasswordHash::new(hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(plain.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::repository::session::SessionRepository;
    use autopark_core::{SessionStatus, VehicleSession};
    use chrono::{DateTime, TimeZone};

    async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.users().seed_defaults().await.unwrap();
        db
    }

    fn operator(username: &str, name: &str) -> User {
        User {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password_hash: hash_password("secret1").unwrap(),
            name: name.to_string(),
            role: Role::Operator,
            is_active: true,
            email: Some(format!("{username}@autoparking.com")),
            phone: None,
            created_at: Utc::now(),
        }
    }

    async fn exited_session(
        sessions: &SessionRepository,
        plate: &str,
        operator_id: &str,
        entry: DateTime<chrono::Utc>,
        amount_cents: i64,
    ) {
        let session = VehicleSession {
            id: Uuid::new_v4().to_string(),
            plate_number: plate.to_string(),
            entry_time: entry,
            exit_time: None,
            duration_minutes: None,
            amount_cents: None,
            status: SessionStatus::Parked,
            confidence: 0.9,
            operator_id: Some(operator_id.to_string()),
            created_at: entry,
        };
        sessions.insert(&session).await.unwrap();
        sessions
            .complete_exit(&session.id, entry + chrono::Duration::minutes(60), 60, amount_cents)
            .await
            .unwrap();
    }

    #[test]
    fn test_password_hash_round_trip() {
        let hash = hash_password("admin123").unwrap();
        assert_ne!(hash, "admin123");
        assert!(verify_password("admin123", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("admin123", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_seeded_admin_authenticates() {
        let db = test_db().await;
        let repo = db.users();

        let auth = repo.authenticate("admin", "admin123").await.unwrap().unwrap();
        assert_eq!(auth.username, "admin");
        assert_eq!(auth.role, Role::Admin);

        assert!(repo.authenticate("admin", "wrong").await.unwrap().is_none());
        assert!(repo.authenticate("ghost", "admin123").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_inactive_user_cannot_authenticate() {
        let db = test_db().await;
        let repo = db.users();

        let op = repo.get_by_username("operador").await.unwrap().unwrap();
        repo.set_status(&op.id, false).await.unwrap();

        assert!(repo
            .authenticate("operador", "operador123")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_duplicate_username_rejected() {
        let db = test_db().await;
        let repo = db.users();

        repo.insert(&operator("maria", "María Quispe")).await.unwrap();
        let err = repo
            .insert(&operator("maria", "Someone Else"))
            .await
            .unwrap_err();
        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn test_operator_aggregates_recomputed_from_sessions() {
        let db = test_db().await;
        let users = db.users();
        let sessions = db.sessions();

        let maria = operator("maria", "María Quispe");
        users.insert(&maria).await.unwrap();

        let entry = Utc.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap();
        exited_session(&sessions, "AAA-111", &maria.id, entry, 500).await;
        exited_session(
            &sessions,
            "BBB-222",
            &maria.id,
            entry + chrono::Duration::hours(2),
            800,
        )
        .await;

        let operators = users.operators().await.unwrap();
        let row = operators.iter().find(|o| o.username == "maria").unwrap();
        assert_eq!(row.total_vehicles_processed, 2);
        assert_eq!(row.total_earnings_cents, 1300);

        // The seeded operator has no sessions yet
        let seeded = operators.iter().find(|o| o.username == "operador").unwrap();
        assert_eq!(seeded.total_vehicles_processed, 0);
        assert_eq!(seeded.total_earnings_cents, 0);
    }

    #[tokio::test]
    async fn test_deactivation_preserves_history() {
        let db = test_db().await;
        let users = db.users();
        let sessions = db.sessions();

        let maria = operator("maria", "María Quispe");
        users.insert(&maria).await.unwrap();

        let entry = Utc.with_ymd_and_hms(2026, 3, 11, 8, 0, 0).unwrap();
        exited_session(&sessions, "AAA-111", &maria.id, entry, 500).await;

        users.set_status(&maria.id, false).await.unwrap();

        // Still listed, still aggregated, still resolvable by name
        let operators = users.operators().await.unwrap();
        let row = operators.iter().find(|o| o.username == "maria").unwrap();
        assert!(!row.is_active);
        assert_eq!(row.total_vehicles_processed, 1);

        let reports = sessions
            .reports(&autopark_core::ReportFilter::default())
            .await
            .unwrap();
        assert_eq!(reports[0].operator_name, "María Quispe");
    }

    #[tokio::test]
    async fn test_update_operator() {
        let db = test_db().await;
        let repo = db.users();

        let maria = operator("maria", "María Quispe");
        repo.insert(&maria).await.unwrap();

        repo.update_operator(&OperatorUpdate {
            id: maria.id.clone(),
            username: "maria.q".to_string(),
            name: "María Quispe Flores".to_string(),
            email: Some("mq@autoparking.com".to_string()),
            phone: Some("959-000111".to_string()),
        })
        .await
        .unwrap();

        let stored = repo.get_by_id(&maria.id).await.unwrap().unwrap();
        assert_eq!(stored.username, "maria.q");
        assert_eq!(stored.name, "María Quispe Flores");

        let err = repo
            .update_operator(&OperatorUpdate {
                id: "missing".to_string(),
                username: "x".to_string(),
                name: "x".to_string(),
                email: None,
                phone: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
