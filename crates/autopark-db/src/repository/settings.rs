//! # Settings Repository
//!
//! Flat key/value persistence for `app_settings`.
//!
//! Typed parsing lives in `autopark_core::settings`; this repository only
//! moves strings. Defaults are seeded once, on first run, when the table
//! is empty.

use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::error::DbResult;
use autopark_core::AllSettings;

/// Repository for application settings.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    /// Creates a new SettingsRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    /// Gets a single setting value.
    ///
    /// Absence is a valid outcome; typed defaults are applied by the
    /// settings boundary, not here.
    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM app_settings WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        Ok(value)
    }

    /// Upserts a single setting.
    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        debug!(key = %key, "Saving setting");

        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value,
                                            updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Gets multiple settings in one round trip.
    ///
    /// Missing keys are simply absent from the result map.
    pub async fn get_many(&self, keys: &[String]) -> DbResult<HashMap<String, String>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let placeholders = vec!["?"; keys.len()].join(",");
        let sql = format!("SELECT key, value FROM app_settings WHERE key IN ({placeholders})");

        let mut query = sqlx::query_as::<_, (String, String)>(&sql);
        for key in keys {
            query = query.bind(key);
        }

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows.into_iter().collect())
    }

    /// Saves multiple settings in a single transaction.
    ///
    /// All-or-nothing: a failure rolls every entry back.
    pub async fn save_many(&self, entries: &BTreeMap<String, String>) -> DbResult<()> {
        debug!(count = entries.len(), "Saving settings batch");

        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for (key, value) in entries {
            sqlx::query(
                r#"
                INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT (key) DO UPDATE SET value = excluded.value,
                                                updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Gets every stored setting as a flat map.
    pub async fn all(&self) -> DbResult<HashMap<String, String>> {
        let rows = sqlx::query_as::<_, (String, String)>("SELECT key, value FROM app_settings")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().collect())
    }

    /// Seeds the documented defaults when the table is empty.
    ///
    /// No-op on every later run; individual keys use INSERT OR IGNORE so a
    /// partially seeded table never gets overwritten.
    pub async fn seed_defaults(&self) -> DbResult<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM app_settings")
            .fetch_one(&self.pool)
            .await?;

        if count > 0 {
            return Ok(());
        }

        let now = Utc::now();
        for (key, value) in AllSettings::default_entries() {
            sqlx::query(
                "INSERT OR IGNORE INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)",
            )
            .bind(key)
            .bind(value)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }

        info!("Default settings seeded");
        Ok(())
    }

    /// Removes every setting (restore-defaults flow).
    pub async fn delete_all(&self) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM app_settings")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use autopark_core::Money;

    async fn test_db() -> Database {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settings().seed_defaults().await.unwrap();
        db
    }

    #[tokio::test]
    async fn test_defaults_are_seeded() {
        let db = test_db().await;
        let repo = db.settings();

        assert_eq!(
            repo.get("tariff_first_hour").await.unwrap(),
            Some("5.00".to_string())
        );
        assert_eq!(
            repo.get("business_name").await.unwrap(),
            Some("AutoParking Control".to_string())
        );
        assert_eq!(repo.get("no_such_key").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_set_then_get() {
        let db = test_db().await;
        let repo = db.settings();

        repo.set("tariff_first_hour", "6.00").await.unwrap();
        assert_eq!(
            repo.get("tariff_first_hour").await.unwrap(),
            Some("6.00".to_string())
        );
    }

    #[tokio::test]
    async fn test_typed_round_trip() {
        let db = test_db().await;
        let repo = db.settings();

        repo.set("tariff_first_hour", "6.00").await.unwrap();

        let all = AllSettings::from_settings(&repo.all().await.unwrap());
        assert_eq!(all.tariffs.first_hour, Money::from_cents(600));
        // Untouched keys keep their seeded values
        assert_eq!(all.tariffs.additional_hour, Money::from_cents(300));
    }

    #[tokio::test]
    async fn test_get_many() {
        let db = test_db().await;
        let repo = db.settings();

        let values = repo
            .get_many(&[
                "tariff_first_hour".to_string(),
                "system_language".to_string(),
                "missing_key".to_string(),
            ])
            .await
            .unwrap();

        assert_eq!(values.len(), 2);
        assert_eq!(values["tariff_first_hour"], "5.00");
        assert_eq!(values["system_language"], "es");

        assert!(repo.get_many(&[]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_many_is_transactional() {
        let db = test_db().await;
        let repo = db.settings();

        let mut batch = BTreeMap::new();
        batch.insert("tariff_first_hour".to_string(), "7.00".to_string());
        batch.insert("business_max_spots".to_string(), "80".to_string());
        repo.save_many(&batch).await.unwrap();

        assert_eq!(
            repo.get("tariff_first_hour").await.unwrap(),
            Some("7.00".to_string())
        );
        assert_eq!(
            repo.get("business_max_spots").await.unwrap(),
            Some("80".to_string())
        );
    }

    #[tokio::test]
    async fn test_delete_all_then_reseed() {
        let db = test_db().await;
        let repo = db.settings();

        let deleted = repo.delete_all().await.unwrap();
        assert!(deleted > 0);
        assert_eq!(repo.get("tariff_first_hour").await.unwrap(), None);

        repo.seed_defaults().await.unwrap();
        assert_eq!(
            repo.get("tariff_first_hour").await.unwrap(),
            Some("5.00".to_string())
        );
    }
}
