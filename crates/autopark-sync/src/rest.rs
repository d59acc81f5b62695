//! # REST Remote Backend
//!
//! [`RemoteStore`] implementation over a PostgREST-style relational API
//! (one resource per table under `/rest/v1/`, filters as query params,
//! upsert semantics via `Prefer` headers).
//!
//! ## Error Classification
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                  HTTP outcome → RemoteError                             │
//! │                                                                         │
//! │  connect failure / timeout          → Unavailable (queue + replay)     │
//! │  5xx, 408, 429                      → Unavailable (server outage)      │
//! │  other 4xx                          → Rejected (surface to caller)     │
//! │  2xx with undecodable body          → Rejected (protocol mismatch)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use autopark_core::{OperatorUpdate, User, VehicleSession};

use crate::config::ParkingConfig;
use crate::error::{RemoteError, StoreError, StoreResult};
use crate::remote::{RemoteResult, RemoteStore};

// =============================================================================
// Client
// =============================================================================

/// REST client for the remote relational store.
#[derive(Debug, Clone)]
pub struct RestRemote {
    client: reqwest::Client,
    base: String,
}

/// Row shape for `app_settings` on the wire.
#[derive(Debug, Serialize, Deserialize)]
struct SettingRecord {
    key: String,
    value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    updated_at: Option<DateTime<Utc>>,
}

/// Body of the guarded exit PATCH.
#[derive(Debug, Serialize)]
struct ExitPatch {
    exit_time: DateTime<Utc>,
    duration_minutes: i64,
    amount_cents: i64,
    status: &'static str,
}

/// Returned-id slice of an inserted row.
#[derive(Debug, Deserialize)]
struct IdRecord {
    id: String,
}

impl RestRemote {
    /// Builds a client for the given base URL.
    ///
    /// The request timeout here is a transport-level bound; the store
    /// additionally wraps calls in its own `remote_timeout`.
    pub fn new(base_url: &str, api_key: Option<&str>, timeout: Duration) -> StoreResult<Self> {
        // Reject malformed URLs up front rather than on the first request
        url::Url::parse(base_url)?;

        let mut headers = HeaderMap::new();
        if let Some(key) = api_key {
            let value = HeaderValue::from_str(key)
                .map_err(|e| StoreError::InvalidConfig(format!("invalid api key: {e}")))?;
            headers.insert("apikey", value.clone());
            let bearer = HeaderValue::from_str(&format!("Bearer {key}"))
                .map_err(|e| StoreError::InvalidConfig(format!("invalid api key: {e}")))?;
            headers.insert(reqwest::header::AUTHORIZATION, bearer);
        }

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("autopark/0.1.0")
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(RestRemote {
            client,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Builds a client from the loaded device configuration.
    ///
    /// Returns `None` when no remote URL is configured (local-only mode).
    pub fn from_config(config: &ParkingConfig) -> StoreResult<Option<Self>> {
        match config.remote.url.as_deref() {
            Some(url) => Ok(Some(Self::new(
                url,
                config.remote.api_key.as_deref(),
                config.tuning().remote_timeout,
            )?)),
            None => Ok(None),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base, table)
    }

    /// Maps transport-level failures: the request never completed, so the
    /// remote may not have observed it.
    fn transport_error(err: reqwest::Error) -> RemoteError {
        RemoteError::Unavailable(err.to_string())
    }

    /// Splits HTTP statuses into outage vs. refusal.
    async fn check_status(response: Response) -> RemoteResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        if status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS
        {
            Err(RemoteError::Unavailable(format!("{status}: {body}")))
        } else {
            Err(RemoteError::Rejected(format!("{status}: {body}")))
        }
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> RemoteResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| RemoteError::Rejected(format!("invalid response body: {e}")))
    }
}

// =============================================================================
// RemoteStore Implementation
// =============================================================================

#[async_trait]
impl RemoteStore for RestRemote {
    async fn ping(&self) -> RemoteResult<()> {
        let response = self
            .client
            .get(self.table_url("app_settings"))
            .query(&[("select", "key"), ("limit", "1")])
            .send()
            .await
            .map_err(Self::transport_error)?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn insert_session(&self, session: &VehicleSession) -> RemoteResult<String> {
        debug!(id = %session.id, plate = %session.plate_number, "Remote session insert");

        let response = self
            .client
            .post(self.table_url("vehicle_entries"))
            // Idempotent on the client-generated id: a replayed insert that
            // already landed returns an empty representation
            .header("Prefer", "resolution=ignore-duplicates,return=representation")
            .json(&[session])
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check_status(response).await?;
        let inserted: Vec<IdRecord> = Self::decode(response).await?;

        Ok(inserted
            .into_iter()
            .next()
            .map(|record| record.id)
            .unwrap_or_else(|| session.id.clone()))
    }

    async fn complete_exit(
        &self,
        id: &str,
        exit_time: DateTime<Utc>,
        duration_minutes: i64,
        amount_cents: i64,
    ) -> RemoteResult<()> {
        debug!(id = %id, amount = amount_cents, "Remote exit update");

        let response = self
            .client
            .patch(self.table_url("vehicle_entries"))
            .query(&[("id", format!("eq.{id}")), ("status", "eq.parked".to_string())])
            .header("Prefer", "return=representation")
            .json(&ExitPatch {
                exit_time,
                duration_minutes,
                amount_cents,
                status: "exited",
            })
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check_status(response).await?;
        let updated: Vec<IdRecord> = Self::decode(response).await?;

        if updated.is_empty() {
            return Err(RemoteError::Rejected(format!(
                "no parked session matched id {id}"
            )));
        }

        Ok(())
    }

    async fn fetch_active_by_plate(&self, plate: &str) -> RemoteResult<Option<VehicleSession>> {
        let response = self
            .client
            .get(self.table_url("vehicle_entries"))
            .query(&[
                ("plate_number", format!("eq.{plate}")),
                ("status", "eq.parked".to_string()),
                ("order", "entry_time.desc".to_string()),
                ("limit", "1".to_string()),
            ])
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check_status(response).await?;
        let mut sessions: Vec<VehicleSession> = Self::decode(response).await?;
        Ok(if sessions.is_empty() {
            None
        } else {
            Some(sessions.remove(0))
        })
    }

    async fn fetch_active_sessions(&self) -> RemoteResult<Vec<VehicleSession>> {
        let response = self
            .client
            .get(self.table_url("vehicle_entries"))
            .query(&[("status", "eq.parked"), ("order", "entry_time.desc")])
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check_status(response).await?;
        Self::decode(response).await
    }

    async fn upsert_setting(&self, key: &str, value: &str) -> RemoteResult<()> {
        debug!(key = %key, "Remote setting upsert");

        let record = SettingRecord {
            key: key.to_string(),
            value: value.to_string(),
            updated_at: Some(Utc::now()),
        };

        let response = self
            .client
            .post(self.table_url("app_settings"))
            .header("Prefer", "resolution=merge-duplicates")
            .json(&[record])
            .send()
            .await
            .map_err(Self::transport_error)?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn fetch_settings(&self) -> RemoteResult<Vec<(String, String)>> {
        let response = self
            .client
            .get(self.table_url("app_settings"))
            .query(&[("select", "key,value")])
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check_status(response).await?;
        let records: Vec<SettingRecord> = Self::decode(response).await?;
        Ok(records.into_iter().map(|r| (r.key, r.value)).collect())
    }

    async fn insert_user(&self, user: &User) -> RemoteResult<()> {
        debug!(id = %user.id, username = %user.username, "Remote user insert");

        let response = self
            .client
            .post(self.table_url("users"))
            .header("Prefer", "resolution=ignore-duplicates,return=minimal")
            .json(&[user])
            .send()
            .await
            .map_err(Self::transport_error)?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn update_operator(&self, update: &OperatorUpdate) -> RemoteResult<()> {
        let response = self
            .client
            .patch(self.table_url("users"))
            .query(&[("id", format!("eq.{}", update.id))])
            .json(&serde_json::json!({
                "username": update.username,
                "name": update.name,
                "email": update.email,
                "phone": update.phone,
            }))
            .send()
            .await
            .map_err(Self::transport_error)?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn set_operator_status(&self, id: &str, is_active: bool) -> RemoteResult<()> {
        let response = self
            .client
            .patch(self.table_url("users"))
            .query(&[("id", format!("eq.{id}"))])
            .json(&serde_json::json!({ "is_active": is_active }))
            .send()
            .await
            .map_err(Self::transport_error)?;

        Self::check_status(response).await?;
        Ok(())
    }

    async fn fetch_users(&self) -> RemoteResult<Vec<User>> {
        let response = self
            .client
            .get(self.table_url("users"))
            .send()
            .await
            .map_err(Self::transport_error)?;

        let response = Self::check_status(response).await?;
        Self::decode(response).await
    }
}
