use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::net::IpAddr;
use tracing::{info, instrument};

use crate::config::DatabaseConfig;
use crate::error::StoreResult;
use crate::types::{AlertRow, ApiRow, NewAlert, RequestLogRow};

/// Persistence layer over the `apis`, `request_logs`, `alerts`,
/// `alert_notifications`, `ml_models`, `ip_blacklist`, `ip_whitelist`,
/// `detector_configs`, `users` and `audit_logs` tables. Runtime-checked
/// queries are used throughout (`sqlx::query`/`query_as` with `.bind()`)
/// rather than the compile-time `query!` macros, since no live database is
/// reachable at build time in this environment.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    pub async fn connect(config: &DatabaseConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;

        info!(host = %config.host, db = %config.name, "connected to database");
        Ok(Self { pool })
    }

    #[cfg(test)]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // ----- APIs -----------------------------------------------------

    #[instrument(skip(self))]
    pub async fn get_api_by_key(&self, api_key: &str) -> StoreResult<Option<ApiRow>> {
        let row = sqlx::query_as::<_, ApiRow>(
            "SELECT id, owner_id, name, api_key, is_active FROM apis WHERE api_key = $1",
        )
        .bind(api_key)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn create_api(
        &self,
        owner_id: i64,
        name: &str,
        api_key: &str,
    ) -> StoreResult<ApiRow> {
        let row = sqlx::query_as::<_, ApiRow>(
            "INSERT INTO apis (owner_id, name, api_key, is_active) VALUES ($1, $2, $3, TRUE)
             RETURNING id, owner_id, name, api_key, is_active",
        )
        .bind(owner_id)
        .bind(name)
        .bind(api_key)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn set_api_active(&self, api_id: i64, active: bool) -> StoreResult<()> {
        sqlx::query("UPDATE apis SET is_active = $1 WHERE id = $2")
            .bind(active)
            .bind(api_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn list_active_api_ids(&self) -> StoreResult<Vec<i64>> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM apis WHERE is_active = TRUE")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn delete_api_cascade(&self, api_id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM apis WHERE id = $1")
            .bind(api_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ----- Request logs ----------------------------------------------

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_request_log(
        &self,
        api_id: i64,
        timestamp: DateTime<Utc>,
        method: &str,
        endpoint: &str,
        client_ip: IpAddr,
        status_code: Option<i32>,
        latency_ms: Option<f64>,
        headers: Option<serde_json::Value>,
        body_size: i64,
        user_agent: Option<&str>,
    ) -> StoreResult<i64> {
        let id: (i64,) = sqlx::query_as(
            "INSERT INTO request_logs
                (api_id, timestamp, method, endpoint, client_ip, status_code,
                 latency_ms, headers, body_size, user_agent, is_suspicious)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, FALSE)
             RETURNING id",
        )
        .bind(api_id)
        .bind(timestamp)
        .bind(method)
        .bind(endpoint)
        .bind(client_ip.to_string())
        .bind(status_code)
        .bind(latency_ms)
        .bind(headers)
        .bind(body_size)
        .bind(user_agent)
        .fetch_one(&self.pool)
        .await?;
        Ok(id.0)
    }

    pub async fn mark_suspicious(&self, log_id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE request_logs SET is_suspicious = TRUE WHERE id = $1")
            .bind(log_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Last `limit` non-null latency samples for an API, most recent first,
    /// feeding the statistical detector's baseline.
    pub async fn recent_latencies(&self, api_id: i64, limit: i64) -> StoreResult<Vec<f64>> {
        let rows: Vec<(f64,)> = sqlx::query_as(
            "SELECT latency_ms FROM request_logs
             WHERE api_id = $1 AND latency_ms IS NOT NULL
             ORDER BY id DESC LIMIT $2",
        )
        .bind(api_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(v,)| v).collect())
    }

    /// Non-suspicious request logs used as the ML detector's training set.
    pub async fn training_features(
        &self,
        api_id: i64,
        limit: i64,
    ) -> StoreResult<Vec<RequestLogRow>> {
        let rows = sqlx::query_as::<_, RequestLogRow>(
            "SELECT id, api_id, timestamp, method, endpoint, client_ip, status_code,
                    latency_ms, body_size, is_suspicious
             FROM request_logs
             WHERE api_id = $1 AND is_suspicious = FALSE
             ORDER BY id DESC LIMIT $2",
        )
        .bind(api_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// `(errors, total)` request counts for this API since `since`, scoped
    /// to the API as a whole rather than per client — the error-rate
    /// detector watches for an API-wide error spike, not a single client's.
    pub async fn recent_error_count(
        &self,
        api_id: i64,
        since: DateTime<Utc>,
    ) -> StoreResult<(i64, i64)> {
        let row: (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*) FILTER (WHERE status_code >= 400), COUNT(*)
             FROM request_logs
             WHERE api_id = $1 AND timestamp >= $2",
        )
        .bind(api_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    // ----- Alerts ------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn create_alert(&self, alert: &NewAlert) -> StoreResult<AlertRow> {
        let row = sqlx::query_as::<_, AlertRow>(
            "INSERT INTO alerts
                (api_id, alert_type, severity, title, description, risk_score,
                 created_at, acknowledged, muted)
             VALUES ($1, $2, $3, $4, $5, $6, NOW(), FALSE, FALSE)
             RETURNING id, api_id, alert_type, severity, title, description,
                       risk_score, created_at, acknowledged, muted",
        )
        .bind(alert.api_id)
        .bind(&alert.alert_type)
        .bind(alert.severity.to_string())
        .bind(&alert.title)
        .bind(&alert.description)
        .bind(alert.risk_score)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn acknowledge_alert(&self, alert_id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE alerts SET acknowledged = TRUE WHERE id = $1")
            .bind(alert_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn mute_alert(&self, alert_id: i64) -> StoreResult<()> {
        sqlx::query("UPDATE alerts SET muted = TRUE WHERE id = $1")
            .bind(alert_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Records a single dispatch attempt. `sent_at` is `None` on failure,
    /// matching the original's behaviour of only stamping a delivery time on
    /// the happy path.
    pub async fn log_alert_notification(
        &self,
        alert_id: i64,
        channel: &str,
        status: &str,
        sent_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO alert_notifications (alert_id, channel, status, sent_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(alert_id)
        .bind(channel)
        .bind(status)
        .bind(sent_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ----- ML models -----------------------------------------------

    pub async fn load_ml_model(&self, api_id: i64) -> StoreResult<Option<Vec<u8>>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT blob FROM ml_models WHERE api_id = $1")
                .bind(api_id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(b,)| b))
    }

    pub async fn upsert_ml_model(&self, api_id: i64, blob: &[u8]) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO ml_models (api_id, blob, trained_at) VALUES ($1, $2, NOW())
             ON CONFLICT (api_id) DO UPDATE SET blob = EXCLUDED.blob, trained_at = NOW()",
        )
        .bind(api_id)
        .bind(blob)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ----- IP lists ---------------------------------------------------

    pub async fn is_blacklisted(&self, ip: IpAddr) -> StoreResult<bool> {
        Ok(self.lookup_blacklist_entry(ip).await?.is_some())
    }

    /// Active (non-expired) blacklist entry for `ip`, carrying the stored
    /// reason so detectors can surface it rather than synthesizing their own.
    pub async fn lookup_blacklist_entry(&self, ip: IpAddr) -> StoreResult<Option<Option<String>>> {
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "SELECT reason FROM ip_blacklist
             WHERE ip = $1 AND (expires_at IS NULL OR expires_at > NOW())",
        )
        .bind(ip.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(reason,)| reason))
    }

    pub async fn upsert_blacklist_entry(
        &self,
        ip: IpAddr,
        reason: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO ip_blacklist (ip, reason, expires_at) VALUES ($1, $2, $3)
             ON CONFLICT (ip) DO UPDATE SET reason = EXCLUDED.reason, expires_at = EXCLUDED.expires_at",
        )
        .bind(ip.to_string())
        .bind(reason)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn is_whitelisted(&self, ip: IpAddr) -> StoreResult<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM ip_whitelist WHERE ip = $1")
            .bind(ip.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    // ----- Users / audit (cascades only; no CRUD surface) -----------

    pub async fn delete_user_cascade(&self, user_id: i64) -> StoreResult<()> {
        sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn record_audit_log(&self, actor_id: i64, action: &str) -> StoreResult<()> {
        sqlx::query("INSERT INTO audit_logs (actor_id, action, created_at) VALUES ($1, $2, NOW())")
            .bind(actor_id)
            .bind(action)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
