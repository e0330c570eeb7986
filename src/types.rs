use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        write!(f, "{s}")
    }
}

/// Body of `POST /api/ingest`, mirroring the original request-log payload.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestRequest {
    pub api_key: String,
    /// Seconds since the Unix epoch.
    pub timestamp: f64,
    pub method: String,
    pub endpoint: String,
    pub client_ip: IpAddr,
    pub status_code: Option<i32>,
    pub latency_ms: Option<f64>,
    pub headers: Option<serde_json::Value>,
    #[serde(default)]
    pub body_size: Option<i64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub log_id: i64,
    pub is_suspicious: bool,
    pub risk_score: f64,
}

/// A persisted request_logs row, as read back for statistical/ML feature
/// extraction.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RequestLogRow {
    pub id: i64,
    pub api_id: i64,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub endpoint: String,
    pub client_ip: String,
    pub status_code: Option<i32>,
    pub latency_ms: Option<f64>,
    pub body_size: Option<i64>,
    pub is_suspicious: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ApiRow {
    pub id: i64,
    pub owner_id: i64,
    pub name: String,
    pub api_key: String,
    pub is_active: bool,
}

/// The context a detector sees for a single ingested request: the raw
/// payload plus the identity of the persisted log row it came from.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub log_id: i64,
    pub api_id: i64,
    pub timestamp: DateTime<Utc>,
    pub method: String,
    pub endpoint: String,
    pub client_ip: IpAddr,
    pub status_code: Option<i32>,
    pub latency_ms: Option<f64>,
    pub headers: Option<serde_json::Value>,
    pub body_size: i64,
    pub user_agent: Option<String>,
}

/// A single detector's verdict on one request.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub detector: &'static str,
    pub score: f64,
    pub reason: String,
    #[serde(skip)]
    pub metadata: HashMap<String, String>,
}

/// Outcome of running the full detector pipeline over one request.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub is_suspicious: bool,
    pub risk_score: f64,
    pub detections: Vec<Detection>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AlertRow {
    pub id: i64,
    pub api_id: i64,
    pub alert_type: String,
    pub severity: String,
    pub title: String,
    pub description: String,
    pub risk_score: f64,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
    pub muted: bool,
}

#[derive(Debug, Clone)]
pub struct NewAlert {
    pub api_id: i64,
    pub alert_type: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub risk_score: f64,
}

/// Event broadcast to live-bus subscribers after each ingest call. Uses
/// serde's internally-tagged representation so the wire shape stays flat —
/// `{"type":"request_log", "id":.., ...}` — matching the original's plain
/// dict broadcast rather than nesting the fields under a `data` key.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum LiveEvent {
    #[serde(rename = "request_log")]
    RequestLog {
        id: i64,
        api_id: i64,
        ts: f64,
        method: String,
        endpoint: String,
        client_ip: String,
        status_code: Option<i32>,
        is_suspicious: bool,
        risk_score: f64,
    },
    #[serde(rename = "alert")]
    Alert {
        id: i64,
        api_id: i64,
        severity: String,
        title: String,
        risk_score: f64,
    },
}

/// A persisted ML model blob: the fitted forest plus the feature scaler it
/// was trained with, always read and written together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlModelBlob {
    pub forest: extended_isolation_forest::Forest<f64, 6>,
    pub scaler: FeatureScaler,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureScaler {
    pub mean: [f64; 6],
    pub std: [f64; 6],
}

impl FeatureScaler {
    pub fn transform(&self, features: &[f64; 6]) -> [f64; 6] {
        let mut out = [0.0; 6];
        for i in 0..6 {
            let std = if self.std[i].abs() < 1e-9 { 1.0 } else { self.std[i] };
            out[i] = (features[i] - self.mean[i]) / std;
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct IpListEntry {
    pub ip: IpAddr,
    pub reason: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}
