use axum::extract::State;
use axum::Json;
use chrono::{DateTime, TimeZone, Utc};
use metrics::{counter, histogram};
use std::time::Instant;
use tracing::instrument;

use super::AppState;
use crate::error::IngestError;
use crate::types::{IngestRequest, IngestResponse, LiveEvent, RequestContext};

/// `POST /api/ingest` — the single entry point every monitored API's
/// middleware calls after handling a request. Validates the API key,
/// persists the request log, runs it through the detection engine, and
/// broadcasts the outcome to live-bus subscribers.
#[instrument(skip(state, payload), fields(endpoint = %payload.endpoint))]
pub async fn ingest(
    State(state): State<AppState>,
    Json(payload): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, IngestError> {
    let started_at = Instant::now();
    counter!("ingest_requests_total", 1);

    let api = state
        .store
        .get_api_by_key(&payload.api_key)
        .await?
        .ok_or(IngestError::UnknownApiKey)?;

    if !api.is_active {
        return Err(IngestError::ApiInactive);
    }

    let timestamp: DateTime<Utc> = Utc
        .timestamp_opt(payload.timestamp as i64, 0)
        .single()
        .unwrap_or_else(Utc::now);

    let body_size = payload.body_size.unwrap_or(0);

    let log_id = state
        .store
        .insert_request_log(
            api.id,
            timestamp,
            &payload.method,
            &payload.endpoint,
            payload.client_ip,
            payload.status_code,
            payload.latency_ms,
            payload.headers.clone(),
            body_size,
            payload.user_agent.as_deref(),
        )
        .await?;

    let ctx = RequestContext {
        log_id,
        api_id: api.id,
        timestamp,
        method: payload.method.clone(),
        endpoint: payload.endpoint.clone(),
        client_ip: payload.client_ip,
        status_code: payload.status_code,
        latency_ms: payload.latency_ms,
        headers: payload.headers.clone(),
        body_size,
        user_agent: payload.user_agent.clone(),
    };

    let result = state.engine.analyze_request(&ctx).await;

    state.live_bus.publish(LiveEvent::RequestLog {
        id: log_id,
        api_id: api.id,
        ts: payload.timestamp,
        method: payload.method,
        endpoint: payload.endpoint,
        client_ip: payload.client_ip.to_string(),
        status_code: payload.status_code,
        is_suspicious: result.is_suspicious,
        risk_score: result.risk_score,
    });

    histogram!("ingest_duration_seconds", started_at.elapsed().as_secs_f64());

    Ok(Json(IngestResponse {
        status: "success",
        log_id,
        is_suspicious: result.is_suspicious,
        risk_score: result.risk_score,
    }))
}

/// Lightweight liveness probe for the ingest surface, distinct from
/// `/health` — callers use this to confirm the ingest route itself is
/// reachable before wiring up telemetry.
pub async fn ingest_test() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
