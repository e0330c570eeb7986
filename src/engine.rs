use metrics::{counter, gauge};
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::alerts::AlertService;
use crate::detectors::Detector;
use crate::error::StoreResult;
use crate::live_bus::LiveBus;
use crate::store::Store;
use crate::types::{Detection, DetectionResult, LiveEvent, NewAlert, RequestContext, Severity};

const SUSPICIOUS_THRESHOLD: f64 = 5.0;

/// Orchestrates the detector pipeline: runs every registered detector
/// against a request, aggregates the resulting risk score (capped at 10),
/// and creates at most one alert per request at the severity implied by the
/// aggregate score. Detectors are held as trait objects so the engine never
/// needs to know how many of each kind exist or what they individually do —
/// constructor injection resolves the engine/alert-service cycle: the
/// engine is built after the alert service and holds a reference to it,
/// rather than the two holding `Arc`s back to each other.
pub struct DetectionEngine {
    detectors: Vec<Box<dyn Detector>>,
    store: Store,
    alert_service: Arc<AlertService>,
    live_bus: LiveBus,
    high_severity_threshold: f64,
    medium_severity_threshold: f64,
}

impl DetectionEngine {
    pub fn new(
        detectors: Vec<Box<dyn Detector>>,
        store: Store,
        alert_service: Arc<AlertService>,
        live_bus: LiveBus,
        high_severity_threshold: f64,
        medium_severity_threshold: f64,
    ) -> Self {
        Self {
            detectors,
            store,
            alert_service,
            live_bus,
            high_severity_threshold,
            medium_severity_threshold,
        }
    }

    #[instrument(skip(self, ctx), fields(api_id = ctx.api_id, log_id = ctx.log_id))]
    pub async fn analyze_request(&self, ctx: &RequestContext) -> DetectionResult {
        let mut detections: Vec<Detection> = Vec::new();

        for detector in &self.detectors {
            // A single detector's failure (store hiccup, model unavailable)
            // never fails the request — it's treated as "no detection" and
            // logged, so one misbehaving detector can't take down ingest.
            match detector.evaluate(ctx).await {
                Ok(hits) => {
                    for hit in &hits {
                        counter!(detector_hit_metric_name(hit.detector), 1);
                    }
                    detections.extend(hits);
                }
                Err(e) => {
                    warn!(detector = detector.name(), error = %e, "detector evaluation failed");
                }
            }
        }

        let risk_score = detections.iter().map(|d| d.score).sum::<f64>().min(10.0);
        let is_suspicious = risk_score >= SUSPICIOUS_THRESHOLD;
        gauge!("last_risk_score", risk_score);

        if is_suspicious {
            counter!("suspicious_requests_total", 1);
            if let Err(e) = self.store.mark_suspicious(ctx.log_id).await {
                warn!(error = %e, "failed to mark request log suspicious");
            }
        }

        if !detections.is_empty() {
            if let Err(e) = self.maybe_create_alert(ctx, &detections, risk_score).await {
                warn!(error = %e, "failed to create alert");
            }
        }

        DetectionResult {
            is_suspicious,
            risk_score,
            detections,
        }
    }

    async fn maybe_create_alert(
        &self,
        ctx: &RequestContext,
        detections: &[Detection],
        risk_score: f64,
    ) -> StoreResult<()> {
        let severity = if risk_score >= self.high_severity_threshold {
            Severity::Critical
        } else if risk_score >= self.medium_severity_threshold {
            Severity::Medium
        } else {
            return Ok(());
        };

        let alert_type = if detections.len() > 1 {
            "multi_threat".to_string()
        } else {
            detections[0].detector.to_string()
        };

        let reasons: Vec<&str> = detections.iter().map(|d| d.reason.as_str()).collect();
        let title = format!(
            "{}: {} threats detected",
            severity.to_string().to_uppercase(),
            detections.len()
        );
        let description = reasons.join("; ");

        let alert = NewAlert {
            api_id: ctx.api_id,
            alert_type,
            severity,
            title,
            description,
            risk_score,
        };

        let row = self.store.create_alert(&alert).await?;

        match severity {
            Severity::Critical => counter!("alerts_created_critical_total", 1),
            Severity::Medium => counter!("alerts_created_medium_total", 1),
            _ => {}
        }

        // Broadcast precedes the side-channel dispatch, matching the
        // ordering guarantee that an alert's broadcast and its
        // notification both follow the insert that produced its id.
        self.live_bus.publish(LiveEvent::Alert {
            id: row.id,
            api_id: row.api_id,
            severity: row.severity.clone(),
            title: row.title.clone(),
            risk_score: row.risk_score,
        });

        self.alert_service.dispatch(&row).await;
        Ok(())
    }
}

/// Static per-detector counter name, mirroring `waf.rs`'s one-literal-per-
/// condition style rather than a dynamically labeled metric.
fn detector_hit_metric_name(detector: &'static str) -> &'static str {
    match detector {
        "rate_limit" => "detector_hits_rate_limit",
        "ip_blacklist" => "detector_hits_ip_blacklist",
        "attack_signature" => "detector_hits_attack_signature",
        "error_rate" => "detector_hits_error_rate",
        "latency_spike" => "detector_hits_latency_spike",
        "ml_anomaly" => "detector_hits_ml_anomaly",
        _ => "detector_hits_other",
    }
}
