use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

/// Installs the Prometheus recorder and binds its scrape endpoint on its own
/// address, separate from the ingest/live-bus listener — observability
/// traffic and data-plane traffic never share a port.
pub fn install(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    describe_metrics();
    info!(%addr, "prometheus metrics endpoint installed");
    Ok(())
}

fn describe_metrics() {
    describe_counter!("ingest_requests_total", "Total ingest requests accepted");
    describe_histogram!(
        "ingest_duration_seconds",
        "Ingest request handling latency, auth through broadcast"
    );
    describe_counter!(
        "detector_hits_rate_limit",
        "Rate-limit detector hits"
    );
    describe_counter!(
        "detector_hits_ip_blacklist",
        "IP blacklist detector hits"
    );
    describe_counter!(
        "detector_hits_attack_signature",
        "Attack signature detector hits"
    );
    describe_counter!("detector_hits_error_rate", "Error-rate detector hits");
    describe_counter!(
        "detector_hits_latency_spike",
        "Latency-spike detector hits"
    );
    describe_counter!("detector_hits_ml_anomaly", "ML anomaly detector hits");
    describe_gauge!("last_risk_score", "Most recently computed request risk score");
    describe_counter!(
        "suspicious_requests_total",
        "Requests flagged suspicious by the detection engine"
    );
    describe_counter!("alerts_created_critical_total", "Critical alerts created");
    describe_counter!("alerts_created_medium_total", "Medium alerts created");
    describe_counter!(
        "alert_notifications_email_sent_total",
        "Alert emails delivered successfully"
    );
    describe_counter!(
        "alert_notifications_email_failed_total",
        "Alert emails that failed to deliver"
    );
    describe_counter!(
        "alert_notifications_webhook_sent_total",
        "Alert webhooks delivered successfully"
    );
    describe_counter!(
        "alert_notifications_webhook_failed_total",
        "Alert webhooks that failed to deliver"
    );
}
