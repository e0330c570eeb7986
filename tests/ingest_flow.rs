//! Integration tests for the ingest -> detection engine -> alert path.
//!
//! These exercise the detector pipeline and window/alert plumbing directly
//! (the same units `main.rs` wires together), rather than standing up a
//! Postgres instance and an HTTP listener — there is no live database in
//! this environment, so the store-backed detectors are exercised at the
//! unit level inside their own modules, and this file covers the parts of
//! the six scenarios that don't require a database: sliding-window rate
//! limiting, attack-signature compounding, and the live bus.

use std::net::IpAddr;

use boing_sentryd::detectors::attack_signature::AttackSignatureDetector;
use boing_sentryd::detectors::rate_limit::RateLimitDetector;
use boing_sentryd::detectors::Detector;
use boing_sentryd::live_bus::LiveBus;
use boing_sentryd::types::{LiveEvent, RequestContext};
use boing_sentryd::window::WindowStore;

fn ctx(endpoint: &str, ip: &str) -> RequestContext {
    RequestContext {
        log_id: 1,
        api_id: 1,
        timestamp: chrono::Utc::now(),
        method: "GET".into(),
        endpoint: endpoint.into(),
        client_ip: ip.parse::<IpAddr>().unwrap(),
        status_code: Some(200),
        latency_ms: Some(12.0),
        headers: None,
        body_size: 0,
        user_agent: None,
    }
}

// Scenario: sustained request flood from one client trips the rate-limit
// detector once the sliding window exceeds the configured threshold.
#[tokio::test]
async fn request_flood_triggers_rate_limit_detection() {
    let detector = RateLimitDetector::new(WindowStore::new(), 10, 60, 7.0);

    let mut triggered = false;
    for _ in 0..15 {
        let hits = detector.evaluate(&ctx("/v1/orders", "203.0.113.5")).await.unwrap();
        if !hits.is_empty() {
            triggered = true;
        }
    }
    assert!(triggered, "rate limit detector should fire once threshold is exceeded");
}

// Scenario: a compound attack (path traversal + XSS in the same request)
// yields one detection per matching family, not just the first.
#[tokio::test]
async fn compound_attack_yields_multiple_detections() {
    let detector = AttackSignatureDetector::new(9.0);
    let request = ctx(
        "/v1/files?path=../../etc/passwd&q=<script>alert(1)</script>",
        "203.0.113.9",
    );
    let hits = detector.evaluate(&request).await.unwrap();
    assert!(hits.len() >= 2, "expected detections for both attack families");
}

// Scenario: distinct clients never interfere with each other's sliding
// window counts.
#[tokio::test]
async fn separate_clients_have_independent_windows() {
    let detector = RateLimitDetector::new(WindowStore::new(), 3, 60, 7.0);

    for _ in 0..3 {
        let hits = detector.evaluate(&ctx("/v1/orders", "203.0.113.10")).await.unwrap();
        assert!(hits.is_empty());
    }

    let hits = detector.evaluate(&ctx("/v1/orders", "203.0.113.11")).await.unwrap();
    assert!(hits.is_empty(), "a fresh client should not inherit another client's count");
}

// Scenario: live bus subscribers get best-effort delivery and are dropped
// on overflow rather than stalling the publisher.
#[tokio::test]
async fn live_bus_delivers_to_active_subscribers() {
    let bus = LiveBus::new();
    let (_id, mut rx) = bus.subscribe();

    bus.publish(LiveEvent::RequestLog {
        id: 1,
        api_id: 1,
        ts: 0.0,
        method: "GET".into(),
        endpoint: "/v1/orders".into(),
        client_ip: "203.0.113.5".into(),
        status_code: Some(200),
        is_suspicious: true,
        risk_score: 6.5,
    });

    let received = rx.recv().await.expect("subscriber should receive the event");
    match received {
        LiveEvent::RequestLog { is_suspicious, risk_score, .. } => {
            assert!(is_suspicious);
            assert_eq!(risk_score, 6.5);
        }
        _ => panic!("unexpected event variant"),
    }
}
