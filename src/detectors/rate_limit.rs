use async_trait::async_trait;
use std::collections::HashMap;

use super::Detector;
use crate::error::DetectorResult;
use crate::types::{Detection, RequestContext};
use crate::window::WindowStore;

/// Counts requests per `(api_id, client_ip)` in a sliding window and scores
/// proportionally to how far the count exceeds the configured threshold,
/// capped at 10.0.
pub struct RateLimitDetector {
    windows: WindowStore,
    threshold: u32,
    window_seconds: i64,
    severity_weight: f64,
}

impl RateLimitDetector {
    pub fn new(
        windows: WindowStore,
        threshold: u32,
        window_seconds: i64,
        severity_weight: f64,
    ) -> Self {
        Self {
            windows,
            threshold,
            window_seconds,
            severity_weight,
        }
    }
}

#[async_trait]
impl Detector for RateLimitDetector {
    fn name(&self) -> &'static str {
        "rate_limit"
    }

    async fn evaluate(&self, ctx: &RequestContext) -> DetectorResult<Vec<Detection>> {
        let count = self.windows.record_and_count(
            ctx.api_id,
            ctx.client_ip,
            ctx.timestamp,
            self.window_seconds,
        );

        if count as u32 <= self.threshold {
            return Ok(Vec::new());
        }

        let score = (self.severity_weight * count as f64 / self.threshold as f64).min(10.0);
        let mut metadata = HashMap::new();
        metadata.insert("count".to_string(), count.to_string());
        metadata.insert("threshold".to_string(), self.threshold.to_string());

        Ok(vec![Detection {
            detector: "rate_limit",
            score,
            reason: format!(
                "{count} requests from {} in {}s exceeds threshold {}",
                ctx.client_ip, self.window_seconds, self.threshold
            ),
            metadata,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn ctx(ip: &str) -> RequestContext {
        RequestContext {
            log_id: 1,
            api_id: 1,
            timestamp: Utc::now(),
            method: "GET".into(),
            endpoint: "/v1/widgets".into(),
            client_ip: ip.parse().unwrap(),
            status_code: Some(200),
            latency_ms: Some(10.0),
            headers: None,
            body_size: 0,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn allows_requests_under_threshold() {
        let detector = RateLimitDetector::new(WindowStore::new(), 5, 60, 7.0);
        for _ in 0..5 {
            let result = detector.evaluate(&ctx("10.0.0.1")).await.unwrap();
            assert!(result.is_empty());
        }
    }

    #[tokio::test]
    async fn flags_requests_over_threshold() {
        let detector = RateLimitDetector::new(WindowStore::new(), 5, 60, 7.0);
        let mut last = Vec::new();
        for _ in 0..7 {
            last = detector.evaluate(&ctx("10.0.0.2")).await.unwrap();
        }
        let detection = last.first().expect("expected a detection once over threshold");
        assert_eq!(detection.detector, "rate_limit");
        assert!(detection.score > 0.0);
    }
}
