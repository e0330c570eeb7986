use async_trait::async_trait;
use std::collections::HashMap;

use super::Detector;
use crate::error::DetectorResult;
use crate::store::Store;
use crate::types::{Detection, RequestContext};

/// Flags a client whose error rate over a trailing window exceeds a
/// fraction threshold. Only evaluated when the current request itself is an
/// error, matching the original's "only check on 4xx/5xx" gate, and only
/// once the window has accumulated enough samples to be meaningful.
pub struct ErrorRateDetector {
    store: Store,
    threshold: f64,
    window_seconds: i64,
    severity_weight: f64,
    min_samples: i64,
}

impl ErrorRateDetector {
    pub fn new(
        store: Store,
        threshold: f64,
        window_seconds: i64,
        severity_weight: f64,
        min_samples: i64,
    ) -> Self {
        Self {
            store,
            threshold,
            window_seconds,
            severity_weight,
            min_samples,
        }
    }
}

#[async_trait]
impl Detector for ErrorRateDetector {
    fn name(&self) -> &'static str {
        "error_rate"
    }

    async fn evaluate(&self, ctx: &RequestContext) -> DetectorResult<Vec<Detection>> {
        let is_error = ctx.status_code.map(|c| c >= 400).unwrap_or(false);
        if !is_error {
            return Ok(Vec::new());
        }

        let since = ctx.timestamp - chrono::Duration::seconds(self.window_seconds);
        let (errors, total) = self.store.recent_error_count(ctx.api_id, since).await?;

        if total <= self.min_samples {
            return Ok(Vec::new());
        }

        let rate = errors as f64 / total as f64;
        if rate < self.threshold {
            return Ok(Vec::new());
        }

        let score = (self.severity_weight * rate / self.threshold).min(10.0);
        let mut metadata = HashMap::new();
        metadata.insert("errors".to_string(), errors.to_string());
        metadata.insert("total".to_string(), total.to_string());

        Ok(vec![Detection {
            detector: "error_rate",
            score,
            reason: format!(
                "error rate {:.2} ({errors}/{total}) exceeds threshold {:.2}",
                rate, self.threshold
            ),
            metadata,
        }])
    }
}
