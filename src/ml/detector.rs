use async_trait::async_trait;
use std::collections::HashMap;

use super::{engine::MlEngine, features};
use crate::detectors::Detector;
use crate::error::DetectorResult;
use crate::types::{Detection, RequestContext};

/// Anomaly threshold above which a score is treated as a detection. The
/// isolation forest score returned by the underlying crate sits in
/// `[0, 1]`, with values near 1 indicating an anomaly.
const ANOMALY_SCORE_THRESHOLD: f64 = 0.65;

pub struct MlDetector {
    engine: MlEngine,
    severity_weight: f64,
}

impl MlDetector {
    pub fn new(engine: MlEngine, severity_weight: f64) -> Self {
        Self {
            engine,
            severity_weight,
        }
    }
}

#[async_trait]
impl Detector for MlDetector {
    fn name(&self) -> &'static str {
        "ml_anomaly"
    }

    async fn evaluate(&self, ctx: &RequestContext) -> DetectorResult<Vec<Detection>> {
        if !self.engine.has_model(ctx.api_id) {
            // First encounter for this API: kick off training and report no
            // detection for this request, same as the original's lazy
            // per-API training trigger.
            self.engine.trigger_training(ctx.api_id);
            return Ok(Vec::new());
        }

        let feature_vector = features::extract(ctx);
        let Some(score) = self.engine.score(ctx.api_id, feature_vector).await? else {
            return Ok(Vec::new());
        };

        if score < ANOMALY_SCORE_THRESHOLD {
            return Ok(Vec::new());
        }

        // The score is the fixed detector weight, not graduated by how far
        // past the threshold the anomaly score sits — matching
        // `detection_engine.py`'s `score = self.severity_weight` on an
        // anomaly classification. The raw anomaly score is kept in metadata
        // only, for observability.
        let mut metadata = HashMap::new();
        metadata.insert("anomaly_score".to_string(), format!("{score:.3}"));

        Ok(vec![Detection {
            detector: "ml_anomaly",
            score: self.severity_weight,
            reason: format!("isolation forest anomaly score {score:.3} exceeds threshold"),
            metadata,
        }])
    }
}
