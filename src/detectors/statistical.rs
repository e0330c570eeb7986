use async_trait::async_trait;
use std::collections::HashMap;

use super::Detector;
use crate::error::DetectorResult;
use crate::store::Store;
use crate::types::{Detection, RequestContext};

const SAMPLE_LIMIT: i64 = 100;
const MIN_SAMPLES: usize = 30;

/// Flags requests whose latency is a statistical outlier against the API's
/// recent latency distribution, via a population z-score.
pub struct StatisticalDetector {
    store: Store,
    z_threshold: f64,
    severity_weight: f64,
}

impl StatisticalDetector {
    pub fn new(store: Store, z_threshold: f64, severity_weight: f64) -> Self {
        Self {
            store,
            z_threshold,
            severity_weight,
        }
    }
}

pub fn mean_std(samples: &[f64]) -> (f64, f64) {
    let n = samples.len() as f64;
    let mean = samples.iter().sum::<f64>() / n;
    let variance = samples.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[async_trait]
impl Detector for StatisticalDetector {
    fn name(&self) -> &'static str {
        "latency_spike"
    }

    async fn evaluate(&self, ctx: &RequestContext) -> DetectorResult<Vec<Detection>> {
        let Some(latency) = ctx.latency_ms else {
            return Ok(Vec::new());
        };

        let samples = self.store.recent_latencies(ctx.api_id, SAMPLE_LIMIT).await?;
        if samples.len() < MIN_SAMPLES {
            return Ok(Vec::new());
        }

        let (mean, std) = mean_std(&samples);
        if std < 1e-9 {
            return Ok(Vec::new());
        }

        let z = (latency - mean) / std;
        if z.abs() < self.z_threshold {
            return Ok(Vec::new());
        }

        let score = (self.severity_weight * (z.abs() / self.z_threshold)).min(10.0);
        let mut metadata = HashMap::new();
        metadata.insert("z_score".to_string(), format!("{z:.2}"));
        metadata.insert("latency_ms".to_string(), format!("{latency:.2}"));

        Ok(vec![Detection {
            detector: "latency_spike",
            score,
            reason: format!(
                "latency {latency:.1}ms is {z:.1} standard deviations from baseline {mean:.1}ms"
            ),
            metadata,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_std_of_uniform_samples_is_zero_std() {
        let samples = vec![10.0; 40];
        let (mean, std) = mean_std(&samples);
        assert_eq!(mean, 10.0);
        assert_eq!(std, 0.0);
    }

    #[test]
    fn mean_std_detects_spread() {
        let mut samples = vec![10.0; 39];
        samples.push(500.0);
        let (mean, std) = mean_std(&samples);
        assert!(mean > 10.0);
        assert!(std > 0.0);
    }
}
