use extended_isolation_forest::{Forest, ForestOptions};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::types::{FeatureScaler, MlModelBlob};

/// Fixed training seed, matching the original's `random_state=42` — training
/// is idempotent: the same input rows must yield a forest with identical
/// predictions on retrain.
const TRAINING_SEED: u64 = 42;

/// Fits a fresh Isolation Forest plus the feature scaler it was trained
/// with. Runs on a blocking thread pool — fitting is CPU-bound and must
/// never block the async ingest path.
pub fn train(samples: &[[f64; 6]], contamination: f64) -> anyhow::Result<MlModelBlob> {
    let scaler = fit_scaler(samples);
    let scaled: Vec<[f64; 6]> = samples.iter().map(|s| scaler.transform(s)).collect();

    let options = ForestOptions {
        n_trees: 100,
        sample_size: scaled.len().min(256),
        max_tree_depth: None,
        extension_level: 5,
    };

    let mut rng = StdRng::seed_from_u64(TRAINING_SEED);
    let forest = Forest::from_slice_with_rng(&scaled, &options, &mut rng)
        .map_err(|e| anyhow::anyhow!("failed to fit isolation forest: {e}"))?;

    let _ = contamination; // kept for parity with the config surface; the
                           // crate derives an anomaly score rather than a
                           // hard contamination cutoff, so thresholding
                           // happens at score time in the detector.

    Ok(MlModelBlob { forest, scaler })
}

/// Anomaly score in `[0, 1]`; values close to 1 indicate an anomaly.
pub fn score(model: &MlModelBlob, features: &[f64; 6]) -> f64 {
    let scaled = model.scaler.transform(features);
    model.forest.score(&scaled)
}

fn fit_scaler(samples: &[[f64; 6]]) -> FeatureScaler {
    let n = samples.len() as f64;
    let mut mean = [0.0; 6];
    for sample in samples {
        for i in 0..6 {
            mean[i] += sample[i];
        }
    }
    for m in &mut mean {
        *m /= n;
    }

    let mut variance = [0.0; 6];
    for sample in samples {
        for i in 0..6 {
            variance[i] += (sample[i] - mean[i]).powi(2);
        }
    }
    let mut std = [0.0; 6];
    for i in 0..6 {
        std[i] = (variance[i] / n).sqrt();
    }

    FeatureScaler { mean, std }
}

pub fn encode(blob: &MlModelBlob) -> anyhow::Result<Vec<u8>> {
    Ok(bincode::serialize(blob)?)
}

pub fn decode(bytes: &[u8]) -> anyhow::Result<MlModelBlob> {
    Ok(bincode::deserialize(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(v: f64) -> [f64; 6] {
        [v, v, 0.0, v, v % 24.0, v % 7.0]
    }

    #[test]
    fn train_and_score_round_trip() {
        let samples: Vec<[f64; 6]> = (0..200).map(|i| sample(i as f64 % 50.0)).collect();
        let model = train(&samples, 0.1).expect("training should succeed");

        let normal_score = score(&model, &sample(25.0));
        let outlier_score = score(&model, &sample(10_000.0));

        assert!(outlier_score >= normal_score);
    }

    #[test]
    fn blob_encodes_and_decodes() {
        let samples: Vec<[f64; 6]> = (0..150).map(|i| sample(i as f64 % 30.0)).collect();
        let model = train(&samples, 0.1).unwrap();
        let bytes = encode(&model).unwrap();
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.scaler.mean, model.scaler.mean);
    }
}
