use arc_swap::ArcSwapOption;
use chrono::{Datelike, Timelike};
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::model;
use crate::error::DetectorError;
use crate::store::Store;
use crate::types::MlModelBlob;

const MIN_TRAINING_SAMPLES: usize = 100;
const TRAINING_SAMPLE_LIMIT: i64 = 1000;

/// Per-API hot-swappable model cache plus a non-blocking async training
/// pipeline. Readers hold an `Arc<MlModelBlob>` snapshot for the whole
/// scoring call, so a concurrent retrain can never hand back a model paired
/// with the wrong scaler — the swap replaces the pair atomically.
#[derive(Clone)]
pub struct MlEngine {
    store: Store,
    models: Arc<DashMap<i64, Arc<ArcSwapOption<MlModelBlob>>>>,
    training_inflight: Arc<DashMap<i64, ()>>,
    contamination: f64,
}

impl MlEngine {
    pub fn new(store: Store, contamination: f64) -> Self {
        Self {
            store,
            models: Arc::new(DashMap::new()),
            training_inflight: Arc::new(DashMap::new()),
            contamination,
        }
    }

    /// Loads a persisted model into the cache at startup, if one exists.
    pub async fn warm_start(&self, api_id: i64) -> Result<(), DetectorError> {
        if let Some(bytes) = self.store.load_ml_model(api_id).await? {
            match model::decode(&bytes) {
                Ok(blob) => self.install(api_id, blob),
                Err(e) => warn!(api_id, error = %e, "failed to decode persisted model"),
            }
        }
        Ok(())
    }

    fn install(&self, api_id: i64, blob: MlModelBlob) {
        let slot = self
            .models
            .entry(api_id)
            .or_insert_with(|| Arc::new(ArcSwapOption::empty()))
            .clone();
        slot.store(Some(Arc::new(blob)));
    }

    fn snapshot(&self, api_id: i64) -> Option<Arc<MlModelBlob>> {
        self.models.get(&api_id).and_then(|slot| slot.load_full())
    }

    /// Scores a request against the cached model for `api_id`. Returns
    /// `None` if no model exists yet, in which case the caller should also
    /// call `trigger_training`.
    pub async fn score(
        &self,
        api_id: i64,
        features: [f64; 6],
    ) -> Result<Option<f64>, DetectorError> {
        let Some(blob) = self.snapshot(api_id) else {
            return Ok(None);
        };

        let score = tokio::task::spawn_blocking(move || model::score(&blob, &features))
            .await
            .map_err(|_| DetectorError::ModelUnavailable)?;

        Ok(Some(score))
    }

    pub fn has_model(&self, api_id: i64) -> bool {
        self.snapshot(api_id).is_some()
    }

    /// Spawns a background training task for `api_id` unless one is already
    /// running, so concurrent triggers for the same API coalesce into a
    /// single training run instead of racing each other.
    #[instrument(skip(self))]
    pub fn trigger_training(&self, api_id: i64) {
        if self.training_inflight.insert(api_id, ()).is_some() {
            return;
        }

        let engine = self.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.train(api_id).await {
                warn!(api_id, error = %e, "ml model training failed");
            }
            engine.training_inflight.remove(&api_id);
        });
    }

    async fn train(&self, api_id: i64) -> anyhow::Result<()> {
        let rows = self
            .store
            .training_features(api_id, TRAINING_SAMPLE_LIMIT)
            .await?;

        if rows.len() < MIN_TRAINING_SAMPLES {
            return Ok(());
        }

        let samples: Vec<[f64; 6]> = rows
            .iter()
            .map(|row| {
                let is_error = row.status_code.map(|c| c >= 400).unwrap_or(false) as u8 as f64;
                [
                    row.latency_ms.unwrap_or(0.0),
                    row.body_size.unwrap_or(0) as f64,
                    is_error,
                    row.endpoint.len() as f64,
                    row.timestamp.hour() as f64,
                    row.timestamp.weekday().num_days_from_monday() as f64,
                ]
            })
            .collect();

        let contamination = self.contamination;
        let blob = tokio::task::spawn_blocking(move || model::train(&samples, contamination))
            .await??;

        let bytes = model::encode(&blob)?;
        self.store.upsert_ml_model(api_id, &bytes).await?;
        self.install(api_id, blob);

        info!(api_id, samples = rows.len(), "trained ml model");
        Ok(())
    }

    /// Periodic retraining tick: triggers (coalesced) retraining for every
    /// API the caller currently knows about. Call this on a timer from the
    /// service's background task set.
    pub fn retrain_tick(&self, known_apis: &[i64]) {
        for &api_id in known_apis {
            self.trigger_training(api_id);
        }
    }
}
