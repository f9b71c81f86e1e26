use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use super::predictor::RulPredictor;
use crate::config::ModelConfig;
use crate::data::SensorTable;
use crate::error::{MLError, PredictError};

/// Engine status for `/health`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineStatus {
    pub model_loaded: bool,
    pub model_version: String,
    pub sequence_length: usize,
    pub n_features: usize,
    pub inference_count: u64,
    pub avg_latency_ms: f64,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
}

struct Loaded {
    predictor: RulPredictor,
    loaded_at: chrono::DateTime<chrono::Utc>,
}

pub struct MLEngine {
    config: ModelConfig,
    current: ArcSwap<Loaded>,
    latency_sum_us: AtomicU64,
    inference_count: AtomicU64,
}

impl MLEngine {
    pub fn new(config: &ModelConfig) -> Result<Self, MLError> {
        let predictor = RulPredictor::load(config)?;
        info!(
            "ML Engine initialized with model {} (window {})",
            predictor.model_version(),
            predictor.sequence_length()
        );
        Ok(Self::with_predictor(config.clone(), predictor))
    }

    pub fn with_predictor(config: ModelConfig, predictor: RulPredictor) -> Self {
        Self {
            config,
            current: ArcSwap::from_pointee(Loaded {
                predictor,
                loaded_at: chrono::Utc::now(),
            }),
            latency_sum_us: AtomicU64::new(0),
            inference_count: AtomicU64::new(0),
        }
    }

    /// Re-reads model and scaler from disk. The running predictor keeps
    /// serving until the new one is fully loaded; on failure it stays.
    pub fn reload(&self) -> Result<String, MLError> {
        info!("Reloading model artifacts");
        let predictor = RulPredictor::load(&self.config)?;
        let version = predictor.model_version().to_string();

        self.current.store(Arc::new(Loaded {
            predictor,
            loaded_at: chrono::Utc::now(),
        }));

        info!("Model {} swapped in", version);
        Ok(version)
    }

    pub fn predict(&self, table: &SensorTable) -> Result<f64, PredictError> {
        let loaded = self.current.load_full();
        let started = Instant::now();

        let result = loaded.predictor.predict(table);

        let elapsed = started.elapsed();
        metrics::histogram!("rul_inference_seconds").record(elapsed.as_secs_f64());
        if result.is_ok() {
            self.latency_sum_us
                .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
            self.inference_count.fetch_add(1, Ordering::Relaxed);
        }
        debug!("Inference finished in {:?}", elapsed);

        result
    }

    /// Runs [`MLEngine::predict`] on the blocking pool.
    pub async fn predict_blocking(
        self: &Arc<Self>,
        table: SensorTable,
    ) -> Result<f64, PredictError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.predict(&table))
            .await
            .map_err(|e| MLError::InferenceError(format!("inference task failed: {}", e)))?
    }

    pub fn status(&self) -> EngineStatus {
        let loaded = self.current.load();
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        let count = self.inference_count.load(Ordering::Relaxed);
        let avg = if count > 0 {
            (sum as f64 / count as f64) / 1000.0
        } else {
            0.0
        };

        EngineStatus {
            model_loaded: true,
            model_version: loaded.predictor.model_version().to_string(),
            sequence_length: loaded.predictor.sequence_length(),
            n_features: loaded.predictor.n_features(),
            inference_count: count,
            avg_latency_ms: avg,
            loaded_at: loaded.loaded_at,
        }
    }

    pub fn sequence_length(&self) -> usize {
        self.current.load().predictor.sequence_length()
    }
}
