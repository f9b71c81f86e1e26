use tracing::{debug, warn};

use super::models::{LSTMModel, RulModel};
use super::scaler::Scaler;
use super::window::SensorWindow;
use crate::config::ModelConfig;
use crate::data::{SensorTable, REQUIRED_FEATURES};
use crate::error::{MLError, PredictError};

/// Selection, scaling, windowing and a single forward pass, in that order.
pub struct RulPredictor {
    model: Box<dyn RulModel>,
    scaler: Scaler,
    sequence_length: usize,
}

impl RulPredictor {
    pub fn new(
        model: Box<dyn RulModel>,
        scaler: Scaler,
        sequence_length: usize,
    ) -> Result<Self, MLError> {
        if model.input_size() != scaler.n_features() {
            return Err(MLError::ShapeMismatch {
                context: "model input vs scaler".to_string(),
                expected: scaler.n_features(),
                actual: model.input_size(),
            });
        }
        if sequence_length == 0 {
            return Err(MLError::ModelLoadError(
                "sequence length must be positive".to_string(),
            ));
        }

        Ok(Self {
            model,
            scaler,
            sequence_length,
        })
    }

    pub fn load(config: &ModelConfig) -> Result<Self, MLError> {
        let model = LSTMModel::load_from_file(&config.model_path)?;
        if let Some(trained) = model.sequence_length {
            if trained != config.sequence_length {
                warn!(
                    "Model was exported with sequence length {} but {} is configured",
                    trained, config.sequence_length
                );
            }
        }
        let scaler = Scaler::load_from_file(&config.scaler_path)?;
        debug!("Using {} scaler over {} features", scaler.kind(), scaler.n_features());

        Self::new(Box::new(model), scaler, config.sequence_length)
    }

    pub fn model_version(&self) -> &str {
        self.model.model_version()
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn n_features(&self) -> usize {
        self.scaler.n_features()
    }

    pub fn prepare(&self, table: &SensorTable) -> Result<SensorWindow, PredictError> {
        let selected = table.select(&REQUIRED_FEATURES)?;
        let scaled = self.scaler.transform(&selected)?;
        let window = SensorWindow::from_scaled(&scaled, self.sequence_length);

        debug!(
            "Prepared window from {} rows ({} observed, {} padded)",
            table.len(),
            window.observed(),
            window.sequence_length() - window.observed()
        );
        Ok(window)
    }

    pub fn predict(&self, table: &SensorTable) -> Result<f64, PredictError> {
        let window = self.prepare(table)?;
        Ok(self.model.predict(&window)?)
    }
}
