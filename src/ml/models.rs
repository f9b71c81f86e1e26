use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::{debug, info};

use super::window::SensorWindow;
use crate::error::MLError;

/// Anything that turns a scaled window into a remaining-useful-life estimate.
pub trait RulModel: Send + Sync {
    fn predict(&self, window: &SensorWindow) -> Result<f64, MLError>;
    fn model_version(&self) -> &str;
    fn input_size(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Sigmoid,
    HardSigmoid,
    Tanh,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::HardSigmoid => (0.2 * x + 0.5).clamp(0.0, 1.0),
            Activation::Tanh => x.tanh(),
        }
    }

    fn apply_vec(self, v: DVector<f64>) -> DVector<f64> {
        v.map(|x| self.apply(x))
    }
}

fn default_tanh() -> Activation {
    Activation::Tanh
}

fn default_sigmoid() -> Activation {
    Activation::Sigmoid
}

/// Layer description as exported from the training notebook.
/// Kernels are stored `input_dim x units` (gate-major for LSTM: i, f, c, o).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    Lstm {
        units: usize,
        #[serde(default)]
        return_sequences: bool,
        #[serde(default = "default_tanh")]
        activation: Activation,
        #[serde(default = "default_sigmoid")]
        recurrent_activation: Activation,
        kernel: Vec<Vec<f64>>,
        recurrent_kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
    },
    Dense {
        units: usize,
        #[serde(default)]
        activation: Activation,
        kernel: Vec<Vec<f64>>,
        bias: Vec<f64>,
    },
    Dropout {
        #[serde(default)]
        rate: f64,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelSpec {
    #[serde(default = "default_version")]
    pub model_version: String,
    #[serde(default)]
    pub sequence_length: Option<usize>,
    #[serde(default)]
    pub n_features: Option<usize>,
    pub layers: Vec<LayerSpec>,
}

fn default_version() -> String {
    "unversioned".to_string()
}

#[derive(Debug, Clone)]
pub struct LstmLayer {
    pub units: usize,
    pub return_sequences: bool,
    pub activation: Activation,
    pub recurrent_activation: Activation,
    /// `4*units x input_dim`
    pub input_weights: DMatrix<f64>,
    /// `4*units x units`
    pub hidden_weights: DMatrix<f64>,
    pub biases: DVector<f64>,
}

#[derive(Debug, Clone)]
pub struct DenseLayer {
    pub activation: Activation,
    /// `units x input_dim`
    pub weights: DMatrix<f64>,
    pub biases: DVector<f64>,
}

#[derive(Debug, Clone)]
pub enum Layer {
    Lstm(LstmLayer),
    Dense(DenseLayer),
}

/// Values flowing between layers: a full sequence, or only the last state.
enum Signal {
    Sequence(Vec<DVector<f64>>),
    Vector(DVector<f64>),
}

impl Signal {
    fn width(&self) -> usize {
        match self {
            Signal::Sequence(steps) => steps.first().map(|s| s.len()).unwrap_or(0),
            Signal::Vector(v) => v.len(),
        }
    }
}

impl LstmLayer {
    fn forward(&self, inputs: &[DVector<f64>]) -> Signal {
        let h_size = self.units;
        let mut h = DVector::zeros(h_size);
        let mut c = DVector::zeros(h_size);
        let mut outputs = Vec::with_capacity(if self.return_sequences { inputs.len() } else { 0 });

        for x in inputs {
            let z = &self.input_weights * x + &self.hidden_weights * &h + &self.biases;

            let i = self.recurrent_activation.apply_vec(z.rows(0, h_size).into_owned());
            let f = self.recurrent_activation.apply_vec(z.rows(h_size, h_size).into_owned());
            let g = self.activation.apply_vec(z.rows(2 * h_size, h_size).into_owned());
            let o = self.recurrent_activation.apply_vec(z.rows(3 * h_size, h_size).into_owned());

            c = f.component_mul(&c) + i.component_mul(&g);
            h = o.component_mul(&self.activation.apply_vec(c.clone()));

            if self.return_sequences {
                outputs.push(h.clone());
            }
        }

        if self.return_sequences {
            Signal::Sequence(outputs)
        } else {
            Signal::Vector(h)
        }
    }
}

impl DenseLayer {
    fn forward_one(&self, x: &DVector<f64>) -> DVector<f64> {
        self.activation
            .apply_vec(&self.weights * x + &self.biases)
    }
}

/// Converts a row-major `rows x cols` nested list into a transposed matrix,
/// so that `W * x` can be used for column-vector inputs.
fn transposed(name: &str, nested: &[Vec<f64>], cols: usize) -> Result<DMatrix<f64>, MLError> {
    if let Some(bad) = nested.iter().find(|row| row.len() != cols) {
        return Err(MLError::ShapeMismatch {
            context: name.to_string(),
            expected: cols,
            actual: bad.len(),
        });
    }
    let flat: Vec<f64> = nested.iter().flatten().copied().collect();
    Ok(DMatrix::from_row_slice(nested.len(), cols, &flat).transpose())
}

fn expect_len(context: &str, expected: usize, actual: usize) -> Result<(), MLError> {
    if expected != actual {
        return Err(MLError::ShapeMismatch {
            context: context.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct LSTMModel {
    pub model_version: String,
    pub input_size: usize,
    pub sequence_length: Option<usize>,
    pub layers: Vec<Layer>,
}

impl LSTMModel {
    pub fn load_from_file(path: &str) -> Result<Self, MLError> {
        info!("Loading LSTM model from {}", path);

        let content = fs::read_to_string(path)
            .map_err(|e| MLError::ModelLoadError(format!("{}: {}", path, e)))?;
        let spec: ModelSpec = serde_json::from_str(&content)
            .map_err(|e| MLError::ModelLoadError(format!("{}: {}", path, e)))?;

        let model = Self::from_spec(spec)?;
        info!(
            "Loaded model {} ({} layers, input size {})",
            model.model_version,
            model.layers.len(),
            model.input_size
        );
        Ok(model)
    }

    pub fn from_spec(spec: ModelSpec) -> Result<Self, MLError> {
        let mut layers = Vec::new();
        let mut input_size: Option<usize> = None;
        let mut width = spec.n_features;
        let mut yields_sequence = true;

        for (idx, layer) in spec.layers.into_iter().enumerate() {
            match layer {
                LayerSpec::Lstm {
                    units,
                    return_sequences,
                    activation,
                    recurrent_activation,
                    kernel,
                    recurrent_kernel,
                    bias,
                } => {
                    if !yields_sequence {
                        return Err(MLError::ModelLoadError(format!(
                            "layer {} is recurrent but its input is not a sequence",
                            idx
                        )));
                    }
                    let in_dim = kernel.len();
                    if let Some(w) = width {
                        expect_len(&format!("layer {} kernel rows", idx), w, in_dim)?;
                    }
                    expect_len(&format!("layer {} recurrent rows", idx), units, recurrent_kernel.len())?;
                    expect_len(&format!("layer {} bias", idx), 4 * units, bias.len())?;

                    input_size.get_or_insert(in_dim);
                    layers.push(Layer::Lstm(LstmLayer {
                        units,
                        return_sequences,
                        activation,
                        recurrent_activation,
                        input_weights: transposed(&format!("layer {} kernel", idx), &kernel, 4 * units)?,
                        hidden_weights: transposed(
                            &format!("layer {} recurrent kernel", idx),
                            &recurrent_kernel,
                            4 * units,
                        )?,
                        biases: DVector::from_vec(bias),
                    }));
                    width = Some(units);
                    yields_sequence = return_sequences;
                }
                LayerSpec::Dense {
                    units,
                    activation,
                    kernel,
                    bias,
                } => {
                    let in_dim = kernel.len();
                    if let Some(w) = width {
                        expect_len(&format!("layer {} kernel rows", idx), w, in_dim)?;
                    }
                    expect_len(&format!("layer {} bias", idx), units, bias.len())?;

                    input_size.get_or_insert(in_dim);
                    layers.push(Layer::Dense(DenseLayer {
                        activation,
                        weights: transposed(&format!("layer {} kernel", idx), &kernel, units)?,
                        biases: DVector::from_vec(bias),
                    }));
                    width = Some(units);
                }
                LayerSpec::Dropout { rate } => {
                    debug!("Skipping dropout layer {} (rate {}) for inference", idx, rate);
                }
            }
        }

        let input_size = input_size
            .ok_or_else(|| MLError::ModelLoadError("model has no weighted layers".to_string()))?;
        if width != Some(1) {
            return Err(MLError::ModelLoadError(format!(
                "model must end in a single output, found width {:?}",
                width
            )));
        }

        Ok(Self {
            model_version: spec.model_version,
            input_size,
            sequence_length: spec.sequence_length,
            layers,
        })
    }

    fn forward(&self, window: &SensorWindow) -> Result<DVector<f64>, MLError> {
        let steps: Vec<DVector<f64>> = (0..window.sequence_length())
            .map(|t| window.timestep(t))
            .collect();
        let mut signal = Signal::Sequence(steps);

        for layer in &self.layers {
            signal = match (layer, signal) {
                (Layer::Lstm(lstm), Signal::Sequence(steps)) => lstm.forward(&steps),
                (Layer::Lstm(_), Signal::Vector(_)) => {
                    return Err(MLError::InferenceError(
                        "recurrent layer received a flat vector".to_string(),
                    ))
                }
                (Layer::Dense(dense), Signal::Sequence(steps)) => {
                    Signal::Sequence(steps.iter().map(|s| dense.forward_one(s)).collect())
                }
                (Layer::Dense(dense), Signal::Vector(v)) => Signal::Vector(dense.forward_one(&v)),
            };
        }

        debug!("Forward pass produced output of width {}", signal.width());

        match signal {
            Signal::Vector(v) => Ok(v),
            Signal::Sequence(mut steps) => steps
                .pop()
                .ok_or_else(|| MLError::InferenceError("empty input sequence".to_string())),
        }
    }
}

impl RulModel for LSTMModel {
    fn predict(&self, window: &SensorWindow) -> Result<f64, MLError> {
        if window.n_features() != self.input_size {
            return Err(MLError::ShapeMismatch {
                context: "model input".to_string(),
                expected: self.input_size,
                actual: window.n_features(),
            });
        }

        let output = self.forward(window)?;
        let value = output
            .get(0)
            .copied()
            .ok_or_else(|| MLError::InferenceError("model produced no output".to_string()))?;

        if !value.is_finite() {
            return Err(MLError::InferenceError(format!(
                "model produced a non-finite value ({})",
                value
            )));
        }
        Ok(value)
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn input_size(&self) -> usize {
        self.input_size
    }
}
