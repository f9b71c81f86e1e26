use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::fs;
use tracing::info;

use crate::data::REQUIRED_FEATURES;
use crate::error::MLError;

/// On-disk form of a fitted scaler, as exported next to the model weights.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScalerSpec {
    MinMax {
        #[serde(default)]
        scale: Option<Vec<f64>>,
        #[serde(default)]
        min: Option<Vec<f64>>,
        #[serde(default)]
        data_min: Option<Vec<f64>>,
        #[serde(default)]
        data_max: Option<Vec<f64>>,
        #[serde(default)]
        feature_range: Option<(f64, f64)>,
        #[serde(default)]
        feature_names: Option<Vec<String>>,
    },
    Standard {
        mean: Vec<f64>,
        scale: Vec<f64>,
        #[serde(default)]
        feature_names: Option<Vec<String>>,
    },
}

/// Per-column affine transform: `x' = x * multiplier + offset`.
#[derive(Debug, Clone)]
pub struct Scaler {
    kind: &'static str,
    multiplier: DVector<f64>,
    offset: DVector<f64>,
}

fn guard_zero(v: f64) -> f64 {
    if v.abs() < f64::EPSILON {
        1.0
    } else {
        v
    }
}

impl Scaler {
    pub fn load_from_file(path: &str) -> Result<Self, MLError> {
        info!("Loading scaler from {}", path);

        let content = fs::read_to_string(path)
            .map_err(|e| MLError::ScalerLoadError(format!("{}: {}", path, e)))?;
        let spec: ScalerSpec = serde_json::from_str(&content)
            .map_err(|e| MLError::ScalerLoadError(format!("{}: {}", path, e)))?;

        Self::from_spec(spec)
    }

    pub fn from_spec(spec: ScalerSpec) -> Result<Self, MLError> {
        let (kind, multiplier, offset, names) = match spec {
            ScalerSpec::MinMax {
                scale: Some(scale),
                min: Some(min),
                feature_names,
                ..
            } => ("min_max", scale, min, feature_names),
            ScalerSpec::MinMax {
                data_min: Some(data_min),
                data_max: Some(data_max),
                feature_range,
                feature_names,
                ..
            } => {
                if data_min.len() != data_max.len() {
                    return Err(MLError::ScalerLoadError(
                        "data_min and data_max differ in length".to_string(),
                    ));
                }
                let (lo, hi) = feature_range.unwrap_or((0.0, 1.0));
                let scale: Vec<f64> = data_min
                    .iter()
                    .zip(&data_max)
                    .map(|(mn, mx)| (hi - lo) / guard_zero(mx - mn))
                    .collect();
                let min: Vec<f64> = data_min
                    .iter()
                    .zip(&scale)
                    .map(|(mn, s)| lo - mn * s)
                    .collect();
                ("min_max", scale, min, feature_names)
            }
            ScalerSpec::MinMax { .. } => {
                return Err(MLError::ScalerLoadError(
                    "min_max scaler needs either scale/min or data_min/data_max".to_string(),
                ))
            }
            ScalerSpec::Standard {
                mean,
                scale,
                feature_names,
            } => {
                if mean.len() != scale.len() {
                    return Err(MLError::ScalerLoadError(
                        "mean and scale differ in length".to_string(),
                    ));
                }
                let multiplier: Vec<f64> = scale.iter().map(|s| 1.0 / guard_zero(*s)).collect();
                let offset: Vec<f64> = mean
                    .iter()
                    .zip(&multiplier)
                    .map(|(m, k)| -m * k)
                    .collect();
                ("standard", multiplier, offset, feature_names)
            }
        };

        if multiplier.len() != offset.len() {
            return Err(MLError::ScalerLoadError(
                "scale and offset differ in length".to_string(),
            ));
        }
        if multiplier.len() != REQUIRED_FEATURES.len() {
            return Err(MLError::ShapeMismatch {
                context: "scaler".to_string(),
                expected: REQUIRED_FEATURES.len(),
                actual: multiplier.len(),
            });
        }
        if let Some(names) = names {
            if names.iter().map(String::as_str).ne(REQUIRED_FEATURES.iter().copied()) {
                return Err(MLError::ScalerLoadError(format!(
                    "scaler was fitted on {:?}, expected {:?}",
                    names, REQUIRED_FEATURES
                )));
            }
        }

        Ok(Self {
            kind,
            multiplier: DVector::from_vec(multiplier),
            offset: DVector::from_vec(offset),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn n_features(&self) -> usize {
        self.multiplier.len()
    }

    pub fn transform(&self, data: &DMatrix<f64>) -> Result<DMatrix<f64>, MLError> {
        if data.ncols() != self.n_features() {
            return Err(MLError::ShapeMismatch {
                context: "scaler input".to_string(),
                expected: self.n_features(),
                actual: data.ncols(),
            });
        }

        Ok(DMatrix::from_fn(data.nrows(), data.ncols(), |r, c| {
            data[(r, c)] * self.multiplier[c] + self.offset[c]
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn min_max_from_range(lo: f64, hi: f64) -> Scaler {
        Scaler::from_spec(ScalerSpec::MinMax {
            scale: None,
            min: None,
            data_min: Some(vec![lo; 17]),
            data_max: Some(vec![hi; 17]),
            feature_range: None,
            feature_names: None,
        })
        .unwrap()
    }

    #[test]
    fn min_max_maps_range_onto_unit_interval() {
        let scaler = min_max_from_range(10.0, 20.0);
        let data = DMatrix::from_fn(2, 17, |r, _| if r == 0 { 10.0 } else { 15.0 });
        let out = scaler.transform(&data).unwrap();

        assert!((out[(0, 0)] - 0.0).abs() < 1e-12);
        assert!((out[(1, 16)] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn constant_column_keeps_unit_scale() {
        let scaler = min_max_from_range(100.0, 100.0);
        let data = DMatrix::from_element(1, 17, 101.0);
        let out = scaler.transform(&data).unwrap();

        assert!((out[(0, 3)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn fitted_attributes_are_used_verbatim() {
        let scaler = Scaler::from_spec(ScalerSpec::MinMax {
            scale: Some(vec![2.0; 17]),
            min: Some(vec![-1.0; 17]),
            data_min: None,
            data_max: None,
            feature_range: None,
            feature_names: None,
        })
        .unwrap();
        let out = scaler.transform(&DMatrix::from_element(1, 17, 3.0)).unwrap();
        assert_eq!(out[(0, 0)], 5.0);
    }

    #[test]
    fn standard_scaler_centres_and_divides() {
        let scaler = Scaler::from_spec(ScalerSpec::Standard {
            mean: vec![5.0; 17],
            scale: vec![2.0; 17],
            feature_names: None,
        })
        .unwrap();
        let out = scaler.transform(&DMatrix::from_element(1, 17, 9.0)).unwrap();

        assert_eq!(scaler.kind(), "standard");
        assert!((out[(0, 0)] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn wrong_width_is_rejected() {
        let result = Scaler::from_spec(ScalerSpec::Standard {
            mean: vec![0.0; 3],
            scale: vec![1.0; 3],
            feature_names: None,
        });
        assert!(matches!(result, Err(MLError::ShapeMismatch { expected: 17, actual: 3, .. })));

        let scaler = min_max_from_range(0.0, 1.0);
        assert!(scaler.transform(&DMatrix::zeros(1, 4)).is_err());
    }

    #[test]
    fn mismatched_feature_names_are_rejected() {
        let mut names: Vec<String> = REQUIRED_FEATURES.iter().map(|s| s.to_string()).collect();
        names.swap(0, 1);

        let result = Scaler::from_spec(ScalerSpec::Standard {
            mean: vec![0.0; 17],
            scale: vec![1.0; 17],
            feature_names: Some(names),
        });
        assert!(matches!(result, Err(MLError::ScalerLoadError(_))));
    }

    #[test]
    fn loads_tagged_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        let spec = serde_json::json!({
            "kind": "min_max",
            "data_min": vec![0.0; 17],
            "data_max": vec![4.0; 17],
            "feature_range": [-1.0, 1.0]
        });
        std::fs::write(&path, spec.to_string()).unwrap();

        let scaler = Scaler::load_from_file(path.to_str().unwrap()).unwrap();
        let out = scaler.transform(&DMatrix::from_element(1, 17, 2.0)).unwrap();
        assert!(out[(0, 0)].abs() < 1e-12);
    }
}
