use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Missing features: {}", py_list(.0))]
    MissingFeatures(Vec<String>),

    #[error("Missing columns: {}", py_list(.0))]
    MissingColumns(Vec<String>),

    #[error("No sensor readings provided")]
    NoReadings,

    #[error("Invalid value for '{feature}' in reading {row}: {value}")]
    InvalidValue {
        row: usize,
        feature: String,
        value: String,
    },

    #[error("Malformed input: {0}")]
    Malformed(String),
}

#[derive(Error, Debug)]
pub enum MLError {
    #[error("Model loading failed: {0}")]
    ModelLoadError(String),

    #[error("Scaler loading failed: {0}")]
    ScalerLoadError(String),

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Inference failed: {0}")]
    InferenceError(String),
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Model(#[from] MLError),
}

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{detail}")]
    Api { status: u16, detail: String },

    #[error("Inference service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Errors surfaced by the inference HTTP API. Every variant renders as
/// `{"detail": "..."}` so clients can show the message verbatim.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<PredictError> for ApiError {
    fn from(err: PredictError) -> Self {
        match err {
            PredictError::Input(e) => ApiError::BadRequest(e.to_string()),
            PredictError::Model(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

/// Renders names the way the service has always reported them,
/// e.g. `['sensor_2', 'sensor_3']`.
pub fn py_list(names: &[String]) -> String {
    let quoted: Vec<String> = names.iter().map(|n| format!("'{}'", n)).collect();
    format!("[{}]", quoted.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_features_message_lists_names() {
        let err = InputError::MissingFeatures(vec!["sensor_2".into(), "sensor_21".into()]);
        assert_eq!(err.to_string(), "Missing features: ['sensor_2', 'sensor_21']");
    }

    #[test]
    fn model_failures_map_to_server_errors() {
        let err: ApiError = PredictError::from(MLError::InferenceError("nan".into())).into();
        assert!(matches!(err, ApiError::Internal(_)));

        let resp = ApiError::BadRequest("Missing features: []".into()).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn predict_error_is_transparent() {
        let err: PredictError = InputError::NoReadings.into();
        assert_eq!(err.to_string(), "No sensor readings provided");
    }
}
