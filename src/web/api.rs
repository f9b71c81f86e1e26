use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, DefaultBodyLimit, Multipart, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use super::shutdown_signal;
use crate::data::{PredictionResult, SensorInput, SensorTable, REQUIRED_FEATURES};
use crate::error::{ApiError, PredictError};
use crate::ml::MLEngine;

/// C-MAPSS training logs run to a few MB; leave room above axum's 2 MB default.
const UPLOAD_LIMIT_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct InferenceServer {
    engine: Arc<MLEngine>,
    prometheus: Option<PrometheusHandle>,
}

impl InferenceServer {
    pub fn new(engine: Arc<MLEngine>, prometheus: Option<PrometheusHandle>) -> Self {
        Self { engine, prometheus }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/predict/sensors", post(predict_from_sensors))
            .route("/predict/file", post(predict_file))
            .route("/health", get(health))
            .route("/features", get(features))
            .route("/admin/reload", post(reload))
            .route("/metrics", get(render_metrics))
            .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn start(&self, addr: &str) -> Result<()> {
        info!("Starting inference service on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Inference service listening on http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

fn record_outcome(source: &'static str, result: &Result<f64, PredictError>) {
    match result {
        Ok(_) => metrics::counter!("rul_predictions_total", "source" => source).increment(1),
        Err(_) => metrics::counter!("rul_prediction_errors_total", "source" => source).increment(1),
    }
}

async fn predict_from_sensors(
    State(server): State<InferenceServer>,
    payload: Result<Json<SensorInput>, JsonRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    let Json(input) = payload.map_err(|e| ApiError::Unprocessable(e.body_text()))?;
    let request_id = Uuid::new_v4();
    info!(
        %request_id,
        engine_id = input.engine_id,
        "Sensor prediction with {} readings",
        input.readings.len()
    );

    let table = SensorTable::from_readings(&input.readings, &REQUIRED_FEATURES)
        .map_err(PredictError::from)?;
    let result = server.engine.predict_blocking(table).await;
    record_outcome("sensors", &result);

    let predicted_rul = result.map_err(|e| {
        warn!(%request_id, "Sensor prediction failed: {}", e);
        ApiError::from(e)
    })?;

    Ok(Json(PredictionResult {
        engine_id: input.engine_id,
        predicted_rul,
    }))
}

struct FileUpload {
    file_name: String,
    bytes: Vec<u8>,
    engine_id: i64,
}

async fn read_upload(mut multipart: Multipart) -> Result<FileUpload, ApiError> {
    let mut file = None;
    let mut engine_id = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Error reading file: {}", e.body_text())))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(format!("Error reading file: {}", e.body_text())))?;
                file = Some((file_name, bytes.to_vec()));
            }
            Some("engine_id") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::Unprocessable(e.body_text()))?;
                engine_id = Some(text.trim().parse::<i64>().map_err(|_| {
                    ApiError::Unprocessable(format!("engine_id must be an integer, got '{}'", text))
                })?);
            }
            _ => {}
        }
    }

    let (file_name, bytes) =
        file.ok_or_else(|| ApiError::Unprocessable("field 'file' is required".to_string()))?;
    let engine_id = engine_id
        .ok_or_else(|| ApiError::Unprocessable("field 'engine_id' is required".to_string()))?;

    Ok(FileUpload {
        file_name,
        bytes,
        engine_id,
    })
}

async fn predict_file(
    State(server): State<InferenceServer>,
    multipart: Multipart,
) -> Result<Json<PredictionResult>, ApiError> {
    let upload = read_upload(multipart).await?;
    let request_id = Uuid::new_v4();
    info!(
        %request_id,
        engine_id = upload.engine_id,
        "File prediction for {} ({} bytes)",
        upload.file_name,
        upload.bytes.len()
    );

    let result = match SensorTable::from_upload(&upload.file_name, &upload.bytes) {
        Ok(table) => {
            server
                .engine
                .predict_blocking(table.for_engine(upload.engine_id))
                .await
        }
        Err(e) => Err(e.into()),
    };
    record_outcome("file", &result);

    // every failure past the form fields is reported as a bad file
    let predicted_rul = result.map_err(|e| {
        warn!(%request_id, "File prediction failed: {}", e);
        ApiError::BadRequest(format!("Error reading file: {}", e))
    })?;

    Ok(Json(PredictionResult {
        engine_id: upload.engine_id,
        predicted_rul,
    }))
}

async fn health(State(server): State<InferenceServer>) -> impl IntoResponse {
    Json(server.engine.status())
}

async fn features(State(server): State<InferenceServer>) -> impl IntoResponse {
    Json(json!({
        "required_features": REQUIRED_FEATURES,
        "sequence_length": server.engine.sequence_length(),
    }))
}

async fn reload(State(server): State<InferenceServer>) -> Result<impl IntoResponse, ApiError> {
    let engine = server.engine.clone();
    let version = tokio::task::spawn_blocking(move || engine.reload())
        .await
        .map_err(|e| ApiError::Internal(format!("reload task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(json!({ "reloaded": true, "model_version": version })))
}

async fn render_metrics(State(server): State<InferenceServer>) -> impl IntoResponse {
    match &server.prometheus {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}
