use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::data::{PredictionResult, SensorInput};
use crate::error::ClientError;
use crate::ml::EngineStatus;

/// HTTP client for the inference service, used by the dashboard.
#[derive(Clone)]
pub struct InferenceClient {
    http: reqwest::Client,
    base_url: String,
}

impl InferenceClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn predict_sensors(&self, input: &SensorInput) -> Result<PredictionResult, ClientError> {
        debug!("POST {}/predict/sensors", self.base_url);
        let response = self
            .http
            .post(format!("{}/predict/sensors", self.base_url))
            .json(input)
            .send()
            .await?;

        decode(response).await
    }

    pub async fn predict_file(
        &self,
        engine_id: i64,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<PredictionResult, ClientError> {
        debug!("POST {}/predict/file ({})", self.base_url, file_name);
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = Form::new()
            .text("engine_id", engine_id.to_string())
            .part("file", part);

        let response = self
            .http
            .post(format!("{}/predict/file", self.base_url))
            .multipart(form)
            .send()
            .await?;

        decode(response).await
    }

    pub async fn health(&self) -> Result<EngineStatus, ClientError> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let text = response.text().await?;
    Err(ClientError::Api {
        status: status.as_u16(),
        detail: extract_detail(&text),
    })
}

/// Pulls the message out of a `{"detail": ...}` body, falling back to the raw text.
pub fn extract_detail(body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => body.to_string(),
        },
        _ => body.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_is_extracted_from_error_bodies() {
        assert_eq!(
            extract_detail(r#"{"detail": "Missing features: ['sensor_2']"}"#),
            "Missing features: ['sensor_2']"
        );
        assert_eq!(extract_detail(r#"{"detail": [1, 2]}"#), "[1,2]");
        assert_eq!(extract_detail("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn base_url_drops_trailing_slash() {
        let client = InferenceClient::new("http://127.0.0.1:8000/").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:8000");
    }

    async fn spawn_service() -> InferenceClient {
        use crate::config::ModelConfig;
        use crate::ml::predictor::tests::echo_predictor;
        use crate::ml::MLEngine;
        use crate::web::InferenceServer;
        use std::sync::Arc;

        let engine = Arc::new(MLEngine::with_predictor(ModelConfig::default(), echo_predictor(50)));
        let router = InferenceServer::new(engine, None).router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        InferenceClient::new(&format!("http://{}", addr)).unwrap()
    }

    fn reading(value: f64) -> serde_json::Map<String, Value> {
        crate::data::REQUIRED_FEATURES
            .iter()
            .map(|f| (f.to_string(), serde_json::json!(value)))
            .collect()
    }

    #[tokio::test]
    async fn round_trips_sensor_prediction() {
        let client = spawn_service().await;
        let input = SensorInput {
            engine_id: 5,
            readings: vec![reading(0.125)],
        };

        let result = client.predict_sensors(&input).await.unwrap();
        assert_eq!(result.engine_id, 5);
        assert_eq!(result.predicted_rul, 126.0);
    }

    #[tokio::test]
    async fn api_errors_carry_the_detail() {
        let client = spawn_service().await;
        let err = client
            .predict_file(1, "log.csv", b"sensor_2\n1\n".to_vec())
            .await
            .unwrap_err();

        match err {
            ClientError::Api { status, detail } => {
                assert_eq!(status, 400);
                assert!(detail.starts_with("Error reading file: Missing columns:"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn health_decodes_engine_status() {
        let client = spawn_service().await;
        let status = client.health().await.unwrap();
        assert_eq!(status.model_version, "echo");
        assert_eq!(status.n_features, 17);
    }
}
