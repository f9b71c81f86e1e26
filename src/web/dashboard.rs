use anyhow::Result;
use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Query, State},
    response::Html,
    routing::{get, post},
    Form, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::client::InferenceClient;
use super::render::{self, Mode};
use super::shutdown_signal;
use crate::data::{SensorInput, SensorTable, REQUIRED_FEATURES};

const UPLOAD_LIMIT_BYTES: usize = 32 * 1024 * 1024;

#[derive(Clone)]
pub struct DashboardServer {
    client: InferenceClient,
    static_dir: String,
}

#[derive(Debug, Deserialize)]
struct PageParams {
    mode: Option<String>,
}

impl DashboardServer {
    pub fn new(client: InferenceClient) -> Self {
        Self {
            client,
            static_dir: "static".to_string(),
        }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(serve_dashboard))
            .route("/upload", post(submit_upload))
            .route("/manual", post(submit_manual))
            .nest_service("/static", ServeDir::new(&self.static_dir))
            .layer(DefaultBodyLimit::max(UPLOAD_LIMIT_BYTES))
            .layer(TraceLayer::new_for_http())
            .with_state(self.clone())
    }

    pub async fn start(&self, addr: &str) -> Result<()> {
        info!("Starting predictive maintenance dashboard on {}", addr);
        info!("Forwarding predictions to {}", self.client.base_url());

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Dashboard available at http://{}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    /// One line for the sidebar describing the model behind the service.
    async fn model_line(&self) -> String {
        match self.client.health().await {
            Ok(status) => format!(
                "Model {} · window {} · {} predictions served",
                status.model_version, status.sequence_length, status.inference_count
            ),
            Err(e) => {
                warn!("Inference service health check failed: {}", e);
                format!("Inference service unavailable at {}", self.client.base_url())
            }
        }
    }

    async fn render(&self, mode: Mode, content: String) -> Html<String> {
        Html(render::page(mode, &content, &self.model_line().await))
    }
}

async fn serve_dashboard(
    State(server): State<DashboardServer>,
    Query(params): Query<PageParams>,
) -> Html<String> {
    let mode = Mode::parse(params.mode.as_deref());
    let content = match mode {
        Mode::Upload => render::upload_panel(1),
        Mode::Manual => render::manual_panel(1, &[0.0; REQUIRED_FEATURES.len()]),
    };
    server.render(mode, content).await
}

fn parse_engine_id(raw: Option<&str>) -> Result<i64, String> {
    let raw = raw.map(str::trim).unwrap_or_default();
    let id: i64 = raw
        .parse()
        .map_err(|_| format!("Engine ID must be a whole number, got '{}'", raw))?;
    if id < 1 {
        return Err("Engine ID must be at least 1".to_string());
    }
    Ok(id)
}

struct UploadForm {
    engine_raw: Option<String>,
    file: Option<(String, Vec<u8>)>,
}

async fn read_upload_form(mut multipart: Multipart) -> Result<UploadForm, MultipartError> {
    let mut form = UploadForm {
        engine_raw: None,
        file: None,
    };

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("engine_id") => form.engine_raw = Some(field.text().await?),
            Some("file") => {
                let file_name = field.file_name().unwrap_or("upload.csv").to_string();
                let bytes = field.bytes().await?;
                form.file = Some((file_name, bytes.to_vec()));
            }
            _ => {}
        }
    }

    Ok(form)
}

async fn submit_upload(
    State(server): State<DashboardServer>,
    multipart: Multipart,
) -> Html<String> {
    let UploadForm { engine_raw, file } = match read_upload_form(multipart).await {
        Ok(form) => form,
        Err(e) => {
            let content = format!(
                "{}{}",
                render::upload_panel(1),
                render::warning(&format!("Could not read the upload: {}", e))
            );
            return server.render(Mode::Upload, content).await;
        }
    };

    let engine_id = match parse_engine_id(engine_raw.as_deref()) {
        Ok(id) => id,
        Err(msg) => {
            let content = format!("{}{}", render::upload_panel(1), render::warning(&msg));
            return server.render(Mode::Upload, content).await;
        }
    };

    let Some((file_name, bytes)) = file.filter(|(_, b)| !b.is_empty()) else {
        let content = format!(
            "{}{}",
            render::upload_panel(engine_id),
            render::warning("Choose a CSV or TXT sensor log to upload.")
        );
        return server.render(Mode::Upload, content).await;
    };

    let preview = match SensorTable::from_upload(&file_name, &bytes) {
        Ok(table) => render::preview(&file_name, &table),
        Err(e) => render::warning(&format!("Preview unavailable: {}", e)),
    };

    info!(engine_id, "Forwarding {} to the inference service", file_name);
    let result = server.client.predict_file(engine_id, &file_name, bytes).await;

    let content = format!(
        "{}{}{}",
        render::upload_panel(engine_id),
        preview,
        render::outcome(&result)
    );
    server.render(Mode::Upload, content).await
}

async fn submit_manual(
    State(server): State<DashboardServer>,
    Form(fields): Form<HashMap<String, String>>,
) -> Html<String> {
    let mut values = [0.0; REQUIRED_FEATURES.len()];
    let mut problems = Vec::new();

    for (idx, feature) in REQUIRED_FEATURES.iter().enumerate() {
        let raw = fields.get(*feature).map(|s| s.trim()).unwrap_or("");
        if raw.is_empty() {
            continue;
        }
        match raw.parse::<f64>() {
            Ok(v) => values[idx] = v,
            Err(_) => problems.push(format!("{} is not a number ('{}')", feature, raw)),
        }
    }

    let engine_id = match parse_engine_id(fields.get("engine_id").map(String::as_str)) {
        Ok(id) => id,
        Err(msg) => {
            problems.push(msg);
            1
        }
    };

    if !problems.is_empty() {
        let content = format!(
            "{}{}",
            render::manual_panel(engine_id, &values),
            render::warning(&problems.join("; "))
        );
        return server.render(Mode::Manual, content).await;
    }

    let reading: Map<String, Value> = REQUIRED_FEATURES
        .iter()
        .zip(values.iter())
        .map(|(name, v)| (name.to_string(), json!(v)))
        .collect();
    let input = SensorInput {
        engine_id,
        readings: vec![reading],
    };

    info!(engine_id, "Forwarding manual reading to the inference service");
    let result = server.client.predict_sensors(&input).await;

    let content = format!(
        "{}{}",
        render::manual_panel(engine_id, &values),
        render::outcome(&result)
    );
    server.render(Mode::Manual, content).await
}
