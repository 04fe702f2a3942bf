//! HTTP surface: `/health`, `/config` and `/detect`.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use uuid::Uuid;

use crate::config::ServiceConfig;
use crate::detector::DetectorConfig;
use crate::error::DetectError;
use crate::infer::NmsParams;
use crate::inference::InferenceContext;
use crate::models::{self, ModelCatalogEntry, ModelSelection};
use crate::protocol::{DetectRequest, DetectResponse, ErrorBody};

#[derive(Clone)]
pub struct AppState {
    pub inference: Arc<InferenceContext>,
    pub config: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(inference: InferenceContext, config: ServiceConfig) -> Self {
        Self { inference: Arc::new(inference), config: Arc::new(config) }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    model: Option<ModelSelection>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    service: ServiceConfig,
    detector: Option<DetectorConfig>,
    models: Vec<ModelCatalogEntry>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Detect(DetectError),
}

impl From<DetectError> for ApiError {
    fn from(err: DetectError) -> Self {
        Self::Detect(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, "bad-request", message),
            ApiError::Detect(err) if err.is_input_error() => (StatusCode::BAD_REQUEST, "bad-image", err.to_string()),
            ApiError::Detect(err @ DetectError::ModelNotFound(_)) => {
                (StatusCode::SERVICE_UNAVAILABLE, "no-model", err.to_string())
            }
            ApiError::Detect(err) => {
                error!("event" = "detect.failed", %err);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal", err.to_string())
            }
        };
        (status, Json(ErrorBody { code, message })).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/config", get(service_config))
        .route("/detect", post(detect))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(
            CorsLayer::new()
                .allow_methods(Any)
                .allow_origin(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = if state.inference.detector.is_some() { "ok" } else { "degraded" };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        model: state.inference.selected_model.clone(),
    };
    (StatusCode::OK, Json(body))
}

async fn service_config(State(state): State<AppState>) -> impl IntoResponse {
    let body = ConfigResponse {
        service: (*state.config).clone(),
        detector: state.inference.detector.as_ref().map(|d| d.config().clone()),
        models: models::inspect_models_dir(&state.config.models_dir),
    };
    (StatusCode::OK, Json(body))
}

async fn detect(
    State(state): State<AppState>,
    Json(req): Json<DetectRequest>,
) -> Result<Json<DetectResponse>, ApiError> {
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let bytes = STANDARD
        .decode(req.image.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("image is not valid base64: {e}")))?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| ApiError::BadRequest(format!("image could not be decoded: {e}")))?;
    let (width, height) = (img.width(), img.height());

    let params = match req.score_threshold {
        Some(t) if !(0.0..=1.0).contains(&t) => {
            return Err(ApiError::BadRequest(format!("score threshold {t} outside [0, 1]")));
        }
        Some(t) => {
            let det = state.inference.detector()?;
            Some(NmsParams { score_threshold: t, ..det.config().nms_params() })
        }
        None => None,
    };

    let inference = Arc::clone(&state.inference);
    let faces = tokio::task::spawn_blocking(move || inference.detect_image(&img, params))
        .await
        .map_err(|e| DetectError::inference(format!("detection task failed: {e}")))??;

    let rows = req.flat.then(|| faces.iter().map(|f| f.to_row()).collect());
    let elapsed_ms = started.elapsed().as_millis() as u64;
    info!("event" = "detect.done", %request_id, width, height, faces = faces.len(), elapsed_ms);
    Ok(Json(DetectResponse { request_id, width, height, faces, rows, elapsed_ms }))
}
