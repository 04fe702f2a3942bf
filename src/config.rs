//! Service configuration.

use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use tracing::warn;

use crate::detector::{Backend, DetectorConfig, Target};

/// Input size used when neither the environment nor the model metadata declares one.
pub const DEFAULT_INPUT_SIZE: (u32, u32) = (320, 320);

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub host: String,
    pub port: u16,
    /// Catalog root with `face_detection/<version>/` entries.
    pub models_dir: PathBuf,
    /// Explicit model reference; overrides the catalog.
    pub model: Option<PathBuf>,
    /// Overrides the input size declared by the model metadata.
    pub input_size: Option<(u32, u32)>,
    pub score_threshold: f32,
    pub nms_threshold: f32,
    pub top_k: usize,
    pub backend: Backend,
    pub target: Target,
    pub max_body_bytes: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            models_dir: PathBuf::from("models"),
            model: None,
            input_size: None,
            score_threshold: 0.9,
            nms_threshold: 0.3,
            top_k: 5000,
            backend: Backend::Default,
            target: Target::Default,
            max_body_bytes: 8 * 1024 * 1024,
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("event" = "config.invalid", key, value = %raw, "message" = "using default");
            default
        }),
        Err(_) => default,
    }
}

fn parse_size(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.split_once(['x', 'X'])?;
    Some((w.trim().parse().ok()?, h.trim().parse().ok()?))
}

impl ServiceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            host: std::env::var("DNNFACE_HOST").unwrap_or(d.host),
            port: env_or("DNNFACE_PORT", d.port),
            models_dir: std::env::var("DNNFACE_MODELS_DIR").map(PathBuf::from).unwrap_or(d.models_dir),
            model: std::env::var("DNNFACE_MODEL").ok().map(PathBuf::from),
            input_size: std::env::var("DNNFACE_INPUT_SIZE").ok().and_then(|s| parse_size(&s)),
            score_threshold: env_or("DNNFACE_SCORE_THRESHOLD", d.score_threshold),
            nms_threshold: env_or("DNNFACE_NMS_THRESHOLD", d.nms_threshold),
            top_k: env_or("DNNFACE_TOP_K", d.top_k),
            backend: env_or("DNNFACE_BACKEND", d.backend),
            target: env_or("DNNFACE_TARGET", d.target),
            max_body_bytes: env_or("DNNFACE_MAX_BODY_BYTES", d.max_body_bytes),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Detector settings; `model_size` comes from model metadata when available.
    pub fn detector_config(&self, model_size: Option<(u32, u32)>) -> DetectorConfig {
        let (input_width, input_height) = self.input_size.or(model_size).unwrap_or(DEFAULT_INPUT_SIZE);
        DetectorConfig {
            input_width,
            input_height,
            score_threshold: self.score_threshold,
            nms_threshold: self.nms_threshold,
            top_k: self.top_k,
            backend: self.backend,
            target: self.target,
        }
    }
}
