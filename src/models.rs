use std::fs;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{DetectError, DetectResult};

pub const FACE_DETECTION: &str = "face_detection";
const MODEL_FILES: [&str; 3] = ["model.onnx", "model.ort", "model"];

#[derive(Debug, Clone, Serialize)]
pub struct ModelCatalogEntry {
    pub kind: String,
    pub versions: Vec<String>,
}

pub fn inspect_models_dir(base_dir: impl AsRef<Path>) -> Vec<ModelCatalogEntry> {
    let mut versions: Vec<String> = discover_kind(base_dir.as_ref(), FACE_DETECTION)
        .into_iter()
        .map(|(version, _, _)| version)
        .collect();
    versions.sort();
    vec![ModelCatalogEntry { kind: FACE_DETECTION.to_string(), versions }]
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InputSpec {
    pub name: String,
    /// `[N, C, H, W]`
    pub shape: Vec<i64>,
    pub layout: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelMetadata {
    pub name: String,
    pub version: String,
    pub url: String,
    pub sha256: String,
    pub inputs: Vec<InputSpec>,
    pub license: String,
    #[serde(default)]
    pub accuracy: Option<f64>,
}

impl ModelMetadata {
    /// `(width, height)` declared by the first NCHW input, if any.
    pub fn input_size(&self) -> Option<(u32, u32)> {
        let shape = &self.inputs.first()?.shape;
        if shape.len() < 4 || shape[2] <= 0 || shape[3] <= 0 {
            return None;
        }
        Some((shape[3] as u32, shape[2] as u32))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelSelection {
    pub kind: String,
    pub version: String,
    pub path: PathBuf,
    pub metadata: Option<ModelMetadata>,
}

impl ModelSelection {
    pub fn input_size(&self) -> Option<(u32, u32)> {
        self.metadata.as_ref().and_then(ModelMetadata::input_size)
    }
}

pub fn read_metadata(path: &Path) -> DetectResult<ModelMetadata> {
    let data = fs::read_to_string(path)?;
    Ok(serde_json::from_str::<ModelMetadata>(&data)?)
}

fn model_file_in(dir: &Path) -> Option<PathBuf> {
    MODEL_FILES.into_iter().map(|fname| dir.join(fname)).find(|p| p.exists())
}

fn discover_kind(base_dir: &Path, kind: &str) -> Vec<(String, ModelMetadata, PathBuf)> {
    let mut out = Vec::new();
    let kind_dir = base_dir.join(kind);
    let Ok(read) = fs::read_dir(&kind_dir) else { return out; };
    for item in read.flatten() {
        if !item.file_type().map(|ft| ft.is_dir()).unwrap_or(false) {
            continue;
        }
        let version = item.file_name().to_string_lossy().to_string();
        let version_dir = kind_dir.join(&version);
        let meta = match read_metadata(&version_dir.join("metadata.json")) {
            Ok(meta) => meta,
            Err(err) => {
                debug!("event" = "models.skip", version = %version, %err);
                continue;
            }
        };
        match model_file_in(&version_dir) {
            Some(path) => out.push((version, meta, path)),
            None => warn!("event" = "models.no_weights", version = %version),
        }
    }
    out
}

fn pick_best(mut items: Vec<(String, ModelMetadata, PathBuf)>) -> Option<ModelSelection> {
    if items.is_empty() {
        return None;
    }
    items.sort_by(|a, b| {
        let acc_a = a.1.accuracy.unwrap_or(f64::NEG_INFINITY);
        let acc_b = b.1.accuracy.unwrap_or(f64::NEG_INFINITY);
        acc_b
            .partial_cmp(&acc_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.cmp(&a.0))
    });
    let (version, metadata, path) = items.remove(0);
    Some(ModelSelection { kind: FACE_DETECTION.to_string(), version, path, metadata: Some(metadata) })
}

pub fn select_best_model(base_dir: impl AsRef<Path>) -> Option<ModelSelection> {
    pick_best(discover_kind(base_dir.as_ref(), FACE_DETECTION))
}

/// Resolve a model reference: a weights file, a version directory holding
/// `metadata.json`, or a catalog root with a `face_detection/` subdirectory.
pub fn resolve_model(reference: impl AsRef<Path>) -> DetectResult<ModelSelection> {
    let reference = reference.as_ref();
    if reference.is_file() {
        let version = reference
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        return Ok(ModelSelection {
            kind: FACE_DETECTION.to_string(),
            version,
            path: reference.to_path_buf(),
            metadata: None,
        });
    }
    if reference.is_dir() {
        let meta_path = reference.join("metadata.json");
        if meta_path.exists() {
            let metadata = read_metadata(&meta_path)?;
            let path = model_file_in(reference).ok_or_else(|| {
                DetectError::ModelNotFound(format!("no model file next to {}", meta_path.display()))
            })?;
            return Ok(ModelSelection {
                kind: FACE_DETECTION.to_string(),
                version: metadata.version.clone(),
                path,
                metadata: Some(metadata),
            });
        }
        if let Some(selection) = select_best_model(reference) {
            return Ok(selection);
        }
    }
    Err(DetectError::ModelNotFound(reference.display().to_string()))
}
