//! Face detector facade: priors, inference engine, decode and suppression.

use std::fmt;
use std::str::FromStr;

use image::RgbImage;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::{debug, info};

use crate::error::{DetectError, DetectResult};
use crate::infer::blob::{ImageTensor, image_to_blob};
use crate::infer::decode::{RawOutputs, decode};
use crate::infer::priors::{Prior, generate_priors};
use crate::infer::{Face, NmsParams, non_max_suppression};

/// Runs the network. Output rows must line up with the detector's priors.
pub trait InferenceEngine: Send + Sync {
    fn forward(&self, input: &ImageTensor) -> DetectResult<RawOutputs>;
}

impl<E: InferenceEngine + ?Sized> InferenceEngine for Box<E> {
    fn forward(&self, input: &ImageTensor) -> DetectResult<RawOutputs> {
        (**self).forward(input)
    }
}

/// Execution backend requested from the inference engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Default,
    Cpu,
    Cuda,
}

impl FromStr for Backend {
    type Err = DetectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "cpu" => Ok(Self::Cpu),
            "cuda" => Ok(Self::Cuda),
            other => Err(DetectError::config(format!("unknown backend `{other}`"))),
        }
    }
}

/// Device the backend runs on. Serialized in its `FromStr` form, e.g. `gpu:1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Target {
    #[default]
    Default,
    Cpu,
    Gpu(i32),
}

impl FromStr for Target {
    type Err = DetectError;

    /// Accepts `default`, `cpu`, `gpu` or `gpu:<device>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "" | "default" => return Ok(Self::Default),
            "cpu" => return Ok(Self::Cpu),
            "gpu" => return Ok(Self::Gpu(0)),
            _ => {}
        }
        s.strip_prefix("gpu:")
            .and_then(|id| id.parse().ok())
            .map(Self::Gpu)
            .ok_or_else(|| DetectError::config(format!("unknown target `{s}`")))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => f.write_str("default"),
            Self::Cpu => f.write_str("cpu"),
            Self::Gpu(id) => write!(f, "gpu:{id}"),
        }
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

fn default_score_threshold() -> f32 { 0.9 }
fn default_nms_threshold() -> f32 { 0.3 }
fn default_top_k() -> usize { 5000 }

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectorConfig {
    pub input_width: u32,
    pub input_height: u32,
    #[serde(default = "default_score_threshold")]
    pub score_threshold: f32,
    #[serde(default = "default_nms_threshold")]
    pub nms_threshold: f32,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub target: Target,
}

impl DetectorConfig {
    pub fn new(input_width: u32, input_height: u32) -> Self {
        Self {
            input_width,
            input_height,
            score_threshold: default_score_threshold(),
            nms_threshold: default_nms_threshold(),
            top_k: default_top_k(),
            backend: Backend::Default,
            target: Target::Default,
        }
    }

    pub fn nms_params(&self) -> NmsParams {
        NmsParams {
            score_threshold: self.score_threshold,
            iou_threshold: self.nms_threshold,
            top_k: self.top_k,
        }
    }

    pub fn validate(&self) -> DetectResult<()> {
        if self.input_width == 0 || self.input_height == 0 {
            return Err(DetectError::config(format!(
                "input size must be non-zero, got {}x{}",
                self.input_width, self.input_height
            )));
        }
        if !(0.0..=1.0).contains(&self.score_threshold) {
            return Err(DetectError::config(format!(
                "score threshold {} outside [0, 1]",
                self.score_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.nms_threshold) {
            return Err(DetectError::config(format!(
                "nms threshold {} outside [0, 1]",
                self.nms_threshold
            )));
        }
        if self.backend == Backend::Cuda && self.target == Target::Cpu {
            return Err(DetectError::config("cuda backend cannot run on the cpu target"));
        }
        Ok(())
    }
}

/// Detector bound to one input size. Priors are generated at construction and
/// only change through `set_input_size`, which needs exclusive access.
pub struct FaceDetector<E> {
    engine: E,
    config: DetectorConfig,
    priors: Vec<Prior>,
}

impl<E> FaceDetector<E> {
    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn input_size(&self) -> (u32, u32) {
        (self.config.input_width, self.config.input_height)
    }

    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Decode and suppress raw network outputs.
    pub fn post_process(&self, outputs: &RawOutputs) -> DetectResult<Vec<Face>> {
        self.post_process_with(outputs, &self.config.nms_params())
    }

    /// Same as `post_process` with suppression parameters other than the configured ones.
    pub fn post_process_with(&self, outputs: &RawOutputs, params: &NmsParams) -> DetectResult<Vec<Face>> {
        let (w, h) = self.input_size();
        let candidates = decode(&self.priors, outputs, w, h)?;
        let total = candidates.len();
        let faces = non_max_suppression(candidates, params);
        debug!("event" = "detect.post_process", candidates = total, kept = faces.len());
        Ok(faces)
    }

    pub fn set_input_size(&mut self, width: u32, height: u32) -> DetectResult<()> {
        let config = DetectorConfig { input_width: width, input_height: height, ..self.config.clone() };
        let priors = build_priors(&config)?;
        self.config = config;
        self.priors = priors;
        info!("event" = "detector.resized", width, height, priors = self.priors.len());
        Ok(())
    }

    pub fn set_score_threshold(&mut self, threshold: f32) -> DetectResult<()> {
        let config = DetectorConfig { score_threshold: threshold, ..self.config.clone() };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_nms_threshold(&mut self, threshold: f32) -> DetectResult<()> {
        let config = DetectorConfig { nms_threshold: threshold, ..self.config.clone() };
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn set_top_k(&mut self, top_k: usize) {
        self.config.top_k = top_k;
    }
}

impl<E: InferenceEngine> FaceDetector<E> {
    pub fn new(engine: E, config: DetectorConfig) -> DetectResult<Self> {
        let priors = build_priors(&config)?;
        info!(
            "event" = "detector.ready",
            width = config.input_width,
            height = config.input_height,
            priors = priors.len(),
            backend = ?config.backend,
            target = %config.target,
        );
        Ok(Self { engine, config, priors })
    }

    /// Run the full pipeline on an image already sized to the detector input.
    pub fn detect(&self, image: &RgbImage) -> DetectResult<Vec<Face>> {
        self.detect_with(image, &self.config.nms_params())
    }

    pub fn detect_with(&self, image: &RgbImage, params: &NmsParams) -> DetectResult<Vec<Face>> {
        let blob = image_to_blob(image, self.input_size())?;
        let outputs = self.engine.forward(&blob)?;
        self.post_process_with(&outputs, params)
    }
}

fn build_priors(config: &DetectorConfig) -> DetectResult<Vec<Prior>> {
    config.validate()?;
    let priors = generate_priors(config.input_width, config.input_height);
    if priors.is_empty() {
        return Err(DetectError::config(format!(
            "input size {}x{} is too small for any prior",
            config.input_width, config.input_height
        )));
    }
    Ok(priors)
}
