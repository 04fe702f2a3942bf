//! Face detection post-processing for YuNet-style networks.
//!
//! A network emits, for every anchor prior, a 14-value regression (box and
//! five landmarks), a two-class confidence and an IoU quality estimate. This
//! crate generates the priors for a given input size, decodes those rows into
//! faces and applies non-maximum suppression. Running the network itself is
//! delegated to a [`detector::InferenceEngine`]; the `onnx` feature provides
//! one backed by ONNX Runtime.

pub mod config;
pub mod detector;
pub mod error;
pub mod infer;
pub mod inference;
pub mod models;
pub mod protocol;
pub mod service;

pub use detector::{Backend, DetectorConfig, FaceDetector, InferenceEngine, Target};
pub use error::{DetectError, DetectResult};
pub use infer::decode::RawOutputs;
pub use infer::{BoundingBox, Face, Landmarks, Point};
