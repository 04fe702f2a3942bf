use image::{imageops::FilterType, DynamicImage, GenericImageView, RgbImage};
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::detector::{FaceDetector, InferenceEngine};
use crate::error::{DetectError, DetectResult};
use crate::infer::{Face, NmsParams};
use crate::models::{resolve_model, ModelSelection};

pub type DynDetector = FaceDetector<Box<dyn InferenceEngine>>;

pub struct InferenceContext {
    pub selected_model: Option<ModelSelection>,
    pub detector: Option<DynDetector>,
}

impl InferenceContext {
    /// Resolve the model and build the detector.
    ///
    /// An explicit `model` reference that cannot be resolved or loaded is an
    /// error. Without one, an empty `models_dir` catalog yields a context with
    /// no detector; a catalog model that fails to load is still an error.
    pub fn new(config: &ServiceConfig) -> DetectResult<Self> {
        let selected = match &config.model {
            Some(reference) => Some(resolve_model(reference)?),
            None => match resolve_model(&config.models_dir) {
                Ok(sel) => Some(sel),
                Err(err @ DetectError::ModelNotFound(_)) => {
                    warn!("event" = "models.missing", reference = %config.models_dir.display(), %err);
                    None
                }
                Err(err) => return Err(err),
            },
        };

        let detector = match &selected {
            Some(sel) => {
                info!("event" = "models.selected", version = %sel.version, path = %sel.path.display());
                Some(load_detector(sel, config)?)
            }
            None => None,
        };

        Ok(Self { selected_model: selected, detector })
    }

    pub fn with_detector(detector: DynDetector) -> Self {
        Self { selected_model: None, detector: Some(detector) }
    }

    pub fn detector(&self) -> DetectResult<&DynDetector> {
        self.detector
            .as_ref()
            .ok_or_else(|| DetectError::ModelNotFound("no face detection model loaded".to_string()))
    }

    /// Detect on an image of any size: letterbox into the detector input,
    /// then map faces back to source pixel coordinates.
    pub fn detect_image(&self, img: &DynamicImage, params: Option<NmsParams>) -> DetectResult<Vec<Face>> {
        let det = self.detector()?;
        let params = params.unwrap_or_else(|| det.config().nms_params());
        let (orig_w, orig_h) = img.dimensions();
        if orig_w == 0 || orig_h == 0 {
            return Err(DetectError::EmptyImage);
        }

        let (iw, ih) = det.input_size();
        if (orig_w, orig_h) == (iw, ih) {
            return det.detect_with(&img.to_rgb8(), &params);
        }

        let (canvas, offset, scale) = letterbox(img, iw, ih);
        let faces = det.detect_with(&canvas, &params)?;
        Ok(faces.iter().map(|f| f.map_to_source(offset, scale)).collect())
    }
}

/// Resize keeping aspect ratio and center on a black canvas.
/// Returns the canvas, the paste offset and the canvas-to-source scale.
fn letterbox(img: &DynamicImage, iw: u32, ih: u32) -> (RgbImage, (f32, f32), (f32, f32)) {
    let (orig_w, orig_h) = img.dimensions();
    let r = (iw as f32 / orig_w as f32).min(ih as f32 / orig_h as f32);
    let new_w = ((orig_w as f32 * r).round() as u32).clamp(1, iw);
    let new_h = ((orig_h as f32 * r).round() as u32).clamp(1, ih);
    let resized = img.resize_exact(new_w, new_h, FilterType::Triangle);
    let mut canvas = RgbImage::new(iw, ih);
    let dx = (iw - new_w) / 2;
    let dy = (ih - new_h) / 2;
    image::imageops::overlay(&mut canvas, &resized.to_rgb8(), dx.into(), dy.into());
    let scale = (orig_w as f32 / new_w as f32, orig_h as f32 / new_h as f32);
    (canvas, (dx as f32, dy as f32), scale)
}

#[cfg(feature = "onnx")]
fn load_detector(sel: &ModelSelection, config: &ServiceConfig) -> DetectResult<DynDetector> {
    use crate::infer::yunet::OrtEngine;

    let _ = ort::init().with_name("dnnface").commit();
    let det_config = config.detector_config(sel.input_size());
    let engine = OrtEngine::load(&sel.path, det_config.backend, det_config.target)?;
    FaceDetector::new(Box::new(engine) as Box<dyn InferenceEngine>, det_config)
}

#[cfg(not(feature = "onnx"))]
fn load_detector(_sel: &ModelSelection, _config: &ServiceConfig) -> DetectResult<DynDetector> {
    Err(DetectError::config("built without the `onnx` feature"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorConfig;
    use crate::infer::blob::ImageTensor;
    use crate::infer::decode::RawOutputs;
    use crate::infer::priors::generate_priors;
    use ndarray::Array2;

    /// Every prior reports a confident face with zero regression.
    struct FlatEngine;

    impl InferenceEngine for FlatEngine {
        fn forward(&self, input: &ImageTensor) -> DetectResult<RawOutputs> {
            let n = generate_priors(input.width, input.height).len();
            let conf = Array2::from_shape_fn((n, 2), |(_, c)| c as f32);
            Ok(RawOutputs::new(Array2::zeros((n, 14)), conf, Array2::ones((n, 1))))
        }
    }

    fn context(w: u32, h: u32) -> InferenceContext {
        let det = FaceDetector::new(Box::new(FlatEngine) as Box<dyn InferenceEngine>, DetectorConfig::new(w, h)).unwrap();
        InferenceContext::with_detector(det)
    }

    #[test]
    fn letterbox_centers_wide_images() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(200, 100));
        let (canvas, offset, scale) = letterbox(&img, 100, 100);
        assert_eq!(canvas.dimensions(), (100, 100));
        assert_eq!(offset, (0.0, 25.0));
        assert_eq!(scale, (2.0, 2.0));
    }

    #[test]
    fn faces_map_back_to_source_coordinates() {
        let ctx = context(64, 64);
        let img = DynamicImage::ImageRgb8(RgbImage::new(128, 64));
        let faces = ctx.detect_image(&img, None).unwrap();
        assert!(!faces.is_empty());
        // Canvas is 64x64 with the image in rows 16..48, scaled by 2 back to source.
        for f in &faces {
            let cy = f.bbox.y + f.bbox.height / 2.0;
            assert!(cy >= -32.0 - 1e-3 && cy <= 96.0 + 1e-3);
        }
    }

    #[test]
    fn matching_size_skips_letterbox() {
        let ctx = context(64, 64);
        let img = DynamicImage::ImageRgb8(RgbImage::new(64, 64));
        let direct = ctx.detector().unwrap().detect(&img.to_rgb8()).unwrap();
        assert_eq!(ctx.detect_image(&img, None).unwrap(), direct);
    }

    #[test]
    fn missing_detector_is_reported() {
        let ctx = InferenceContext { selected_model: None, detector: None };
        let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        assert!(matches!(ctx.detect_image(&img, None), Err(DetectError::ModelNotFound(_))));
    }

    #[test]
    fn explicit_model_that_does_not_resolve_is_an_error() {
        let config = ServiceConfig {
            model: Some("/nonexistent/model.onnx".into()),
            ..ServiceConfig::default()
        };
        assert!(matches!(InferenceContext::new(&config), Err(DetectError::ModelNotFound(_))));
    }

    #[test]
    fn empty_catalog_starts_without_a_detector() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServiceConfig { models_dir: dir.path().to_path_buf(), ..ServiceConfig::default() };
        let ctx = InferenceContext::new(&config).unwrap();
        assert!(ctx.detector.is_none());
        assert!(ctx.selected_model.is_none());
    }

    #[cfg(not(feature = "onnx"))]
    #[test]
    fn resolved_model_without_an_engine_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("yunet.onnx");
        std::fs::write(&path, b"weights").unwrap();
        let config = ServiceConfig { model: Some(path), ..ServiceConfig::default() };
        assert!(matches!(InferenceContext::new(&config), Err(DetectError::Config(_))));
    }

    #[test]
    fn empty_image_is_an_input_error() {
        let ctx = context(64, 64);
        let img = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(ctx.detect_image(&img, None), Err(DetectError::EmptyImage)));
    }
}
