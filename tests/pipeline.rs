use dnnface::infer::blob::ImageTensor;
use dnnface::infer::priors::{generate_priors, prior_count};
use dnnface::{DetectError, DetectResult, DetectorConfig, FaceDetector, InferenceEngine, RawOutputs};
use image::RgbImage;
use ndarray::Array2;

/// Returns fixed outputs regardless of the input image.
struct Replay(RawOutputs);

impl InferenceEngine for Replay {
    fn forward(&self, _input: &ImageTensor) -> DetectResult<RawOutputs> {
        Ok(self.0.clone())
    }
}

fn outputs(n: usize, face_prob: impl Fn(usize) -> f32, iou: f32) -> RawOutputs {
    let conf = Array2::from_shape_fn((n, 2), |(r, c)| if c == 1 { face_prob(r) } else { 1.0 - face_prob(r) });
    RawOutputs::new(Array2::zeros((n, 14)), conf, Array2::from_elem((n, 1), iou))
}

#[test]
fn zero_scores_produce_no_faces() {
    let n = prior_count(320, 320);
    let det = FaceDetector::new(Replay(outputs(n, |_| 0.0, 1.0)), DetectorConfig::new(320, 320)).unwrap();
    assert!(det.detect(&RgbImage::new(320, 320)).unwrap().is_empty());
}

#[test]
fn zero_iou_quality_also_produces_no_faces() {
    let n = prior_count(320, 320);
    let det = FaceDetector::new(Replay(outputs(n, |_| 1.0, -2.0)), DetectorConfig::new(320, 320)).unwrap();
    assert!(det.detect(&RgbImage::new(320, 320)).unwrap().is_empty());
}

#[test]
fn row_mismatch_is_surfaced_not_truncated() {
    let n = prior_count(320, 320);
    let det = FaceDetector::new(Replay(outputs(n + 3, |_| 1.0, 1.0)), DetectorConfig::new(320, 320)).unwrap();
    match det.detect(&RgbImage::new(320, 320)) {
        Err(DetectError::ShapeMismatch { expected, actual, .. }) => {
            assert_eq!(expected, n);
            assert_eq!(actual, n + 3);
        }
        other => panic!("expected shape mismatch, got {other:?}"),
    }
}

#[test]
fn anchors_in_one_cell_collapse_to_one_face() {
    // The first three priors share a cell and differ only in size (10, 16, 24 px).
    // Concentric squares: IoU(16, 24) = 0.44 and IoU(10, 16) = 0.39, so a 0.3
    // threshold keeps only the best one.
    let n = prior_count(320, 320);
    let scores = |r: usize| match r {
        0 => 0.92,
        1 => 0.98,
        2 => 0.95,
        _ => 0.0,
    };
    let det = FaceDetector::new(Replay(outputs(n, scores, 1.0)), DetectorConfig::new(320, 320)).unwrap();
    let faces = det.detect(&RgbImage::new(320, 320)).unwrap();
    assert_eq!(faces.len(), 1);
    assert!((faces[0].score - 0.98f32.sqrt()).abs() < 1e-6);
    assert!((faces[0].bbox.width - 16.0).abs() < 1e-4);
}

#[test]
fn distant_anchors_all_survive() {
    let priors = generate_priors(320, 320);
    // Largest anchors in opposite corners of the coarsest level.
    let last = priors.len() - 1;
    let first_coarse = priors.len() - 5 * 5 * 3;
    let scores = move |r: usize| if r == last || r == first_coarse { 1.0 } else { 0.0 };
    let det = FaceDetector::new(Replay(outputs(priors.len(), scores, 1.0)), DetectorConfig::new(320, 320)).unwrap();
    let faces = det.post_process(&det.engine().0).unwrap();
    assert_eq!(faces.len(), 2);
}

#[test]
fn looser_score_threshold_admits_more_faces() {
    let priors = generate_priors(160, 160);
    let n = priors.len();
    // Level-0 cells are 8 px apart; pick cells far enough apart to never overlap.
    let hot = [0usize, 3 * 10, 3 * 20 * 10];
    let scores = move |r: usize| if hot.contains(&r) { 0.7 } else { 0.0 };
    let mut det = FaceDetector::new(Replay(outputs(n, scores, 1.0)), DetectorConfig::new(160, 160)).unwrap();
    assert!(det.detect(&RgbImage::new(160, 160)).unwrap().is_empty());

    det.set_score_threshold(0.8).unwrap();
    // sqrt(0.7) ~ 0.837
    assert_eq!(det.detect(&RgbImage::new(160, 160)).unwrap().len(), 3);
}
