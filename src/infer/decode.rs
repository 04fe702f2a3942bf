//! Prior-relative regression decoding.

use ndarray::{Array2, ArrayView1};

use super::priors::Prior;
use super::{BoundingBox, Face, Landmarks, Point};
use crate::error::{DetectError, DetectResult};

/// Regression scale for centers, landmarks and width.
pub const VARIANCE_CENTER: f32 = 0.1;
/// Regression scale for height.
///
/// Width decodes with `VARIANCE_CENTER` while height uses this one. Trained
/// weights depend on the pairing, so it stays as is.
pub const VARIANCE_SIZE: f32 = 0.2;

pub const LOC_COLS: usize = 14;
pub const CONF_COLS: usize = 2;
pub const IOU_COLS: usize = 1;

/// The three network heads, one row per prior.
#[derive(Debug, Clone)]
pub struct RawOutputs {
    /// N x 14: box `(dx, dy, dw, dh)` then five landmark `(dx, dy)` pairs.
    pub loc: Array2<f32>,
    /// N x 2: background / face probabilities.
    pub conf: Array2<f32>,
    /// N x 1: predicted IoU quality.
    pub iou: Array2<f32>,
}

impl RawOutputs {
    pub fn new(loc: Array2<f32>, conf: Array2<f32>, iou: Array2<f32>) -> Self {
        Self { loc, conf, iou }
    }

    /// Build from flat row-major buffers as returned by an inference runtime.
    pub fn from_flat(loc: Vec<f32>, conf: Vec<f32>, iou: Vec<f32>) -> DetectResult<Self> {
        Ok(Self {
            loc: reshape("loc", loc, LOC_COLS)?,
            conf: reshape("conf", conf, CONF_COLS)?,
            iou: reshape("iou", iou, IOU_COLS)?,
        })
    }

    /// Every head must carry exactly one row per prior with the expected width.
    pub fn check_against(&self, prior_count: usize) -> DetectResult<()> {
        for (tensor, arr, cols) in [
            ("loc", &self.loc, LOC_COLS),
            ("conf", &self.conf, CONF_COLS),
            ("iou", &self.iou, IOU_COLS),
        ] {
            if arr.ncols() != cols {
                return Err(DetectError::inference(format!(
                    "tensor `{tensor}` has {} columns, expected {cols}",
                    arr.ncols()
                )));
            }
            if arr.nrows() != prior_count {
                return Err(DetectError::ShapeMismatch {
                    tensor,
                    expected: prior_count,
                    actual: arr.nrows(),
                });
            }
        }
        Ok(())
    }
}

fn reshape(tensor: &str, data: Vec<f32>, cols: usize) -> DetectResult<Array2<f32>> {
    if data.len() % cols != 0 {
        return Err(DetectError::inference(format!(
            "tensor `{tensor}` has {} values, not a multiple of {cols}",
            data.len()
        )));
    }
    let rows = data.len() / cols;
    Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| DetectError::inference(format!("tensor `{tensor}` reshape: {e}")))
}

/// Geometric mean of face probability and clamped IoU quality.
#[inline]
pub fn combined_score(face_prob: f32, iou_quality: f32) -> f32 {
    (face_prob * iou_quality.clamp(0.0, 1.0)).sqrt()
}

#[inline]
fn decode_point(prior: &Prior, dx: f32, dy: f32, w: f32, h: f32) -> Point {
    Point {
        x: (prior.cx + dx * VARIANCE_CENTER * prior.sx) * w,
        y: (prior.cy + dy * VARIANCE_CENTER * prior.sy) * h,
    }
}

pub fn decode_one(prior: &Prior, loc: ArrayView1<f32>, face_prob: f32, iou_quality: f32, w: f32, h: f32) -> Face {
    let center = decode_point(prior, loc[0], loc[1], w, h);
    let bw = prior.sx * (loc[2] * VARIANCE_CENTER).exp() * w;
    let bh = prior.sy * (loc[3] * VARIANCE_SIZE).exp() * h;
    let lm = |k: usize| decode_point(prior, loc[4 + 2 * k], loc[5 + 2 * k], w, h);
    Face {
        bbox: BoundingBox {
            x: center.x - bw / 2.0,
            y: center.y - bh / 2.0,
            width: bw,
            height: bh,
        },
        landmarks: Landmarks {
            right_eye: lm(0),
            left_eye: lm(1),
            nose_tip: lm(2),
            mouth_right: lm(3),
            mouth_left: lm(4),
        },
        score: combined_score(face_prob, iou_quality),
    }
}

/// One candidate per prior, in prior order, regardless of score.
pub fn decode(priors: &[Prior], outputs: &RawOutputs, width: u32, height: u32) -> DetectResult<Vec<Face>> {
    outputs.check_against(priors.len())?;
    let (w, h) = (width as f32, height as f32);
    let faces = priors
        .iter()
        .zip(outputs.loc.rows())
        .zip(outputs.conf.rows())
        .zip(outputs.iou.rows())
        .map(|(((prior, loc), conf), iou)| decode_one(prior, loc, conf[1], iou[0], w, h))
        .collect();
    Ok(faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infer::priors::generate_priors;
    use ndarray::{Array1, array};

    fn outputs_for(n: usize, loc_row: [f32; 14], face_prob: f32, iou: f32) -> RawOutputs {
        let loc = Array2::from_shape_fn((n, 14), |(_, c)| loc_row[c]);
        let conf = Array2::from_shape_fn((n, 2), |(_, c)| if c == 1 { face_prob } else { 1.0 - face_prob });
        let iou = Array2::from_elem((n, 1), iou);
        RawOutputs::new(loc, conf, iou)
    }

    #[test]
    fn score_is_geometric_mean() {
        assert!((combined_score(0.81, 0.49) - 0.63).abs() < 1e-6);
        assert!((combined_score(0.25, 1.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn iou_quality_is_clamped() {
        assert_eq!(combined_score(1.0, 1.5), 1.0);
        assert_eq!(combined_score(0.9, -0.3), 0.0);
    }

    #[test]
    fn zero_deltas_decode_to_the_prior() {
        let priors = generate_priors(320, 240);
        let outputs = outputs_for(priors.len(), [0.0; 14], 1.0, 1.0);
        let faces = decode(&priors, &outputs, 320, 240).unwrap();
        assert_eq!(faces.len(), priors.len());
        for (p, f) in priors.iter().zip(&faces).step_by(97) {
            let cx = f.bbox.x + f.bbox.width / 2.0;
            let cy = f.bbox.y + f.bbox.height / 2.0;
            assert!((cx - p.cx * 320.0).abs() < 1e-3);
            assert!((cy - p.cy * 240.0).abs() < 1e-3);
            assert_eq!(f.bbox.width, p.sx * 320.0);
            assert_eq!(f.bbox.height, p.sy * 240.0);
            for lm in f.landmarks.points() {
                assert_eq!(lm.x, p.cx * 320.0);
                assert_eq!(lm.y, p.cy * 240.0);
            }
        }
    }

    #[test]
    fn deltas_shift_and_scale_with_variances() {
        let prior = Prior { cx: 0.5, cy: 0.5, sx: 0.1, sy: 0.2 };
        let loc: Array1<f32> = array![1.0, -1.0, 1.0, 1.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let f = decode_one(&prior, loc.view(), 1.0, 1.0, 100.0, 100.0);

        // Center: (0.5 + 1 * 0.1 * 0.1) * 100 = 51, (0.5 - 1 * 0.1 * 0.2) * 100 = 48
        let cx = f.bbox.x + f.bbox.width / 2.0;
        let cy = f.bbox.y + f.bbox.height / 2.0;
        assert!((cx - 51.0).abs() < 1e-4);
        assert!((cy - 48.0).abs() < 1e-4);

        // Width uses 0.1, height uses 0.2.
        assert!((f.bbox.width - 10.0 * 0.1f32.exp()).abs() < 1e-4);
        assert!((f.bbox.height - 20.0 * 0.2f32.exp()).abs() < 1e-4);

        // Right eye: (0.5 + 2 * 0.1 * 0.1) * 100 = 52
        assert!((f.landmarks.right_eye.x - 52.0).abs() < 1e-4);
        assert!((f.landmarks.right_eye.y - 50.0).abs() < 1e-4);
    }

    #[test]
    fn row_count_mismatch_is_an_error() {
        let priors = generate_priors(320, 320);
        let outputs = outputs_for(priors.len() - 1, [0.0; 14], 1.0, 1.0);
        let err = decode(&priors, &outputs, 320, 320).unwrap_err();
        assert!(matches!(
            err,
            DetectError::ShapeMismatch { tensor: "loc", expected: 5875, actual: 5874 }
        ));
    }

    #[test]
    fn mismatch_in_single_head_is_reported() {
        let priors = generate_priors(320, 320);
        let mut outputs = outputs_for(priors.len(), [0.0; 14], 1.0, 1.0);
        outputs.iou = Array2::zeros((10, 1));
        assert!(matches!(
            decode(&priors, &outputs, 320, 320),
            Err(DetectError::ShapeMismatch { tensor: "iou", .. })
        ));
    }

    #[test]
    fn from_flat_rejects_ragged_buffers() {
        assert!(RawOutputs::from_flat(vec![0.0; 15], vec![0.0; 2], vec![0.0; 1]).is_err());
        let ok = RawOutputs::from_flat(vec![0.0; 28], vec![0.0; 4], vec![0.0; 2]).unwrap();
        assert_eq!((ok.loc.nrows(), ok.conf.nrows(), ok.iou.nrows()), (2, 2, 2));
    }
}
