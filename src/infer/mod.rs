pub mod blob;
pub mod decode;
pub mod priors;
#[cfg(feature = "onnx")]
pub mod yunet;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// Axis-aligned box in top-left form, pixel units.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    /// Whole-pixel box, each component truncated toward zero.
    pub fn truncated(&self) -> BoundingBox {
        BoundingBox {
            x: self.x.trunc(),
            y: self.y.trunc(),
            width: self.width.trunc(),
            height: self.height.trunc(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Landmarks {
    pub right_eye: Point,
    pub left_eye: Point,
    pub nose_tip: Point,
    pub mouth_right: Point,
    pub mouth_left: Point,
}

impl Landmarks {
    pub fn points(&self) -> [Point; 5] {
        [
            self.right_eye,
            self.left_eye,
            self.nose_tip,
            self.mouth_right,
            self.mouth_left,
        ]
    }
}

/// One detected face. Decoded candidates and suppression survivors share this type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Face {
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
    pub landmarks: Landmarks,
    pub score: f32,
}

impl Face {
    /// Flat `(x, y, w, h, re, le, nt, rcm, lcm, score)` layout, 15 values.
    pub fn to_row(&self) -> [f32; 15] {
        let mut row = [0.0f32; 15];
        row[0] = self.bbox.x;
        row[1] = self.bbox.y;
        row[2] = self.bbox.width;
        row[3] = self.bbox.height;
        for (k, p) in self.landmarks.points().iter().enumerate() {
            row[4 + 2 * k] = p.x;
            row[5 + 2 * k] = p.y;
        }
        row[14] = self.score;
        row
    }

    /// Map from a padded, resized canvas back to the source image: subtract the
    /// canvas offset, then scale.
    pub fn map_to_source(&self, offset: (f32, f32), scale: (f32, f32)) -> Face {
        let (dx, dy) = offset;
        let (sx, sy) = scale;
        let p = |p: Point| Point { x: (p.x - dx) * sx, y: (p.y - dy) * sy };
        Face {
            bbox: BoundingBox {
                x: (self.bbox.x - dx) * sx,
                y: (self.bbox.y - dy) * sy,
                width: self.bbox.width * sx,
                height: self.bbox.height * sy,
            },
            landmarks: Landmarks {
                right_eye: p(self.landmarks.right_eye),
                left_eye: p(self.landmarks.left_eye),
                nose_tip: p(self.landmarks.nose_tip),
                mouth_right: p(self.landmarks.mouth_right),
                mouth_left: p(self.landmarks.mouth_left),
            },
            score: self.score,
        }
    }
}

/// Suppression parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsParams {
    pub score_threshold: f32,
    pub iou_threshold: f32,
    /// Candidates considered after sorting; 0 disables the cap.
    pub top_k: usize,
}

impl Default for NmsParams {
    fn default() -> Self {
        Self { score_threshold: 0.9, iou_threshold: 0.3, top_k: 5000 }
    }
}

pub fn intersection_over_union(a: &BoundingBox, b: &BoundingBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = a.right().min(b.right());
    let y2 = a.bottom().min(b.bottom());
    let w = (x2 - x1).max(0.0);
    let h = (y2 - y1).max(0.0);
    let inter = w * h;
    if inter <= 0.0 { return 0.0; }
    let union = a.area() + b.area() - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

/// Greedy NMS. Returns survivors in descending score order.
///
/// Zero or one candidate is returned untouched, thresholds included. Overlap
/// is measured on whole-pixel boxes; the returned faces keep their float boxes.
pub fn non_max_suppression(mut faces: Vec<Face>, params: &NmsParams) -> Vec<Face> {
    if faces.len() <= 1 { return faces; }
    faces.retain(|f| f.score >= params.score_threshold);
    faces.sort_by(|a, b| b.score.total_cmp(&a.score));
    if params.top_k > 0 { faces.truncate(params.top_k); }

    let mut selected: Vec<(BoundingBox, Face)> = Vec::new();
    for candidate in faces {
        let pixels = candidate.bbox.truncated();
        let keep = selected
            .iter()
            .all(|(kept, _)| intersection_over_union(&pixels, kept) <= params.iou_threshold);
        if keep { selected.push((pixels, candidate)); }
    }
    selected.into_iter().map(|(_, face)| face).collect()
}
