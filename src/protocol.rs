use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::infer::Face;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectRequest {
    /// Base64 encoded PNG or JPEG.
    pub image: String,
    #[serde(default)]
    pub score_threshold: Option<f32>,
    /// Also return each face as a flat 15-value row.
    #[serde(default)]
    pub flat: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub request_id: Uuid,
    pub width: u32,
    pub height: u32,
    pub faces: Vec<Face>,
    /// `x, y, w, h`, five landmark points, score; present when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<[f32; 15]>>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}
