use serde::{Deserialize, Serialize};

use crate::mapping::LabelMap;
use crate::postprocess::Candidate;

pub const STATUS_MESSAGE: &str = "Fashion object detection API is up and running";

/// One detected object, as sent over the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub score: f64,
    /// `[xmin, ymin, xmax, ymax]` in original image pixels.
    #[serde(rename = "box")]
    pub bbox: [f64; 4],
}

impl Detection {
    /// Rounds the score to 3 decimals and every coordinate to 2.
    pub fn from_candidate(candidate: &Candidate, labels: &LabelMap) -> Self {
        Self {
            label: labels.name(candidate.class_id),
            score: round_to(candidate.score as f64, 3),
            bbox: candidate.bbox.map(|v| round_to(v as f64, 2)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResponse {
    pub image_name: String,
    pub num_detections: usize,
    pub detections: Vec<Detection>,
}

impl DetectionResponse {
    pub fn new(image_name: impl Into<String>, detections: Vec<Detection>) -> Self {
        Self {
            image_name: image_name.into(),
            num_detections: detections.len(),
            detections,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

impl Default for StatusResponse {
    fn default() -> Self {
        Self {
            status: STATUS_MESSAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
