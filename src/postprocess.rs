use ndarray::{ArrayView1, ArrayView2, ArrayViewD, Axis, Ix2, Ix3};
use serde::Deserialize;

use crate::error::DetectError;
use crate::preprocess::Transform;

/// One kept detection: class id, confidence and `[xmin, ymin, xmax, ymax]` in
/// original image pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub class_id: usize,
    pub score: f32,
    pub bbox: [f32; 4],
}

/// How the raw outputs of the exported graph are read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecodeMode {
    /// Per-class sigmoid with a top-k over all (query, class) pairs.
    #[default]
    Sigmoid,
    /// Per-query softmax whose last class means "no object".
    Softmax,
    /// Labels, scores and original-pixel boxes already produced by the graph.
    Embedded,
}

#[derive(Debug, Clone)]
pub struct Decoder {
    pub mode: DecodeMode,
    pub top_k: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self {
            mode: DecodeMode::Sigmoid,
            top_k: 100,
        }
    }
}

impl Decoder {
    pub fn new(mode: DecodeMode, top_k: usize) -> Self {
        Self { mode, top_k }
    }

    /// Decodes `logits [1, Q, C]` and normalised `pred_boxes [1, Q, 4]`.
    pub fn decode_logits(
        &self,
        logits: &ArrayViewD<f32>,
        boxes: &ArrayViewD<f32>,
        transform: &Transform,
        threshold: f32,
    ) -> Result<Vec<Candidate>, DetectError> {
        let logits = logits.view().into_dimensionality::<Ix3>()?;
        let boxes = boxes.view().into_dimensionality::<Ix3>()?;
        let (batch, queries, _) = logits.dim();
        if batch == 0 || boxes.dim() != (batch, queries, 4) {
            return Err(DetectError::OutputShape(format!(
                "logits {:?} and boxes {:?} disagree, boxes must be [{batch}, {queries}, 4]",
                logits.shape(),
                boxes.shape()
            )));
        }
        let logits = logits.index_axis(Axis(0), 0);
        let boxes = boxes.index_axis(Axis(0), 0);

        let raw = match self.mode {
            DecodeMode::Softmax => softmax_and_filter(&logits, threshold),
            _ => sigmoid_top_k(&logits, self.top_k, threshold),
        };

        Ok(raw
            .into_iter()
            .map(|(query, class_id, score)| {
                let row = boxes.row(query);
                let bbox = transform.to_original([row[0], row[1], row[2], row[3]]);
                Candidate {
                    class_id,
                    score,
                    bbox: clamp_box(bbox, transform.orig_width, transform.orig_height),
                }
            })
            .collect())
    }

    /// Filters graph-decoded `labels [1, N]`, `boxes [1, N, 4]` (xyxy in
    /// original pixels) and `scores [1, N]`.
    pub fn decode_embedded(
        &self,
        labels: &ArrayViewD<i64>,
        boxes: &ArrayViewD<f32>,
        scores: &ArrayViewD<f32>,
        transform: &Transform,
        threshold: f32,
    ) -> Result<Vec<Candidate>, DetectError> {
        let labels = labels.view().into_dimensionality::<Ix2>()?;
        let scores = scores.view().into_dimensionality::<Ix2>()?;
        let boxes = boxes.view().into_dimensionality::<Ix3>()?;
        let (batch, count) = labels.dim();
        if batch == 0 || scores.dim() != (batch, count) || boxes.dim() != (batch, count, 4) {
            return Err(DetectError::OutputShape(format!(
                "labels {:?}, scores {:?} and boxes {:?} disagree",
                labels.shape(),
                scores.shape(),
                boxes.shape()
            )));
        }
        let labels = labels.index_axis(Axis(0), 0);
        let scores = scores.index_axis(Axis(0), 0);
        let boxes = boxes.index_axis(Axis(0), 0);

        Ok(labels
            .iter()
            .zip(scores.iter())
            .zip(boxes.axis_iter(Axis(0)))
            .filter(|((_, score), _)| **score > threshold)
            .map(|((&label, &score), row)| Candidate {
                class_id: label.max(0) as usize,
                score,
                bbox: clamp_box(
                    [row[0], row[1], row[2], row[3]],
                    transform.orig_width,
                    transform.orig_height,
                ),
            })
            .collect())
    }
}

pub fn softmax(slice: &ArrayView1<f32>) -> Vec<f32> {
    let max_val = slice.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp_vals: Vec<f32> = slice.iter().map(|x| (x - max_val).exp()).collect();
    let sum_exp: f32 = exp_vals.iter().sum();
    exp_vals.into_iter().map(|v| v / sum_exp).collect()
}

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

pub fn argmax_and_max(values: &[f32]) -> (usize, f32) {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(max_idx, max_val), (i, &val)| {
            if val > max_val { (i, val) } else { (max_idx, max_val) }
        })
}

/// Softmax per query, ignoring the trailing "no object" class.
/// Returns `(query, class, score)` in query order.
pub fn softmax_and_filter(logits: &ArrayView2<f32>, threshold: f32) -> Vec<(usize, usize, f32)> {
    let mut kept = Vec::new();
    for (query, row) in logits.axis_iter(Axis(0)).enumerate() {
        let probs = softmax(&row);
        let objects = &probs[..probs.len().saturating_sub(1)];
        if objects.is_empty() {
            continue;
        }
        let (class_id, score) = argmax_and_max(objects);
        if score > threshold {
            kept.push((query, class_id, score));
        }
    }
    kept
}

/// Sigmoid over every (query, class) pair, best `top_k` pairs kept.
/// Returns `(query, class, score)` by descending score.
pub fn sigmoid_top_k(
    logits: &ArrayView2<f32>,
    top_k: usize,
    threshold: f32,
) -> Vec<(usize, usize, f32)> {
    let num_classes = logits.ncols();
    if num_classes == 0 {
        return Vec::new();
    }
    let mut scored: Vec<(usize, f32)> = logits
        .iter()
        .enumerate()
        .map(|(idx, &logit)| (idx, sigmoid(logit)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored.truncate(top_k);

    scored
        .into_iter()
        .filter(|(_, score)| *score > threshold)
        .map(|(idx, score)| (idx / num_classes, idx % num_classes, score))
        .collect()
}

/// Clamps a box to the image and orders its corners.
pub fn clamp_box(bbox: [f32; 4], width: u32, height: u32) -> [f32; 4] {
    let (w, h) = (width as f32, height as f32);
    let fix = |v: f32, max: f32| if v.is_finite() { v.clamp(0.0, max) } else { 0.0 };
    let (x0, x1) = (fix(bbox[0], w), fix(bbox[2], w));
    let (y0, y1) = (fix(bbox[1], h), fix(bbox[3], h));
    [x0.min(x1), y0.min(y1), x0.max(x1), y0.max(y1)]
}
