use image::DynamicImage;
use ndarray::{Array2, CowArray};
use ort::session::Session;
use tracing::debug;

use crate::error::DetectError;
use crate::mapping::LabelMap;
use crate::postprocess::{Candidate, DecodeMode, Decoder};
use crate::preprocess::{Processor, Transform};

/// An object detector shared read-only by all requests.
pub trait Detector: Send + Sync {
    /// Detections whose score is strictly above `threshold`, boxes in the
    /// image's own pixel coordinates.
    fn detect(&self, image: &DynamicImage, threshold: f32) -> Result<Vec<Candidate>, DetectError>;

    fn labels(&self) -> &LabelMap;
}

/// Input and output names of the exported graph.
#[derive(Debug, Clone)]
pub struct TensorNames {
    pub input: String,
    pub sizes_input: String,
    pub logits: String,
    pub boxes: String,
    pub labels: String,
    pub scores: String,
}

impl Default for TensorNames {
    fn default() -> Self {
        Self {
            input: "pixel_values".into(),
            sizes_input: "orig_target_sizes".into(),
            logits: "logits".into(),
            boxes: "pred_boxes".into(),
            labels: "labels".into(),
            scores: "scores".into(),
        }
    }
}

/// DETR-family detector running an ONNX export through ONNX Runtime.
pub struct DetrDetector {
    session: Session,
    processor: Processor,
    decoder: Decoder,
    labels: LabelMap,
    names: TensorNames,
}

impl DetrDetector {
    pub fn new(
        session: Session,
        processor: Processor,
        decoder: Decoder,
        labels: LabelMap,
        names: TensorNames,
    ) -> Self {
        Self {
            session,
            processor,
            decoder,
            labels,
            names,
        }
    }
}

impl Detector for DetrDetector {
    fn detect(&self, image: &DynamicImage, threshold: f32) -> Result<Vec<Candidate>, DetectError> {
        let (xs, transforms) = self.processor.preprocess(std::slice::from_ref(image))?;
        let transform = transforms[0];
        let xs = CowArray::from(xs.into_dyn());

        let names = &self.names;
        let candidates = if self.decoder.mode == DecodeMode::Embedded {
            let sizes = CowArray::from(target_sizes(&transform)?.into_dyn());
            let ys = self.session.run(ort::inputs![
                names.input.as_str() => xs.view(),
                names.sizes_input.as_str() => sizes.view(),
            ]?)?;
            let labels = require(ys.get(names.labels.as_str()), &names.labels)?
                .try_extract_tensor::<i64>()?;
            let boxes = require(ys.get(names.boxes.as_str()), &names.boxes)?
                .try_extract_tensor::<f32>()?;
            let scores = require(ys.get(names.scores.as_str()), &names.scores)?
                .try_extract_tensor::<f32>()?;
            self.decoder
                .decode_embedded(&labels, &boxes, &scores, &transform, threshold)?
        } else {
            let ys = self
                .session
                .run(ort::inputs![names.input.as_str() => xs.view()]?)?;
            let logits = require(ys.get(names.logits.as_str()), &names.logits)?
                .try_extract_tensor::<f32>()?;
            let boxes = require(ys.get(names.boxes.as_str()), &names.boxes)?
                .try_extract_tensor::<f32>()?;
            self.decoder
                .decode_logits(&logits, &boxes, &transform, threshold)?
        };

        debug!(
            width = transform.orig_width,
            height = transform.orig_height,
            input_width = transform.input_width,
            input_height = transform.input_height,
            kept = candidates.len(),
            "inference done"
        );
        Ok(candidates)
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }
}

/// `orig_target_sizes` input of graphs that rescale boxes themselves: one
/// `[width, height]` row.
pub fn target_sizes(transform: &Transform) -> Result<Array2<i64>, DetectError> {
    Ok(Array2::from_shape_vec(
        (1, 2),
        vec![transform.orig_width as i64, transform.orig_height as i64],
    )?)
}

fn require<T>(output: Option<T>, name: &str) -> Result<T, DetectError> {
    output.ok_or_else(|| DetectError::MissingOutput(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{PreprocessConfig, ResizeMode};

    #[test]
    fn target_sizes_are_width_then_height() {
        let transform = Processor::new(PreprocessConfig {
            resize: ResizeMode::Stretch,
            width: 32,
            height: 32,
            ..PreprocessConfig::default()
        })
        .plan(640, 480);
        let sizes = target_sizes(&transform).unwrap();
        assert_eq!(sizes.shape(), &[1, 2]);
        assert_eq!(sizes.row(0).to_vec(), vec![640, 480]);
    }

    #[test]
    fn absent_output_is_reported_by_name() {
        let err = require(None::<()>, "class_logits").unwrap_err();
        assert!(matches!(&err, DetectError::MissingOutput(name) if name == "class_logits"));
        assert_eq!(require(Some(3), "logits").unwrap(), 3);
    }
}
