use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use image::DynamicImage;
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::detector::Detector;
use crate::dto::{Detection, DetectionResponse, StatusResponse};
use crate::error::{ApiError, DetectError};

/// Shared by every request; the detector is never mutated after start-up.
#[derive(Clone)]
pub struct AppState {
    pub detector: Arc<dyn Detector>,
    pub threshold: f32,
}

impl AppState {
    pub fn new(detector: Arc<dyn Detector>, threshold: f32) -> Self {
        Self {
            detector,
            threshold,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/detect", post(detect))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Default, Deserialize)]
pub struct DetectParams {
    pub threshold: Option<f32>,
}

pub async fn status() -> Json<StatusResponse> {
    Json(StatusResponse::default())
}

pub async fn detect(
    State(state): State<AppState>,
    params: Result<Query<DetectParams>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<DetectionResponse>, ApiError> {
    let Query(params) = params?;
    let mut multipart = multipart?;
    let threshold = params.threshold.unwrap_or(state.threshold);
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ApiError::InvalidThreshold(threshold));
    }

    let (image_name, data) = read_upload(&mut multipart).await?;
    debug!(image_name = %image_name, bytes = data.len(), threshold, "received upload");

    let detector = state.detector.clone();
    let response = tokio::task::spawn_blocking(move || {
        run_detection(&*detector, image_name, &data, threshold)
    })
    .await??;

    info!(
        image_name = %response.image_name,
        num_detections = response.num_detections,
        "detection done"
    );
    Ok(Json(response))
}

/// Decode, detect and shape the response for one upload.
pub fn run_detection(
    detector: &dyn Detector,
    image_name: String,
    data: &[u8],
    threshold: f32,
) -> Result<DetectionResponse, DetectError> {
    let image = DynamicImage::ImageRgb8(image::load_from_memory(data)?.to_rgb8());
    let candidates = detector.detect(&image, threshold)?;

    let labels = detector.labels();
    let detections = candidates
        .iter()
        .map(|c| Detection::from_candidate(c, labels))
        .collect();
    Ok(DetectionResponse::new(image_name, detections))
}

async fn read_upload(multipart: &mut Multipart) -> Result<(String, Bytes), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;
        return Ok((name, data));
    }
    Err(ApiError::MissingFile)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::LabelMap;
    use crate::postprocess::Candidate;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    struct Fixed(Vec<Candidate>, LabelMap);

    impl Detector for Fixed {
        fn detect(&self, _: &DynamicImage, threshold: f32) -> Result<Vec<Candidate>, DetectError> {
            Ok(self.0.iter().copied().filter(|c| c.score > threshold).collect())
        }

        fn labels(&self) -> &LabelMap {
            &self.1
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    #[test]
    fn run_detection_applies_threshold_and_labels() {
        let detector = Fixed(
            vec![
                Candidate {
                    class_id: 1,
                    score: 0.9,
                    bbox: [1.0, 2.0, 3.0, 4.0],
                },
                Candidate {
                    class_id: 0,
                    score: 0.4,
                    bbox: [1.0, 2.0, 3.0, 4.0],
                },
            ],
            LabelMap::fashion(),
        );
        let response = run_detection(&detector, "a.png".into(), &png(8, 8), 0.5).unwrap();
        assert_eq!(response.num_detections, 1);
        assert_eq!(response.detections[0].label, "bottom");
    }

    #[test]
    fn run_detection_rejects_garbage() {
        let detector = Fixed(Vec::new(), LabelMap::fashion());
        let err = run_detection(&detector, "a.txt".into(), b"hello", 0.5).unwrap_err();
        assert!(err.is_client_error());
    }
}
