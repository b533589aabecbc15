#![allow(dead_code)]

use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use fashion_detect::{router, AppState, Candidate, DetectError, Detector, LabelMap};
use image::{DynamicImage, ImageFormat, RgbImage};

pub const BOUNDARY: &str = "fashion-detect-test-boundary";

/// Returns the same candidates for every image, filtered by the threshold.
pub struct StubDetector {
    pub candidates: Vec<Candidate>,
    pub labels: LabelMap,
}

impl Detector for StubDetector {
    fn detect(&self, _: &DynamicImage, threshold: f32) -> Result<Vec<Candidate>, DetectError> {
        Ok(self
            .candidates
            .iter()
            .copied()
            .filter(|c| c.score > threshold)
            .collect())
    }

    fn labels(&self) -> &LabelMap {
        &self.labels
    }
}

/// Fails every inference.
pub struct BrokenDetector(pub LabelMap);

impl Detector for BrokenDetector {
    fn detect(&self, _: &DynamicImage, _: f32) -> Result<Vec<Candidate>, DetectError> {
        Err(DetectError::MissingOutput("logits".into()))
    }

    fn labels(&self) -> &LabelMap {
        &self.0
    }
}

pub fn jacket_detector() -> StubDetector {
    StubDetector {
        candidates: vec![Candidate {
            class_id: 0,
            score: 0.87,
            bbox: [10.0, 20.0, 200.0, 300.0],
        }],
        labels: LabelMap::from_names(["jacket"]),
    }
}

pub fn app(detector: impl Detector + 'static) -> Router {
    router(AppState::new(Arc::new(detector), 0.5))
}

pub fn png(width: u32, height: u32) -> Vec<u8> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(RgbImage::new(width, height))
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

pub fn multipart_body(field: &str, file_name: &str, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

/// Serves `app` on an ephemeral local port.
pub async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}
