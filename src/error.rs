use std::path::PathBuf;

use axum::extract::multipart::MultipartError;
use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::QueryRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;
use tracing::{error, warn};

use crate::dto::ErrorResponse;

/// Failures of a single detection pass, from decoding to decoding outputs.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("invalid image: {0}")]
    Image(#[from] image::ImageError),
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("resize failed: {0}")]
    Resize(#[from] fast_image_resize::ResizeError),
    #[error("unexpected tensor shape: {0}")]
    Shape(#[from] ndarray::ShapeError),
    #[error("onnx runtime error: {0}")]
    Ort(#[from] ort::Error),
    #[error("model output `{0}` not found")]
    MissingOutput(String),
    #[error("model outputs have mismatched shapes: {0}")]
    OutputShape(String),
}

impl DetectError {
    /// Errors caused by the uploaded bytes rather than by the model.
    pub fn is_client_error(&self) -> bool {
        matches!(self, DetectError::Image(_) | DetectError::EmptyImage)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{path} has no `id2label` table")]
    MissingId2Label { path: PathBuf },
    #[error("invalid label id `{0}`")]
    LabelId(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors returned by the detection endpoint.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("expected a multipart/form-data upload: {0}")]
    NotMultipart(#[from] MultipartRejection),
    #[error("malformed multipart body: {0}")]
    Multipart(#[from] MultipartError),
    #[error("invalid query string: {0}")]
    Query(#[from] QueryRejection),
    #[error("missing multipart field `file`")]
    MissingFile,
    #[error("threshold must lie in [0, 1], got {0}")]
    InvalidThreshold(f32),
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error("inference worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotMultipart(_) | ApiError::Multipart(_) | ApiError::MissingFile => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Query(_) | ApiError::InvalidThreshold(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Detect(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Detect(_) | ApiError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("detection request failed: {self}");
        } else {
            warn!("rejected detection request: {self}");
        }
        let body = ErrorResponse {
            detail: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Errors seen by the clients talking to the detection service.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to detection service failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("detection service answered {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_image_maps_to_client_error() {
        let err = image::load_from_memory(b"definitely not an image").unwrap_err();
        let api = ApiError::from(DetectError::from(err));
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn model_failures_map_to_server_error() {
        let api = ApiError::from(DetectError::MissingOutput("logits".into()));
        assert_eq!(api.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::InvalidThreshold(1.5).status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
