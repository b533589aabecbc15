use std::path::Path;

use reqwest::multipart::{Form, Part};
use tracing::debug;

use crate::dto::DetectionResponse;
use crate::error::ClientError;

/// Async client for the detection endpoint.
#[derive(Debug, Clone)]
pub struct DetectClient {
    http: reqwest::Client,
    url: String,
}

impl DetectClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    /// Uploads one image and waits for the detections. Any non-200 answer is
    /// an error; there is no retry.
    pub async fn detect(
        &self,
        file_name: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> Result<DetectionResponse, ClientError> {
        let mut part = Part::bytes(data).file_name(file_name.to_string());
        if let Some(mime) = content_type {
            part = part.mime_str(mime)?;
        }
        let form = Form::new().part("file", part);

        debug!(url = %self.url, file_name, "uploading image");
        let response = self.http.post(&self.url).multipart(form).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Status { status, body });
        }
        Ok(response.json().await?)
    }
}

/// Blocking upload of a file from disk.
pub fn detect_file(url: &str, path: &Path) -> Result<DetectionResponse, ClientError> {
    let form = reqwest::blocking::multipart::Form::new()
        .file("file", path)
        .map_err(|source| ClientError::Read {
            path: path.to_path_buf(),
            source,
        })?;

    debug!(url, path = %path.display(), "uploading image");
    let response = reqwest::blocking::Client::new()
        .post(url)
        .multipart(form)
        .send()?;
    let status = response.status();
    if status != reqwest::StatusCode::OK {
        let body = response.text().unwrap_or_default();
        return Err(ClientError::Status { status, body });
    }
    Ok(response.json()?)
}
