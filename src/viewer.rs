use std::io::Cursor;
use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use image::{DynamicImage, ImageFormat, RgbImage};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::client::DetectClient;
use crate::dto::DetectionResponse;
use crate::error::ClientError;
use crate::helpers::Annotator;

#[derive(Clone)]
pub struct ViewerState {
    client: DetectClient,
    annotator: Arc<Annotator>,
}

impl ViewerState {
    pub fn new(client: DetectClient, annotator: Annotator) -> Self {
        Self {
            client,
            annotator: Arc::new(annotator),
        }
    }
}

#[derive(Debug, Error)]
pub enum ViewerError {
    #[error("malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error("no image was uploaded")]
    MissingFile,
    #[error("the uploaded file is not a readable image: {0}")]
    Image(image::ImageError),
    #[error("Error processing the image in the API: {0}")]
    Api(#[from] ClientError),
    #[error("failed to encode preview: {0}")]
    Encode(image::ImageError),
    #[error("image worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

impl ViewerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ViewerError::Multipart(_) | ViewerError::MissingFile | ViewerError::Image(_) => {
                StatusCode::BAD_REQUEST
            }
            ViewerError::Api(_) => StatusCode::BAD_GATEWAY,
            ViewerError::Encode(_) | ViewerError::Worker(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ViewerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("{self}");
        } else {
            warn!("{self}");
        }
        (status, Html(render_error(&self.to_string()))).into_response()
    }
}

pub fn router(state: ViewerState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/detect", post(submit))
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn index() -> Html<String> {
    Html(page(""))
}

struct Upload {
    file_name: String,
    content_type: Option<String>,
    data: Vec<u8>,
}

pub async fn submit(
    State(state): State<ViewerState>,
    mut multipart: Multipart,
) -> Result<Html<String>, ViewerError> {
    let upload = read_upload(&mut multipart).await?;
    let data = upload.data.clone();
    let original = tokio::task::spawn_blocking(move || image::load_from_memory(&data))
        .await?
        .map_err(ViewerError::Image)?
        .to_rgb8();

    let response = state
        .client
        .detect(
            &upload.file_name,
            upload.data,
            upload.content_type.as_deref(),
        )
        .await?;
    info!(
        image_name = %response.image_name,
        num_detections = response.num_detections,
        "detections received"
    );

    let annotator = state.annotator.clone();
    let detections = response.detections.clone();
    let (original, annotated) = tokio::task::spawn_blocking(move || {
        let mut annotated = original.clone();
        annotator.draw_chips(&mut annotated, &detections);
        Ok::<_, ViewerError>((png_data_uri(original)?, png_data_uri(annotated)?))
    })
    .await??;
    Ok(Html(render_result(&original, &annotated, &response)))
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ViewerError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?.to_vec();
        if data.is_empty() {
            return Err(ViewerError::MissingFile);
        }
        return Ok(Upload {
            file_name,
            content_type,
            data,
        });
    }
    Err(ViewerError::MissingFile)
}

fn png_data_uri(image: RgbImage) -> Result<String, ViewerError> {
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(ViewerError::Encode)?;
    Ok(format!("data:image/png;base64,{}", BASE64_STANDARD.encode(buf)))
}

const STYLE: &str = "body{font-family:sans-serif;max-width:760px;margin:2rem auto;padding:0 1rem}\
img{max-width:100%}\
.error{background:#fde2e2;color:#8a1111;padding:.75rem;border-radius:4px}\
.success{background:#e1f5e6;color:#14532d;padding:.75rem;border-radius:4px}\
pre{background:#f4f4f4;padding:.75rem;overflow:auto}";

fn page(content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Fashion Object Detection</title>
<style>{STYLE}</style>
</head>
<body>
<h1>Fashion object detection</h1>
<p>Upload an image to see the detected objects.</p>
<form action="/detect" method="post" enctype="multipart/form-data">
<input type="file" name="file" accept=".png,.jpg,.jpeg,image/png,image/jpeg" required>
<button type="submit">Detect objects</button>
</form>
{content}
</body>
</html>
"#
    )
}

pub fn render_result(original: &str, annotated: &str, response: &DetectionResponse) -> String {
    let mut content = format!(
        r#"<h2>Original image</h2>
<img src="{original}" alt="original image">
<h2>Detected objects</h2>
<img src="{annotated}" alt="annotated image">
<p class="success">Detections: {}</p>
"#,
        response.num_detections
    );
    if !response.detections.is_empty() {
        let json = serde_json::to_string_pretty(&response.detections).unwrap_or_default();
        content.push_str(&format!("<pre>{}</pre>\n", escape_html(&json)));
    }
    page(&content)
}

pub fn render_error(message: &str) -> String {
    page(&format!(
        "<p class=\"error\">{}</p>\n",
        escape_html(message)
    ))
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
