pub mod cli;
pub mod client;
pub mod config;
pub mod detector;
pub mod dto;
pub mod error;
pub mod helpers;
pub mod mapping;
pub mod model;
pub mod postprocess;
pub mod preprocess;
pub mod service;
pub mod viewer;

pub use crate::cli::{PlotArgs, ServeArgs, ViewerArgs};
pub use crate::client::{detect_file, DetectClient};
pub use crate::config::ServiceConfig;
pub use crate::detector::{Detector, DetrDetector, TensorNames};
pub use crate::dto::{Detection, DetectionResponse, StatusResponse};
pub use crate::error::{ApiError, ClientError, ConfigError, DetectError};
pub use crate::helpers::Annotator;
pub use crate::mapping::{load_class_mapping, LabelMap};
pub use crate::model::OnnxModel;
pub use crate::postprocess::{Candidate, DecodeMode, Decoder};
pub use crate::preprocess::{PreprocessConfig, Processor, ResizeMode};
pub use crate::service::{router, AppState};

use tracing_subscriber::EnvFilter;

/// Installs the fmt subscriber; `RUST_LOG` overrides the default `info` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves on Ctrl-C so servers can drain in-flight requests.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
