use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use fashion_detect::{
    init_tracing, router, shutdown_signal, AppState, DetrDetector, OnnxModel, Processor,
    ServeArgs, ServiceConfig,
};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = ServeArgs::parse();
    let config = ServiceConfig::load(&args).context("invalid configuration")?;
    let model = &config.model;

    let labels = model.label_map().context("failed to load labels")?;
    info!(labels = labels.len(), "label table ready");

    // loaded once, shared read-only by every request
    let session = OnnxModel::new(model.cuda)
        .load_model(&model.path)
        .with_context(|| format!("failed to load model {}", model.path.display()))?;
    let detector = DetrDetector::new(
        session,
        Processor::new(model.preprocess_config()),
        model.decoder(),
        labels,
        model.tensor_names(),
    );
    let state = AppState::new(Arc::new(detector), config.detection.threshold);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("detection service listening on http://{addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
