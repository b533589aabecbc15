use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use fashion_detect::viewer::{self, ViewerState};
use fashion_detect::{init_tracing, shutdown_signal, Annotator, DetectClient, ViewerArgs};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = ViewerArgs::parse();

    let annotator = Annotator::from_font_path(args.font.as_deref());
    let annotator_font = annotator.has_font();
    let state = ViewerState::new(DetectClient::new(args.api_url.clone()), annotator);

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(api = %args.api_url, font = annotator_font, "viewer listening on http://{addr}");

    axum::serve(listener, viewer::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
