use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use fashion_detect::{detect_file, init_tracing, Annotator, PlotArgs};

fn main() -> Result<()> {
    init_tracing();
    let args = PlotArgs::parse();

    let response = detect_file(&args.api_url, &args.image)?;
    info!(
        image_name = %response.image_name,
        num_detections = response.num_detections,
        "detections received"
    );
    for det in &response.detections {
        println!("{} ({}) {:?}", det.label, det.score, det.bbox);
    }

    let mut image = image::open(&args.image)
        .with_context(|| format!("failed to open {}", args.image.display()))?
        .to_rgb8();
    Annotator::from_font_path(args.font.as_deref()).draw_plot(&mut image, &response.detections);
    image
        .save(&args.output)
        .with_context(|| format!("failed to write {}", args.output.display()))?;
    info!("annotated image written to {}", args.output.display());
    Ok(())
}
