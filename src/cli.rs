use std::path::PathBuf;

use clap::Parser;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/detect";

/// Fashion object detection HTTP service.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ServeArgs {
    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// ONNX model path
    #[arg(long, value_name = "FILE")]
    pub model: Option<PathBuf>,

    /// label table: model config.json or one label per line
    #[arg(long, value_name = "FILE")]
    pub labels: Option<PathBuf>,

    #[arg(long)]
    pub host: Option<String>,

    #[arg(long)]
    pub port: Option<u16>,

    /// default confidence threshold (0.0 - 1.0)
    #[arg(long, value_name = "THRESHOLD")]
    pub threshold: Option<f32>,

    /// run inference on CUDA
    #[arg(long)]
    pub cuda: bool,
}

/// Web page that uploads an image to the detection service and shows the boxes.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct ViewerArgs {
    /// detection endpoint
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 8501)]
    pub port: u16,

    /// TrueType font for the labels
    #[arg(long, value_name = "FILE")]
    pub font: Option<PathBuf>,
}

/// Sends one image to the detection service and writes the annotated result.
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct PlotArgs {
    /// detection endpoint
    #[arg(long, default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// image path
    #[arg(long, default_value = "foto1.jpg")]
    pub image: PathBuf,

    #[arg(long, default_value = "detections.png")]
    pub output: PathBuf,

    /// TrueType font for the labels
    #[arg(long, value_name = "FILE")]
    pub font: Option<PathBuf>,
}
