use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, span, trace, Level};

use crate::cli::ServeArgs;
use crate::detector::TensorNames;
use crate::error::ConfigError;
use crate::mapping::{load_class_mapping, LabelMap};
use crate::postprocess::{DecodeMode, Decoder};
use crate::preprocess::{PreprocessConfig, ResizeMode};

pub const DEFAULT_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub model: ModelConfig,
    pub detection: DetectionConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelConfig {
    pub path: PathBuf,
    /// `config.json` with `id2label`, or a text file; built-in fashion labels
    /// when absent.
    pub labels: Option<PathBuf>,
    pub label_first_id: usize,
    pub cuda: bool,
    pub decode: DecodeMode,
    pub top_k: usize,
    pub resize: ResizeMode,
    pub width: u32,
    pub height: u32,
    pub shortest_edge: u32,
    pub longest_edge: u32,
    pub input_name: String,
    pub sizes_input_name: String,
    pub logits_output: String,
    pub boxes_output: String,
    pub labels_output: String,
    pub scores_output: String,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let names = TensorNames::default();
        let pre = PreprocessConfig::default();
        Self {
            path: PathBuf::from("models/fashion-detr.onnx"),
            labels: None,
            label_first_id: 0,
            cuda: false,
            decode: DecodeMode::default(),
            top_k: 100,
            resize: pre.resize,
            width: pre.width,
            height: pre.height,
            shortest_edge: pre.shortest_edge,
            longest_edge: pre.longest_edge,
            input_name: names.input,
            sizes_input_name: names.sizes_input,
            logits_output: names.logits,
            boxes_output: names.boxes,
            labels_output: names.labels,
            scores_output: names.scores,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DetectionConfig {
    pub threshold: f32,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl ServiceConfig {
    pub fn from_file<P>(file_path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path> + std::fmt::Debug,
    {
        let span = span!(Level::TRACE, "ServiceConfig::from_file");
        let _enter = span.enter();

        let path = file_path.as_ref();
        trace!("Reading content from file {:?}...", path);
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        trace!("Deserializing content to ServiceConfig...");
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Config file (if any), then command-line overrides, then validation.
    pub fn load(args: &ServeArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_args(args);
        config.validate()?;
        info!(
            model = %config.model.path.display(),
            threshold = config.detection.threshold,
            decode = ?config.model.decode,
            resize = ?config.model.resize,
            "configuration ready"
        );
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &ServeArgs) {
        if let Some(model) = &args.model {
            self.model.path = model.clone();
        }
        if let Some(labels) = &args.labels {
            self.model.labels = Some(labels.clone());
        }
        if let Some(host) = &args.host {
            self.server.host = host.clone();
        }
        if let Some(port) = args.port {
            self.server.port = port;
        }
        if let Some(threshold) = args.threshold {
            self.detection.threshold = threshold;
        }
        if args.cuda {
            self.model.cuda = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = self.detection.threshold;
        if !(0.0..=1.0).contains(&t) {
            return Err(ConfigError::Invalid(format!(
                "threshold must lie in [0, 1], got {t}"
            )));
        }
        if self.model.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("model path is empty".into()));
        }
        let m = &self.model;
        if m.width == 0 || m.height == 0 || m.shortest_edge == 0 || m.longest_edge == 0 {
            return Err(ConfigError::Invalid("input sizes must be non-zero".into()));
        }
        if m.top_k == 0 {
            return Err(ConfigError::Invalid("top_k must be non-zero".into()));
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

impl ModelConfig {
    pub fn preprocess_config(&self) -> PreprocessConfig {
        PreprocessConfig {
            resize: self.resize,
            width: self.width,
            height: self.height,
            shortest_edge: self.shortest_edge,
            longest_edge: self.longest_edge,
            ..PreprocessConfig::default()
        }
    }

    pub fn decoder(&self) -> Decoder {
        Decoder::new(self.decode, self.top_k)
    }

    pub fn tensor_names(&self) -> TensorNames {
        TensorNames {
            input: self.input_name.clone(),
            sizes_input: self.sizes_input_name.clone(),
            logits: self.logits_output.clone(),
            boxes: self.boxes_output.clone(),
            labels: self.labels_output.clone(),
            scores: self.scores_output.clone(),
        }
    }

    pub fn label_map(&self) -> Result<LabelMap, ConfigError> {
        match &self.labels {
            Some(path) => load_class_mapping(path, self.label_first_id),
            None => Ok(LabelMap::fashion()),
        }
    }
}
