use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Labels of the fashion detector, in class-id order.
pub const FASHION_LABELS: [&str; 7] = ["bag", "bottom", "dress", "hat", "shoes", "outer", "top"];

/// Class id to label name table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelMap {
    names: HashMap<usize, String>,
}

impl LabelMap {
    pub fn new(names: HashMap<usize, String>) -> Self {
        Self { names }
    }

    /// Builds a table whose ids count from zero.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names
                .into_iter()
                .enumerate()
                .map(|(id, name)| (id, name.into()))
                .collect(),
        }
    }

    pub fn fashion() -> Self {
        Self::from_names(FASHION_LABELS)
    }

    pub fn get(&self, id: usize) -> Option<&str> {
        self.names.get(&id).map(String::as_str)
    }

    /// Label for `id`, or `LABEL_{id}` when the table has no entry.
    pub fn name(&self, id: usize) -> String {
        match self.get(id) {
            Some(name) => name.to_string(),
            None => format!("LABEL_{id}"),
        }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[derive(Deserialize)]
struct ModelConfigFile {
    id2label: Option<HashMap<String, String>>,
}

/// Loads a label table from a Hugging Face `config.json` (its `id2label`
/// object) or from a text file with one label per line, where the first line
/// gets id `first_id`.
pub fn load_class_mapping(file_path: &Path, first_id: usize) -> Result<LabelMap, ConfigError> {
    let is_json = file_path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        load_id2label(file_path)
    } else {
        load_label_lines(file_path, first_id)
    }
}

fn load_label_lines(file_path: &Path, first_id: usize) -> Result<LabelMap, ConfigError> {
    let read_err = |source| ConfigError::Read {
        path: file_path.to_path_buf(),
        source,
    };
    let file = File::open(file_path).map_err(read_err)?;
    let reader = BufReader::new(file);

    let mut names = HashMap::new();
    for (id, line) in reader.lines().enumerate() {
        let name = line.map_err(read_err)?;
        let name = name.trim();
        if name.is_empty() {
            continue;
        }
        names.insert(id + first_id, name.to_string());
    }
    Ok(LabelMap::new(names))
}

fn load_id2label(file_path: &Path) -> Result<LabelMap, ConfigError> {
    let content = std::fs::read_to_string(file_path).map_err(|source| ConfigError::Read {
        path: file_path.to_path_buf(),
        source,
    })?;
    let config: ModelConfigFile =
        serde_json::from_str(&content).map_err(|source| ConfigError::Json {
            path: file_path.to_path_buf(),
            source,
        })?;
    let id2label = config.id2label.ok_or_else(|| ConfigError::MissingId2Label {
        path: file_path.to_path_buf(),
    })?;

    let names = id2label
        .into_iter()
        .map(|(id, name)| {
            id.trim()
                .parse::<usize>()
                .map(|id| (id, name))
                .map_err(|_| ConfigError::LabelId(id))
        })
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(LabelMap::new(names))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn fashion_table_is_zero_based() {
        let labels = LabelMap::fashion();
        assert_eq!(labels.len(), 7);
        assert_eq!(labels.get(0), Some("bag"));
        assert_eq!(labels.get(6), Some("top"));
        assert_eq!(labels.name(7), "LABEL_7");
    }

    #[test]
    fn reads_text_labels_with_offset() {
        let mut file = tempfile::Builder::new().suffix(".txt").tempfile().unwrap();
        writeln!(file, "person\nbicycle\n\ncar").unwrap();

        let labels = load_class_mapping(file.path(), 1).unwrap();
        assert_eq!(labels.get(1), Some("person"));
        assert_eq!(labels.get(2), Some("bicycle"));
        assert_eq!(labels.get(3), None);
        assert_eq!(labels.get(4), Some("car"));
    }

    #[test]
    fn reads_id2label_from_model_config() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{"model_type": "conditional_detr", "id2label": {{"0": "bag", "1": "bottom"}}}}"#
        )
        .unwrap();

        let labels = load_class_mapping(file.path(), 0).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.get(1), Some("bottom"));
    }

    #[test]
    fn rejects_model_config_without_labels() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"{{"model_type": "detr"}}"#).unwrap();

        let err = load_class_mapping(file.path(), 0).unwrap_err();
        assert!(matches!(err, ConfigError::MissingId2Label { .. }));
    }

    #[test]
    fn missing_file_is_reported() {
        let err = load_class_mapping(Path::new("no/such/labels.txt"), 0).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
