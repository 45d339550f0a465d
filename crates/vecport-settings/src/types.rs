//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may name only the fields it wants to change.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use vecport_core::{DEFAULT_EMBEDDING_DIM, DEFAULT_MAX_SEQ_LENGTH, DEFAULT_MODEL_ID};

/// Root settings type for the vecport tools.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VecportSettings {
    /// Logging configuration.
    pub logging: LoggingSettings,
    /// Model exporter configuration.
    pub export: ExportSettings,
    /// Cluster visualizer configuration.
    pub visualize: VisualizeSettings,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive (`RUST_LOG` still wins).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Model exporter configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportSettings {
    /// Hugging Face model repository id.
    pub model_id: String,
    /// Path of the base ONNX graph inside the model repository.
    pub base_model_file: String,
    /// Local base ONNX graph; skips the download when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_model_path: Option<String>,
    /// Local `tokenizer.json`; skips the download when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenizer_path: Option<String>,
    /// Model download cache directory (may contain `~`).
    pub cache_dir: String,
    /// Fixed sequence length of the exported inputs.
    pub max_seq_length: usize,
    /// Width of the pooled embedding.
    pub embedding_dim: usize,
    /// Directory the intermediate and merged artifacts are written to.
    pub output_dir: String,
    /// Tensors at least this many bytes go to the external data file of the
    /// intermediate artifact.
    pub external_data_threshold: usize,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            base_model_file: "onnx/model.onnx".to_string(),
            base_model_path: None,
            tokenizer_path: None,
            cache_dir: "~/.vecport/models".to_string(),
            max_seq_length: DEFAULT_MAX_SEQ_LENGTH,
            embedding_dim: DEFAULT_EMBEDDING_DIM,
            output_dir: ".".to_string(),
            external_data_threshold: 1024,
        }
    }
}

impl ExportSettings {
    /// Resolve the cache directory, expanding `~/` to the home directory.
    pub fn resolved_cache_dir(&self) -> PathBuf {
        if let Some(rest) = self.cache_dir.strip_prefix("~/") {
            if let Ok(home) = std::env::var("HOME") {
                return PathBuf::from(home).join(rest);
            }
        }
        PathBuf::from(&self.cache_dir)
    }
}

/// Cluster visualizer configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct VisualizeSettings {
    /// `SQLite` database holding the `galactic_tickets` table.
    pub database_path: String,
    /// Output PNG path.
    pub output_path: String,
    /// Plot title.
    pub title: String,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
}

impl Default for VisualizeSettings {
    fn default() -> Self {
        Self {
            database_path: "galactic_tickets.db".to_string(),
            output_path: "galactic_clusters.png".to_string(),
            title: "Semantic Map of Galactic Support Tickets".to_string(),
            width: 1200,
            height: 800,
        }
    }
}
