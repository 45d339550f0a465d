//! Export error types.

use std::path::PathBuf;

use thiserror::Error;
use vecport_onnx::OnnxError;

/// Errors from the export pipeline.
#[derive(Debug, Error)]
pub enum ExportError {
    /// Model file handling failed.
    #[error(transparent)]
    Onnx(#[from] OnnxError),

    /// Filesystem operation failed.
    #[error("{path}: {source}")]
    Io {
        /// Path involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Tokenizer could not be loaded or failed to encode.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Base model files could not be fetched.
    #[error("Download failed: {0}")]
    Download(String),

    /// A token id does not fit the requested integer width.
    #[error("Token value {value} in {input} does not fit {width}")]
    TokenOverflow {
        /// Input tensor name.
        input: &'static str,
        /// Offending value.
        value: i64,
        /// Requested width.
        width: vecport_onnx::IntWidth,
    },

    /// The base graph cannot be wrapped with pooling.
    #[error("Unsupported base graph: {0}")]
    BaseGraph(String),

    /// Hidden width of the base graph disagrees with the configured width.
    #[error("Embedding width mismatch: expected {expected}, base graph declares {found}")]
    DimensionMismatch {
        /// Configured embedding width.
        expected: usize,
        /// Width declared by the base graph.
        found: i64,
    },

    /// An expected artifact is not on disk.
    #[error("Missing artifact: {} (the export step produced no file)", .0.display())]
    MissingArtifact(PathBuf),

    /// Runtime comparison against the reference pooling failed.
    #[error("Verification failed: {0}")]
    Verification(String),
}

impl ExportError {
    /// Wrap an I/O error with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for export operations.
pub type Result<T> = std::result::Result<T, ExportError>;
