//! ONNX model error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from reading, writing and rewriting ONNX models.
#[derive(Debug, Error)]
pub enum OnnxError {
    /// File system error, with the path involved.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// Path being read or written.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The bytes are not a valid `ModelProto`.
    #[error("failed to decode ONNX model: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The model has no graph.
    #[error("model has no graph")]
    MissingGraph,

    /// The graph declares no inputs.
    #[error("graph declares no inputs")]
    NoInputs,

    /// A graph value expected to be a dense tensor is something else.
    #[error("value '{0}' is not a tensor")]
    NotATensor(String),

    /// An external data reference is malformed or out of bounds.
    #[error("external data for tensor '{tensor}': {reason}")]
    ExternalData {
        /// Tensor name.
        tensor: String,
        /// What is wrong.
        reason: String,
    },

    /// An operator cannot be expressed at the requested opset.
    #[error("operator {op_type} (node '{node}') unsupported at opset {opset}: {reason}")]
    UnsupportedOperator {
        /// Operator type.
        op_type: String,
        /// Node name.
        node: String,
        /// Target opset.
        opset: i64,
        /// Why the conversion is not possible.
        reason: String,
    },

    /// The opset transition itself is not supported.
    #[error("cannot convert opset {from} to {to}: {reason}")]
    UnsupportedOpset {
        /// Source opset.
        from: i64,
        /// Target opset.
        to: i64,
        /// Why.
        reason: String,
    },
}

impl OnnxError {
    /// Wrap an I/O error with its path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for ONNX operations.
pub type Result<T> = std::result::Result<T, OnnxError>;
