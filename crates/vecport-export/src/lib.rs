//! # vecport-export
//!
//! Produces a sentence-embedding ONNX model from a base transformer graph:
//! - `tokens`: sample tokenization and integer-width casting
//! - `graph_build`: mean pooling and L2 normalization appended to the graph
//! - `pipeline`: export → merge → verify, shared by every [`ExportVariant`]
//! - `pooling`: the same pooling math in Rust, used as a reference
//! - `runtime_check` (feature `ort`): runs both and compares
//!
//! ## Crate Position
//!
//! Depends on: vecport-core, vecport-settings, vecport-onnx.
//! Depended on by: nothing (leaf crate with binaries).

#![deny(unsafe_code)]

pub mod cli;
pub mod errors;
pub mod graph_build;
pub mod pipeline;
pub mod pooling;
#[cfg(feature = "ort")]
pub mod runtime_check;
pub mod source;
pub mod tokens;
pub mod variant;

pub use errors::{ExportError, Result};
pub use graph_build::{GraphSpec, build_embedding_graph};
pub use pipeline::{ExportReport, Exporter};
pub use source::{ModelFiles, resolve_model_files};
pub use tokens::{TokenBatch, TokenRow, TypedTokenBatch};
pub use variant::ExportVariant;
