//! # vecport-onnx
//!
//! ONNX model handling without a runtime:
//! - `prost` definitions of the ONNX protobuf schema
//! - load/save, with external tensor data split out or merged back in
//! - declared input/output inspection and element-type classification
//! - default-domain opset upgrades
//!
//! ## Crate Position
//!
//! Depends on: vecport-core (binary only).
//! Depended on by: vecport-export.

#![deny(unsafe_code)]

pub mod check;
pub mod elem_type;
pub mod errors;
pub mod external;
pub mod graph;
pub mod inspect;
pub mod io;
pub mod opset;
pub mod proto;

pub use check::{TypeVerdict, check_model_file, render_report};
pub use elem_type::{ElementType, IntWidth};
pub use errors::{OnnxError, Result};
pub use external::{external_locations, has_external_data, inline_external_data};
pub use inspect::{Dim, ModelSummary, TensorInfo, first_input_type, summarize};
pub use io::{
    SavedModel, external_data_path, load_model, load_model_with_external_data, save_model,
    save_model_with_external_data,
};
pub use opset::{OpsetChange, upgrade_opset};
pub use proto::ModelProto;
