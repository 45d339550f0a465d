//! Read-only views of a model's declared inputs and outputs.

use std::fmt;

use prost::Message;

use crate::elem_type::ElementType;
use crate::errors::{OnnxError, Result};
use crate::graph::default_opset;
use crate::proto::tensor_shape_proto::dimension;
use crate::proto::{ModelProto, ValueInfoProto, type_proto};

/// One axis of a declared shape.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dim {
    /// Fixed size.
    Fixed(i64),
    /// Symbolic size resolved per inference call.
    Dynamic(String),
    /// Neither value nor parameter given.
    Unknown,
}

impl Dim {
    /// Whether this axis is dynamic (symbolic).
    pub fn is_dynamic(&self) -> bool {
        matches!(self, Self::Dynamic(_))
    }

    /// Short form used inside `[...]` shape lists.
    pub fn short(&self) -> String {
        match self {
            Self::Fixed(v) => v.to_string(),
            Self::Dynamic(p) => p.clone(),
            Self::Unknown => "?".to_string(),
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(v) => write!(f, "{v} (fixed)"),
            Self::Dynamic(p) => write!(f, "{p} (dynamic)"),
            Self::Unknown => f.write_str("? (unknown)"),
        }
    }
}

/// Declared element type and shape of a graph input or output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TensorInfo {
    /// Value name.
    pub name: String,
    /// Declared element type.
    pub elem_type: ElementType,
    /// Declared shape; `None` when the rank is unknown.
    pub dims: Option<Vec<Dim>>,
}

impl TensorInfo {
    /// Extract from a value info; fails for non-tensor values.
    pub fn from_value_info(info: &ValueInfoProto) -> Result<Self> {
        let tensor = match info.r#type.as_ref().and_then(|t| t.value.as_ref()) {
            Some(type_proto::Value::TensorType(t)) => t,
            _ => return Err(OnnxError::NotATensor(info.name.clone())),
        };
        let dims = tensor.shape.as_ref().map(|shape| {
            shape
                .dim
                .iter()
                .map(|d| match &d.value {
                    Some(dimension::Value::DimValue(v)) => Dim::Fixed(*v),
                    Some(dimension::Value::DimParam(p)) if !p.is_empty() => {
                        Dim::Dynamic(p.clone())
                    }
                    _ => Dim::Unknown,
                })
                .collect()
        });
        Ok(Self {
            name: info.name.clone(),
            elem_type: ElementType::from_code(tensor.elem_type),
            dims,
        })
    }

    /// `[batch_size, 128]` style shape list.
    pub fn shape_list(&self) -> String {
        match &self.dims {
            Some(dims) => {
                let parts: Vec<String> = dims.iter().map(Dim::short).collect();
                format!("[{}]", parts.join(", "))
            }
            None => "[?]".to_string(),
        }
    }

    /// `batch_size (dynamic) 128 (fixed)` style shape description.
    pub fn shape_detail(&self) -> String {
        match &self.dims {
            Some(dims) => dims
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" "),
            None => "? (unknown rank)".to_string(),
        }
    }
}

/// Summary of a model's interface, as printed after an export.
#[derive(Clone, Debug, PartialEq)]
pub struct ModelSummary {
    /// Declared graph inputs.
    pub inputs: Vec<TensorInfo>,
    /// Declared graph outputs.
    pub outputs: Vec<TensorInfo>,
    /// Default-domain operator set version.
    pub opset: Option<i64>,
    /// Serialized size in bytes.
    pub byte_size: usize,
}

impl ModelSummary {
    /// Serialized size in mebibytes.
    pub fn size_mb(&self) -> f64 {
        self.byte_size as f64 / 1024.0 / 1024.0
    }
}

/// Summarize the graph's declared inputs and outputs.
///
/// Initializers listed as graph inputs (older IR versions) are skipped.
pub fn summarize(model: &ModelProto) -> Result<ModelSummary> {
    let graph = model.graph.as_ref().ok_or(OnnxError::MissingGraph)?;
    let initializers: std::collections::HashSet<&str> =
        graph.initializer.iter().map(|t| t.name.as_str()).collect();
    let inputs = graph
        .input
        .iter()
        .filter(|i| !initializers.contains(i.name.as_str()))
        .map(TensorInfo::from_value_info)
        .collect::<Result<Vec<_>>>()?;
    let outputs = graph
        .output
        .iter()
        .map(TensorInfo::from_value_info)
        .collect::<Result<Vec<_>>>()?;
    Ok(ModelSummary {
        inputs,
        outputs,
        opset: default_opset(model),
        byte_size: model.encoded_len(),
    })
}

/// Element type of the first declared graph input.
pub fn first_input_type(model: &ModelProto) -> Result<ElementType> {
    let graph = model.graph.as_ref().ok_or(OnnxError::MissingGraph)?;
    let first = graph.input.first().ok_or(OnnxError::NoInputs)?;
    Ok(TensorInfo::from_value_info(first)?.elem_type)
}
