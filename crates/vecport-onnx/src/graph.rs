//! Builders and small edits for graph construction.

use std::collections::HashSet;

use crate::elem_type::ElementType;
use crate::inspect::Dim;
use crate::proto::tensor_shape_proto::{Dimension, dimension};
use crate::proto::{
    AttributeProto, GraphProto, ModelProto, NodeProto, OperatorSetIdProto, TensorProto,
    TensorShapeProto, TypeProto, ValueInfoProto, attribute_proto, type_proto,
};

/// Build a node in the default domain.
pub fn node(op_type: &str, inputs: &[&str], outputs: &[&str], name: &str) -> NodeProto {
    NodeProto {
        input: inputs.iter().map(ToString::to_string).collect(),
        output: outputs.iter().map(ToString::to_string).collect(),
        name: name.to_string(),
        op_type: op_type.to_string(),
        ..NodeProto::default()
    }
}

impl NodeProto {
    /// Append an attribute, builder style.
    #[must_use]
    pub fn with_attribute(mut self, attr: AttributeProto) -> Self {
        self.attribute.push(attr);
        self
    }

    /// Look up an attribute by name.
    pub fn attr(&self, name: &str) -> Option<&AttributeProto> {
        self.attribute.iter().find(|a| a.name == name)
    }

    /// Remove and return an attribute by name.
    pub fn take_attr(&mut self, name: &str) -> Option<AttributeProto> {
        let idx = self.attribute.iter().position(|a| a.name == name)?;
        Some(self.attribute.remove(idx))
    }

    /// Whether the node belongs to the default ONNX operator domain.
    pub fn is_default_domain(&self) -> bool {
        is_default_domain(&self.domain)
    }
}

/// `""` and `"ai.onnx"` both name the default operator set.
pub fn is_default_domain(domain: &str) -> bool {
    domain.is_empty() || domain == "ai.onnx"
}

/// Integer attribute.
pub fn attr_int(name: &str, value: i64) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: attribute_proto::INT,
        i: value,
        ..AttributeProto::default()
    }
}

/// Integer list attribute.
pub fn attr_ints(name: &str, values: &[i64]) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: attribute_proto::INTS,
        ints: values.to_vec(),
        ..AttributeProto::default()
    }
}

/// Float attribute.
pub fn attr_float(name: &str, value: f32) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: attribute_proto::FLOAT,
        f: value,
        ..AttributeProto::default()
    }
}

/// Tensor attribute.
pub fn attr_tensor(name: &str, value: TensorProto) -> AttributeProto {
    AttributeProto {
        name: name.to_string(),
        r#type: attribute_proto::TENSOR,
        t: Some(value),
        ..AttributeProto::default()
    }
}

/// `f32` tensor with little-endian `raw_data`.
pub fn tensor_f32(name: &str, dims: &[i64], values: &[f32]) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        dims: dims.to_vec(),
        data_type: ElementType::FLOAT_CODE,
        raw_data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ..TensorProto::default()
    }
}

/// `i64` tensor with little-endian `raw_data`.
pub fn tensor_i64(name: &str, dims: &[i64], values: &[i64]) -> TensorProto {
    TensorProto {
        name: name.to_string(),
        dims: dims.to_vec(),
        data_type: ElementType::INT64_CODE,
        raw_data: values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        ..TensorProto::default()
    }
}

/// Read an `f32` tensor's values, from `raw_data` or `float_data`.
pub fn tensor_f32_values(tensor: &TensorProto) -> Option<Vec<f32>> {
    if tensor.data_type != ElementType::FLOAT_CODE {
        return None;
    }
    if tensor.raw_data.is_empty() {
        return Some(tensor.float_data.clone());
    }
    Some(
        tensor
            .raw_data
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

/// Read an `i64` tensor's values, from `raw_data` or `int64_data`.
pub fn tensor_i64_values(tensor: &TensorProto) -> Option<Vec<i64>> {
    if tensor.data_type != ElementType::INT64_CODE {
        return None;
    }
    if tensor.raw_data.is_empty() {
        return Some(tensor.int64_data.clone());
    }
    Some(
        tensor
            .raw_data
            .chunks_exact(8)
            .map(|c| i64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
    )
}

/// Dense tensor value info with the given element type and shape.
pub fn tensor_value_info(name: &str, elem: ElementType, dims: &[Dim]) -> ValueInfoProto {
    let dim = dims
        .iter()
        .map(|d| Dimension {
            value: match d {
                Dim::Fixed(v) => Some(dimension::Value::DimValue(*v)),
                Dim::Dynamic(p) => Some(dimension::Value::DimParam(p.clone())),
                Dim::Unknown => None,
            },
            ..Dimension::default()
        })
        .collect();
    ValueInfoProto {
        name: name.to_string(),
        r#type: Some(TypeProto {
            value: Some(type_proto::Value::TensorType(type_proto::Tensor {
                elem_type: elem.code(),
                shape: Some(TensorShapeProto { dim }),
            })),
            ..TypeProto::default()
        }),
        ..ValueInfoProto::default()
    }
}

/// Every value name produced or declared in the graph (not subgraphs).
pub fn value_names(graph: &GraphProto) -> HashSet<String> {
    graph
        .input
        .iter()
        .chain(&graph.output)
        .chain(&graph.value_info)
        .map(|v| v.name.clone())
        .chain(graph.initializer.iter().map(|t| t.name.clone()))
        .chain(graph.node.iter().flat_map(|n| n.output.iter().cloned()))
        .chain(graph.node.iter().map(|n| n.name.clone()))
        .collect()
}

/// A name derived from `base` that does not collide with `taken`; the
/// result is added to `taken`.
pub fn unique_name(taken: &mut HashSet<String>, base: &str) -> String {
    let mut candidate = base.to_string();
    let mut n = 1usize;
    while taken.contains(&candidate) {
        candidate = format!("{base}_{n}");
        n += 1;
    }
    let _ = taken.insert(candidate.clone());
    candidate
}

/// Point every consumer of value `from` at value `to`, including nodes of
/// nested subgraphs that capture it from the outer scope.
pub fn rename_value_uses(graph: &mut GraphProto, from: &str, to: &str) {
    for node in &mut graph.node {
        for input in &mut node.input {
            if input == from {
                *input = to.to_string();
            }
        }
        for attr in &mut node.attribute {
            if let Some(g) = attr.g.as_mut() {
                rename_value_uses(g, from, to);
            }
            for g in &mut attr.graphs {
                rename_value_uses(g, from, to);
            }
        }
    }
}

/// Version of the default-domain operator set, if imported.
pub fn default_opset(model: &ModelProto) -> Option<i64> {
    model
        .opset_import
        .iter()
        .find(|o| is_default_domain(&o.domain))
        .map(|o| o.version)
}

/// Set (or add) the default-domain operator set version.
pub fn set_default_opset(model: &mut ModelProto, version: i64) {
    if let Some(entry) = model
        .opset_import
        .iter_mut()
        .find(|o| is_default_domain(&o.domain))
    {
        entry.version = version;
    } else {
        model.opset_import.push(OperatorSetIdProto {
            domain: String::new(),
            version,
        });
    }
}

/// Minimum IR version able to carry a given default opset.
pub fn min_ir_version_for_opset(opset: i64) -> i64 {
    match opset {
        ..=8 => 3,
        9 => 4,
        10 => 5,
        11 => 6,
        12..=14 => 7,
        15..=18 => 8,
        19..=20 => 9,
        _ => 10,
    }
}
