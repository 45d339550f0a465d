//! Turns a base transformer graph into the sentence-embedding graph.
//!
//! The base graph maps token tensors to per-token hidden states. The result
//! declares the three token inputs at the requested width with shape
//! `[batch_size, max_seq_length]` and a single output `output_vector` of
//! shape `[batch_size, embedding_dim]`:
//!
//! ```text
//! mask_f   = Cast<float>(attention_mask)
//! mask_e   = Unsqueeze(mask_f, [-1])
//! summed   = ReduceSum(Mul(hidden, mask_e), [1], keepdims=0)
//! counts   = Max(ReduceSum(mask_e, [1], keepdims=0), 1e-9)
//! mean     = Div(summed, counts)
//! output   = Div(mean, Max(ReduceL2(mean, [1], keepdims=1), 1e-12))
//! ```

use std::collections::HashSet;

use tracing::{debug, info};
use vecport_core::{BATCH_AXIS_NAME, INPUT_NAMES, OUTPUT_NAME};
use vecport_onnx::graph::{
    attr_int, attr_ints, node, rename_value_uses, tensor_f32, tensor_i64, tensor_value_info,
    unique_name, value_names,
};
use vecport_onnx::proto::{GraphProto, NodeProto, TensorProto, ValueInfoProto};
use vecport_onnx::{Dim, ElementType, IntWidth, ModelProto, OnnxError, TensorInfo, upgrade_opset};

use crate::errors::{ExportError, Result};
use crate::pooling::{MASK_SUM_FLOOR, NORM_EPSILON};

/// Output names recognized as per-token hidden states, in preference order.
pub const HIDDEN_OUTPUT_NAMES: [&str; 2] = ["last_hidden_state", "token_embeddings"];

/// First opset where `ReduceL2` takes `axes` as an input.
const REDUCE_AXES_INPUT_OPSET: i64 = 18;

/// Shape and typing of the graph to build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphSpec {
    /// Width of the declared token inputs.
    pub width: IntWidth,
    /// Default-domain opset of the result.
    pub opset: i64,
    /// Fixed sequence axis length.
    pub max_seq_length: usize,
    /// Width of the hidden states and of the output.
    pub embedding_dim: usize,
}

/// Wrap `model` with pooling and normalization according to `spec`.
pub fn build_embedding_graph(mut model: ModelProto, spec: &GraphSpec) -> Result<ModelProto> {
    let change = upgrade_opset(&mut model, spec.opset)?;
    info!(from = ?change.from, to = change.to, rewritten = change.rewritten_nodes, "operator set ready");

    let graph = model.graph.as_mut().ok_or(OnnxError::MissingGraph)?;
    let hidden = hidden_output(graph, spec.embedding_dim)?;
    let mut taken = value_names(graph);

    let (inputs, mut casts) = retype_inputs(graph, spec, &mut taken)?;
    let (mut pooling, constants) = pooling_nodes(&hidden.name, spec.opset, &mut taken);
    debug!(
        casts = casts.len(),
        pooling = pooling.len(),
        hidden = %hidden.name,
        "appending pooling"
    );

    casts.append(&mut graph.node);
    casts.append(&mut pooling);
    graph.node = casts;
    graph.initializer.extend(constants);
    graph.input = inputs;
    if !graph.value_info.iter().any(|v| v.name == hidden.name) {
        graph.value_info.push(hidden);
    }
    graph.output = vec![tensor_value_info(
        OUTPUT_NAME,
        ElementType::Float,
        &[
            Dim::Dynamic(BATCH_AXIS_NAME.to_string()),
            Dim::Fixed(spec.embedding_dim as i64),
        ],
    )];

    model.producer_name = "vecport".to_string();
    model.producer_version = env!("CARGO_PKG_VERSION").to_string();
    Ok(model)
}

/// Find the per-token hidden-state output and check its width.
fn hidden_output(graph: &GraphProto, embedding_dim: usize) -> Result<ValueInfoProto> {
    let by_name = HIDDEN_OUTPUT_NAMES
        .iter()
        .find_map(|name| graph.output.iter().find(|o| o.name == *name));
    let hidden = by_name
        .or_else(|| graph.output.first())
        .ok_or_else(|| ExportError::BaseGraph("graph declares no outputs".into()))?;

    let info = TensorInfo::from_value_info(hidden)?;
    if info.elem_type != ElementType::Float {
        return Err(ExportError::BaseGraph(format!(
            "hidden output {} is {}, expected FLOAT32",
            info.name, info.elem_type
        )));
    }
    if let Some(dims) = &info.dims {
        if dims.len() != 3 {
            return Err(ExportError::BaseGraph(format!(
                "hidden output {} has rank {}, expected [batch, sequence, hidden]",
                info.name,
                dims.len()
            )));
        }
        if let Dim::Fixed(found) = dims[2] {
            if found != embedding_dim as i64 {
                return Err(ExportError::DimensionMismatch {
                    expected: embedding_dim,
                    found,
                });
            }
        }
    }
    Ok(hidden.clone())
}

/// Declare the token inputs at the requested width. Where the base graph
/// consumes another width, its uses are routed through a `Cast`.
fn retype_inputs(
    graph: &mut GraphProto,
    spec: &GraphSpec,
    taken: &mut HashSet<String>,
) -> Result<(Vec<ValueInfoProto>, Vec<NodeProto>)> {
    let declared = spec.width.element_type();
    let initializers: HashSet<&str> = graph.initializer.iter().map(|t| t.name.as_str()).collect();
    for extra in &graph.input {
        if !INPUT_NAMES.contains(&extra.name.as_str()) && !initializers.contains(extra.name.as_str())
        {
            return Err(ExportError::BaseGraph(format!(
                "unexpected graph input {}",
                extra.name
            )));
        }
    }
    let kept: Vec<ValueInfoProto> = graph
        .input
        .iter()
        .filter(|i| initializers.contains(i.name.as_str()))
        .cloned()
        .collect();

    let mut inputs = Vec::with_capacity(INPUT_NAMES.len() + kept.len());
    let mut casts = Vec::new();
    for name in INPUT_NAMES {
        let base = graph
            .input
            .iter()
            .find(|i| i.name == name)
            .map(TensorInfo::from_value_info)
            .transpose()?;
        match base {
            Some(info) if info.elem_type == declared => {}
            Some(info) => {
                let base_width = IntWidth::from_element_type(info.elem_type).ok_or_else(|| {
                    ExportError::BaseGraph(format!("input {name} has element type {}", info.elem_type))
                })?;
                let converted = unique_name(taken, &format!("{name}_{base_width}"));
                rename_value_uses(graph, name, &converted);
                let cast_name = unique_name(taken, &format!("cast_{name}"));
                casts.push(
                    node("Cast", &[name], &[&converted], &cast_name)
                        .with_attribute(attr_int("to", i64::from(info.elem_type.code()))),
                );
            }
            None => debug!(input = name, "base graph does not read this input"),
        }
        inputs.push(tensor_value_info(
            name,
            declared,
            &[
                Dim::Dynamic(BATCH_AXIS_NAME.to_string()),
                Dim::Fixed(spec.max_seq_length as i64),
            ],
        ));
    }
    inputs.extend(kept);
    Ok((inputs, casts))
}

/// Mean pooling and L2 normalization nodes reading `hidden`.
fn pooling_nodes(
    hidden: &str,
    opset: i64,
    taken: &mut HashSet<String>,
) -> (Vec<NodeProto>, Vec<TensorProto>) {
    let mut name = |base: &str| unique_name(taken, base);

    let axes_last = name("pool_axes_last");
    let axes_tokens = name("pool_axes_tokens");
    let mask_floor = name("pool_mask_floor");
    let norm_floor = name("pool_norm_floor");
    let constants = vec![
        tensor_i64(&axes_last, &[1], &[-1]),
        tensor_i64(&axes_tokens, &[1], &[1]),
        tensor_f32(&mask_floor, &[], &[MASK_SUM_FLOOR]),
        tensor_f32(&norm_floor, &[], &[NORM_EPSILON]),
    ];

    let mask_float = name("pool_mask_float");
    let mask_expanded = name("pool_mask_expanded");
    let weighted = name("pool_weighted");
    let summed = name("pool_summed");
    let counts = name("pool_counts");
    let counts_clamped = name("pool_counts_clamped");
    let mean = name("pool_mean");
    let norm = name("pool_norm");
    let norm_clamped = name("pool_norm_clamped");

    let reduce_l2 = if opset >= REDUCE_AXES_INPUT_OPSET {
        node("ReduceL2", &[&mean, &axes_tokens], &[&norm], &name("pool_reduce_l2"))
    } else {
        node("ReduceL2", &[&mean], &[&norm], &name("pool_reduce_l2"))
            .with_attribute(attr_ints("axes", &[1]))
    };

    let nodes = vec![
        node("Cast", &["attention_mask"], &[&mask_float], &name("pool_cast_mask"))
            .with_attribute(attr_int("to", i64::from(ElementType::FLOAT_CODE))),
        node(
            "Unsqueeze",
            &[&mask_float, &axes_last],
            &[&mask_expanded],
            &name("pool_unsqueeze_mask"),
        ),
        node("Mul", &[hidden, &mask_expanded], &[&weighted], &name("pool_mul")),
        node(
            "ReduceSum",
            &[&weighted, &axes_tokens],
            &[&summed],
            &name("pool_sum_embeddings"),
        )
        .with_attribute(attr_int("keepdims", 0)),
        node(
            "ReduceSum",
            &[&mask_expanded, &axes_tokens],
            &[&counts],
            &name("pool_sum_mask"),
        )
        .with_attribute(attr_int("keepdims", 0)),
        node("Max", &[&counts, &mask_floor], &[&counts_clamped], &name("pool_clamp_counts")),
        node("Div", &[&summed, &counts_clamped], &[&mean], &name("pool_mean_div")),
        reduce_l2.with_attribute(attr_int("keepdims", 1)),
        node("Max", &[&norm, &norm_floor], &[&norm_clamped], &name("pool_clamp_norm")),
        node("Div", &[&mean, &norm_clamped], &[OUTPUT_NAME], &name("pool_normalize")),
    ];
    (nodes, constants)
}
