//! Default-domain operator set upgrades.
//!
//! Rewrites the nodes whose signature changed between the source and target
//! opset so the graph stays valid when its `opset_import` is raised:
//!
//! | Version | Change                                                        |
//! |---------|---------------------------------------------------------------|
//! | 13      | `Unsqueeze`, `Squeeze`, `ReduceSum`: `axes` attribute → input  |
//! | 13      | `Split`: `split` attribute → input                             |
//! | 13      | `Softmax`/`LogSoftmax`/`Hardmax`: per-axis semantics           |
//! | 18      | remaining `Reduce*`: `axes` attribute → input                  |
//! | 18      | `Split`: `num_outputs` required without a `split` input        |
//!
//! Anything older than opset 11 is refused rather than guessed at.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::errors::{OnnxError, Result};
use crate::graph::{
    attr_int, default_opset, min_ir_version_for_opset, set_default_opset, tensor_i64,
    unique_name, value_names,
};
use crate::inspect::TensorInfo;
use crate::proto::{GraphProto, ModelProto, NodeProto, TensorProto};

/// Oldest source opset the upgrader accepts.
pub const MIN_SOURCE_OPSET: i64 = 11;

/// Oldest target opset (input-form `axes` are assumed from here on).
pub const MIN_TARGET_OPSET: i64 = 13;

const AXES_INPUT_AT_13: [&str; 3] = ["Unsqueeze", "Squeeze", "ReduceSum"];

const AXES_INPUT_AT_18: [&str; 9] = [
    "ReduceMean",
    "ReduceMax",
    "ReduceMin",
    "ReduceProd",
    "ReduceL1",
    "ReduceL2",
    "ReduceLogSum",
    "ReduceLogSumExp",
    "ReduceSumSquare",
];

const SOFTMAX_FAMILY: [&str; 3] = ["Softmax", "LogSoftmax", "Hardmax"];

/// Which opset a model ended up at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpsetChange {
    /// Opset before the upgrade (`None` when the model imported none).
    pub from: Option<i64>,
    /// Opset after the upgrade.
    pub to: i64,
    /// Nodes rewritten.
    pub rewritten_nodes: usize,
}

struct Upgrade {
    from: i64,
    to: i64,
    taken: HashSet<String>,
    new_initializers: Vec<TensorProto>,
    rewritten: usize,
}

impl Upgrade {
    fn crosses(&self, version: i64) -> bool {
        self.from < version && version <= self.to
    }
}

/// Raise the model's default-domain opset to `target`, rewriting nodes whose
/// signature changed on the way.
pub fn upgrade_opset(model: &mut ModelProto, target: i64) -> Result<OpsetChange> {
    if target < MIN_TARGET_OPSET {
        return Err(OnnxError::UnsupportedOpset {
            from: default_opset(model).unwrap_or(target),
            to: target,
            reason: format!("target opset must be at least {MIN_TARGET_OPSET}"),
        });
    }
    let from = default_opset(model);
    let source = from.unwrap_or(target);
    if source > target {
        return Err(OnnxError::UnsupportedOpset {
            from: source,
            to: target,
            reason: "downgrades are not supported".to_string(),
        });
    }
    if source < MIN_SOURCE_OPSET {
        return Err(OnnxError::UnsupportedOpset {
            from: source,
            to: target,
            reason: format!("source opset must be at least {MIN_SOURCE_OPSET}"),
        });
    }

    let graph = model.graph.as_mut().ok_or(OnnxError::MissingGraph)?;
    let mut upgrade = Upgrade {
        from: source,
        to: target,
        taken: value_names(graph),
        new_initializers: Vec::new(),
        rewritten: 0,
    };
    if source < target {
        upgrade_graph(graph, &mut upgrade)?;
        graph.initializer.append(&mut upgrade.new_initializers);
    }

    set_default_opset(model, target);
    model.ir_version = model.ir_version.max(min_ir_version_for_opset(target));
    debug!(?from, to = target, rewritten = upgrade.rewritten, "opset upgraded");

    Ok(OpsetChange {
        from,
        to: target,
        rewritten_nodes: upgrade.rewritten,
    })
}

fn upgrade_graph(graph: &mut GraphProto, upgrade: &mut Upgrade) -> Result<()> {
    let ranks = declared_ranks(graph);
    for node in &mut graph.node {
        for attr in &mut node.attribute {
            if let Some(g) = attr.g.as_mut() {
                upgrade_graph(g, upgrade)?;
            }
            for g in &mut attr.graphs {
                upgrade_graph(g, upgrade)?;
            }
        }
        if node.is_default_domain() {
            upgrade_node(node, &ranks, upgrade)?;
        }
    }
    Ok(())
}

fn upgrade_node(
    node: &mut NodeProto,
    ranks: &HashMap<String, usize>,
    upgrade: &mut Upgrade,
) -> Result<()> {
    let op_type = node.op_type.clone();
    let op = op_type.as_str();
    let mut changed = false;

    if upgrade.crosses(13) && AXES_INPUT_AT_13.contains(&op) {
        changed |= axes_to_input(node, upgrade)?;
    }
    if upgrade.crosses(18) && AXES_INPUT_AT_18.contains(&op) {
        changed |= axes_to_input(node, upgrade)?;
    }
    if upgrade.crosses(13) && op == "Split" {
        if let Some(split) = node.take_attr("split") {
            let name = unique_name(&mut upgrade.taken, &format!("{}_split", node_label(node)));
            upgrade
                .new_initializers
                .push(tensor_i64(&name, &[split.ints.len() as i64], &split.ints));
            node.input.truncate(1);
            node.input.push(name);
            changed = true;
        }
    }
    if upgrade.crosses(18) && op == "Split" {
        let has_split_input = node.input.get(1).is_some_and(|s| !s.is_empty());
        if !has_split_input && node.attr("num_outputs").is_none() {
            let outputs = node.output.len() as i64;
            node.attribute.push(attr_int("num_outputs", outputs));
            changed = true;
        }
    }
    if upgrade.crosses(13) && SOFTMAX_FAMILY.contains(&op) {
        check_softmax_axis(node, ranks, upgrade.to)?;
    }

    if changed {
        upgrade.rewritten += 1;
    }
    Ok(())
}

/// Move the `axes` attribute into a second input. Returns whether anything
/// changed; a node without `axes` already means "all axes" in both forms.
fn axes_to_input(node: &mut NodeProto, upgrade: &mut Upgrade) -> Result<bool> {
    let Some(axes) = node.take_attr("axes") else {
        if node.op_type == "Unsqueeze" {
            return Err(unsupported(node, upgrade.to, "Unsqueeze without axes"));
        }
        return Ok(false);
    };
    if node.input.len() != 1 {
        return Err(unsupported(
            node,
            upgrade.to,
            "expected a single data input alongside the axes attribute",
        ));
    }
    let name = unique_name(&mut upgrade.taken, &format!("{}_axes", node_label(node)));
    upgrade
        .new_initializers
        .push(tensor_i64(&name, &[axes.ints.len() as i64], &axes.ints));
    node.input.push(name);
    Ok(true)
}

/// Before opset 13 these ops flatten the input to 2-D at `axis` (default 1);
/// from 13 they work along one axis (default -1). The two agree only when
/// the axis is the last one.
fn check_softmax_axis(
    node: &NodeProto,
    ranks: &HashMap<String, usize>,
    target: i64,
) -> Result<()> {
    let axis = node.attr("axis").map_or(1, |a| a.i);
    if axis == -1 {
        return Ok(());
    }
    let rank = node.input.first().and_then(|i| ranks.get(i)).copied();
    match rank {
        Some(rank) if axis == rank as i64 - 1 => Ok(()),
        Some(rank) => Err(unsupported(
            node,
            target,
            &format!("axis {axis} is not the last axis of a rank-{rank} input"),
        )),
        None => Err(unsupported(
            node,
            target,
            &format!("axis {axis} on an input of unknown rank"),
        )),
    }
}

fn declared_ranks(graph: &GraphProto) -> HashMap<String, usize> {
    graph
        .input
        .iter()
        .chain(&graph.output)
        .chain(&graph.value_info)
        .filter_map(|vi| TensorInfo::from_value_info(vi).ok())
        .filter_map(|info| info.dims.map(|d| (info.name, d.len())))
        .collect()
}

fn node_label(node: &NodeProto) -> String {
    if node.name.is_empty() {
        node.op_type.to_lowercase()
    } else {
        node.name.clone()
    }
}

fn unsupported(node: &NodeProto, opset: i64, reason: &str) -> OnnxError {
    OnnxError::UnsupportedOperator {
        op_type: node.op_type.clone(),
        node: node.name.clone(),
        opset,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elem_type::ElementType;
    use crate::graph::{attr_ints, node, tensor_i64_values, tensor_value_info};
    use crate::inspect::Dim;
    use crate::proto::OperatorSetIdProto;

    fn model_at(opset: i64, nodes: Vec<NodeProto>) -> ModelProto {
        ModelProto {
            ir_version: 7,
            opset_import: vec![OperatorSetIdProto {
                domain: String::new(),
                version: opset,
            }],
            graph: Some(GraphProto {
                node: nodes,
                ..GraphProto::default()
            }),
            ..ModelProto::default()
        }
    }

    fn init_values(model: &ModelProto, name: &str) -> Vec<i64> {
        let t = model
            .graph
            .as_ref()
            .unwrap()
            .initializer
            .iter()
            .find(|t| t.name == name)
            .unwrap();
        tensor_i64_values(t).unwrap()
    }

    #[test]
    fn unsqueeze_axes_become_input_at_13() {
        let n = node("Unsqueeze", &["x"], &["y"], "unsq").with_attribute(attr_ints("axes", &[1]));
        let mut model = model_at(12, vec![n]);
        let change = upgrade_opset(&mut model, 14).unwrap();
        assert_eq!(change.rewritten_nodes, 1);
        let n = &model.graph.as_ref().unwrap().node[0];
        assert_eq!(n.input, vec!["x", "unsq_axes"]);
        assert!(n.attr("axes").is_none());
        assert_eq!(init_values(&model, "unsq_axes"), vec![1]);
        assert_eq!(default_opset(&model), Some(14));
    }

    #[test]
    fn reduce_mean_untouched_until_18() {
        let n = node("ReduceMean", &["x"], &["y"], "rm").with_attribute(attr_ints("axes", &[-1]));
        let mut model = model_at(14, vec![n.clone()]);
        let _ = upgrade_opset(&mut model, 17).unwrap();
        assert_eq!(model.graph.as_ref().unwrap().node[0], n);

        let mut model = model_at(14, vec![n]);
        let _ = upgrade_opset(&mut model, 18).unwrap();
        let n = &model.graph.as_ref().unwrap().node[0];
        assert_eq!(n.input, vec!["x", "rm_axes"]);
        assert_eq!(init_values(&model, "rm_axes"), vec![-1]);
        assert_eq!(model.ir_version, 8);
    }

    #[test]
    fn split_gains_num_outputs_at_18() {
        let n = node("Split", &["x"], &["a", "b", "c"], "sp").with_attribute(attr_int("axis", 0));
        let mut model = model_at(14, vec![n]);
        let _ = upgrade_opset(&mut model, 18).unwrap();
        let n = &model.graph.as_ref().unwrap().node[0];
        assert_eq!(n.attr("num_outputs").unwrap().i, 3);
    }

    #[test]
    fn split_attribute_becomes_input_at_13() {
        let n = node("Split", &["x"], &["a", "b"], "sp").with_attribute(attr_ints("split", &[2, 6]));
        let mut model = model_at(12, vec![n]);
        let _ = upgrade_opset(&mut model, 18).unwrap();
        let n = &model.graph.as_ref().unwrap().node[0];
        assert_eq!(n.input, vec!["x", "sp_split"]);
        assert!(n.attr("num_outputs").is_none(), "split input given");
        assert_eq!(init_values(&model, "sp_split"), vec![2, 6]);
    }

    #[test]
    fn softmax_last_axis_accepted() {
        let n = node("Softmax", &["scores"], &["p"], "sm").with_attribute(attr_int("axis", 3));
        let mut model = model_at(12, vec![n]);
        model.graph.as_mut().unwrap().value_info.push(tensor_value_info(
            "scores",
            ElementType::Float,
            &[Dim::Dynamic("b".into()), Dim::Fixed(12), Dim::Fixed(8), Dim::Fixed(8)],
        ));
        assert!(upgrade_opset(&mut model, 13).is_ok());
    }

    #[test]
    fn softmax_inner_axis_rejected() {
        let n = node("Softmax", &["scores"], &["p"], "sm").with_attribute(attr_int("axis", 1));
        let mut model = model_at(12, vec![n]);
        let err = upgrade_opset(&mut model, 13).unwrap_err();
        assert!(matches!(err, OnnxError::UnsupportedOperator { .. }));
    }

    #[test]
    fn name_collisions_avoided() {
        let n = node("Squeeze", &["x"], &["y"], "sq").with_attribute(attr_ints("axes", &[0]));
        let mut model = model_at(12, vec![n]);
        model
            .graph
            .as_mut()
            .unwrap()
            .initializer
            .push(tensor_i64("sq_axes", &[1], &[5]));
        let _ = upgrade_opset(&mut model, 13).unwrap();
        let n = &model.graph.as_ref().unwrap().node[0];
        assert_eq!(n.input[1], "sq_axes_1");
    }

    #[test]
    fn downgrade_and_ancient_sources_refused() {
        let mut model = model_at(18, vec![]);
        assert!(matches!(
            upgrade_opset(&mut model, 14),
            Err(OnnxError::UnsupportedOpset { .. })
        ));
        let mut model = model_at(9, vec![]);
        assert!(matches!(
            upgrade_opset(&mut model, 14),
            Err(OnnxError::UnsupportedOpset { .. })
        ));
        let mut model = model_at(11, vec![]);
        assert!(matches!(
            upgrade_opset(&mut model, 12),
            Err(OnnxError::UnsupportedOpset { .. })
        ));
    }

    #[test]
    fn same_opset_is_noop() {
        let n = node("ReduceMean", &["x"], &["y"], "rm").with_attribute(attr_ints("axes", &[1]));
        let mut model = model_at(17, vec![n.clone()]);
        let change = upgrade_opset(&mut model, 17).unwrap();
        assert_eq!(change.rewritten_nodes, 0);
        assert_eq!(model.graph.as_ref().unwrap().node[0], n);
    }

    #[test]
    fn custom_domain_nodes_ignored() {
        let mut n = node("ReduceMean", &["x"], &["y"], "rm").with_attribute(attr_ints("axes", &[1]));
        n.domain = "com.microsoft".into();
        let mut model = model_at(14, vec![n.clone()]);
        let _ = upgrade_opset(&mut model, 18).unwrap();
        assert_eq!(model.graph.as_ref().unwrap().node[0], n);
    }
}
