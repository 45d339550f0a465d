//! External tensor data: merging side files into the model and splitting
//! large tensors out of it.
//!
//! A tensor stored externally has `data_location = EXTERNAL` and
//! `external_data` entries `location` (path relative to the model file),
//! optional `offset` and optional `length`. Tensors are found in graph
//! initializers, sparse initializers, node attributes and nested subgraphs.

use std::collections::{BTreeSet, HashMap};
use std::path::{Component, Path};

use tracing::debug;

use crate::errors::{OnnxError, Result};
use crate::proto::tensor_proto::{DATA_LOCATION_DEFAULT, DATA_LOCATION_EXTERNAL};
use crate::proto::{
    AttributeProto, GraphProto, ModelProto, NodeProto, SparseTensorProto, StringStringEntryProto,
    TensorProto,
};

/// Visit every tensor of the model (graph and local functions), depth first.
pub fn for_each_tensor_mut<F>(model: &mut ModelProto, f: &mut F) -> Result<()>
where
    F: FnMut(&mut TensorProto) -> Result<()>,
{
    if let Some(graph) = model.graph.as_mut() {
        visit_graph(graph, f)?;
    }
    for function in &mut model.functions {
        for node in &mut function.node {
            visit_node(node, f)?;
        }
    }
    Ok(())
}

fn visit_graph<F>(graph: &mut GraphProto, f: &mut F) -> Result<()>
where
    F: FnMut(&mut TensorProto) -> Result<()>,
{
    for tensor in &mut graph.initializer {
        f(tensor)?;
    }
    for sparse in &mut graph.sparse_initializer {
        visit_sparse(sparse, f)?;
    }
    for node in &mut graph.node {
        visit_node(node, f)?;
    }
    Ok(())
}

fn visit_node<F>(node: &mut NodeProto, f: &mut F) -> Result<()>
where
    F: FnMut(&mut TensorProto) -> Result<()>,
{
    for attr in &mut node.attribute {
        visit_attribute(attr, f)?;
    }
    Ok(())
}

fn visit_attribute<F>(attr: &mut AttributeProto, f: &mut F) -> Result<()>
where
    F: FnMut(&mut TensorProto) -> Result<()>,
{
    if let Some(t) = attr.t.as_mut() {
        f(t)?;
    }
    for t in &mut attr.tensors {
        f(t)?;
    }
    if let Some(sparse) = attr.sparse_tensor.as_mut() {
        visit_sparse(sparse, f)?;
    }
    for sparse in &mut attr.sparse_tensors {
        visit_sparse(sparse, f)?;
    }
    if let Some(g) = attr.g.as_mut() {
        visit_graph(g, f)?;
    }
    for g in &mut attr.graphs {
        visit_graph(g, f)?;
    }
    Ok(())
}

fn visit_sparse<F>(sparse: &mut SparseTensorProto, f: &mut F) -> Result<()>
where
    F: FnMut(&mut TensorProto) -> Result<()>,
{
    if let Some(values) = sparse.values.as_mut() {
        f(values)?;
    }
    if let Some(indices) = sparse.indices.as_mut() {
        f(indices)?;
    }
    Ok(())
}

/// Visit every tensor of the model without modifying it.
pub fn for_each_tensor(model: &ModelProto, f: &mut dyn FnMut(&TensorProto)) {
    if let Some(graph) = &model.graph {
        walk_graph(graph, f);
    }
    for function in &model.functions {
        for node in &function.node {
            walk_node(node, f);
        }
    }
}

fn walk_graph(graph: &GraphProto, f: &mut dyn FnMut(&TensorProto)) {
    for tensor in &graph.initializer {
        f(tensor);
    }
    for sparse in &graph.sparse_initializer {
        walk_sparse(sparse, f);
    }
    for node in &graph.node {
        walk_node(node, f);
    }
}

fn walk_node(node: &NodeProto, f: &mut dyn FnMut(&TensorProto)) {
    for attr in &node.attribute {
        if let Some(t) = &attr.t {
            f(t);
        }
        for t in &attr.tensors {
            f(t);
        }
        if let Some(sparse) = &attr.sparse_tensor {
            walk_sparse(sparse, f);
        }
        for sparse in &attr.sparse_tensors {
            walk_sparse(sparse, f);
        }
        if let Some(g) = &attr.g {
            walk_graph(g, f);
        }
        for g in &attr.graphs {
            walk_graph(g, f);
        }
    }
}

fn walk_sparse(sparse: &SparseTensorProto, f: &mut dyn FnMut(&TensorProto)) {
    if let Some(values) = &sparse.values {
        f(values);
    }
    if let Some(indices) = &sparse.indices {
        f(indices);
    }
}

/// Whether any tensor of the model references external data.
pub fn has_external_data(model: &ModelProto) -> bool {
    let mut found = false;
    for_each_tensor(model, &mut |t: &TensorProto| {
        found |= t.data_location == DATA_LOCATION_EXTERNAL;
    });
    found
}

/// Side-file locations referenced by external tensors, as written in the
/// model (relative to the model file).
pub fn external_locations(model: &ModelProto) -> BTreeSet<String> {
    let mut locations = BTreeSet::new();
    for_each_tensor(model, &mut |t: &TensorProto| {
        if t.data_location != DATA_LOCATION_EXTERNAL {
            return;
        }
        if let Some(entry) = t.external_data.iter().find(|e| e.key == "location") {
            let _ = locations.insert(entry.value.clone());
        }
    });
    locations
}

/// Parsed `external_data` entries of one tensor.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ExternalRef {
    location: String,
    offset: usize,
    length: Option<usize>,
}

fn parse_external_ref(tensor: &TensorProto) -> Result<ExternalRef> {
    let bad = |reason: String| OnnxError::ExternalData {
        tensor: tensor.name.clone(),
        reason,
    };
    let lookup = |key: &str| {
        tensor
            .external_data
            .iter()
            .find(|e| e.key == key)
            .map(|e| e.value.as_str())
    };

    let location = lookup("location")
        .filter(|l| !l.is_empty())
        .ok_or_else(|| bad("missing location".to_string()))?;
    let path = Path::new(location);
    if path.is_absolute()
        || path
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
    {
        return Err(bad(format!(
            "location '{location}' must stay inside the model directory"
        )));
    }
    let offset = match lookup("offset") {
        Some(v) => v
            .parse::<usize>()
            .map_err(|_| bad(format!("invalid offset '{v}'")))?,
        None => 0,
    };
    let length = match lookup("length") {
        Some(v) => Some(
            v.parse::<usize>()
                .map_err(|_| bad(format!("invalid length '{v}'")))?,
        ),
        None => None,
    };
    Ok(ExternalRef {
        location: location.to_string(),
        offset,
        length,
    })
}

/// Load every externally stored tensor into `raw_data`.
///
/// Locations resolve relative to `base_dir`. Each side file is read once.
/// Returns the number of tensors inlined.
pub fn inline_external_data(model: &mut ModelProto, base_dir: &Path) -> Result<usize> {
    let mut files: HashMap<String, Vec<u8>> = HashMap::new();
    let mut inlined = 0usize;

    for_each_tensor_mut(model, &mut |tensor: &mut TensorProto| {
        if tensor.data_location != DATA_LOCATION_EXTERNAL {
            return Ok(());
        }
        let ext = parse_external_ref(tensor)?;
        if !files.contains_key(&ext.location) {
            let path = base_dir.join(&ext.location);
            let bytes = std::fs::read(&path).map_err(|e| OnnxError::io(&path, e))?;
            debug!(path = %path.display(), bytes = bytes.len(), "read external data file");
            let _ = files.insert(ext.location.clone(), bytes);
        }
        let data = &files[&ext.location];
        let end = match ext.length {
            Some(len) => ext.offset.checked_add(len),
            None => Some(data.len()),
        };
        let slice = end
            .filter(|&end| ext.offset <= end && end <= data.len())
            .map(|end| &data[ext.offset..end])
            .ok_or_else(|| OnnxError::ExternalData {
                tensor: tensor.name.clone(),
                reason: format!(
                    "range {}+{:?} exceeds {} ({} bytes)",
                    ext.offset,
                    ext.length,
                    ext.location,
                    data.len()
                ),
            })?;
        tensor.raw_data = slice.to_vec();
        tensor.external_data.clear();
        tensor.data_location = DATA_LOCATION_DEFAULT;
        inlined += 1;
        Ok(())
    })?;

    Ok(inlined)
}

/// Move every inline `raw_data` tensor of at least `threshold` bytes into a
/// single side buffer.
///
/// `location` is recorded in each tensor's `external_data` and must be the
/// side file's path relative to the model file. Returns the side buffer,
/// empty when nothing qualified.
pub fn externalize_tensors(
    model: &mut ModelProto,
    location: &str,
    threshold: usize,
) -> Result<Vec<u8>> {
    let mut buffer: Vec<u8> = Vec::new();

    for_each_tensor_mut(model, &mut |tensor: &mut TensorProto| {
        if tensor.data_location == DATA_LOCATION_EXTERNAL
            || tensor.raw_data.is_empty()
            || tensor.raw_data.len() < threshold
        {
            return Ok(());
        }
        let offset = buffer.len();
        let length = tensor.raw_data.len();
        buffer.extend_from_slice(&tensor.raw_data);
        tensor.raw_data.clear();
        tensor.data_location = DATA_LOCATION_EXTERNAL;
        tensor.external_data = vec![
            entry("location", location),
            entry("offset", &offset.to_string()),
            entry("length", &length.to_string()),
        ];
        Ok(())
    })?;

    Ok(buffer)
}

fn entry(key: &str, value: &str) -> StringStringEntryProto {
    StringStringEntryProto {
        key: key.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{attr_tensor, node, tensor_f32};
    use crate::proto::GraphProto;

    fn model_with(initializers: Vec<TensorProto>, nodes: Vec<NodeProto>) -> ModelProto {
        ModelProto {
            graph: Some(GraphProto {
                initializer: initializers,
                node: nodes,
                ..GraphProto::default()
            }),
            ..ModelProto::default()
        }
    }

    #[test]
    fn externalize_then_inline_restores_bytes() {
        let big = tensor_f32("big", &[4, 4], &[0.5; 16]);
        let small = tensor_f32("small", &[2], &[1.0, 2.0]);
        let original = model_with(vec![big, small], vec![]);

        let mut model = original.clone();
        let side = externalize_tensors(&mut model, "m.onnx.data", 32).unwrap();
        assert_eq!(side.len(), 64);
        assert!(has_external_data(&model));
        let graph = model.graph.as_ref().unwrap();
        assert!(graph.initializer[0].raw_data.is_empty());
        assert_eq!(graph.initializer[1].raw_data.len(), 8, "small stays inline");

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("m.onnx.data"), &side).unwrap();
        let count = inline_external_data(&mut model, dir.path()).unwrap();
        assert_eq!(count, 1);
        assert!(!has_external_data(&model));
        assert_eq!(model, original);
    }

    #[test]
    fn locations_are_collected_once() {
        let ext = |name: &str, loc: &str| TensorProto {
            name: name.into(),
            data_location: DATA_LOCATION_EXTERNAL,
            external_data: vec![entry("location", loc)],
            ..TensorProto::default()
        };
        let model = model_with(
            vec![ext("a", "model.onnx_data"), ext("b", "model.onnx_data"), ext("c", "extra.bin")],
            vec![],
        );
        let locations: Vec<String> = external_locations(&model).into_iter().collect();
        assert_eq!(locations, vec!["extra.bin", "model.onnx_data"]);
    }

    #[test]
    fn inline_respects_offset_and_length() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("w.bin"), [9u8, 9, 1, 2, 3, 4, 9]).unwrap();
        let tensor = TensorProto {
            name: "w".into(),
            data_location: DATA_LOCATION_EXTERNAL,
            external_data: vec![
                entry("location", "w.bin"),
                entry("offset", "2"),
                entry("length", "4"),
            ],
            ..TensorProto::default()
        };
        let mut model = model_with(vec![tensor], vec![]);
        let _ = inline_external_data(&mut model, dir.path()).unwrap();
        let t = &model.graph.as_ref().unwrap().initializer[0];
        assert_eq!(t.raw_data, vec![1, 2, 3, 4]);
        assert!(t.external_data.is_empty());
        assert_eq!(t.data_location, DATA_LOCATION_DEFAULT);
    }

    #[test]
    fn inline_reaches_attribute_tensors() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("c.bin"), [7u8; 8]).unwrap();
        let external = TensorProto {
            name: "const".into(),
            data_location: DATA_LOCATION_EXTERNAL,
            external_data: vec![entry("location", "c.bin")],
            ..TensorProto::default()
        };
        let constant = node("Constant", &[], &["c"], "const_node")
            .with_attribute(attr_tensor("value", external));
        let mut model = model_with(vec![], vec![constant]);
        assert!(has_external_data(&model));
        assert_eq!(inline_external_data(&mut model, dir.path()).unwrap(), 1);
        let attr = &model.graph.as_ref().unwrap().node[0].attribute[0];
        assert_eq!(attr.t.as_ref().unwrap().raw_data, vec![7u8; 8]);
    }

    #[test]
    fn out_of_range_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("w.bin"), [0u8; 4]).unwrap();
        let tensor = TensorProto {
            name: "w".into(),
            data_location: DATA_LOCATION_EXTERNAL,
            external_data: vec![entry("location", "w.bin"), entry("length", "16")],
            ..TensorProto::default()
        };
        let mut model = model_with(vec![tensor], vec![]);
        let err = inline_external_data(&mut model, dir.path()).unwrap_err();
        assert!(matches!(err, OnnxError::ExternalData { .. }));
    }

    #[test]
    fn escaping_location_rejected() {
        let tensor = TensorProto {
            name: "w".into(),
            data_location: DATA_LOCATION_EXTERNAL,
            external_data: vec![entry("location", "../secret.bin")],
            ..TensorProto::default()
        };
        let mut model = model_with(vec![tensor], vec![]);
        let err = inline_external_data(&mut model, Path::new("/tmp")).unwrap_err();
        assert!(err.to_string().contains("inside the model directory"));
    }

    #[test]
    fn missing_side_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let tensor = TensorProto {
            name: "w".into(),
            data_location: DATA_LOCATION_EXTERNAL,
            external_data: vec![entry("location", "absent.bin")],
            ..TensorProto::default()
        };
        let mut model = model_with(vec![tensor], vec![]);
        let err = inline_external_data(&mut model, dir.path()).unwrap_err();
        assert!(matches!(err, OnnxError::Io { .. }));
    }
}
