//! Reading and writing `.onnx` files.

use std::path::{Path, PathBuf};

use prost::Message;
use tracing::debug;

use crate::errors::{OnnxError, Result};
use crate::external::{externalize_tensors, inline_external_data};
use crate::proto::ModelProto;

/// Decode a model from the file at `path`. External data stays external.
pub fn load_model(path: &Path) -> Result<ModelProto> {
    let bytes = std::fs::read(path).map_err(|e| OnnxError::io(path, e))?;
    let model = ModelProto::decode(bytes.as_slice())?;
    debug!(path = %path.display(), bytes = bytes.len(), "loaded ONNX model");
    Ok(model)
}

/// Decode a model and pull every externally stored tensor into it.
pub fn load_model_with_external_data(path: &Path) -> Result<ModelProto> {
    let mut model = load_model(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let inlined = inline_external_data(&mut model, base_dir)?;
    if inlined > 0 {
        debug!(path = %path.display(), tensors = inlined, "inlined external data");
    }
    Ok(model)
}

/// Encode `model` into a single self-contained file. Returns bytes written.
pub fn save_model(model: &ModelProto, path: &Path) -> Result<usize> {
    let bytes = model.encode_to_vec();
    std::fs::write(path, &bytes).map_err(|e| OnnxError::io(path, e))?;
    debug!(path = %path.display(), bytes = bytes.len(), "saved ONNX model");
    Ok(bytes.len())
}

/// Files produced by [`save_model_with_external_data`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SavedModel {
    /// The `.onnx` file.
    pub model_path: PathBuf,
    /// The side file, when any tensor was large enough to move out.
    pub data_path: Option<PathBuf>,
}

/// Side-file path used for `model_path`: `<file>.data` next to it.
pub fn external_data_path(model_path: &Path) -> PathBuf {
    let mut name = model_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".data");
    model_path.with_file_name(name)
}

/// Save with tensors of at least `threshold` bytes moved to `<file>.data`.
pub fn save_model_with_external_data(
    mut model: ModelProto,
    path: &Path,
    threshold: usize,
) -> Result<SavedModel> {
    let data_path = external_data_path(path);
    let location = data_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let side = externalize_tensors(&mut model, &location, threshold)?;
    let data_path = if side.is_empty() {
        None
    } else {
        std::fs::write(&data_path, &side).map_err(|e| OnnxError::io(&data_path, e))?;
        debug!(path = %data_path.display(), bytes = side.len(), "wrote external data");
        Some(data_path)
    };
    let _ = save_model(&model, path)?;
    Ok(SavedModel {
        model_path: path.to_path_buf(),
        data_path,
    })
}
