//! Locating the base model files: local paths or the Hugging Face hub.

use std::path::{Path, PathBuf};

use tracing::{debug, info};
use vecport_settings::ExportSettings;

use crate::errors::{ExportError, Result};

/// Base ONNX graph and its tokenizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModelFiles {
    /// `model.onnx` of the base transformer.
    pub model: PathBuf,
    /// `tokenizer.json` of the base transformer.
    pub tokenizer: PathBuf,
}

/// Resolve the base model files, downloading whatever is not configured
/// locally.
pub fn resolve_model_files(settings: &ExportSettings) -> Result<ModelFiles> {
    let local_model = settings.base_model_path.as_deref().map(PathBuf::from);
    let local_tokenizer = settings.tokenizer_path.as_deref().map(PathBuf::from);
    if let (Some(model), Some(tokenizer)) = (&local_model, &local_tokenizer) {
        debug!(model = %model.display(), tokenizer = %tokenizer.display(), "using local model files");
        return Ok(ModelFiles {
            model: model.clone(),
            tokenizer: tokenizer.clone(),
        });
    }
    download_model(settings, local_model, local_tokenizer)
}

/// Download model files via `hf-hub`.
fn download_model(
    settings: &ExportSettings,
    local_model: Option<PathBuf>,
    local_tokenizer: Option<PathBuf>,
) -> Result<ModelFiles> {
    let cache_dir = settings.resolved_cache_dir();
    debug!(cache_dir = %cache_dir.display(), model = %settings.model_id, "downloading model via hf-hub");

    let api = hf_hub::api::sync::ApiBuilder::new()
        .with_cache_dir(cache_dir)
        .build()
        .map_err(|e| ExportError::Download(format!("hf-hub api: {e}")))?;
    let repo = api.model(settings.model_id.clone());

    let model = match local_model {
        Some(path) => path,
        None => {
            let path = repo.get(&settings.base_model_file).map_err(|e| {
                ExportError::Download(format!("model download ({}): {e}", settings.base_model_file))
            })?;
            // Weights published next to the graph must land beside it too.
            for location in sidecar_files(&path)? {
                let remote = sibling(&settings.base_model_file, &location);
                let _ = repo
                    .get(&remote)
                    .map_err(|e| ExportError::Download(format!("external data ({remote}): {e}")))?;
            }
            path
        }
    };

    let tokenizer = match local_tokenizer {
        Some(path) => path,
        None => repo
            .get("tokenizer.json")
            .map_err(|e| ExportError::Download(format!("tokenizer download: {e}")))?,
    };

    info!(model = %model.display(), tokenizer = %tokenizer.display(), "model files ready");
    Ok(ModelFiles { model, tokenizer })
}

/// External data files the model at `path` refers to.
fn sidecar_files(path: &Path) -> Result<Vec<String>> {
    let model = vecport_onnx::load_model(path)?;
    Ok(vecport_onnx::external_locations(&model).into_iter().collect())
}

/// Repository path of `location` relative to the repository file `file`.
fn sibling(file: &str, location: &str) -> String {
    match file.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/{location}"),
        None => location.to_string(),
    }
}
