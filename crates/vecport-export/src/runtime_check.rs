//! ONNX Runtime comparison of an exported model against the reference
//! pooling applied to the base model's token embeddings.

use std::path::Path;

use ort::session::Session;
use ort::value::{DynValue, Tensor};
use tracing::debug;

use crate::errors::{ExportError, Result};
use crate::pooling::{l2_norm, pool_and_normalize};
use crate::tokens::{TokenBatch, TypedTokenBatch};

/// Largest tolerated element-wise difference and unit-norm deviation.
pub const TOLERANCE: f32 = 1e-4;

/// Measured agreement between the exported model and the reference.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RuntimeCheck {
    /// Largest absolute element difference.
    pub max_abs_diff: f32,
    /// Largest `| ||v|| - 1 |` over the exported rows; rows whose reference
    /// is the zero vector (empty mask) must have norm 0 instead.
    pub max_norm_error: f32,
}

/// Run both models on the sample and compare their sentence embeddings.
pub fn compare_with_reference(
    base_model: &Path,
    exported_model: &Path,
    sample: &TokenBatch,
    typed: &TypedTokenBatch,
    embedding_dim: usize,
) -> Result<RuntimeCheck> {
    let reference = reference_embeddings(base_model, sample, embedding_dim)?;
    let exported = exported_embeddings(exported_model, typed, embedding_dim)?;
    let check = measure(&reference, &exported)?;
    if check.max_abs_diff > TOLERANCE || check.max_norm_error > TOLERANCE {
        return Err(ExportError::Verification(format!(
            "max abs diff {:.2e}, max norm error {:.2e} (tolerance {TOLERANCE:.0e})",
            check.max_abs_diff, check.max_norm_error
        )));
    }
    Ok(check)
}

fn open_session(path: &Path) -> Result<Session> {
    Session::builder()
        .map_err(|e| ExportError::Verification(format!("session builder: {e}")))?
        .commit_from_file(path)
        .map_err(|e| ExportError::Verification(format!("model load ({}): {e}", path.display())))
}

fn tensor<T>(name: &str, shape: &[i64], data: &[T]) -> Result<DynValue>
where
    T: ort::tensor::PrimitiveTensorElementType + Clone + std::fmt::Debug + 'static,
{
    Tensor::from_array((shape.to_vec(), data.to_vec()))
        .map(Tensor::into_dyn)
        .map_err(|e| ExportError::Verification(format!("{name} tensor: {e}")))
}

fn run(session: &mut Session, inputs: [DynValue; 3]) -> Result<(Vec<i64>, Vec<f32>)> {
    let [ids, mask, types] = inputs;
    let outputs = session
        .run(ort::inputs![
            "input_ids" => ids,
            "attention_mask" => mask,
            "token_type_ids" => types
        ])
        .map_err(|e| ExportError::Verification(format!("inference: {e}")))?;
    let (shape, data) = outputs[0]
        .try_extract_tensor::<f32>()
        .map_err(|e| ExportError::Verification(format!("extract tensor: {e}")))?;
    Ok((shape.to_vec(), data.to_vec()))
}

/// Base model output pooled and normalized in Rust.
pub fn reference_embeddings(
    base_model: &Path,
    sample: &TokenBatch,
    embedding_dim: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut session = open_session(base_model)?;
    let shape = sample.shape();
    let (out_shape, data) = run(
        &mut session,
        [
            tensor("input_ids", &shape, sample.input_ids())?,
            tensor("attention_mask", &shape, sample.attention_mask())?,
            tensor("token_type_ids", &shape, sample.token_type_ids())?,
        ],
    )?;
    let dims: Vec<usize> = out_shape.iter().map(|&d| d as usize).collect();
    if dims != [sample.batch(), sample.seq_len(), embedding_dim] {
        return Err(ExportError::Verification(format!(
            "unexpected base output shape: {out_shape:?}"
        )));
    }
    Ok(pool_and_normalize(
        &data,
        sample.attention_mask(),
        dims[0],
        dims[1],
        dims[2],
    ))
}

/// Exported model output, one row per sample.
pub fn exported_embeddings(
    exported_model: &Path,
    typed: &TypedTokenBatch,
    embedding_dim: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut session = open_session(exported_model)?;
    let inputs = match typed {
        TypedTokenBatch::I32 {
            shape,
            input_ids,
            attention_mask,
            token_type_ids,
        } => [
            tensor("input_ids", shape, input_ids)?,
            tensor("attention_mask", shape, attention_mask)?,
            tensor("token_type_ids", shape, token_type_ids)?,
        ],
        TypedTokenBatch::I64 {
            shape,
            input_ids,
            attention_mask,
            token_type_ids,
        } => [
            tensor("input_ids", shape, input_ids)?,
            tensor("attention_mask", shape, attention_mask)?,
            tensor("token_type_ids", shape, token_type_ids)?,
        ],
    };
    let (out_shape, data) = run(&mut session, inputs)?;
    if out_shape.len() != 2 || out_shape[1] as usize != embedding_dim {
        return Err(ExportError::Verification(format!(
            "unexpected exported output shape: {out_shape:?}"
        )));
    }
    debug!(shape = ?out_shape, "exported model ran");
    Ok(data.chunks_exact(embedding_dim).map(<[f32]>::to_vec).collect())
}

fn measure(reference: &[Vec<f32>], exported: &[Vec<f32>]) -> Result<RuntimeCheck> {
    if reference.len() != exported.len() {
        return Err(ExportError::Verification(format!(
            "row count differs: reference {}, exported {}",
            reference.len(),
            exported.len()
        )));
    }
    let max_abs_diff = reference
        .iter()
        .zip(exported)
        .flat_map(|(a, b)| a.iter().zip(b).map(|(x, y)| (x - y).abs()))
        .fold(0.0f32, f32::max);
    let max_norm_error = reference
        .iter()
        .zip(exported)
        .map(|(want, row)| {
            let target = if l2_norm(want) > 0.0 { 1.0 } else { 0.0 };
            (l2_norm(row) - target).abs()
        })
        .fold(0.0f32, f32::max);
    Ok(RuntimeCheck {
        max_abs_diff,
        max_norm_error,
    })
}
