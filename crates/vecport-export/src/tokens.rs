//! Sample tokenization and integer-width casting of the three model inputs.

use std::path::Path;

use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};
use vecport_onnx::IntWidth;

use crate::errors::{ExportError, Result};

/// One tokenized text before padding.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenRow {
    /// Vocabulary ids.
    pub ids: Vec<i64>,
    /// 1 for real tokens, 0 for padding.
    pub attention_mask: Vec<i64>,
    /// Segment ids.
    pub token_type_ids: Vec<i64>,
}

/// `[batch, seq_len]` token tensors, stored row-major as `i64`.
///
/// Every row has exactly `seq_len` entries: shorter rows are padded with 0,
/// longer rows are cut.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenBatch {
    batch: usize,
    seq_len: usize,
    input_ids: Vec<i64>,
    attention_mask: Vec<i64>,
    token_type_ids: Vec<i64>,
}

fn fit(values: &[i64], seq_len: usize, out: &mut Vec<i64>) {
    let take = values.len().min(seq_len);
    out.extend_from_slice(&values[..take]);
    out.resize(out.len() + (seq_len - take), 0);
}

impl TokenBatch {
    /// Pad or cut each row to `seq_len`.
    pub fn from_rows(rows: &[TokenRow], seq_len: usize) -> Self {
        let mut input_ids = Vec::with_capacity(rows.len() * seq_len);
        let mut attention_mask = Vec::with_capacity(rows.len() * seq_len);
        let mut token_type_ids = Vec::with_capacity(rows.len() * seq_len);
        for row in rows {
            fit(&row.ids, seq_len, &mut input_ids);
            fit(&row.attention_mask, seq_len, &mut attention_mask);
            fit(&row.token_type_ids, seq_len, &mut token_type_ids);
        }
        Self {
            batch: rows.len(),
            seq_len,
            input_ids,
            attention_mask,
            token_type_ids,
        }
    }

    /// Number of rows.
    pub fn batch(&self) -> usize {
        self.batch
    }

    /// Tokens per row.
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// `[batch, seq_len]` as `i64`, the form tensor constructors take.
    pub fn shape(&self) -> Vec<i64> {
        vec![self.batch as i64, self.seq_len as i64]
    }

    /// Flattened token ids.
    pub fn input_ids(&self) -> &[i64] {
        &self.input_ids
    }

    /// Flattened attention mask.
    pub fn attention_mask(&self) -> &[i64] {
        &self.attention_mask
    }

    /// Flattened segment ids.
    pub fn token_type_ids(&self) -> &[i64] {
        &self.token_type_ids
    }

    /// Convert all three tensors to the requested width.
    pub fn cast(&self, width: IntWidth) -> Result<TypedTokenBatch> {
        Ok(match width {
            IntWidth::I64 => TypedTokenBatch::I64 {
                shape: self.shape(),
                input_ids: self.input_ids.clone(),
                attention_mask: self.attention_mask.clone(),
                token_type_ids: self.token_type_ids.clone(),
            },
            IntWidth::I32 => TypedTokenBatch::I32 {
                shape: self.shape(),
                input_ids: narrow("input_ids", &self.input_ids)?,
                attention_mask: narrow("attention_mask", &self.attention_mask)?,
                token_type_ids: narrow("token_type_ids", &self.token_type_ids)?,
            },
        })
    }
}

fn narrow(input: &'static str, values: &[i64]) -> Result<Vec<i32>> {
    values
        .iter()
        .map(|&value| {
            i32::try_from(value).map_err(|_| ExportError::TokenOverflow {
                input,
                value,
                width: IntWidth::I32,
            })
        })
        .collect()
}

/// Token tensors at a concrete integer width.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypedTokenBatch {
    /// 32-bit tensors.
    I32 {
        /// `[batch, seq_len]`.
        shape: Vec<i64>,
        /// Token ids.
        input_ids: Vec<i32>,
        /// Attention mask.
        attention_mask: Vec<i32>,
        /// Segment ids.
        token_type_ids: Vec<i32>,
    },
    /// 64-bit tensors.
    I64 {
        /// `[batch, seq_len]`.
        shape: Vec<i64>,
        /// Token ids.
        input_ids: Vec<i64>,
        /// Attention mask.
        attention_mask: Vec<i64>,
        /// Segment ids.
        token_type_ids: Vec<i64>,
    },
}

impl TypedTokenBatch {
    /// Width of all three tensors.
    pub fn width(&self) -> IntWidth {
        match self {
            Self::I32 { .. } => IntWidth::I32,
            Self::I64 { .. } => IntWidth::I64,
        }
    }

    /// `int32, int32, int32` style listing for logs.
    pub fn dtype_listing(&self) -> String {
        let w = self.width();
        format!("{w}, {w}, {w}")
    }
}

/// Load `tokenizer.json` with fixed-length padding and truncation.
pub fn load_tokenizer(path: &Path, max_seq_length: usize) -> Result<Tokenizer> {
    let mut tokenizer = Tokenizer::from_file(path)
        .map_err(|e| ExportError::Tokenizer(format!("{}: {e}", path.display())))?;
    let _ = tokenizer.with_padding(Some(PaddingParams {
        strategy: PaddingStrategy::Fixed(max_seq_length),
        ..PaddingParams::default()
    }));
    let _ = tokenizer
        .with_truncation(Some(TruncationParams {
            max_length: max_seq_length,
            ..TruncationParams::default()
        }))
        .map_err(|e| ExportError::Tokenizer(format!("truncation: {e}")))?;
    Ok(tokenizer)
}

/// Tokenize `texts` into a fixed-length batch.
pub fn tokenize(tokenizer: &Tokenizer, texts: &[&str], seq_len: usize) -> Result<TokenBatch> {
    let inputs: Vec<String> = texts.iter().map(ToString::to_string).collect();
    let encodings = tokenizer
        .encode_batch(inputs, true)
        .map_err(|e| ExportError::Tokenizer(format!("encode: {e}")))?;
    let rows: Vec<TokenRow> = encodings
        .iter()
        .map(|enc| TokenRow {
            ids: enc.get_ids().iter().map(|&v| i64::from(v)).collect(),
            attention_mask: enc.get_attention_mask().iter().map(|&v| i64::from(v)).collect(),
            token_type_ids: enc.get_type_ids().iter().map(|&v| i64::from(v)).collect(),
        })
        .collect();
    Ok(TokenBatch::from_rows(&rows, seq_len))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(ids: &[i64]) -> TokenRow {
        TokenRow {
            ids: ids.to_vec(),
            attention_mask: vec![1; ids.len()],
            token_type_ids: vec![0; ids.len()],
        }
    }

    #[test]
    fn short_rows_are_padded() {
        let batch = TokenBatch::from_rows(&[row(&[101, 7592, 102])], 6);
        assert_eq!(batch.shape(), vec![1, 6]);
        assert_eq!(batch.input_ids(), &[101, 7592, 102, 0, 0, 0]);
        assert_eq!(batch.attention_mask(), &[1, 1, 1, 0, 0, 0]);
        assert_eq!(batch.token_type_ids(), &[0; 6]);
    }

    #[test]
    fn long_rows_are_cut() {
        let batch = TokenBatch::from_rows(&[row(&[1, 2, 3, 4, 5])], 3);
        assert_eq!(batch.input_ids(), &[1, 2, 3]);
        assert_eq!(batch.attention_mask(), &[1, 1, 1]);
    }

    #[test]
    fn rows_stack_in_order() {
        let batch = TokenBatch::from_rows(&[row(&[1]), row(&[2, 3])], 2);
        assert_eq!(batch.batch(), 2);
        assert_eq!(batch.seq_len(), 2);
        assert_eq!(batch.input_ids(), &[1, 0, 2, 3]);
    }

    #[test]
    fn cast_to_int32() {
        let batch = TokenBatch::from_rows(&[row(&[101, 102])], 4);
        let typed = batch.cast(IntWidth::I32).unwrap();
        assert_eq!(typed.width(), IntWidth::I32);
        assert_eq!(typed.dtype_listing(), "int32, int32, int32");
        match typed {
            TypedTokenBatch::I32 {
                shape, input_ids, ..
            } => {
                assert_eq!(shape, vec![1, 4]);
                assert_eq!(input_ids, vec![101, 102, 0, 0]);
            }
            TypedTokenBatch::I64 { .. } => panic!("expected int32 batch"),
        }
    }

    #[test]
    fn cast_to_int64_is_lossless() {
        let batch = TokenBatch::from_rows(&[row(&[i64::from(i32::MAX) + 1])], 1);
        let typed = batch.cast(IntWidth::I64).unwrap();
        assert_eq!(typed.dtype_listing(), "int64, int64, int64");
    }

    #[test]
    fn cast_overflow_is_error() {
        let batch = TokenBatch::from_rows(&[row(&[i64::from(i32::MAX) + 1])], 1);
        let err = batch.cast(IntWidth::I32).unwrap_err();
        assert!(matches!(
            err,
            ExportError::TokenOverflow {
                input: "input_ids",
                ..
            }
        ));
    }

    #[test]
    fn missing_tokenizer_file() {
        let err = load_tokenizer(Path::new("/nonexistent/tokenizer.json"), 128).unwrap_err();
        assert!(matches!(err, ExportError::Tokenizer(_)));
    }
}
