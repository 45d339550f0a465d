//! Reference implementation of the pooling appended to exported graphs.
//!
//! Mirrors the graph nodes exactly: the mask-weighted mean over the token
//! axis divides by `max(sum(mask), 1e-9)`, and normalization divides by
//! `max(||v||, 1e-12)`.

/// Lower bound on the per-row mask sum.
pub const MASK_SUM_FLOOR: f32 = 1e-9;

/// Lower bound on the L2 norm used as the normalization divisor.
pub const NORM_EPSILON: f32 = 1e-12;

/// Compute the L2 (Euclidean) norm of a vector.
pub fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Divide by `max(||v||, 1e-12)` in place. Zero vectors remain zero.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = l2_norm(v).max(NORM_EPSILON);
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Mask-weighted mean of `[batch, seq_len, hidden]` token embeddings.
///
/// `attention_mask` is `[batch, seq_len]`. Rows whose mask is all zero pool
/// to the zero vector.
pub fn mean_pool(
    token_embeddings: &[f32],
    attention_mask: &[i64],
    batch: usize,
    seq_len: usize,
    hidden: usize,
) -> Vec<Vec<f32>> {
    assert_eq!(
        token_embeddings.len(),
        batch * seq_len * hidden,
        "token embeddings must be [batch, seq_len, hidden]"
    );
    assert_eq!(
        attention_mask.len(),
        batch * seq_len,
        "attention mask must be [batch, seq_len]"
    );
    (0..batch)
        .map(|b| {
            let mut sum = vec![0.0f32; hidden];
            let mut count = 0.0f32;
            for s in 0..seq_len {
                let weight = attention_mask[b * seq_len + s] as f32;
                if weight == 0.0 {
                    continue;
                }
                count += weight;
                let offset = (b * seq_len + s) * hidden;
                for (acc, x) in sum
                    .iter_mut()
                    .zip(&token_embeddings[offset..offset + hidden])
                {
                    *acc += x * weight;
                }
            }
            let divisor = count.max(MASK_SUM_FLOOR);
            sum.iter_mut().for_each(|x| *x /= divisor);
            sum
        })
        .collect()
}

/// [`mean_pool`] followed by [`l2_normalize`] on every row.
pub fn pool_and_normalize(
    token_embeddings: &[f32],
    attention_mask: &[i64],
    batch: usize,
    seq_len: usize,
    hidden: usize,
) -> Vec<Vec<f32>> {
    let mut pooled = mean_pool(token_embeddings, attention_mask, batch, seq_len, hidden);
    for row in &mut pooled {
        l2_normalize(row);
    }
    pooled
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f32 = 1e-6;

    #[test]
    fn padding_is_ignored() {
        // two tokens, second one padded
        let emb = [1.0, 2.0, 100.0, 100.0];
        let pooled = mean_pool(&emb, &[1, 0], 1, 2, 2);
        assert_eq!(pooled, vec![vec![1.0, 2.0]]);
    }

    #[test]
    fn mean_over_real_tokens() {
        let emb = [1.0, 0.0, 3.0, 4.0, 9.0, 9.0];
        let pooled = mean_pool(&emb, &[1, 1, 0], 1, 3, 2);
        assert!((pooled[0][0] - 2.0).abs() < EPSILON);
        assert!((pooled[0][1] - 2.0).abs() < EPSILON);
    }

    #[test]
    fn full_mask_is_plain_mean() {
        let emb = [1.0, -2.0, 4.0, 0.5, 7.0, 3.5, -1.0, 9.0, 2.0];
        let pooled = mean_pool(&emb, &[1, 1, 1], 1, 3, 3);
        let expected = [
            (1.0 + 0.5 - 1.0) / 3.0,
            (-2.0 + 7.0 + 9.0) / 3.0,
            (4.0 + 3.5 + 2.0) / 3.0,
        ];
        for (got, want) in pooled[0].iter().zip(expected) {
            assert!((got - want).abs() < EPSILON);
        }
    }

    #[test]
    fn empty_mask_pools_to_zero() {
        let pooled = pool_and_normalize(&[5.0, 5.0], &[0], 1, 1, 2);
        assert_eq!(pooled, vec![vec![0.0, 0.0]]);
    }

    #[test]
    fn rows_are_independent() {
        let emb = [1.0, 0.0, 0.0, 3.0];
        let pooled = pool_and_normalize(&emb, &[1, 1], 2, 1, 2);
        assert_eq!(pooled[0], vec![1.0, 0.0]);
        assert_eq!(pooled[1], vec![0.0, 1.0]);
    }

    #[test]
    fn normalize_known_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < EPSILON);
        assert!((v[1] - 0.8).abs() < EPSILON);
    }

    #[test]
    #[should_panic(expected = "attention mask")]
    fn mask_shape_checked() {
        let _ = mean_pool(&[0.0; 4], &[1], 1, 2, 2);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn pooled_rows_are_unit_or_zero(
                emb in proptest::collection::vec(-10.0f32..10.0, 24),
                mask in proptest::collection::vec(0i64..=1, 6),
            ) {
                // batch 2, seq 3, hidden 4
                let pooled = pool_and_normalize(&emb, &mask, 2, 3, 4);
                prop_assert_eq!(pooled.len(), 2);
                for row in &pooled {
                    let n = l2_norm(row);
                    prop_assert!(n < 1e-6 || (n - 1.0).abs() < 1e-4);
                }
            }

            #[test]
            fn padding_content_never_matters(
                emb in proptest::collection::vec(-10.0f32..10.0, 8),
                junk in proptest::collection::vec(-10.0f32..10.0, 4),
            ) {
                // seq 3, hidden 4, last token padded
                let mut with_junk = emb.clone();
                with_junk.extend_from_slice(&junk);
                let mut with_zero = emb;
                with_zero.extend_from_slice(&[0.0; 4]);
                let a = mean_pool(&with_junk, &[1, 1, 0], 1, 3, 4);
                let b = mean_pool(&with_zero, &[1, 1, 0], 1, 3, 4);
                prop_assert_eq!(a, b);
            }
        }
    }
}
