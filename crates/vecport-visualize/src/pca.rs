//! Principal component analysis by power iteration with deflation.
//!
//! Computed in `f64` on mean-centered data. Each component is oriented so
//! its largest-magnitude loading is positive, which makes the projection
//! deterministic for a given input.

use ndarray::{Array1, Array2, Axis};
use tracing::debug;

use crate::errors::{Result, VisualizeError};

const MAX_ITERATIONS: usize = 1000;
const TOLERANCE: f64 = 1e-10;

/// A fitted projection.
#[derive(Clone, Debug)]
pub struct Pca {
    mean: Array1<f64>,
    /// `[n_components, dims]`, orthonormal rows.
    components: Array2<f64>,
    explained_variance: Vec<f64>,
}

impl Pca {
    /// Fit `n_components` principal axes to the rows of `data`.
    pub fn fit(data: &Array2<f64>, n_components: usize) -> Result<Self> {
        let (n, dims) = data.dim();
        if n < 2 {
            return Err(VisualizeError::TooFewRows(n));
        }
        if n_components == 0 || n_components > dims {
            return Err(VisualizeError::Pca(format!(
                "cannot extract {n_components} components from {dims} dimensions"
            )));
        }
        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| VisualizeError::Pca("empty data".into()))?;
        let centered = data - &mean;
        let mut cov = centered.t().dot(&centered) / (n as f64 - 1.0);

        let mut components = Array2::zeros((n_components, dims));
        let mut explained_variance = Vec::with_capacity(n_components);
        for k in 0..n_components {
            let (value, vector) = dominant_eigenpair(&cov, &components, k);
            // deflate: C -= λ v vᵀ
            let outer = vector
                .view()
                .insert_axis(Axis(1))
                .dot(&vector.view().insert_axis(Axis(0)));
            cov = cov - outer * value;
            components.row_mut(k).assign(&orient(vector));
            explained_variance.push(value.max(0.0));
        }
        debug!(rows = n, dims, ?explained_variance, "PCA fitted");
        Ok(Self {
            mean,
            components,
            explained_variance,
        })
    }

    /// Project rows of `data` onto the fitted components.
    pub fn transform(&self, data: &Array2<f64>) -> Array2<f64> {
        (data - &self.mean).dot(&self.components.t())
    }

    /// Fitted axes, one per row.
    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Variance captured by each component.
    pub fn explained_variance(&self) -> &[f64] {
        &self.explained_variance
    }
}

/// Fit on `data` and project it.
pub fn fit_transform(data: &Array2<f64>, n_components: usize) -> Result<Array2<f64>> {
    let pca = Pca::fit(data, n_components)?;
    Ok(pca.transform(data))
}

/// Largest eigenpair of symmetric `cov`, orthogonal to the first `found`
/// rows of `previous`.
fn dominant_eigenpair(
    cov: &Array2<f64>,
    previous: &Array2<f64>,
    found: usize,
) -> (f64, Array1<f64>) {
    let dims = cov.nrows();
    // slightly uneven start so no axis is orthogonal to it by symmetry
    let mut v = Array1::from_shape_fn(dims, |i| 1.0 + i as f64 / dims as f64);
    orthonormalize(&mut v, previous, found);

    for _ in 0..MAX_ITERATIONS {
        let mut next = cov.dot(&v);
        orthonormalize(&mut next, previous, found);
        let delta = (&next - &v).mapv(f64::abs).sum();
        v = next;
        if delta < TOLERANCE {
            break;
        }
    }
    let value = v.dot(&cov.dot(&v));
    (value, v)
}

/// Remove the projections on the first `found` rows of `basis`, then scale
/// to unit length. A zero vector is replaced by the first basis direction
/// that survives the projection.
fn orthonormalize(v: &mut Array1<f64>, basis: &Array2<f64>, found: usize) {
    for row in basis.rows().into_iter().take(found) {
        let proj = v.dot(&row);
        v.scaled_add(-proj, &row);
    }
    let norm = v.dot(&*v).sqrt();
    if norm > f64::EPSILON {
        v.mapv_inplace(|x| x / norm);
        return;
    }
    for axis in 0..v.len() {
        let mut e = Array1::zeros(v.len());
        e[axis] = 1.0;
        for row in basis.rows().into_iter().take(found) {
            let proj = e.dot(&row);
            e.scaled_add(-proj, &row);
        }
        let n = e.dot(&e).sqrt();
        if n > 1e-6 {
            *v = e / n;
            return;
        }
    }
}

/// Flip `v` so its largest-magnitude entry is positive.
fn orient(v: Array1<f64>) -> Array1<f64> {
    let pivot = v
        .iter()
        .copied()
        .fold(0.0f64, |best, x| if x.abs() > best.abs() { x } else { best });
    if pivot < 0.0 { -v } else { v }
}
