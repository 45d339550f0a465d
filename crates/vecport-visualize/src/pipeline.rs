//! Fetch → project → plot.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use tracing::{error, info};

use crate::errors::{Result, VisualizeError};
use crate::guard::ConnectionGuard;
use crate::pca::fit_transform;
use crate::plot::{PlotRenderer, PlotStyle, ScatterPlan};
use crate::source::{LabeledVector, VectorSource};

/// What a successful run produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VisualizeOutcome {
    /// Rows plotted.
    pub rows: usize,
    /// Distinct labels (legend entries).
    pub groups: usize,
    /// Written image.
    pub output: PathBuf,
}

/// Stack row vectors into an `[n, dims]` matrix, rejecting ragged input.
pub fn stack_vectors(rows: &[LabeledVector]) -> Result<Array2<f64>> {
    let dims = rows.first().map_or(0, |r| r.vector.len());
    let mut flat = Vec::with_capacity(rows.len() * dims);
    for (i, row) in rows.iter().enumerate() {
        if row.vector.len() != dims {
            return Err(VisualizeError::Ragged {
                row: i,
                expected: dims,
                found: row.vector.len(),
            });
        }
        flat.extend(row.vector.iter().map(|&v| f64::from(v)));
    }
    Array2::from_shape_vec((rows.len(), dims), flat)
        .map_err(|e| VisualizeError::Pca(e.to_string()))
}

/// Run the whole visualization. `source` is closed before this returns,
/// whatever the outcome.
pub fn run<S, R>(
    source: S,
    renderer: &mut R,
    style: &PlotStyle,
    output: &Path,
) -> Result<VisualizeOutcome>
where
    S: VectorSource,
    R: PlotRenderer,
{
    let mut guard = ConnectionGuard::new(source);
    renderer.prepare(style)?;
    let rows = match guard.fetch_rows() {
        Ok(rows) => rows,
        Err(e) => {
            error!(error = %e, "fetching vectors failed");
            return Err(e);
        }
    };
    drop(guard);

    if rows.is_empty() {
        return Err(VisualizeError::NoData);
    }
    info!(rows = rows.len(), "vectors loaded");
    if rows.len() < 2 {
        return Err(VisualizeError::TooFewRows(rows.len()));
    }

    let matrix = stack_vectors(&rows)?;
    info!(dims = matrix.ncols(), "running PCA");
    let projected = fit_transform(&matrix, 2)?;

    let labels: Vec<Option<String>> = rows.into_iter().map(|r| r.label).collect();
    let plan = ScatterPlan::build(&labels, &projected);
    renderer.render(&plan, style, output)?;
    info!(path = %output.display(), groups = plan.groups.len(), "plot saved");

    Ok(VisualizeOutcome {
        rows: labels.len(),
        groups: plan.groups.len(),
        output: output.to_path_buf(),
    })
}
