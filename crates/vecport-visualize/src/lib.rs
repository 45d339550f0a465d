//! # vecport-visualize
//!
//! Renders stored ticket embeddings as a 2-D scatter plot:
//! - `source`: the [`VectorSource`] seam and its `SQLite` implementation
//! - `guard`: closes the source on every exit path
//! - `pca`: projection to two principal components
//! - `plot`: label grouping, rainbow colors, PNG output
//! - `pipeline`: fetch → project → plot
//!
//! ## Crate Position
//!
//! Depends on: vecport-core (binary), vecport-settings.
//! Depended on by: nothing (leaf crate with a binary).

#![deny(unsafe_code)]

pub mod errors;
pub mod guard;
pub mod pca;
pub mod pipeline;
pub mod plot;
pub mod source;

pub use errors::{FONT_HINT, INGEST_HINT, Result, VisualizeError};
pub use guard::ConnectionGuard;
pub use pca::{Pca, fit_transform};
pub use pipeline::{VisualizeOutcome, run, stack_vectors};
pub use plot::{PlotRenderer, PlotStyle, PngRenderer, ScatterPlan};
pub use source::{FETCH_QUERY, LabeledVector, SqliteVectorSource, VectorSource};
