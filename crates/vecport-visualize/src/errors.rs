//! Visualizer error types.

use std::path::PathBuf;

use thiserror::Error;

/// Hint printed when the table holds no vectors.
pub const INGEST_HINT: &str = "run the ingestion step first to store ticket embeddings";

/// Hint printed when text cannot be drawn on the plot.
pub const FONT_HINT: &str =
    "plot text is drawn with a system sans-serif font found through fontconfig; \
     install fontconfig and a font package such as fonts-dejavu-core";

/// Errors from fetching, projecting or plotting vectors.
#[derive(Debug, Error)]
pub enum VisualizeError {
    /// `SQLite` error (preserves source chain).
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The source was used after being closed.
    #[error("Vector source is closed")]
    Closed,

    /// A stored vector could not be decoded.
    #[error("Row {row}: cannot decode vector: {reason}")]
    Decode {
        /// Zero-based row index.
        row: usize,
        /// What was wrong.
        reason: String,
    },

    /// The query returned nothing.
    #[error("No vectors found; {INGEST_HINT}")]
    NoData,

    /// Vectors of different lengths.
    #[error("Row {row} has {found} dimensions, expected {expected}")]
    Ragged {
        /// Zero-based row index.
        row: usize,
        /// Length of the first vector.
        expected: usize,
        /// Length of this vector.
        found: usize,
    },

    /// PCA needs at least two samples.
    #[error("Need at least 2 vectors for PCA, got {0}")]
    TooFewRows(usize),

    /// Projection failed.
    #[error("PCA failed: {0}")]
    Pca(String),

    /// No usable font for the title, axis labels or legend.
    #[error("Cannot draw plot text: {0}")]
    Fonts(String),

    /// Drawing or encoding the image failed.
    #[error("Render failed ({}): {reason}", path.display())]
    Render {
        /// Target image.
        path: PathBuf,
        /// Backend message.
        reason: String,
    },
}

/// Result alias for visualizer operations.
pub type Result<T> = std::result::Result<T, VisualizeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn error_display_variants() {
        let cases = vec![
            (VisualizeError::Closed, "Vector source is closed".to_string()),
            (
                VisualizeError::Decode {
                    row: 3,
                    reason: "bad".into(),
                },
                "Row 3: cannot decode vector: bad".to_string(),
            ),
            (
                VisualizeError::NoData,
                format!("No vectors found; {INGEST_HINT}"),
            ),
            (
                VisualizeError::Ragged {
                    row: 1,
                    expected: 384,
                    found: 3,
                },
                "Row 1 has 3 dimensions, expected 384".to_string(),
            ),
            (
                VisualizeError::TooFewRows(1),
                "Need at least 2 vectors for PCA, got 1".to_string(),
            ),
            (
                VisualizeError::Fonts("no match for sans-serif".into()),
                "Cannot draw plot text: no match for sans-serif".to_string(),
            ),
            (
                VisualizeError::Render {
                    path: PathBuf::from("out.png"),
                    reason: "no font".into(),
                },
                "Render failed (out.png): no font".to_string(),
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.to_string(), expected);
        }
    }

    #[test]
    fn error_from_rusqlite() {
        let err: VisualizeError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, VisualizeError::Sqlite(_)));
        assert!(err.source().is_some());
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<VisualizeError>();
    }
}
