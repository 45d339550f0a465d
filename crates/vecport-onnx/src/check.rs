//! Input element-type classification for the type checker.

use std::path::Path;

use tracing::debug;

use crate::elem_type::ElementType;
use crate::errors::{OnnxError, Result};
use crate::inspect::first_input_type;
use crate::io::load_model;

/// What the first declared input of a model turned out to be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeVerdict {
    /// Element type 7.
    Int64,
    /// Element type 6.
    Int32,
    /// Anything else, with its raw code.
    Other(i32),
}

impl TypeVerdict {
    /// Classify an element type against the two integer codes.
    pub fn classify(elem: ElementType) -> Self {
        match elem {
            ElementType::Int64 => Self::Int64,
            ElementType::Int32 => Self::Int32,
            other => Self::Other(other.code()),
        }
    }

    /// Raw element type code.
    pub fn code(self) -> i32 {
        match self {
            Self::Int64 => ElementType::INT64_CODE,
            Self::Int32 => ElementType::INT32_CODE,
            Self::Other(code) => code,
        }
    }

    /// Report lines, without the separator frame.
    pub fn lines(self) -> Vec<String> {
        match self {
            Self::Int64 => vec![
                format!("Input is INT64 (type {})", self.code()),
                "RECOMMENDATION: use the INT64 SQL setup".to_string(),
            ],
            Self::Int32 => vec![
                format!("Input is INT32 (type {})", self.code()),
                "RECOMMENDATION: use the INT32 SQL setup".to_string(),
            ],
            Self::Other(code) => vec![format!("Input is some other type (type {code})")],
        }
    }
}

/// Separator framing the report.
pub const SEPARATOR: &str = "------------------------------";

/// Load the model at `path` and classify its first input.
///
/// A first input that is not a tensor (sequence, map, ...) has no element
/// type and reports as `Other(0)`.
pub fn check_model_file(path: &Path) -> Result<TypeVerdict> {
    let model = load_model(path)?;
    match first_input_type(&model) {
        Ok(elem) => Ok(TypeVerdict::classify(elem)),
        Err(OnnxError::NotATensor(name)) => {
            debug!(input = %name, "first input is not a tensor");
            Ok(TypeVerdict::Other(0))
        }
        Err(e) => Err(e),
    }
}

/// The full framed report.
pub fn render_report(verdict: TypeVerdict) -> String {
    let mut out = vec![SEPARATOR.to_string()];
    out.extend(verdict.lines());
    out.push(SEPARATOR.to_string());
    out.join("\n")
}
