//! The three export flavors and what distinguishes them.

use std::fmt;
use std::str::FromStr;

use vecport_onnx::IntWidth;

/// An export flavor: input width, opset and artifact naming.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ExportVariant {
    /// 64-bit inputs at opset 17.
    Oracle,
    /// 64-bit inputs at opset 14, for older database releases.
    Legacy,
    /// 32-bit inputs at opset 18; intermediate files are removed.
    Fixed,
}

impl ExportVariant {
    /// All variants.
    pub const ALL: [Self; 3] = [Self::Oracle, Self::Legacy, Self::Fixed];

    /// Integer width of the declared inputs.
    pub fn width(self) -> IntWidth {
        match self {
            Self::Oracle | Self::Legacy => IntWidth::I64,
            Self::Fixed => IntWidth::I32,
        }
    }

    /// Default-domain opset of the exported graph.
    pub fn opset(self) -> i64 {
        match self {
            Self::Oracle => 17,
            Self::Legacy => 14,
            Self::Fixed => 18,
        }
    }

    /// File written by the export step (weights may sit in `<file>.data`).
    pub fn intermediate_file(self) -> &'static str {
        match self {
            Self::Oracle => "model_oracle.onnx",
            Self::Legacy => "model_legacy.onnx",
            Self::Fixed => "temp_model.onnx",
        }
    }

    /// Self-contained file written by the merge step.
    pub fn final_file(self) -> &'static str {
        match self {
            Self::Oracle => "model_oracle_merged.onnx",
            Self::Legacy => "model_legacy_merged.onnx",
            Self::Fixed => "model_fixed.onnx",
        }
    }

    /// Text tokenized to produce the example batch.
    pub fn sample_text(self) -> &'static str {
        match self {
            Self::Oracle | Self::Legacy => "Oracle AI Vector Search",
            Self::Fixed => "This is a test.",
        }
    }

    /// Whether the intermediate files are deleted after a successful merge.
    pub fn removes_intermediate(self) -> bool {
        matches!(self, Self::Fixed)
    }

    /// Follow-up shown to the user after a successful export.
    pub fn install_hint(self) -> Option<String> {
        match self {
            Self::Legacy => Some(format!(
                "cp {} /opt/oracle/oradata/models/",
                self.final_file()
            )),
            Self::Oracle | Self::Fixed => None,
        }
    }

    /// Lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Oracle => "oracle",
            Self::Legacy => "legacy",
            Self::Fixed => "fixed",
        }
    }
}

impl fmt::Display for ExportVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown export variant: {s}"))
    }
}
