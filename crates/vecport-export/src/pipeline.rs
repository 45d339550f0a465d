//! The export → merge → verify sequence shared by every variant.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};
use vecport_onnx::{
    Dim, ElementType, IntWidth, ModelSummary, SavedModel, external_data_path, first_input_type,
    load_model, load_model_with_external_data, save_model, save_model_with_external_data,
    summarize,
};
use vecport_settings::ExportSettings;

use crate::errors::{ExportError, Result};
use crate::graph_build::{GraphSpec, build_embedding_graph};
use crate::source::ModelFiles;
use crate::tokens::{TokenBatch, load_tokenizer, tokenize};
use crate::variant::ExportVariant;

/// Runs one export variant against configured paths.
#[derive(Clone, Debug)]
pub struct Exporter<'a> {
    variant: ExportVariant,
    settings: &'a ExportSettings,
}

impl<'a> Exporter<'a> {
    /// Create an exporter for `variant`.
    pub fn new(variant: ExportVariant, settings: &'a ExportSettings) -> Self {
        Self { variant, settings }
    }

    /// The variant being exported.
    pub fn variant(&self) -> ExportVariant {
        self.variant
    }

    /// Where the export step writes.
    pub fn intermediate_path(&self) -> PathBuf {
        Path::new(&self.settings.output_dir).join(self.variant.intermediate_file())
    }

    /// Where the merge step writes.
    pub fn final_path(&self) -> PathBuf {
        Path::new(&self.settings.output_dir).join(self.variant.final_file())
    }

    fn graph_spec(&self) -> GraphSpec {
        GraphSpec {
            width: self.variant.width(),
            opset: self.variant.opset(),
            max_seq_length: self.settings.max_seq_length,
            embedding_dim: self.settings.embedding_dim,
        }
    }

    /// Tokenize the variant's sample text and run the whole pipeline.
    pub fn run(&self, files: &ModelFiles) -> Result<ExportReport> {
        info!(variant = %self.variant, "step 1: tokenizing sample text");
        let tokenizer = load_tokenizer(&files.tokenizer, self.settings.max_seq_length)?;
        let sample = tokenize(
            &tokenizer,
            &[self.variant.sample_text()],
            self.settings.max_seq_length,
        )?;
        self.run_with_sample(&files.model, &sample)
    }

    /// Run the pipeline with an already tokenized sample batch.
    pub fn run_with_sample(&self, base_model: &Path, sample: &TokenBatch) -> Result<ExportReport> {
        info!(width = %self.variant.width(), "step 2: casting inputs");
        let typed = sample.cast(self.variant.width())?;
        let sample_dtypes = typed.dtype_listing();
        info!(dtypes = %sample_dtypes, "input dtypes");

        info!(opset = self.variant.opset(), "step 3: exporting graph");
        match self.export(base_model) {
            Ok(saved) => info!(
                path = %saved.model_path.display(),
                external_data = saved.data_path.is_some(),
                "export finished"
            ),
            Err(e) => warn!(error = %e, "export failed; continuing with whatever was written"),
        }

        info!("step 4: merging external data");
        let merged_bytes = self.merge()?;
        info!(path = %self.final_path().display(), bytes = merged_bytes, "merged model saved");
        if self.variant.removes_intermediate() {
            self.remove_intermediate()?;
        }

        #[cfg(feature = "ort")]
        {
            info!("step 5a: comparing against reference pooling");
            let outcome = crate::runtime_check::compare_with_reference(
                base_model,
                &self.final_path(),
                sample,
                &typed,
                self.settings.embedding_dim,
            )?;
            info!(
                max_abs_diff = outcome.max_abs_diff,
                max_norm_error = outcome.max_norm_error,
                "runtime comparison passed"
            );
        }

        info!("step 5: verifying");
        self.verify(&sample_dtypes)
    }

    /// Build the embedding graph from `base_model` and save it with large
    /// tensors in a side file.
    pub fn export(&self, base_model: &Path) -> Result<SavedModel> {
        let base = load_model_with_external_data(base_model)?;
        let model = build_embedding_graph(base, &self.graph_spec())?;
        Ok(save_model_with_external_data(
            model,
            &self.intermediate_path(),
            self.settings.external_data_threshold,
        )?)
    }

    /// Fold the intermediate artifact and its side file into the final file.
    pub fn merge(&self) -> Result<usize> {
        let intermediate = self.intermediate_path();
        if !intermediate.exists() {
            return Err(ExportError::MissingArtifact(intermediate));
        }
        let model = load_model_with_external_data(&intermediate)?;
        Ok(save_model(&model, &self.final_path())?)
    }

    fn remove_intermediate(&self) -> Result<()> {
        let intermediate = self.intermediate_path();
        for path in [external_data_path(&intermediate), intermediate] {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(ExportError::io(path, e)),
            }
        }
        Ok(())
    }

    /// Reload the final file and summarize it.
    pub fn verify(&self, sample_dtypes: &str) -> Result<ExportReport> {
        let final_path = self.final_path();
        let model = load_model(&final_path)?;
        let summary = summarize(&model)?;
        let first_input = first_input_type(&model)?;
        Ok(ExportReport {
            variant: self.variant,
            final_path,
            summary,
            first_input,
            requested: self.variant.width(),
            max_seq_length: self.settings.max_seq_length,
            sample_dtypes: sample_dtypes.to_string(),
        })
    }
}

/// What the verify step found.
#[derive(Clone, Debug, PartialEq)]
pub struct ExportReport {
    /// Variant exported.
    pub variant: ExportVariant,
    /// The self-contained model file.
    pub final_path: PathBuf,
    /// Declared interface of the final file.
    pub summary: ModelSummary,
    /// Element type of the first declared input.
    pub first_input: ElementType,
    /// Width the variant asked for.
    pub requested: IntWidth,
    /// Expected fixed sequence length.
    pub max_seq_length: usize,
    /// Dtypes of the cast sample batch.
    pub sample_dtypes: String,
}

impl ExportReport {
    /// First input carries the requested integer width.
    pub fn type_matches(&self) -> bool {
        self.first_input == self.requested.element_type()
    }

    /// Every input is `[dynamic, max_seq_length]` and every output has a
    /// dynamic leading axis.
    pub fn axes_match(&self) -> bool {
        let seq = self.max_seq_length as i64;
        let inputs_ok = self.summary.inputs.iter().all(|i| {
            matches!(i.dims.as_deref(), Some([batch, Dim::Fixed(s)]) if batch.is_dynamic() && *s == seq)
        });
        let outputs_ok = self
            .summary
            .outputs
            .iter()
            .all(|o| matches!(o.dims.as_deref(), Some([batch, ..]) if batch.is_dynamic()));
        inputs_ok && outputs_ok
    }

    /// Whether the export produced what the variant promised.
    pub fn succeeded(&self) -> bool {
        self.type_matches() && self.axes_match()
    }

    /// Human-readable verification report.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Sample input dtypes: {}", self.sample_dtypes);
        let _ = writeln!(out, "Inputs:");
        for input in &self.summary.inputs {
            let _ = writeln!(
                out,
                "  {}: {} {}",
                input.name,
                input.elem_type,
                input.shape_list()
            );
            let _ = writeln!(out, "    shape: {}", input.shape_detail());
        }
        let _ = writeln!(out, "Outputs:");
        for output in &self.summary.outputs {
            let _ = writeln!(
                out,
                "  {}: {} {}",
                output.name,
                output.elem_type,
                output.shape_list()
            );
        }
        let _ = writeln!(
            out,
            "Model: {} ({:.1} MB)",
            self.final_path.display(),
            self.summary.size_mb()
        );
        let _ = writeln!(out, "Sequence length: {} (fixed)", self.max_seq_length);
        let _ = writeln!(out, "Batch size: dynamic");
        if self.type_matches() {
            let _ = writeln!(
                out,
                "SUCCESS: first input is {} (type {})",
                self.first_input,
                self.first_input.code()
            );
        } else {
            let _ = writeln!(
                out,
                "FAILURE: first input is {} (type {}), expected {} (type {})",
                self.first_input,
                self.first_input.code(),
                self.requested.element_type(),
                self.requested.element_type().code()
            );
        }
        if !self.axes_match() {
            let _ = writeln!(
                out,
                "FAILURE: declared axes are not [batch_size, {}]",
                self.max_seq_length
            );
        }
        if self.succeeded() {
            if let Some(hint) = self.variant.install_hint() {
                let _ = writeln!(out, "Next step: {hint}");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vecport_onnx::TensorInfo;

    fn info(name: &str, elem: ElementType, dims: Vec<Dim>) -> TensorInfo {
        TensorInfo {
            name: name.into(),
            elem_type: elem,
            dims: Some(dims),
        }
    }

    fn report(variant: ExportVariant, first: ElementType) -> ExportReport {
        let batch = || Dim::Dynamic("batch_size".into());
        ExportReport {
            variant,
            final_path: PathBuf::from(variant.final_file()),
            summary: ModelSummary {
                inputs: vec![info("input_ids", first, vec![batch(), Dim::Fixed(128)])],
                outputs: vec![info(
                    "output_vector",
                    ElementType::Float,
                    vec![batch(), Dim::Fixed(384)],
                )],
                opset: Some(variant.opset()),
                byte_size: 90 * 1024 * 1024,
            },
            first_input: first,
            requested: variant.width(),
            max_seq_length: 128,
            sample_dtypes: "int64, int64, int64".into(),
        }
    }

    #[test]
    fn matching_report() {
        let r = report(ExportVariant::Oracle, ElementType::Int64);
        assert!(r.succeeded());
        let text = r.render();
        assert!(text.contains("input_ids: INT64 [batch_size, 128]"));
        assert!(text.contains("shape: batch_size (dynamic) 128 (fixed)"));
        assert!(text.contains("output_vector: FLOAT32 [batch_size, 384]"));
        assert!(text.contains("(90.0 MB)"));
        assert!(text.contains("SUCCESS: first input is INT64 (type 7)"));
        assert!(!text.contains("Next step"));
    }

    #[test]
    fn legacy_report_has_hint() {
        let text = report(ExportVariant::Legacy, ElementType::Int64).render();
        assert!(text.contains("Next step: cp model_legacy_merged.onnx /opt/oracle/oradata/models/"));
    }

    #[test]
    fn wrong_width_fails() {
        let r = report(ExportVariant::Fixed, ElementType::Int64);
        assert!(!r.type_matches());
        assert!(!r.succeeded());
        assert!(r.render().contains("expected INT32 (type 6)"));
    }

    #[test]
    fn dynamic_sequence_axis_fails() {
        let mut r = report(ExportVariant::Oracle, ElementType::Int64);
        r.summary.inputs[0].dims = Some(vec![
            Dim::Dynamic("batch_size".into()),
            Dim::Dynamic("sequence".into()),
        ]);
        assert!(r.type_matches());
        assert!(!r.axes_match());
        assert!(r.render().contains("FAILURE: declared axes"));
    }

    #[test]
    fn paths_follow_output_dir() {
        let settings = ExportSettings {
            output_dir: "/out".into(),
            ..ExportSettings::default()
        };
        let exporter = Exporter::new(ExportVariant::Fixed, &settings);
        assert_eq!(exporter.intermediate_path(), PathBuf::from("/out/temp_model.onnx"));
        assert_eq!(exporter.final_path(), PathBuf::from("/out/model_fixed.onnx"));
        assert_eq!(exporter.variant(), ExportVariant::Fixed);
    }
}
