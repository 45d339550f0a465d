//! Command-line entry shared by the three export binaries.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use vecport_settings::{VecportSettings, load_settings, load_settings_from_path};

use crate::pipeline::Exporter;
use crate::source::resolve_model_files;
use crate::variant::ExportVariant;

/// Flags accepted by every export binary.
#[derive(Debug, Parser)]
#[command(about = "Export a pooled, normalized sentence-embedding ONNX model")]
pub struct ExportArgs {
    /// Settings file (default: `~/.vecport/settings.json`).
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Directory receiving the model files.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Local base ONNX graph instead of the hub download.
    #[arg(long)]
    pub base_model: Option<PathBuf>,

    /// Local `tokenizer.json` instead of the hub download.
    #[arg(long)]
    pub tokenizer: Option<PathBuf>,

    /// Log filter (overridden by `RUST_LOG`).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl ExportArgs {
    /// Load settings and apply the flag overrides on top.
    pub fn resolve_settings(&self) -> Result<VecportSettings> {
        let mut settings = match &self.settings {
            Some(path) => load_settings_from_path(path)
                .with_context(|| format!("failed to load settings: {}", path.display()))?,
            None => load_settings().context("failed to load settings")?,
        };
        if let Some(dir) = &self.output_dir {
            settings.export.output_dir = dir.display().to_string();
        }
        if let Some(path) = &self.base_model {
            settings.export.base_model_path = Some(path.display().to_string());
        }
        if let Some(path) = &self.tokenizer {
            settings.export.tokenizer_path = Some(path.display().to_string());
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        Ok(settings)
    }
}

/// Parse flags, run `variant`, print the report.
///
/// Fails when the export did not produce a model with the requested input
/// width and axes.
pub fn run(variant: ExportVariant) -> Result<()> {
    let args = ExportArgs::parse();
    let settings = args.resolve_settings()?;
    vecport_core::init_subscriber(&settings.logging.level);

    let result = export(variant, &settings);
    if let Err(e) = &result {
        error!(variant = %variant, "{e:#}");
    }
    result
}

fn export(variant: ExportVariant, settings: &VecportSettings) -> Result<()> {
    std::fs::create_dir_all(&settings.export.output_dir).with_context(|| {
        format!("failed to create output dir: {}", settings.export.output_dir)
    })?;
    let files = resolve_model_files(&settings.export).context("failed to fetch base model")?;
    let report = Exporter::new(variant, &settings.export)
        .run(&files)
        .with_context(|| format!("{variant} export failed"))?;

    print!("{}", report.render());
    if !report.succeeded() {
        anyhow::bail!(
            "exported model does not declare {} inputs of shape [batch_size, {}]",
            report.requested,
            report.max_seq_length
        );
    }
    Ok(())
}
