//! Plot stored ticket embeddings, colored by department.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use vecport_settings::{load_settings, load_settings_from_path};
use vecport_visualize::{
    FONT_HINT, INGEST_HINT, PlotStyle, PngRenderer, SqliteVectorSource, VisualizeError,
};

#[derive(Debug, Parser)]
#[command(
    name = "visualize-clusters",
    about = "Project stored embeddings with PCA and save a scatter plot"
)]
struct Args {
    /// Settings file (default: `~/.vecport/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,

    /// `SQLite` database holding `galactic_tickets`.
    #[arg(long)]
    database: Option<PathBuf>,

    /// Output image.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Log filter (overridden by `RUST_LOG`).
    #[arg(long)]
    log_level: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = match &args.settings {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings: {}", path.display()))?,
        None => load_settings().context("failed to load settings")?,
    };
    if let Some(level) = &args.log_level {
        settings.logging.level.clone_from(level);
    }
    vecport_core::init_subscriber(&settings.logging.level);

    let database = args
        .database
        .unwrap_or_else(|| PathBuf::from(&settings.visualize.database_path));
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(&settings.visualize.output_path));

    println!("Connecting to {}...", database.display());
    let source = SqliteVectorSource::open(&database)
        .with_context(|| format!("failed to open database: {}", database.display()))?;

    let style = PlotStyle::from_settings(&settings.visualize);
    match vecport_visualize::run(source, &mut PngRenderer, &style, &output) {
        Ok(outcome) => {
            println!(
                "Plotted {} vectors in {} groups to {}",
                outcome.rows,
                outcome.groups,
                outcome.output.display()
            );
            Ok(())
        }
        Err(VisualizeError::NoData) => {
            println!("Error: no vectors found. Hint: {INGEST_HINT}.");
            anyhow::bail!("no vectors to plot")
        }
        Err(e @ VisualizeError::Fonts(_)) => {
            error!("{e}");
            println!("Error: {e}. Hint: {FONT_HINT}.");
            Err(e).context("visualization failed")
        }
        Err(e) => {
            error!("{e}");
            Err(e).context("visualization failed")
        }
    }
}
