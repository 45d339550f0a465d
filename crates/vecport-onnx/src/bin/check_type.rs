//! Report the element type of an ONNX model's first input.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;

#[derive(Debug, Parser)]
#[command(
    name = "check-type",
    about = "Classify the element type of an ONNX model's first input"
)]
struct Args {
    /// Model to inspect.
    #[arg(default_value = "model_fixed.onnx")]
    model: PathBuf,

    /// Log filter (overridden by `RUST_LOG`).
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn run(args: &Args) -> Result<()> {
    let verdict = vecport_onnx::check_model_file(&args.model)
        .with_context(|| format!("failed to inspect {}", args.model.display()))?;
    println!("{}", vecport_onnx::render_report(verdict));
    Ok(())
}

fn main() -> ExitCode {
    let args = Args::parse();
    vecport_core::init_subscriber(&args.log_level);

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
