//! Export the sentence-embedding model with 64-bit inputs at opset 17.

#![deny(unsafe_code)]

use vecport_export::ExportVariant;

fn main() -> anyhow::Result<()> {
    vecport_export::cli::run(ExportVariant::Oracle)
}
