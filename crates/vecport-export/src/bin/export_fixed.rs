//! Export the sentence-embedding model with 32-bit inputs at opset 18 and
//! remove the intermediate files afterwards.

#![deny(unsafe_code)]

use vecport_export::ExportVariant;

fn main() -> anyhow::Result<()> {
    vecport_export::cli::run(ExportVariant::Fixed)
}
