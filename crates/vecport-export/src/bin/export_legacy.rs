//! Export the sentence-embedding model with 64-bit inputs at opset 14 for
//! older database releases.

#![deny(unsafe_code)]

use vecport_export::ExportVariant;

fn main() -> anyhow::Result<()> {
    vecport_export::cli::run(ExportVariant::Legacy)
}
