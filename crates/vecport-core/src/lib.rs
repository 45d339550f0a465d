//! # vecport-core
//!
//! Foundation shared by the vecport tools:
//! - Embedding geometry constants (sequence length, vector width)
//! - `tracing` subscriber setup for the binaries
//!
//! ## Crate Position
//!
//! Standalone (no vecport crate dependencies).
//! Depended on by: every other vecport crate.

#![deny(unsafe_code)]

pub mod logging;

pub use logging::init_subscriber;

/// Hugging Face id of the base sentence-embedding transformer.
pub const DEFAULT_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// Fixed token sequence length of every exported model input.
pub const DEFAULT_MAX_SEQ_LENGTH: usize = 128;

/// Width of the pooled sentence embedding for the default model.
pub const DEFAULT_EMBEDDING_DIM: usize = 384;

/// Symbolic name of the dynamic batch axis in exported graphs.
pub const BATCH_AXIS_NAME: &str = "batch_size";

/// Names of the three integer inputs, in graph order.
pub const INPUT_NAMES: [&str; 3] = ["input_ids", "attention_mask", "token_type_ids"];

/// Name of the pooled, normalized output.
pub const OUTPUT_NAME: &str = "output_vector";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_names_in_graph_order() {
        assert_eq!(INPUT_NAMES[0], "input_ids");
        assert_eq!(INPUT_NAMES[1], "attention_mask");
        assert_eq!(INPUT_NAMES[2], "token_type_ids");
    }

    #[test]
    fn minilm_geometry() {
        assert_eq!(DEFAULT_MAX_SEQ_LENGTH, 128);
        assert_eq!(DEFAULT_EMBEDDING_DIM, 384);
    }
}
