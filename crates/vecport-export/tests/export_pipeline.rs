//! End-to-end export runs against a small synthetic base graph.

use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use vecport_export::{ExportError, ExportVariant, Exporter, TokenBatch, TokenRow};
use vecport_onnx::graph::{node, tensor_f32, tensor_value_info};
use vecport_onnx::proto::{GraphProto, OperatorSetIdProto};
use vecport_onnx::{
    Dim, ElementType, ModelProto, external_data_path, has_external_data, load_model,
    save_model_with_external_data,
};
use vecport_settings::ExportSettings;

const HIDDEN: i64 = 4;

/// Embedding lookup standing in for a transformer: `[batch, seq] -> [batch, seq, 4]`.
fn base_model() -> ModelProto {
    let batch = || Dim::Dynamic("batch".into());
    let seq = || Dim::Dynamic("sequence".into());
    let int_input = |name: &str| tensor_value_info(name, ElementType::Int64, &[batch(), seq()]);
    let words: Vec<f32> = (0..32).map(|v| v as f32 * 0.25).collect();
    ModelProto {
        ir_version: 7,
        producer_name: "synthetic".into(),
        opset_import: vec![OperatorSetIdProto {
            domain: String::new(),
            version: 14,
        }],
        graph: Some(GraphProto {
            name: "base".into(),
            node: vec![
                node("Gather", &["word_emb", "input_ids"], &["words"], "gather_words"),
                node("Gather", &["type_emb", "token_type_ids"], &["types"], "gather_types"),
                node("Add", &["words", "types"], &["last_hidden_state"], "add"),
            ],
            initializer: vec![
                tensor_f32("word_emb", &[8, HIDDEN], &words),
                tensor_f32("type_emb", &[2, HIDDEN], &[0.5; 8]),
            ],
            input: vec![
                int_input("input_ids"),
                int_input("attention_mask"),
                int_input("token_type_ids"),
            ],
            output: vec![tensor_value_info(
                "last_hidden_state",
                ElementType::Float,
                &[batch(), seq(), Dim::Fixed(HIDDEN)],
            )],
            ..GraphProto::default()
        }),
        ..ModelProto::default()
    }
}

/// Save the base model with its word table in a side file.
fn write_base(dir: &Path) -> PathBuf {
    let path = dir.join("base").join("model.onnx");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let saved = save_model_with_external_data(base_model(), &path, 64).unwrap();
    assert!(saved.data_path.is_some());
    path
}

fn settings(output_dir: &Path) -> ExportSettings {
    ExportSettings {
        output_dir: output_dir.display().to_string(),
        embedding_dim: HIDDEN as usize,
        external_data_threshold: 64,
        ..ExportSettings::default()
    }
}

fn sample() -> TokenBatch {
    TokenBatch::from_rows(
        &[TokenRow {
            ids: vec![1, 5, 2],
            attention_mask: vec![1, 1, 1],
            token_type_ids: vec![0, 0, 0],
        }],
        128,
    )
}

#[test]
fn every_variant_declares_requested_width_and_axes() {
    for variant in ExportVariant::ALL {
        let dir = tempfile::tempdir().unwrap();
        let base = write_base(dir.path());
        let settings = settings(dir.path());
        let exporter = Exporter::new(variant, &settings);

        let report = exporter.run_with_sample(&base, &sample()).unwrap();
        assert!(report.succeeded(), "{variant}: {}", report.render());
        assert_eq!(report.first_input.code(), variant.width().element_type().code());
        assert_eq!(report.summary.opset, Some(variant.opset()));

        for input in &report.summary.inputs {
            assert_eq!(input.shape_list(), "[batch_size, 128]", "{variant}");
        }
        let output = &report.summary.outputs[0];
        assert_eq!(output.name, "output_vector");
        assert_eq!(output.elem_type, ElementType::Float);
        assert_eq!(output.shape_list(), "[batch_size, 4]");

        let merged = load_model(&exporter.final_path()).unwrap();
        assert!(!has_external_data(&merged), "{variant}: merged file is self-contained");
    }
}

#[test]
fn input_codes_by_variant() {
    let expected = [
        (ExportVariant::Oracle, 7),
        (ExportVariant::Legacy, 7),
        (ExportVariant::Fixed, 6),
    ];
    for (variant, code) in expected {
        let dir = tempfile::tempdir().unwrap();
        let base = write_base(dir.path());
        let settings = settings(dir.path());
        let report = Exporter::new(variant, &settings)
            .run_with_sample(&base, &sample())
            .unwrap();
        assert_eq!(report.first_input.code(), code);
        assert!(report.render().contains(&format!("(type {code})")));
    }
}

#[test]
fn fixed_variant_removes_intermediate_files() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_base(dir.path());
    let settings = settings(dir.path());
    let exporter = Exporter::new(ExportVariant::Fixed, &settings);

    let _ = exporter.run_with_sample(&base, &sample()).unwrap();
    let intermediate = exporter.intermediate_path();
    assert!(!intermediate.exists());
    assert!(!external_data_path(&intermediate).exists());
    assert!(exporter.final_path().exists());
}

#[test]
fn oracle_variant_keeps_intermediate_files() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_base(dir.path());
    let settings = settings(dir.path());
    let exporter = Exporter::new(ExportVariant::Oracle, &settings);

    let _ = exporter.run_with_sample(&base, &sample()).unwrap();
    let intermediate = exporter.intermediate_path();
    assert!(intermediate.exists());
    assert!(external_data_path(&intermediate).exists());
    assert!(has_external_data(&load_model(&intermediate).unwrap()));
}

#[test]
fn failed_export_without_artifact_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let settings = settings(dir.path());
    let exporter = Exporter::new(ExportVariant::Oracle, &settings);

    let err = exporter
        .run_with_sample(&dir.path().join("missing.onnx"), &sample())
        .unwrap_err();
    assert_matches!(err, ExportError::MissingArtifact(path) if path == exporter.intermediate_path());
    assert!(!exporter.final_path().exists());
}

#[test]
fn failed_export_merges_existing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_base(dir.path());
    let settings = settings(dir.path());
    let exporter = Exporter::new(ExportVariant::Legacy, &settings);
    let _ = exporter.export(&base).unwrap();

    // second run: the export step fails, the earlier artifact is merged
    let report = exporter
        .run_with_sample(&dir.path().join("missing.onnx"), &sample())
        .unwrap();
    assert!(report.succeeded());
    assert!(report.render().contains("cp model_legacy_merged.onnx"));
}

#[test]
fn hidden_width_mismatch_is_reported_not_merged() {
    let dir = tempfile::tempdir().unwrap();
    let base = write_base(dir.path());
    let mut settings = settings(dir.path());
    settings.embedding_dim = 384;
    let exporter = Exporter::new(ExportVariant::Oracle, &settings);

    assert_matches!(
        exporter.export(&base),
        Err(ExportError::DimensionMismatch {
            expected: 384,
            found: 4
        })
    );
    assert_matches!(
        exporter.run_with_sample(&base, &sample()),
        Err(ExportError::MissingArtifact(_))
    );
}

#[cfg(feature = "ort")]
mod runtime {
    use super::*;
    use vecport_export::pooling::l2_norm;
    use vecport_export::runtime_check::{
        TOLERANCE, compare_with_reference, exported_embeddings, reference_embeddings,
    };

    /// Full mask, partial mask and empty mask, one row each.
    fn masked_batch() -> TokenBatch {
        TokenBatch::from_rows(
            &[
                TokenRow {
                    ids: vec![1, 5, 2],
                    attention_mask: vec![1, 1, 1],
                    token_type_ids: vec![0, 0, 0],
                },
                TokenRow {
                    ids: vec![3, 7, 6],
                    attention_mask: vec![1, 1, 0],
                    token_type_ids: vec![0, 1, 0],
                },
                TokenRow {
                    ids: vec![4, 4, 4],
                    attention_mask: vec![0, 0, 0],
                    token_type_ids: vec![0, 0, 0],
                },
            ],
            128,
        )
    }

    /// Row `id` of the base graph's output with token type 0.
    fn token_embedding(id: i64) -> Vec<f32> {
        (0..HIDDEN).map(|h| (id * HIDDEN + h) as f32 * 0.25 + 0.5).collect()
    }

    #[test]
    fn exported_graph_pools_and_normalizes() {
        for variant in ExportVariant::ALL {
            let dir = tempfile::tempdir().unwrap();
            let base = write_base(dir.path());
            let settings = settings(dir.path());
            let exporter = Exporter::new(variant, &settings);
            let report = exporter.run_with_sample(&base, &sample()).unwrap();
            assert!(report.succeeded(), "{variant}: {}", report.render());

            let batch = masked_batch();
            let typed = batch.cast(variant.width()).unwrap();
            let dim = HIDDEN as usize;
            let check =
                compare_with_reference(&base, &exporter.final_path(), &batch, &typed, dim)
                    .unwrap();
            assert!(check.max_abs_diff <= TOLERANCE, "{variant}: {check:?}");

            let rows = exported_embeddings(&exporter.final_path(), &typed, dim).unwrap();
            let reference = reference_embeddings(&base, &batch, dim).unwrap();
            assert_eq!(rows.len(), 3);
            assert!((l2_norm(&rows[0]) - 1.0).abs() <= TOLERANCE, "{variant}");
            assert!((l2_norm(&rows[1]) - 1.0).abs() <= TOLERANCE, "{variant}");
            assert_eq!(rows[2], vec![0.0; dim], "{variant}: empty mask");
            assert_eq!(reference[2], vec![0.0; dim]);

            // full mask: normalized arithmetic mean of the three tokens
            let mut mean = vec![0.0f32; dim];
            for id in [1, 5, 2] {
                for (acc, x) in mean.iter_mut().zip(token_embedding(id)) {
                    *acc += x / 3.0;
                }
            }
            let norm = l2_norm(&mean);
            for (got, want) in rows[0].iter().zip(&mean) {
                assert!((got - want / norm).abs() <= TOLERANCE, "{variant}");
            }
        }
    }
}
