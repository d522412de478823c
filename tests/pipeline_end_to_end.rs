//! End-to-end tests for the TFRecord input pipeline
//!
//! Writes real TFRecord files into a temp directory and reads them back
//! through the registry and loader.

use logit_adjust_core::data::image::RAW_IMAGE_BYTES;
use logit_adjust_core::data::{
    create_dataset, encode_labeled_image, lookup, DataLoader, PipelineConfig, RecordWriter,
};
use logit_adjust_core::loss::{base_probs_from_counts, build_loss_fn, class_counts};
use logit_adjust_core::LaError;
use std::path::Path;

/// Write `n` examples; image i is filled with byte `i` and labeled `i % 10`
async fn write_fixture(path: &Path, n: usize) {
    let mut writer = RecordWriter::new();
    for i in 0..n {
        let image = vec![i as u8; RAW_IMAGE_BYTES];
        writer.write(&encode_labeled_image(&image, (i % 10) as i64));
    }
    writer.write_to(path).await.unwrap();
}

fn seeded() -> PipelineConfig {
    PipelineConfig::default().with_seed(1234)
}

#[tokio::test]
async fn test_registry_fixture_dataset() {
    let dir = tempfile::tempdir().unwrap();
    let spec = lookup("test").unwrap();
    write_fixture(&dir.path().join(&spec.train_file_name), spec.num_train).await;

    let mut loader = create_dataset(&spec, dir.path(), 2, true, seeded()).await.unwrap();
    let mut batches = 0;
    while let Some(batch) = loader.next_batch().await.unwrap() {
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.images.len(), 2 * RAW_IMAGE_BYTES);
        assert_eq!(batch.image_shape(), [32, 32, 3]);
        batches += 1;
    }
    assert_eq!(batches, 2);
}

#[tokio::test]
async fn test_eval_pass_is_unaugmented_and_complete() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eval.tfrecord");
    write_fixture(&path, 25).await;

    let mut loader = DataLoader::open(&path, 8, false, seeded()).await.unwrap();
    let mut seen = Vec::new();
    while let Some(batch) = loader.next_batch().await.unwrap() {
        for i in 0..batch.len() {
            let pixels = batch.image(i);
            // Eval images are decoded verbatim: every pixel equals the fill byte.
            let first = pixels[0];
            assert!(pixels.iter().all(|&v| v == first));
            let byte = ((first + 0.5) * 255.0).round() as i64;
            assert_eq!(batch.labels[i], byte % 10);
            seen.push(byte);
        }
    }
    assert_eq!(loader.batches_loaded(), 4);
    seen.sort_unstable();
    assert_eq!(seen, (0..25).collect::<Vec<i64>>());
}

#[tokio::test]
async fn test_training_pass_shuffles_with_seed() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.tfrecord");
    write_fixture(&path, 40).await;

    async fn labels(path: &Path, seed: u64) -> Vec<i64> {
        let config = PipelineConfig::default().with_seed(seed).with_shuffle_buffer(16);
        let mut loader = DataLoader::open(path, 4, true, config).await.unwrap();
        let mut out = Vec::new();
        while let Some(batch) = loader.next_batch().await.unwrap() {
            out.extend(batch.labels);
        }
        out
    }

    let a = labels(&path, 1).await;
    let b = labels(&path, 1).await;
    assert_eq!(a, b);
    assert_eq!(a.len(), 40);

    let in_order: Vec<i64> = (0..40).map(|i| i % 10).collect();
    assert_ne!(a, in_order);
}

#[tokio::test]
async fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let spec = lookup("test").unwrap();
    let err = create_dataset(&spec, dir.path(), 2, false, seeded())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, LaError::Io { .. }));
}

#[tokio::test]
async fn test_corrupt_tail_surfaces_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt.tfrecord");
    write_fixture(&path, 6).await;

    let mut data = tokio::fs::read(&path).await.unwrap();
    let last = data.len() - 1;
    data[last] ^= 0xff;
    tokio::fs::write(&path, &data).await.unwrap();

    // Shuffle buffer larger than the file: nothing is emitted before the error.
    let config = seeded().with_shuffle_buffer(100);
    let mut loader = DataLoader::open(&path, 2, false, config).await.unwrap();
    let err = loader.next_batch().await.unwrap_err();
    assert!(err.is_corruption());
    assert!(loader.next_batch().await.unwrap().is_none());
}

#[tokio::test]
async fn test_mid_file_corruption_delivers_earlier_batches() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("corrupt_mid.tfrecord");
    write_fixture(&path, 10).await;

    // Every record has the same size, so record 8 starts at 8 * stride.
    let mut data = tokio::fs::read(&path).await.unwrap();
    let stride = data.len() / 10;
    data[8 * stride + 12 + 20] ^= 0xff;
    tokio::fs::write(&path, &data).await.unwrap();

    let config = seeded().with_shuffle_buffer(1).with_decode_workers(4);
    let mut loader = DataLoader::open(&path, 1, false, config).await.unwrap();
    let mut labels = Vec::new();
    let err = loop {
        match loader.next_batch().await {
            Ok(Some(batch)) => labels.extend(batch.labels),
            Ok(None) => panic!("pass ended without an error"),
            Err(e) => break e,
        }
    };

    assert_eq!(labels, (0..8).collect::<Vec<i64>>());
    assert!(err.is_corruption());
    assert!(loader.next_batch().await.unwrap().is_none());
}

#[tokio::test]
async fn test_priors_feed_loss() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("train.tfrecord");
    write_fixture(&path, 30).await;

    let mut loader = DataLoader::open(&path, 10, false, seeded()).await.unwrap();
    let mut labels = Vec::new();
    while let Some(batch) = loader.next_batch().await.unwrap() {
        labels.extend(batch.labels);
    }

    let counts = class_counts(&labels, 10).unwrap();
    assert!(counts.iter().all(|&c| c == 3));
    let probs = base_probs_from_counts(&counts).unwrap();
    let loss = build_loss_fn(true, probs, 1.0);

    // Uniform priors shift every logit equally, leaving the loss at ln(10).
    let logits = vec![0.0f32; 10];
    let value = loss.loss(&[3], &logits).unwrap();
    assert!((value - 10f32.ln()).abs() < 1e-5);
}
