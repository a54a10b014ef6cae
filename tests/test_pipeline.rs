use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use assert_fs::prelude::*;
use assert_fs::TempDir;
use image::{Rgb, RgbImage};
use ndarray::{ArrayD, ArrayView4, Axis, IxDyn};
use predicates::prelude::*;

use imagedupe::{
    AppError, EmbeddingExtractor, InferenceSession, Pipeline, PreprocessConfig, Preprocessor,
    Result, ScanConfig, SearchOutcome, SimilarityEngine, TensorSpec,
};

const SIZE: u32 = 8;

/// Embeds an image as its mean colour, one component per channel.
struct MeanColorSession {
    input: TensorSpec,
    output: TensorSpec,
    calls: Arc<AtomicUsize>,
}

impl MeanColorSession {
    fn new(calls: Arc<AtomicUsize>) -> Self {
        Self {
            input: TensorSpec::new("pixels", vec![-1, 3, SIZE as i64, SIZE as i64]),
            output: TensorSpec::new("embedding", vec![-1, 3]),
            calls,
        }
    }
}

impl InferenceSession for MeanColorSession {
    fn input(&self) -> &TensorSpec {
        &self.input
    }

    fn output(&self) -> &TensorSpec {
        &self.output
    }

    fn run(&self, input: ArrayView4<'_, f32>) -> Result<ArrayD<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let image = input.index_axis(Axis(0), 0);
        let means: Vec<f32> = image
            .outer_iter()
            .map(|channel| channel.mean().unwrap_or(0.0))
            .collect();
        ArrayD::from_shape_vec(IxDyn(&[1, 3]), means)
            .map_err(|e| AppError::Inference(e.to_string()))
    }
}

/// Identity normalization so embeddings equal raw mean colours in [0, 1].
fn preprocess_config() -> PreprocessConfig {
    PreprocessConfig {
        image_size: SIZE,
        mean: [0.0; 3],
        std: [1.0; 3],
    }
}

fn pipeline_with_calls(calls: Arc<AtomicUsize>) -> Pipeline {
    let preprocessor = Preprocessor::new(&preprocess_config());
    let extractor = EmbeddingExtractor::new(
        Box::new(MeanColorSession::new(calls)),
        preprocessor.output_shape(),
    )
    .unwrap();
    Pipeline::new(preprocessor, extractor).unwrap()
}

fn pipeline() -> Pipeline {
    pipeline_with_calls(Arc::new(AtomicUsize::new(0)))
}

fn scan_config(workers: usize) -> ScanConfig {
    ScanConfig {
        workers,
        ..ScanConfig::default()
    }
}

fn save_solid(path: &Path, color: [u8; 3]) {
    RgbImage::from_pixel(16, 12, Rgb(color)).save(path).unwrap();
}

fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap()
}

#[test]
fn test_describe_normalizes() {
    let temp = TempDir::new().unwrap();
    let file = temp.child("red.png");
    save_solid(file.path(), [255, 0, 0]);

    let descriptor = pipeline().describe(file.path()).unwrap();
    assert_eq!(descriptor.identity(), file.path());
    assert_eq!(descriptor.dimension(), 3);
    assert!((descriptor.embedding().norm() - 1.0).abs() < 1e-5);
    assert!((descriptor.embedding().as_slice()[0] - 1.0).abs() < 1e-5);
}

#[test]
fn test_describe_all_skips_corrupt_image() {
    let temp = TempDir::new().unwrap();
    let mut paths = Vec::new();
    for i in 0..9u8 {
        let file = temp.child(format!("img_{}.png", i));
        save_solid(file.path(), [i * 20, 100, 200 - i * 10]);
        paths.push(file.path().to_path_buf());
    }
    let corrupt = temp.child("corrupt.png");
    corrupt.write_binary(b"\x89PNG\r\n\x1a\nnot really").unwrap();
    paths.insert(4, corrupt.path().to_path_buf());

    let batch = pipeline().describe_all(&paths, 3).unwrap();

    assert_eq!(batch.descriptors.len(), 9);
    assert_eq!(batch.skipped.len(), 1);
    assert_eq!(batch.skipped[0].path, corrupt.path());
    assert_eq!(batch.skipped[0].kind, "image_decode");

    // input order survives the parallel run
    let expected: Vec<_> = paths.iter().filter(|p| *p != corrupt.path()).collect();
    let actual: Vec<_> = batch.descriptors.iter().map(|d| d.identity()).collect();
    assert_eq!(actual, expected);
}

#[test]
fn test_describe_all_single_worker_matches_many() {
    let temp = TempDir::new().unwrap();
    let paths: Vec<_> = (0..6u8)
        .map(|i| {
            let file = temp.child(format!("{}.png", i));
            save_solid(file.path(), [i * 40, 255 - i * 40, 7]);
            file.path().to_path_buf()
        })
        .collect();

    let pipeline = pipeline();
    let one = pipeline.describe_all(&paths, 1).unwrap();
    let many = pipeline.describe_all(&paths, 4).unwrap();
    for (a, b) in one.descriptors.iter().zip(&many.descriptors) {
        assert_eq!(a.identity(), b.identity());
        assert_eq!(a.embedding(), b.embedding());
    }
}

#[test]
fn test_session_shared_across_images() {
    let temp = TempDir::new().unwrap();
    let paths: Vec<_> = (0..5)
        .map(|i| {
            let file = temp.child(format!("{}.png", i));
            save_solid(file.path(), [10, 20, 30]);
            file.path().to_path_buf()
        })
        .collect();

    let calls = Arc::new(AtomicUsize::new(0));
    let pipeline = pipeline_with_calls(calls.clone());
    pipeline.describe_all(&paths, 2).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 5);
    pipeline.close();
}

#[test]
fn test_search_ranks_matches() {
    let reference_dir = TempDir::new().unwrap();
    let reference = reference_dir.child("reference.png");
    save_solid(reference.path(), [200, 30, 10]);

    let target = TempDir::new().unwrap();
    save_solid(target.child("same.png").path(), [200, 30, 10]);
    target.child("nested").create_dir_all().unwrap();
    save_solid(target.child("nested/close.png").path(), [180, 60, 30]);
    save_solid(target.child("blue.png").path(), [0, 0, 255]);
    target.child("broken.jpg").write_binary(b"").unwrap();
    target.child("notes.txt").write_str("not an image").unwrap();

    let engine = SimilarityEngine::new(0.80).unwrap();
    let outcome = pipeline()
        .search(reference.path(), target.path(), &engine, &scan_config(2))
        .unwrap();

    match &outcome {
        SearchOutcome::Matches {
            described,
            matches,
            skipped,
            ..
        } => {
            assert_eq!(*described, 3);
            let names: Vec<_> = matches.iter().map(|m| m.target_name()).collect();
            assert_eq!(names, vec!["same.png", "close.png"]);
            assert!(matches.iter().all(|m| m.source == canonical(reference.path())));
            assert!((matches[0].score - 1.0).abs() < 1e-5);
            assert!(matches[0].score >= matches[1].score);
            assert_eq!(skipped.len(), 1);
            assert_eq!(skipped[0].path, canonical(target.child("broken.jpg").path()));
        }
        other => panic!("expected matches, got {:?}", other),
    }

    // the search never writes into the target tree
    target.child("notes.txt").assert(predicate::str::contains("not an image"));
}

#[test]
fn test_search_excludes_reference_inside_target() {
    let target = TempDir::new().unwrap();
    let reference = target.child("reference.png");
    save_solid(reference.path(), [0, 255, 0]);
    save_solid(target.child("red.png").path(), [255, 0, 0]);

    let engine = SimilarityEngine::new(0.80).unwrap();
    let outcome = pipeline()
        .search(reference.path(), target.path(), &engine, &scan_config(2))
        .unwrap();

    assert!(matches!(outcome, SearchOutcome::NoMatches { described: 2, .. }));
}

#[test]
fn test_search_excludes_reference_spelled_differently() {
    let target = TempDir::new().unwrap();
    target.child("nested").create_dir_all().unwrap();
    let reference = target.child("reference.png");
    save_solid(reference.path(), [0, 255, 0]);
    save_solid(target.child("red.png").path(), [255, 0, 0]);

    let roundabout = target.path().join("nested").join("..").join("reference.png");
    let root = target.path().join(".");

    let engine = SimilarityEngine::new(0.80).unwrap();
    let outcome = pipeline()
        .search(&roundabout, &root, &engine, &scan_config(2))
        .unwrap();

    assert!(matches!(outcome, SearchOutcome::NoMatches { described: 2, .. }));
}

#[test]
fn test_search_empty_directory_is_no_candidates() {
    let reference_dir = TempDir::new().unwrap();
    let reference = reference_dir.child("reference.png");
    save_solid(reference.path(), [1, 2, 3]);

    let target = TempDir::new().unwrap();
    target.child("readme.md").write_str("# nothing here").unwrap();

    let outcome = pipeline()
        .search(
            reference.path(),
            target.path(),
            &SimilarityEngine::default(),
            &scan_config(2),
        )
        .unwrap();

    assert_eq!(
        outcome,
        SearchOutcome::NoCandidates {
            root: canonical(target.path())
        }
    );
}

#[test]
fn test_search_nothing_similar_is_no_matches() {
    let reference_dir = TempDir::new().unwrap();
    let reference = reference_dir.child("reference.png");
    save_solid(reference.path(), [255, 0, 0]);

    let target = TempDir::new().unwrap();
    save_solid(target.child("green.png").path(), [0, 255, 0]);
    save_solid(target.child("blue.png").path(), [0, 0, 255]);

    let outcome = pipeline()
        .search(
            reference.path(),
            target.path(),
            &SimilarityEngine::default(),
            &scan_config(2),
        )
        .unwrap();

    match outcome {
        SearchOutcome::NoMatches {
            described,
            threshold,
            skipped,
        } => {
            assert_eq!(described, 2);
            assert_eq!(threshold, 0.80);
            assert!(skipped.is_empty());
        }
        other => panic!("expected no matches, got {:?}", other),
    }
}

#[test]
fn test_search_corrupt_reference_fails() {
    let reference_dir = TempDir::new().unwrap();
    let reference = reference_dir.child("reference.png");
    reference.write_binary(b"garbage").unwrap();

    let target = TempDir::new().unwrap();
    save_solid(target.child("a.png").path(), [1, 2, 3]);

    let err = pipeline()
        .search(
            reference.path(),
            target.path(),
            &SimilarityEngine::default(),
            &scan_config(1),
        )
        .unwrap_err();
    assert!(matches!(err, AppError::ImageDecode { .. }));
}

#[test]
fn test_search_missing_target_fails() {
    let reference_dir = TempDir::new().unwrap();
    let reference = reference_dir.child("reference.png");
    save_solid(reference.path(), [1, 2, 3]);

    let err = pipeline()
        .search(
            reference.path(),
            reference_dir.path().join("missing"),
            &SimilarityEngine::default(),
            &scan_config(1),
        )
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn test_pipeline_rejects_mismatched_extractor() {
    let preprocessor = Preprocessor::new(&preprocess_config());
    let extractor = EmbeddingExtractor::new(
        Box::new(MeanColorSession::new(Arc::new(AtomicUsize::new(0)))),
        [1, 3, 16, 16],
    );
    // static 8x8 input metadata refuses 16x16 tensors outright
    assert!(matches!(extractor, Err(AppError::ModelLoad(_))));

    let mut session = MeanColorSession::new(Arc::new(AtomicUsize::new(0)));
    session.input = TensorSpec::new("pixels", vec![-1, 3, -1, -1]);
    let extractor = EmbeddingExtractor::new(Box::new(session), [1, 3, 16, 16]).unwrap();
    assert!(matches!(
        Pipeline::new(preprocessor, extractor),
        Err(AppError::Config(_))
    ));
}
