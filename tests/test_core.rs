use std::path::Path;

use image::{DynamicImage, Rgb, RgbImage};
use tempfile::TempDir;

use imagedupe::{
    compare, normalize, AppError, ImageDescriptor, Preprocessor, SimilarityEngine,
};

fn descriptor(name: &str, v: Vec<f32>) -> ImageDescriptor {
    ImageDescriptor::new(name, normalize(v))
}

#[test]
fn test_preprocess_from_disk() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("wide.jpg");

    // Create a simple gradient test image
    let mut imgbuf = RgbImage::new(320, 200);
    for (x, y, pixel) in imgbuf.enumerate_pixels_mut() {
        *pixel = Rgb([(x % 256) as u8, (y % 256) as u8, 128]);
    }
    imgbuf.save(&path).unwrap();

    let pre = Preprocessor::default();
    let tensor = pre.prepare_path(&path).unwrap();
    assert_eq!(tensor.shape(), [1, 3, 224, 224]);

    // Same file, same tensor
    assert_eq!(tensor, pre.prepare_path(&path).unwrap());

    // Decoding from memory gives the same result
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(tensor, pre.prepare_bytes(&bytes).unwrap());
}

#[test]
fn test_preprocess_matches_decoded_image() {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(50, 80, Rgb([12, 200, 99])));
    let pre = Preprocessor::default();
    let tensor = pre.prepare(&img).unwrap();
    assert_eq!(tensor.shape(), pre.output_shape());
    assert!(tensor.view().iter().all(|v| v.is_finite()));
}

#[test]
fn test_preprocess_missing_file() {
    let err = Preprocessor::default()
        .prepare_path(Path::new("/definitely/not/here.png"))
        .unwrap_err();
    assert!(matches!(err, AppError::ImageDecode { .. }));
}

#[test]
fn test_end_to_end_ranking() {
    let reference = descriptor("ref.png", vec![1.0, 0.0, 0.0]);
    let candidates = vec![
        descriptor("ref.png", vec![1.0, 0.0, 0.0]),
        descriptor("orthogonal.png", vec![0.0, 1.0, 0.0]),
        descriptor("similar.png", vec![0.9, 0.436, 0.0]),
    ];

    let engine = SimilarityEngine::new(0.80).unwrap();
    let ranked = engine.rank(&reference, &candidates).unwrap();

    assert_eq!(ranked.len(), 1);
    assert_eq!(ranked[0].target.identity(), Path::new("similar.png"));
    assert!((ranked[0].score - 0.9).abs() < 1e-3);
}

#[test]
fn test_similarity_properties() {
    let vectors = [
        vec![0.1, 0.2, 0.3, 0.4],
        vec![-3.0, 1.0, 0.0, 2.5],
        vec![1e-3, 5e2, -7.0, 0.25],
    ];
    for a in &vectors {
        let na = normalize(a.clone());
        assert!((na.norm() - 1.0).abs() < 1e-5);
        assert!((compare(&na, &na).unwrap() - 1.0).abs() < 1e-5);
        for b in &vectors {
            let nb = normalize(b.clone());
            let ab = compare(&na, &nb).unwrap();
            assert_eq!(ab, compare(&nb, &na).unwrap());
            assert!((-1.0 - 1e-5..=1.0 + 1e-5).contains(&ab));
        }
    }
}

#[test]
fn test_zero_embedding_scores_zero() {
    let zero = normalize(vec![0.0; 3]);
    assert_eq!(zero.as_slice(), &[0.0, 0.0, 0.0]);
    let other = normalize(vec![1.0, 2.0, 3.0]);
    assert_eq!(compare(&zero, &other).unwrap(), 0.0);
}

#[test]
fn test_mismatched_dimensions_never_score() {
    let a = descriptor("a.png", vec![1.0; 512]);
    let b = descriptor("b.png", vec![1.0; 768]);
    assert!(matches!(
        a.compare(&b),
        Err(AppError::DimensionMismatch { expected: 512, actual: 768 })
    ));
}
