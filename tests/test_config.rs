use std::io::Write;

use serial_test::serial;
use tempfile::NamedTempFile;

use imagedupe::{AppError, Config};

const VARS: [&str; 7] = [
    "IMAGEDUPE_THRESHOLD",
    "IMAGEDUPE_IMAGE_SIZE",
    "IMAGEDUPE_MODELS_DIR",
    "IMAGEDUPE_MODEL_FILE",
    "IMAGEDUPE_MODEL_URL",
    "IMAGEDUPE_WORKERS",
    "IMAGEDUPE_LOAD_TIMEOUT_SECS",
];

fn clear_env() {
    for var in VARS {
        std::env::remove_var(var);
    }
}

#[test]
#[serial]
fn test_env_overrides() {
    clear_env();
    std::env::set_var("IMAGEDUPE_THRESHOLD", "0.92");
    std::env::set_var("IMAGEDUPE_IMAGE_SIZE", "256");
    std::env::set_var("IMAGEDUPE_MODELS_DIR", "/opt/models");
    std::env::set_var("IMAGEDUPE_MODEL_URL", "");
    std::env::set_var("IMAGEDUPE_WORKERS", "3");

    let config = Config::from_env().unwrap();
    assert_eq!(config.similarity.threshold, 0.92);
    assert_eq!(config.preprocess.image_size, 256);
    assert_eq!(config.scan.workers, 3);
    assert_eq!(config.model.visual_model_url, None);
    assert!(config.model.visual_model_path().starts_with("/opt/models"));

    clear_env();
}

#[test]
#[serial]
fn test_env_rejects_garbage() {
    clear_env();
    std::env::set_var("IMAGEDUPE_WORKERS", "many");
    assert!(matches!(Config::from_env(), Err(AppError::Config(_))));

    clear_env();
    std::env::set_var("IMAGEDUPE_THRESHOLD", "2.0");
    assert!(matches!(Config::from_env(), Err(AppError::Config(_))));

    clear_env();
}

#[test]
fn test_json_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "similarity": {{ "threshold": 0.75 }}, "scan": {{ "workers": 2 }} }}"#
    )
    .unwrap();

    let config = Config::from_json_file(file.path()).unwrap();
    assert_eq!(config.similarity.threshold, 0.75);
    assert_eq!(config.scan.workers, 2);
    assert_eq!(config.preprocess.image_size, 224);
}

#[test]
fn test_json_file_missing() {
    let err = Config::from_json_file("/no/such/config.json").unwrap_err();
    assert!(matches!(err, AppError::Internal(_)));
}
