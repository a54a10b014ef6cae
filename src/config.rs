use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result, ResultExt};

/// Prefix of every environment variable read by [`Config::apply_env`].
pub const ENV_PREFIX: &str = "IMAGEDUPE_";

/// CLIP ViT-B/32 per-channel mean (R, G, B)
#[allow(clippy::excessive_precision)]
pub const CLIP_MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
/// CLIP ViT-B/32 per-channel standard deviation (R, G, B)
#[allow(clippy::excessive_precision)]
pub const CLIP_STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Configuration for the application
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Image preprocessing configuration
    pub preprocess: PreprocessConfig,
    /// Similarity ranking configuration
    pub similarity: SimilarityConfig,
    /// Embedding model configuration
    pub model: ModelConfig,
    /// Model download configuration
    pub download: DownloadConfig,
    /// Directory scan configuration
    pub scan: ScanConfig,
}

/// Canonical tensor geometry and normalization constants
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Side length `S` of the square model input
    pub image_size: u32,
    /// Per-channel mean (R, G, B)
    pub mean: [f32; 3],
    /// Per-channel standard deviation (R, G, B)
    pub std: [f32; 3],
}

/// Similarity ranking configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    /// Candidates must score strictly above this value
    pub threshold: f32,
}

/// Embedding model configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Directory holding model artifacts
    pub models_dir: PathBuf,
    /// File name of the visual encoder inside `models_dir`
    pub visual_model_file: String,
    /// Where to fetch the visual encoder from when it is missing
    pub visual_model_url: Option<String>,
    /// Upper bound on model load time, in seconds
    pub load_timeout_secs: u64,
    /// Intra-op threads for the inference runtime (runtime default when unset)
    pub intra_threads: Option<usize>,
}

/// Model download configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Whole-request timeout, in seconds
    pub timeout_secs: u64,
    /// User-Agent header sent with download requests
    pub user_agent: String,
    /// Attempts before giving up
    pub max_attempts: u32,
    /// Delay between attempts grows by this many seconds each time
    pub retry_backoff_secs: u64,
}

/// Directory scan configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Number of preprocessing workers
    pub workers: usize,
    /// Supported image extensions (without the dot, case-insensitive)
    pub extensions: Vec<String>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_size: 224,
            mean: CLIP_MEAN,
            std: CLIP_STD,
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self { threshold: 0.80 }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            visual_model_file: String::from("clip-image-vit-32-float32.onnx"),
            visual_model_url: Some(String::from(
                "https://huggingface.co/rocca/openai-clip-js/resolve/main/clip-image-vit-32-float32.onnx",
            )),
            load_timeout_secs: 120,
            intra_threads: None,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 600,
            user_agent: format!("imagedupe/{}", env!("CARGO_PKG_VERSION")),
            max_attempts: 3,
            retry_backoff_secs: 2,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            extensions: vec![
                "jpg", "jpeg", "png", "gif", "webp", "bmp", "tif", "tiff", "tga", "pbm", "pgm",
                "ppm", "qoi",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl ModelConfig {
    /// Full path of the visual encoder artifact
    pub fn visual_model_path(&self) -> PathBuf {
        self.models_dir.join(&self.visual_model_file)
    }
}

impl Config {
    /// Load defaults, then overlay `.env` and `IMAGEDUPE_*` environment variables
    pub fn from_env() -> Result<Self> {
        // A missing .env file is fine
        let _ = dotenv::dotenv();

        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load a JSON configuration file; absent fields keep their defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values from `IMAGEDUPE_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Some(threshold) = env_value::<f32>("THRESHOLD")? {
            self.similarity.threshold = threshold;
        }
        if let Some(size) = env_value::<u32>("IMAGE_SIZE")? {
            self.preprocess.image_size = size;
        }
        if let Some(dir) = env_value::<PathBuf>("MODELS_DIR")? {
            self.model.models_dir = dir;
        }
        if let Some(file) = env_value::<String>("MODEL_FILE")? {
            self.model.visual_model_file = file;
        }
        if let Some(url) = env_value::<String>("MODEL_URL")? {
            self.model.visual_model_url = Some(url).filter(|u| !u.is_empty());
        }
        if let Some(secs) = env_value::<u64>("LOAD_TIMEOUT_SECS")? {
            self.model.load_timeout_secs = secs;
        }
        if let Some(workers) = env_value::<usize>("WORKERS")? {
            self.scan.workers = workers;
        }
        Ok(())
    }

    /// Reject values the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        let threshold = self.similarity.threshold;
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(AppError::Config(format!(
                "similarity threshold must be within [-1, 1], got {}",
                threshold
            )));
        }
        if self.preprocess.image_size == 0 {
            return Err(AppError::Config("image size must be positive".to_string()));
        }
        if self.preprocess.std.iter().any(|s| !s.is_finite() || *s == 0.0) {
            return Err(AppError::Config(
                "per-channel std must be finite and non-zero".to_string(),
            ));
        }
        if self.scan.workers == 0 {
            return Err(AppError::Config("worker count must be positive".to_string()));
        }
        if self.model.visual_model_file.is_empty() {
            return Err(AppError::Config("model file name is empty".to_string()));
        }
        if self.download.max_attempts == 0 {
            return Err(AppError::Config("download attempts must be positive".to_string()));
        }
        Ok(())
    }
}

fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let key = format!("{}{}", ENV_PREFIX, name);
    match std::env::var(&key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| AppError::Config(format!("{}={:?}: {}", key, raw, e))),
        Err(std::env::VarError::NotPresent) => Ok(None),
        Err(e) => Err(AppError::Config(format!("{}: {}", key, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.preprocess.image_size, 224);
        assert_eq!(config.similarity.threshold, 0.80);
        assert!(config.scan.workers > 0);
        assert!(config.scan.extensions.iter().any(|e| e == "png"));
        assert_eq!(
            config.model.visual_model_path(),
            PathBuf::from("models").join("clip-image-vit-32-float32.onnx")
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = Config::default();
        config.similarity.threshold = 1.5;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        config.similarity.threshold = f32::NAN;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_size() {
        let mut config = Config::default();
        config.preprocess.image_size = 0;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "similarity": { "threshold": 0.9 } }"#).unwrap();
        assert_eq!(config.similarity.threshold, 0.9);
        assert_eq!(config.preprocess.image_size, 224);
        assert_eq!(config.model.load_timeout_secs, 120);
    }
}
