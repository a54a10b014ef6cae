#![doc(html_root_url = "https://docs.rs/imagedupe/0.1.0")]
#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    missing_debug_implementations,
    rust_2018_idioms,
    unreachable_pub
)]

//! # imagedupe
//!
//! Find images that look like a reference image inside a directory tree,
//! by comparing CLIP image embeddings under cosine similarity.
//!
//! ## Pipeline
//!
//! - **Preprocessing**: resize, centre-crop and normalize into a `[1, 3, S, S]` tensor
//! - **Embeddings**: run a pretrained ONNX image encoder on the tensor
//! - **Normalization**: rescale every embedding to unit length
//! - **Ranking**: keep candidates above a threshold, best first
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use imagedupe::{find_similar, Config, Result, SearchOutcome};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     imagedupe::init()?;
//!     let config = Config::from_env()?;
//!     match find_similar("photos/cat.jpg", "photos", &config).await? {
//!         SearchOutcome::Matches { matches, .. } => {
//!             for m in matches {
//!                 println!("{} {:.6}", m.target.display(), m.score);
//!             }
//!         }
//!         other => println!("{:?}", other),
//!     }
//!     Ok(())
//! }
//! ```

/// Application configuration and its sources.
pub mod config;
pub mod core;
/// Defines the application's error types and result aliases.
pub mod error;
pub mod models;
mod utils;

/// Build-time information generated by `built`.
#[allow(missing_docs, unreachable_pub)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

// Public API exports
pub use crate::{
    config::{Config, ModelConfig, PreprocessConfig, ScanConfig, SimilarityConfig},
    core::{
        discovery::list_images,
        embeddings::{load_with_timeout, EmbeddingExtractor, InferenceSession, TensorSpec},
        normalize::{normalize, NormalizedEmbedding},
        pipeline::{DescribedBatch, Pipeline},
        preprocess::{CanonicalTensor, Preprocessor},
        similarity::{compare, SimilarityEngine, SimilarityMatch},
    },
    error::{AppError, Result, ResultExt},
    models::{
        descriptor::ImageDescriptor,
        report::{MatchRecord, SearchOutcome, SkippedImage},
    },
};

#[cfg(feature = "embeddings")]
pub use crate::core::embeddings::{load_extractor, OnnxSession};

#[cfg(feature = "download")]
pub use crate::core::download::{fetch_model, ModelDownloader};

/// Initialize logging
///
/// Sets up `env_logger` with an `info` default that `RUST_LOG` overrides.
/// Call once, early in the program.
///
/// # Errors
///
/// Returns an error if a logger has already been installed.
pub fn init() -> Result<()> {
    let env = env_logger::Env::default()
        .default_filter_or("info")
        .default_write_style_or("auto");

    env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .format_module_path(false)
        .format_target(false)
        .try_init()
        .map_err(|e| AppError::Internal(format!("logger already initialized: {}", e)))?;

    log::info!(
        "imagedupe {} (built {})",
        built_info::PKG_VERSION,
        built_info::BUILT_TIME_UTC
    );
    Ok(())
}

/// Search `root` for images similar to `reference`
///
/// Fetches the model if it is missing (with the `download` feature), loads
/// it once, describes every candidate on a bounded worker pool and ranks
/// the results. The inference session is released before returning.
///
/// # Errors
///
/// Fails if the configuration is invalid, the model cannot be obtained or
/// loaded, the reference image cannot be described, or embeddings disagree
/// in length. Unreadable candidate images do not fail the search; they are
/// listed in the outcome instead.
#[cfg(feature = "embeddings")]
pub async fn find_similar<P, Q>(reference: P, root: Q, config: &Config) -> Result<SearchOutcome>
where
    P: AsRef<std::path::Path>,
    Q: AsRef<std::path::Path>,
{
    config.validate()?;

    #[cfg(feature = "download")]
    fetch_model(config).await?;

    let extractor = load_extractor(config).await?;
    let pipeline = Pipeline::new(Preprocessor::new(&config.preprocess), extractor)?;
    let engine = SimilarityEngine::from_config(&config.similarity)?;

    let reference = reference.as_ref().to_path_buf();
    let root = root.as_ref().to_path_buf();
    let scan = config.scan.clone();

    tokio::task::spawn_blocking(move || {
        let outcome = pipeline.search(&reference, &root, &engine, &scan);
        pipeline.close();
        outcome
    })
    .await?
}
