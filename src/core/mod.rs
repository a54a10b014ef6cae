//! Core functionality for the visual similarity pipeline

/// Locates candidate images on disk.
pub mod discovery;
/// Fetches model artifacts before the pipeline is built.
#[cfg(feature = "download")]
pub mod download;
/// Runs the image encoder and owns its inference session.
pub mod embeddings;
/// L2 normalization of raw embeddings.
pub mod normalize;
/// Per-image pipeline and batch descriptor construction.
pub mod pipeline;
/// Turns decoded images into canonical model input tensors.
pub mod preprocess;
/// Pairwise similarity and threshold ranking.
pub mod similarity;
