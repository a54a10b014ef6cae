//! Value types produced by the pipeline

/// Image identity bound to its embedding.
pub mod descriptor;
/// Search outcomes and their serialized form.
pub mod report;
