use std::path::{Path, PathBuf};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use rayon::ThreadPoolBuilder;

use crate::config::ScanConfig;
use crate::core::discovery::list_images;
use crate::core::embeddings::EmbeddingExtractor;
use crate::core::normalize::normalize;
use crate::core::preprocess::Preprocessor;
use crate::core::similarity::SimilarityEngine;
use crate::error::{AppError, Result};
use crate::models::descriptor::ImageDescriptor;
use crate::models::report::{MatchRecord, SearchOutcome, SkippedImage};

/// Descriptors built from a batch of paths, plus the ones that failed
#[derive(Debug, Default)]
pub struct DescribedBatch {
    /// Successfully described images, in input order
    pub descriptors: Vec<ImageDescriptor>,
    /// Images that failed with a per-image error
    pub skipped: Vec<SkippedImage>,
}

/// Preprocessor and extractor wired together: path in, descriptor out
#[derive(Debug)]
pub struct Pipeline {
    preprocessor: Preprocessor,
    extractor: EmbeddingExtractor,
}

impl Pipeline {
    /// Combine a preprocessor with an extractor that accepts its tensors
    pub fn new(preprocessor: Preprocessor, extractor: EmbeddingExtractor) -> Result<Self> {
        if preprocessor.output_shape() != extractor.input_shape() {
            return Err(AppError::Config(format!(
                "preprocessor emits {:?} but the extractor expects {:?}",
                preprocessor.output_shape(),
                extractor.input_shape()
            )));
        }
        Ok(Self {
            preprocessor,
            extractor,
        })
    }

    /// Build the descriptor for one image
    pub fn describe<P: AsRef<Path>>(&self, path: P) -> Result<ImageDescriptor> {
        let path = path.as_ref();
        let tensor = self.preprocessor.prepare_path(path)?;
        let raw = self.extractor.extract(&tensor)?;
        Ok(ImageDescriptor::new(path, normalize(raw)))
    }

    /// Describe many images on a pool of `workers` threads.
    ///
    /// Each worker holds one decoded image at a time. Per-image failures are
    /// logged and collected; any other error aborts the batch.
    pub fn describe_all(&self, paths: &[PathBuf], workers: usize) -> Result<DescribedBatch> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .build()?;

        let results: Vec<(&PathBuf, Result<ImageDescriptor>)> = pool.install(|| {
            paths
                .par_iter()
                .map(|path| (path, self.describe(path)))
                .collect()
        });

        let mut batch = DescribedBatch::default();
        for (path, result) in results {
            match result {
                Ok(descriptor) => batch.descriptors.push(descriptor),
                Err(e) if e.is_per_image() => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    batch.skipped.push(SkippedImage::new(path, &e));
                }
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "Described {} image(s), skipped {}",
            batch.descriptors.len(),
            batch.skipped.len()
        );
        Ok(batch)
    }

    /// Find images under `root` similar to `reference`.
    ///
    /// Both paths are resolved to their canonical form first, so the
    /// reference is recognised inside `root` however it was spelled. A
    /// reference that cannot be described fails the search.
    pub fn search<P, Q>(
        &self,
        reference: P,
        root: Q,
        engine: &SimilarityEngine,
        scan: &ScanConfig,
    ) -> Result<SearchOutcome>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let root = canonical(root.as_ref());
        let root = root.as_path();
        let reference = self.describe(canonical(reference.as_ref()))?;

        let paths = list_images(root, &scan.extensions)?;
        if paths.is_empty() {
            log::info!("No candidate images under {}", root.display());
            return Ok(SearchOutcome::NoCandidates {
                root: root.to_path_buf(),
            });
        }

        let batch = self.describe_all(&paths, scan.workers)?;
        let described = batch.descriptors.len();
        let matches: Vec<MatchRecord> = engine
            .rank(&reference, &batch.descriptors)?
            .iter()
            .map(MatchRecord::from)
            .collect();

        if matches.is_empty() {
            log::info!(
                "No images above similarity threshold {:.2}",
                engine.threshold()
            );
            return Ok(SearchOutcome::NoMatches {
                described,
                threshold: engine.threshold(),
                skipped: batch.skipped,
            });
        }

        log::info!("Found {} similar image(s)", matches.len());
        Ok(SearchOutcome::Matches {
            described,
            threshold: engine.threshold(),
            matches,
            skipped: batch.skipped,
        })
    }

    /// Release the inference session
    pub fn close(self) {
        self.extractor.close();
    }
}

/// Resolve `..`, `.` and symlinks; paths that cannot be resolved are kept
/// as given so the caller reports them.
fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
