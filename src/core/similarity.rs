use crate::config::SimilarityConfig;
use crate::core::normalize::NormalizedEmbedding;
use crate::error::{AppError, Result};
use crate::models::descriptor::ImageDescriptor;

/// Cosine similarity of two normalized embeddings.
///
/// This is a bare dot product: it is only cosine similarity because both
/// arguments are [`NormalizedEmbedding`]s. Do not loosen the argument types.
pub fn compare(a: &NormalizedEmbedding, b: &NormalizedEmbedding) -> Result<f32> {
    if a.len() != b.len() {
        return Err(AppError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.as_slice()
        .iter()
        .zip(b.as_slice())
        .map(|(x, y)| x * y)
        .sum())
}

/// One ranked pair: the reference, a candidate, and their score
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityMatch<'a> {
    /// The reference descriptor
    pub source: &'a ImageDescriptor,
    /// The candidate descriptor
    pub target: &'a ImageDescriptor,
    /// Cosine similarity in [-1, 1]
    pub score: f32,
}

/// Filters and ranks candidates against a reference
#[derive(Debug, Clone)]
pub struct SimilarityEngine {
    threshold: f32,
}

impl Default for SimilarityEngine {
    fn default() -> Self {
        Self {
            threshold: SimilarityConfig::default().threshold,
        }
    }
}

impl SimilarityEngine {
    /// Create an engine; the threshold must be finite and within [-1, 1]
    pub fn new(threshold: f32) -> Result<Self> {
        if !threshold.is_finite() || !(-1.0..=1.0).contains(&threshold) {
            return Err(AppError::InvalidInput(format!(
                "similarity threshold must be within [-1, 1], got {}",
                threshold
            )));
        }
        Ok(Self { threshold })
    }

    /// Create an engine from configuration
    pub fn from_config(config: &SimilarityConfig) -> Result<Self> {
        Self::new(config.threshold)
    }

    /// Scores must be strictly greater than this to be kept
    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Rank `candidates` against `reference`.
    ///
    /// Keeps candidates scoring strictly above the threshold, ordered by
    /// descending score; equal scores keep their input order. A candidate
    /// with the reference's own identity is skipped. Every candidate is
    /// scored before anything is returned, so a single dimension mismatch
    /// fails the whole ranking.
    pub fn rank<'a, I>(
        &self,
        reference: &'a ImageDescriptor,
        candidates: I,
    ) -> Result<Vec<SimilarityMatch<'a>>>
    where
        I: IntoIterator<Item = &'a ImageDescriptor>,
    {
        let scored = candidates
            .into_iter()
            .filter(|candidate| *candidate != reference)
            .map(|candidate| {
                reference.compare(candidate).map(|score| SimilarityMatch {
                    source: reference,
                    target: candidate,
                    score,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let mut matches: Vec<_> = scored
            .into_iter()
            .filter(|m| m.score > self.threshold)
            .collect();
        // stable: ties keep input order
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));

        log::debug!(
            "{} candidate(s) above threshold {:.2} for {}",
            matches.len(),
            self.threshold,
            reference.identity().display()
        );
        Ok(matches)
    }
}
