use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::similarity::SimilarityMatch;
use crate::error::AppError;
use crate::utils::display_name;

/// A ranked (source, target, score) triple, detached from the descriptors
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MatchRecord {
    /// The reference image
    pub source: PathBuf,
    /// The similar image
    pub target: PathBuf,
    /// Cosine similarity of the two
    pub score: f32,
}

impl MatchRecord {
    /// File name of the reference image
    pub fn source_name(&self) -> String {
        display_name(&self.source)
    }

    /// File name of the similar image
    pub fn target_name(&self) -> String {
        display_name(&self.target)
    }
}

impl From<&SimilarityMatch<'_>> for MatchRecord {
    fn from(m: &SimilarityMatch<'_>) -> Self {
        Self {
            source: m.source.identity().to_path_buf(),
            target: m.target.identity().to_path_buf(),
            score: m.score,
        }
    }
}

/// An image left out of the results and why
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct SkippedImage {
    /// The image that failed
    pub path: PathBuf,
    /// Error kind, see [`AppError::kind`]
    pub kind: String,
    /// Human-readable reason
    pub reason: String,
}

impl SkippedImage {
    /// Record a per-image failure
    pub fn new(path: &Path, error: &AppError) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: error.kind().to_string(),
            reason: error.to_string(),
        }
    }
}

/// How a search ended.
///
/// An empty target tree and a tree with nothing similar enough are
/// different outcomes and are reported differently.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SearchOutcome {
    /// File discovery returned no images
    NoCandidates {
        /// The directory that was scanned
        root: PathBuf,
    },
    /// Candidates were described, but none scored above the threshold
    NoMatches {
        /// Number of candidates successfully described
        described: usize,
        /// The threshold that was applied
        threshold: f32,
        /// Candidates excluded because of per-image errors
        skipped: Vec<SkippedImage>,
    },
    /// At least one candidate scored above the threshold
    Matches {
        /// Number of candidates successfully described
        described: usize,
        /// The threshold that was applied
        threshold: f32,
        /// Matches, best first
        matches: Vec<MatchRecord>,
        /// Candidates excluded because of per-image errors
        skipped: Vec<SkippedImage>,
    },
}

impl SearchOutcome {
    /// Ranked matches; empty for the other outcomes
    pub fn matches(&self) -> &[MatchRecord] {
        match self {
            Self::Matches { matches, .. } => matches,
            _ => &[],
        }
    }

    /// Images excluded because of per-image errors
    pub fn skipped(&self) -> &[SkippedImage] {
        match self {
            Self::NoCandidates { .. } => &[],
            Self::NoMatches { skipped, .. } | Self::Matches { skipped, .. } => skipped,
        }
    }

    /// Serializes the outcome to a pretty-printed JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserializes a `SearchOutcome` from a JSON string.
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }
}
