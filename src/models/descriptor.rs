use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use crate::core::normalize::NormalizedEmbedding;
use crate::core::similarity;
use crate::error::Result;

/// An image's identity bound to its normalized embedding.
///
/// Immutable once built. Equality and hashing look at the identity only;
/// the embedding never takes part in them.
#[derive(Debug, Clone)]
pub struct ImageDescriptor {
    identity: PathBuf,
    embedding: NormalizedEmbedding,
}

impl ImageDescriptor {
    /// Bind an identity to an embedding
    pub fn new<P: Into<PathBuf>>(identity: P, embedding: NormalizedEmbedding) -> Self {
        Self {
            identity: identity.into(),
            embedding,
        }
    }

    /// Path the descriptor was built from
    pub fn identity(&self) -> &Path {
        &self.identity
    }

    /// The normalized embedding
    pub fn embedding(&self) -> &NormalizedEmbedding {
        &self.embedding
    }

    /// Embedding length `D`
    pub fn dimension(&self) -> usize {
        self.embedding.len()
    }

    /// Cosine similarity with another descriptor
    pub fn compare(&self, other: &ImageDescriptor) -> Result<f32> {
        similarity::compare(&self.embedding, &other.embedding)
    }
}

impl PartialEq for ImageDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.identity == other.identity
    }
}

impl Eq for ImageDescriptor {}

impl Hash for ImageDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identity.hash(state);
    }
}
