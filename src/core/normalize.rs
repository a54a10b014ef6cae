use serde::Serialize;

/// An embedding that has been through [`normalize`].
///
/// The only way to obtain one is to normalize a raw vector, which is what
/// lets [`crate::core::similarity::compare`] use a plain dot product as
/// cosine similarity. The all-zero vector is the one value whose norm is
/// not 1.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct NormalizedEmbedding(Vec<f32>);

impl NormalizedEmbedding {
    /// Number of components
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the embedding has no components
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Components in model order
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Euclidean norm; 1 within rounding, or 0 for the degenerate vector
    pub fn norm(&self) -> f32 {
        magnitude(&self.0)
    }

    /// Give back the component buffer
    pub fn into_vec(self) -> Vec<f32> {
        self.0
    }
}

impl AsRef<[f32]> for NormalizedEmbedding {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

/// Rescale a raw embedding to unit L2 norm.
///
/// An all-zero vector is returned unchanged.
pub fn normalize(mut vector: Vec<f32>) -> NormalizedEmbedding {
    let magnitude = magnitude(&vector);
    if magnitude > 0.0 {
        for v in vector.iter_mut() {
            *v /= magnitude;
        }
    }
    NormalizedEmbedding(vector)
}

fn magnitude(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}
