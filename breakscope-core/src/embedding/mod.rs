pub mod openai;

use crate::error::{EmbeddingError, Result};

/// Turns text into fixed-dimensionality vectors.
///
/// Implementations only generate vectors; scoring happens in
/// [`crate::retrieval::dense`].
#[async_trait::async_trait]
pub trait Embedder: Send + Sync + std::fmt::Debug {
    /// The model ID being used.
    fn model_id(&self) -> &str;

    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(EmbeddingError::CountMismatch {
                expected: 1,
                actual: vectors.len() + 1,
            }
            .into()),
        }
    }

    /// Embed many texts. Output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Check that every vector has the same length, and the expected one if given.
///
/// Returns the shared dimensionality (0 for an empty batch).
pub fn check_dimensions(
    vectors: &[Vec<f32>],
    expected: Option<usize>,
) -> std::result::Result<usize, EmbeddingError> {
    let Some(first) = vectors.first() else {
        return Ok(expected.unwrap_or(0));
    };
    let dims = expected.unwrap_or(first.len());
    if let Some(bad) = vectors.iter().find(|v| v.len() != dims) {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dims,
            actual: bad.len(),
        });
    }
    Ok(dims)
}

// ── Tests ───────────────────────────────────────────────────────────
