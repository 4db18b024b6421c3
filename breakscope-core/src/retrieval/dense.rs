//! Cosine-similarity ranking over externally supplied embeddings.

use crate::error::InputError;
use crate::types::{ScoredMatch, SpecChunk};

use super::Ranked;

/// Cosine similarity of two equal-length vectors.
///
/// Returns 0.0 when either vector has zero magnitude. Accumulates in `f64`
/// and clamps to `[-1, 1]` to absorb rounding.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Result<f64, InputError> {
    if a.len() != b.len() {
        return Err(InputError::DimensionMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f64, 0.0_f64, 0.0_f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }
    Ok((dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0))
}

/// Rank every candidate by cosine similarity to `query`, best first.
pub fn rank_by_similarity(
    query: &[f32],
    candidates: &[Vec<f32>],
) -> Result<Vec<Ranked>, InputError> {
    let mut ranked = candidates
        .iter()
        .enumerate()
        .map(|(index, vector)| {
            cosine_similarity(query, vector).map(|score| Ranked { index, score })
        })
        .collect::<Result<Vec<_>, _>>()?;
    super::sort_ranked(&mut ranked);
    Ok(ranked)
}

/// [`rank_by_similarity`] resolved onto the spec chunks the vectors belong to.
pub fn rank_chunks<'a>(
    query: &[f32],
    chunks: &'a [SpecChunk],
    vectors: &[Vec<f32>],
) -> Result<Vec<ScoredMatch<'a>>, InputError> {
    if chunks.len() != vectors.len() {
        return Err(InputError::LengthMismatch {
            what: "spec chunk embeddings",
            expected: chunks.len(),
            actual: vectors.len(),
        });
    }
    Ok(rank_by_similarity(query, vectors)?
        .into_iter()
        .map(|r| ScoredMatch {
            chunk: &chunks[r.index],
            score: r.score,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn identical_direction_is_one() {
        let v = [0.3, -1.2, 4.0];
        assert!(approx(cosine_similarity(&v, &v).unwrap(), 1.0));
        let scaled = [0.6, -2.4, 8.0];
        assert!(approx(cosine_similarity(&v, &scaled).unwrap(), 1.0));
    }

    #[test]
    fn orthogonal_is_zero_and_opposite_is_minus_one() {
        assert!(approx(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 0.0));
        assert!(approx(cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]).unwrap(), -1.0));
    }

    #[test]
    fn zero_vector_scores_zero_not_nan() {
        let score = cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]).unwrap();
        assert!(approx(score, 0.0));
        let both = cosine_similarity(&[0.0; 4], &[0.0; 4]).unwrap();
        assert!(approx(both, 0.0));
    }

    #[test]
    fn mismatched_dimensions_are_rejected() {
        let err = cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]).unwrap_err();
        assert!(matches!(
            err,
            InputError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[test]
    fn ranking_orders_by_similarity_with_index_tie_break() {
        let query = [1.0, 0.0];
        let candidates = vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![2.0, 0.0], vec![-1.0, 0.0]];
        let ranked = rank_by_similarity(&query, &candidates).unwrap();
        let order: Vec<usize> = ranked.iter().map(|r| r.index).collect();
        assert_eq!(order, vec![1, 2, 0, 3]);
    }

    #[test]
    fn empty_candidates_rank_to_empty() {
        assert!(rank_by_similarity(&[1.0], &[]).unwrap().is_empty());
    }

    #[test]
    fn chunk_vector_count_must_line_up() {
        let chunks = vec![SpecChunk {
            test_name: "t".into(),
            filename: "f".into(),
            body: "b".into(),
        }];
        let err = rank_chunks(&[1.0], &chunks, &[]).unwrap_err();
        assert!(matches!(err, InputError::LengthMismatch { .. }));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn cosine_stays_within_bounds(
            pair in (1usize..32).prop_flat_map(|n| (
                proptest::collection::vec(-1000.0f32..1000.0, n),
                proptest::collection::vec(-1000.0f32..1000.0, n),
            ))
        ) {
            let score = cosine_similarity(&pair.0, &pair.1).unwrap();
            prop_assert!(score.is_finite());
            prop_assert!((-1.0..=1.0).contains(&score));
        }
    }
}
