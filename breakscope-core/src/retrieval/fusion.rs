// Reciprocal Rank Fusion (RRF) of the dense and lexical rankings.

use super::Ranked;

/// Damping constant from Cormack, Clarke & Buettcher (SIGIR 2009).
///
/// Larger values flatten the advantage of either list's top positions, which
/// keeps fusion robust to noisy absolute scores.
pub const RRF_K: f64 = 60.0;

/// Default number of fused candidates kept per changed chunk.
pub const DEFAULT_TOP_K: usize = 3;

/// One fused candidate, still carrying both raw scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fused {
    /// Position of the candidate in the original input list.
    pub index: usize,
    pub cosine_score: f64,
    pub bm25_score: f64,
    pub rrf_score: f64,
    /// 1-based fused position.
    pub rank: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Accumulator {
    seen: bool,
    cosine: f64,
    bm25: f64,
    rrf: f64,
}

/// Fuse two rankings over the same candidate set.
///
/// RRF(d) = Σ_r 1 / (k + rank_r(d)), 1-based ranks, summed over the lists
/// `d` appears in. Results are ordered by fused score descending; exactly
/// equal scores fall back to the candidate's original index, ascending.
/// Only the first `top_k` survive.
pub fn reciprocal_rank_fusion(
    dense: &[Ranked],
    lexical: &[Ranked],
    k: f64,
    top_k: usize,
) -> Vec<Fused> {
    let size = dense
        .iter()
        .chain(lexical)
        .map(|r| r.index + 1)
        .max()
        .unwrap_or(0);
    let mut acc = vec![Accumulator::default(); size];

    for (position, r) in dense.iter().enumerate() {
        let slot = &mut acc[r.index];
        slot.seen = true;
        slot.cosine = r.score;
        slot.rrf += contribution(k, position);
    }
    for (position, r) in lexical.iter().enumerate() {
        let slot = &mut acc[r.index];
        slot.seen = true;
        slot.bm25 = r.score;
        slot.rrf += contribution(k, position);
    }

    let mut fused: Vec<Fused> = acc
        .into_iter()
        .enumerate()
        .filter(|(_, a)| a.seen)
        .map(|(index, a)| Fused {
            index,
            cosine_score: a.cosine,
            bm25_score: a.bm25,
            rrf_score: a.rrf,
            rank: 0,
        })
        .collect();

    fused.sort_by(|a, b| {
        b.rrf_score
            .total_cmp(&a.rrf_score)
            .then(a.index.cmp(&b.index))
    });
    fused.truncate(top_k);
    for (i, f) in fused.iter_mut().enumerate() {
        f.rank = i + 1;
    }
    fused
}

#[allow(clippy::cast_precision_loss)]
fn contribution(k: f64, zero_based_position: usize) -> f64 {
    1.0 / (k + (zero_based_position + 1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranking(indices: &[usize]) -> Vec<Ranked> {
        let mut score = 1.0;
        indices
            .iter()
            .map(|&index| {
                score -= 0.1;
                Ranked { index, score }
            })
            .collect()
    }

    #[test]
    fn dense_b_a_c_lexical_a_b() {
        let (a, b, c) = (0, 1, 2);
        let dense = ranking(&[b, a, c]);
        let lexical = ranking(&[a, b]);
        let fused = reciprocal_rank_fusion(&dense, &lexical, RRF_K, 10);

        assert_eq!(fused.len(), 3);
        let score = |idx: usize| fused.iter().find(|f| f.index == idx).unwrap().rrf_score;
        assert!((score(a) - (1.0 / 62.0 + 1.0 / 61.0)).abs() < 1e-12);
        assert!((score(b) - (1.0 / 61.0 + 1.0 / 62.0)).abs() < 1e-12);
        assert!((score(c) - 1.0 / 63.0).abs() < 1e-12);

        // A and B tie exactly; the lower original index wins.
        assert_eq!(fused[0].index, a);
        assert_eq!(fused[1].index, b);
        assert_eq!(fused[2].index, c);
        assert_eq!(
            fused.iter().map(|f| f.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[test]
    fn raw_scores_survive_and_absent_side_is_zero() {
        let dense = vec![
            Ranked { index: 0, score: 0.9 },
            Ranked { index: 1, score: 0.2 },
        ];
        let lexical = vec![Ranked { index: 1, score: 7.5 }];
        let fused = reciprocal_rank_fusion(&dense, &lexical, RRF_K, 3);

        let first = fused.iter().find(|f| f.index == 0).unwrap();
        assert!((first.cosine_score - 0.9).abs() < f64::EPSILON);
        assert!(first.bm25_score.abs() < f64::EPSILON);

        let second = fused.iter().find(|f| f.index == 1).unwrap();
        assert!((second.bm25_score - 7.5).abs() < f64::EPSILON);
        assert!((second.cosine_score - 0.2).abs() < f64::EPSILON);
    }

    #[test]
    fn top_k_truncates() {
        let dense = ranking(&[0, 1, 2, 3, 4]);
        let fused = reciprocal_rank_fusion(&dense, &[], RRF_K, DEFAULT_TOP_K);
        assert_eq!(fused.len(), 3);
        assert_eq!(
            fused.iter().map(|f| f.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn both_empty_yields_empty() {
        assert!(reciprocal_rank_fusion(&[], &[], RRF_K, 3).is_empty());
    }

    #[test]
    fn candidate_in_both_lists_beats_single_list_candidate() {
        // 0 is last in dense but present in lexical; 1 tops dense only.
        let dense = ranking(&[1, 2, 3, 0]);
        let lexical = ranking(&[0]);
        let fused = reciprocal_rank_fusion(&dense, &lexical, RRF_K, 4);
        assert_eq!(fused[0].index, 0);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn permutation(n: usize) -> impl Strategy<Value = Vec<usize>> {
        Just((0..n).collect::<Vec<_>>()).prop_shuffle()
    }

    fn to_ranked(indices: &[usize]) -> Vec<Ranked> {
        indices
            .iter()
            .map(|&index| Ranked { index, score: 1.0 })
            .collect()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn fused_output_is_bounded_and_non_increasing(
            (dense, lexical_len, lexical) in (1usize..20).prop_flat_map(|n| {
                (permutation(n), 0..=n, permutation(n))
            }),
            top_k in 1usize..10,
        ) {
            let lexical = &lexical[..lexical_len];
            let fused = reciprocal_rank_fusion(&to_ranked(&dense), &to_ranked(lexical), RRF_K, top_k);

            prop_assert!(fused.len() <= top_k.min(dense.len()));
            for pair in fused.windows(2) {
                prop_assert!(pair[0].rrf_score >= pair[1].rrf_score);
            }
        }

        #[test]
        fn presence_in_both_lists_dominates_at_equal_rank(
            n in 2usize..20,
            rank in 0usize..20,
        ) {
            // Candidate 0 holds the same dense position in both fusions; only
            // the first also ranks it lexically.
            let rank = rank % n;
            let mut dense: Vec<usize> = (2..n + 1).collect();
            dense.insert(rank.min(dense.len()), 0);
            let with_both = reciprocal_rank_fusion(&to_ranked(&dense), &to_ranked(&[0]), RRF_K, n + 1);
            let only_dense = reciprocal_rank_fusion(&to_ranked(&dense), &[], RRF_K, n + 1);

            let both = with_both.iter().find(|f| f.index == 0).unwrap().rrf_score;
            let single = only_dense.iter().find(|f| f.index == 0).unwrap().rrf_score;
            prop_assert!(both >= single);
        }
    }
}
