//! Top-k selection over classifier score vectors.

use crate::core::errors::{CxrError, CxrResult};

/// Returns the indices of the `k` highest scores, best first.
///
/// Ties are broken by ascending original index: the sort is stable and only
/// orders by score, so equal scores keep their input order. This makes the
/// selection deterministic and reproducible across runs.
///
/// # Errors
///
/// Returns `InvalidK` when `k` is zero or exceeds the number of scores;
/// truncated results are never produced.
pub fn select_topk(scores: &[f32], k: usize) -> CxrResult<Vec<usize>> {
    if k == 0 || k > scores.len() {
        return Err(CxrError::InvalidK {
            k,
            classes: scores.len(),
        });
    }

    let mut indexed: Vec<(usize, f32)> = scores.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    indexed.truncate(k);
    Ok(indexed.into_iter().map(|(index, _)| index).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selects_highest_scores_in_order() {
        let scores = [0.2, 0.7, 0.1, 0.9];
        assert_eq!(select_topk(&scores, 2).unwrap(), vec![3, 1]);
        assert_eq!(select_topk(&scores, 4).unwrap(), vec![3, 1, 0, 2]);
    }

    #[test]
    fn ties_break_by_ascending_index() {
        let scores = [0.1, 0.9, 0.9, 0.3];
        assert_eq!(select_topk(&scores, 2).unwrap(), vec![1, 2]);

        let all_equal = [0.5, 0.5, 0.5];
        assert_eq!(select_topk(&all_equal, 3).unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn indices_are_distinct() {
        let scores = [0.4, 0.4, 0.4, 0.4, 0.4];
        let top = select_topk(&scores, 5).unwrap();
        let mut seen = top.clone();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), top.len());
    }

    #[test]
    fn oversized_k_is_an_error_not_a_truncation() {
        let scores = [0.1, 0.2];
        let err = select_topk(&scores, 3).unwrap_err();
        assert!(matches!(err, CxrError::InvalidK { k: 3, classes: 2 }));
    }

    #[test]
    fn zero_k_is_rejected() {
        let scores = [0.1, 0.2];
        assert!(matches!(
            select_topk(&scores, 0),
            Err(CxrError::InvalidK { .. })
        ));
    }
}
