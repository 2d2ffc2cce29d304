//! Score fusion for fan-out results
//!
//! Raw similarity scores from different collections are not comparable, so
//! each branch is first scaled by its own maximum score.

use niibot_common::collections::{sort_passages, RetrievedPassage};
use niibot_common::Domain;

/// Scale scores into [0, 1] by the maximum score of the batch
pub fn normalize_by_max(passages: &mut [RetrievedPassage]) {
    let max = passages.iter().map(|p| p.score).fold(f32::MIN, f32::max);
    if max <= 0.0 {
        return;
    }
    for passage in passages.iter_mut() {
        passage.score = (passage.score / max).clamp(0.0, 1.0);
    }
}

/// Normalize each branch, then interleave everything by score
///
/// Used when all branches share one embedding space.
pub fn normalized_merge(branches: Vec<(Domain, Vec<RetrievedPassage>)>) -> Vec<RetrievedPassage> {
    let mut merged = Vec::new();
    for (_, mut passages) in branches {
        normalize_by_max(&mut passages);
        merged.extend(passages);
    }
    sort_passages(&mut merged);
    merged
}

/// Keep branches grouped in the order given
///
/// Branch `i` of `n` is mapped into the score band
/// `[(n - i - 0.5) / n, (n - i) / n]`, so every passage of an earlier branch
/// outranks every passage of a later one while scores stay in (0, 1] and
/// descend across the result.
pub fn grouped_merge(branches: Vec<(Domain, Vec<RetrievedPassage>)>) -> Vec<RetrievedPassage> {
    let n = branches.len() as f32;
    let mut merged = Vec::new();

    for (i, (_, mut passages)) in branches.into_iter().enumerate() {
        normalize_by_max(&mut passages);
        let base = n - i as f32 - 1.0;
        for passage in passages.iter_mut() {
            passage.score = (base + 0.5 + 0.5 * passage.score.clamp(0.0, 1.0)) / n;
        }
        merged.extend(passages);
    }

    sort_passages(&mut merged);
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use niibot_common::collections::DocumentMetadata;
    use proptest::prelude::*;

    fn passage(id: &str, domain: Domain, score: f32) -> RetrievedPassage {
        RetrievedPassage {
            doc_id: id.to_string(),
            collection: domain,
            content: String::new(),
            score,
            metadata: DocumentMetadata::default(),
        }
    }

    #[test]
    fn test_normalize_by_max() {
        let mut passages = vec![passage("a", Domain::Research, 0.4), passage("b", Domain::Research, 0.2)];
        normalize_by_max(&mut passages);
        assert!((passages[0].score - 1.0).abs() < 1e-6);
        assert!((passages[1].score - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_normalized_merge_puts_each_branch_top_first() {
        // Publications scores run lower overall but its best hit is still a 1.0
        let merged = normalized_merge(vec![
            (Domain::Research, vec![passage("r1", Domain::Research, 0.8), passage("r2", Domain::Research, 0.4)]),
            (Domain::Publications, vec![passage("p1", Domain::Publications, 0.3)]),
        ]);

        let ids: Vec<_> = merged.iter().map(|p| p.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "p1", "r2"]);
        assert!(merged.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_grouped_merge_keeps_domain_order() {
        let merged = grouped_merge(vec![
            (Domain::Research, vec![passage("r1", Domain::Research, 0.2)]),
            (Domain::Publications, vec![passage("p1", Domain::Publications, 0.9), passage("p2", Domain::Publications, 0.1)]),
        ]);

        let ids: Vec<_> = merged.iter().map(|p| p.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "p1", "p2"]);
        assert!(merged.iter().all(|p| p.score > 0.0 && p.score <= 1.0));
        assert!(merged.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[test]
    fn test_empty_branches_merge_to_nothing() {
        assert!(normalized_merge(vec![(Domain::Labs, vec![])]).is_empty());
        assert!(grouped_merge(vec![]).is_empty());
    }

    proptest! {
        #[test]
        fn prop_merges_descend_and_keep_every_passage(
            first in proptest::collection::vec(0.0f32..1.0, 0..8),
            second in proptest::collection::vec(0.0f32..1.0, 0..8),
        ) {
            let branches = || -> Vec<(Domain, Vec<RetrievedPassage>)> {
                vec![
                    (Domain::Research, first.iter().enumerate().map(|(i, s)| passage(&format!("r{}", i), Domain::Research, *s)).collect()),
                    (Domain::Labs, second.iter().enumerate().map(|(i, s)| passage(&format!("l{}", i), Domain::Labs, *s)).collect()),
                ]
            };

            for merged in [normalized_merge(branches()), grouped_merge(branches())] {
                prop_assert_eq!(merged.len(), first.len() + second.len());
                prop_assert!(merged.windows(2).all(|w| w[0].score >= w[1].score));
                prop_assert!(merged.iter().all(|p| (0.0..=1.0).contains(&p.score)));
            }
        }
    }
}
