//! Semantic search over a single collection

use niibot_common::collections::{sort_passages, Collection, MetadataFilter, RetrievedPassage};
use niibot_common::errors::Result;

/// Candidates fetched per requested result when an entity scope post-filters them
pub const SCOPE_OVERFETCH: usize = 3;

/// Top `top_k` passages scoring at least `threshold`. Never padded.
pub async fn search_collection(
    collection: &dyn Collection,
    vector: &[f32],
    top_k: usize,
    threshold: f32,
    scope: Option<&MetadataFilter>,
) -> Result<Vec<RetrievedPassage>> {
    let domain = collection.domain();
    let fetch = if scope.is_some() { top_k * SCOPE_OVERFETCH } else { top_k };

    let mut passages: Vec<RetrievedPassage> = collection
        .search(vector, fetch)
        .await?
        .into_iter()
        .filter(|hit| hit.score >= threshold)
        .filter(|hit| scope.map_or(true, |s| s.matches(&hit.document.metadata)))
        .map(|hit| RetrievedPassage::from_document(hit.document, domain, hit.score))
        .collect();

    sort_passages(&mut passages);
    passages.truncate(top_k);
    Ok(passages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::test_support::{collection, doc, embed};
    use niibot_common::domain::Domain;

    #[tokio::test]
    async fn test_threshold_is_respected_without_padding() {
        let c = collection(
            Domain::Research,
            vec![
                doc("hit", "malaria parasite invasion of red blood cells", &[], None),
                doc("miss", "hostel mess timings and canteen menu", &[], None),
            ],
        )
        .await;

        let passages = search_collection(&c, &embed("malaria parasite").await, 5, 0.2, None)
            .await
            .unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].doc_id, "hit");
    }

    #[tokio::test]
    async fn test_scope_keeps_only_linked_passages() {
        let c = collection(
            Domain::Research,
            vec![
                doc("a", "vaccine immunology research", &["nimesh-gupta"], None),
                doc("b", "vaccine immunology research program", &["sarika-gupta"], None),
            ],
        )
        .await;
        let scope = MetadataFilter::for_entities(["sarika-gupta"]);

        let passages = search_collection(&c, &embed("vaccine research").await, 1, 0.0, Some(&scope))
            .await
            .unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].doc_id, "b");
    }
}
