//! Cross-domain fan-out
//!
//! Runs one semantic search per domain concurrently, each under its own
//! timeout, and fuses whatever came back.

use super::fusion::{grouped_merge, normalized_merge};
use super::semantic::search_collection;
use futures::future::join_all;
use niibot_common::collections::{Collection, CollectionCatalog, MetadataFilter, RetrievedPassage};
use niibot_common::errors::{AppError, Result};
use niibot_common::{metrics, Domain};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

enum Branch {
    Hits(Vec<RetrievedPassage>),
    TimedOut,
    Unavailable(String),
    Failed,
}

/// Concurrent semantic search over `domains`
///
/// A branch that times out or fails contributes nothing. Collections that
/// are missing or unavailable are skipped; the fan-out only fails when none
/// of them could be reached.
pub async fn fan_out(
    catalog: &CollectionCatalog,
    domains: &[Domain],
    vector: &[f32],
    per_domain_top_k: usize,
    threshold: f32,
    scope: Option<&MetadataFilter>,
    sub_timeout: Duration,
) -> Result<Vec<RetrievedPassage>> {
    let mut targets: Vec<(Domain, Arc<dyn Collection>)> = Vec::with_capacity(domains.len());
    let mut unavailable: Vec<String> = Vec::new();

    for &domain in domains {
        match catalog.get(domain) {
            Ok(collection) => targets.push((domain, collection)),
            Err(e) => {
                tracing::warn!(domain = %domain, error = %e, "Skipping fan-out branch");
                unavailable.push(domain.to_string());
            }
        }
    }

    let branches = targets.iter().map(|(domain, collection)| async move {
        let search = search_collection(collection.as_ref(), vector, per_domain_top_k, threshold, scope);
        let branch = match tokio::time::timeout(sub_timeout, search).await {
            Ok(Ok(passages)) => Branch::Hits(passages),
            Ok(Err(AppError::RetrievalUnavailable { reason, .. })) => Branch::Unavailable(reason),
            Ok(Err(e)) => {
                tracing::warn!(domain = %domain, error = %e, "Fan-out branch failed");
                Branch::Failed
            }
            Err(_) => Branch::TimedOut,
        };
        (*domain, branch)
    });

    let results = join_all(branches).await;

    let mut hits: Vec<(Domain, Vec<RetrievedPassage>)> = Vec::with_capacity(results.len());
    for (domain, branch) in results {
        match branch {
            Branch::Hits(passages) => hits.push((domain, passages)),
            Branch::TimedOut => {
                tracing::warn!(domain = %domain, timeout_ms = sub_timeout.as_millis() as u64, "Fan-out branch timed out");
                metrics::record_fanout_timeout(domain.as_str());
                hits.push((domain, Vec::new()));
            }
            Branch::Failed => hits.push((domain, Vec::new())),
            Branch::Unavailable(reason) => {
                tracing::warn!(domain = %domain, reason = %reason, "Skipping unavailable collection");
                unavailable.push(domain.to_string());
            }
        }
    }

    if hits.is_empty() {
        return Err(AppError::RetrievalUnavailable {
            collection: unavailable.join(","),
            reason: "no collection in the fan-out could be reached".to_string(),
        });
    }

    let spaces: BTreeSet<&str> = targets
        .iter()
        .filter(|(domain, _)| hits.iter().any(|(d, _)| d == domain))
        .map(|(_, collection)| collection.embedding_space())
        .collect();

    let merged = if spaces.len() <= 1 {
        normalized_merge(hits)
    } else {
        tracing::debug!(spaces = spaces.len(), "Embedding spaces differ, grouping fan-out results by domain");
        grouped_merge(hits)
    };

    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::test_support::{collection, doc, embed, SlowCollection};
    use niibot_common::collections::UnavailableCollection;

    async fn research() -> Arc<dyn Collection> {
        Arc::new(
            collection(
                Domain::Research,
                vec![doc("res-tb", "tuberculosis immunology research", &["nimesh-gupta"], None)],
            )
            .await,
        )
    }

    async fn publications() -> Arc<dyn Collection> {
        Arc::new(
            collection(
                Domain::Publications,
                vec![
                    doc("pub-tb", "tuberculosis vaccine trial publication", &["nimesh-gupta"], Some(2021)),
                    doc("pub-tb2", "tuberculosis publication on granulomas", &["sarika-gupta"], Some(2018)),
                ],
            )
            .await,
        )
    }

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[tokio::test]
    async fn test_merges_all_branches_sorted() {
        let catalog = CollectionCatalog::new().with(research().await).with(publications().await);
        let vector = embed("tuberculosis research publications").await;

        let passages = fan_out(
            &catalog,
            &[Domain::Research, Domain::Publications],
            &vector,
            3,
            0.1,
            None,
            TIMEOUT,
        )
        .await
        .unwrap();

        assert_eq!(passages.len(), 3);
        assert!(passages.windows(2).all(|w| w[0].score >= w[1].score));
    }

    #[tokio::test]
    async fn test_scope_applies_to_every_branch() {
        let catalog = CollectionCatalog::new().with(research().await).with(publications().await);
        let vector = embed("tuberculosis").await;
        let scope = MetadataFilter::for_entities(["nimesh-gupta"]);

        let passages = fan_out(
            &catalog,
            &[Domain::Research, Domain::Publications],
            &vector,
            3,
            0.0,
            Some(&scope),
            TIMEOUT,
        )
        .await
        .unwrap();

        let ids: BTreeSet<_> = passages.iter().map(|p| p.doc_id.as_str()).collect();
        assert_eq!(ids, BTreeSet::from(["res-tb", "pub-tb"]));
    }

    #[tokio::test]
    async fn test_timed_out_branch_is_empty() {
        let slow = SlowCollection {
            inner: collection(Domain::Publications, vec![doc("late", "tuberculosis", &[], None)]).await,
            delay: Duration::from_millis(300),
        };
        let catalog = CollectionCatalog::new().with(research().await).with(Arc::new(slow));
        let vector = embed("tuberculosis research").await;

        let passages = fan_out(
            &catalog,
            &[Domain::Research, Domain::Publications],
            &vector,
            3,
            0.1,
            None,
            Duration::from_millis(30),
        )
        .await
        .unwrap();

        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].doc_id, "res-tb");
    }

    #[tokio::test]
    async fn test_unavailable_branches_are_skipped() {
        let catalog = CollectionCatalog::new()
            .with(research().await)
            .with(Arc::new(UnavailableCollection::new(Domain::Publications, "offline")));
        let vector = embed("tuberculosis").await;

        let passages = fan_out(
            &catalog,
            &[Domain::Research, Domain::Publications, Domain::Magazine],
            &vector,
            3,
            0.1,
            None,
            TIMEOUT,
        )
        .await
        .unwrap();
        assert!(passages.iter().all(|p| p.collection == Domain::Research));
    }

    #[tokio::test]
    async fn test_all_unavailable_fails() {
        let catalog = CollectionCatalog::new().with(Arc::new(UnavailableCollection::new(Domain::Research, "offline")));
        let vector = embed("tuberculosis").await;

        let err = fan_out(
            &catalog,
            &[Domain::Research, Domain::Publications],
            &vector,
            3,
            0.1,
            None,
            TIMEOUT,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::RetrievalUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_mixed_embedding_spaces_group_by_domain() {
        let foreign: Arc<dyn Collection> = Arc::new(
            collection(
                Domain::Publications,
                vec![doc("pub-tb", "tuberculosis research publications", &[], None)],
            )
            .await
            .with_embedding_space("other-model"),
        );
        let catalog = CollectionCatalog::new().with(research().await).with(foreign);
        let vector = embed("tuberculosis research").await;

        let passages = fan_out(
            &catalog,
            &[Domain::Publications, Domain::Research],
            &vector,
            3,
            0.1,
            None,
            TIMEOUT,
        )
        .await
        .unwrap();

        let order: Vec<_> = passages.iter().map(|p| p.collection).collect();
        assert_eq!(order, vec![Domain::Publications, Domain::Research]);
    }
}
