//! Strategy-driven retrieval
//!
//! Provides three retrieval modes:
//! - Metadata filter (entity-linked passages, newest first)
//! - Semantic search (similarity above a threshold in one collection)
//! - Cross-domain fan-out (concurrent semantic search with score fusion)

mod fanout;
mod fusion;
mod metadata;
mod semantic;

pub use fanout::fan_out;
pub use fusion::{grouped_merge, normalize_by_max, normalized_merge};
pub use metadata::filter_collection;
pub use semantic::{search_collection, SCOPE_OVERFETCH};

use niibot_common::collections::{CollectionCatalog, MetadataFilter, RetrievedPassage};
use niibot_common::config::{EmbeddingConfig, RetrievalConfig};
use niibot_common::context::RetrievalStrategy;
use niibot_common::errors::{AppError, Result};
use niibot_common::metrics;
use niibot_common::{Domain, Embedder};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Common trait for all retrievers
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Execute `strategy` for `query_text`
    ///
    /// An empty result is not an error. `RetrievalUnavailable` means no
    /// collection the strategy needed could be reached.
    async fn retrieve(&self, strategy: &RetrievalStrategy, query_text: &str) -> Result<Vec<RetrievedPassage>>;
}

/// Time limits applied while retrieving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrieverSettings {
    pub embedding_timeout: Duration,
    pub search_timeout: Duration,
    pub sub_retrieval_timeout: Duration,
}

impl RetrieverSettings {
    pub fn from_config(retrieval: &RetrievalConfig, embedding: &EmbeddingConfig) -> Self {
        Self {
            embedding_timeout: Duration::from_millis(embedding.timeout_ms),
            search_timeout: Duration::from_millis(retrieval.search_timeout_ms),
            sub_retrieval_timeout: Duration::from_millis(retrieval.sub_retrieval_timeout_ms),
        }
    }
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default(), &EmbeddingConfig::default())
    }
}

/// Retriever backed by a collection catalog
pub struct CollectionRetriever {
    catalog: CollectionCatalog,
    embedder: Arc<dyn Embedder>,
    settings: RetrieverSettings,
}

impl CollectionRetriever {
    pub fn new(catalog: CollectionCatalog, embedder: Arc<dyn Embedder>, settings: RetrieverSettings) -> Self {
        Self {
            catalog,
            embedder,
            settings,
        }
    }

    pub fn catalog(&self) -> &CollectionCatalog {
        &self.catalog
    }

    /// Embed the query once per retrieval
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let timeout = self.settings.embedding_timeout;
        let started = Instant::now();
        let result = tokio::time::timeout(timeout, self.embedder.embed(text)).await;

        let outcome = match result {
            Ok(Ok(vector)) => Ok(vector),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AppError::EmbeddingTimeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
        };

        metrics::record_embedding(
            started.elapsed().as_secs_f64(),
            self.embedder.model_name(),
            1,
            outcome.is_ok(),
        );
        outcome
    }

    /// First fallback collection with passages for the filter's entities.
    /// Unreachable fallbacks are skipped.
    async fn filter_fallback(
        &self,
        primary: Domain,
        fallback: &[Domain],
        filter: &MetadataFilter,
        max_results: usize,
    ) -> Vec<RetrievedPassage> {
        for domain in fallback {
            let Ok(collection) = self.catalog.get(*domain) else {
                continue;
            };
            let search = filter_collection(collection.as_ref(), filter, max_results);
            match with_search_timeout(*domain, self.settings.search_timeout, search).await {
                Ok(passages) if !passages.is_empty() => {
                    tracing::debug!(
                        from = %primary,
                        to = %domain,
                        results = passages.len(),
                        "Entity passages found in fallback collection"
                    );
                    return passages;
                }
                Ok(_) => {}
                Err(e) => tracing::warn!(domain = %domain, error = %e, "Fallback collection skipped"),
            }
        }
        Vec::new()
    }

    async fn execute(&self, strategy: &RetrievalStrategy, query_text: &str) -> Result<Vec<RetrievedPassage>> {
        match strategy {
            RetrievalStrategy::MetadataFilter {
                domain,
                filter,
                max_results,
                fallback,
            } => {
                let collection = self.catalog.get(*domain)?;
                let passages = with_search_timeout(
                    *domain,
                    self.settings.search_timeout,
                    filter_collection(collection.as_ref(), filter, *max_results),
                )
                .await?;
                if !passages.is_empty() || fallback.is_empty() {
                    return Ok(passages);
                }
                Ok(self.filter_fallback(*domain, fallback, filter, *max_results).await)
            }

            RetrievalStrategy::SemanticSearch {
                domain,
                top_k,
                threshold,
                scope,
            } => {
                let collection = self.catalog.get(*domain)?;
                let vector = self.embed_query(query_text).await?;
                with_search_timeout(
                    *domain,
                    self.settings.search_timeout,
                    search_collection(collection.as_ref(), &vector, *top_k, *threshold, scope.as_ref()),
                )
                .await
            }

            RetrievalStrategy::CrossDomainFanout {
                domains,
                per_domain_top_k,
                threshold,
                scope,
            } => {
                let vector = self.embed_query(query_text).await?;
                fan_out(
                    &self.catalog,
                    domains,
                    &vector,
                    *per_domain_top_k,
                    *threshold,
                    scope.as_ref(),
                    self.settings.sub_retrieval_timeout,
                )
                .await
            }
        }
    }
}

#[async_trait::async_trait]
impl Retriever for CollectionRetriever {
    async fn retrieve(&self, strategy: &RetrievalStrategy, query_text: &str) -> Result<Vec<RetrievedPassage>> {
        let started = Instant::now();
        let result = self.execute(strategy, query_text).await;
        let elapsed = started.elapsed();

        match &result {
            Ok(passages) => {
                tracing::debug!(
                    strategy = strategy.name(),
                    results = passages.len(),
                    latency_ms = elapsed.as_millis() as u64,
                    "Retrieval complete"
                );
                metrics::record_retrieval(elapsed.as_secs_f64(), strategy.name(), passages.len(), true);
            }
            Err(e) => {
                tracing::warn!(strategy = strategy.name(), error = %e, "Retrieval failed");
                metrics::record_retrieval(elapsed.as_secs_f64(), strategy.name(), 0, false);
            }
        }

        result
    }
}

async fn with_search_timeout<F>(
    domain: Domain,
    timeout: Duration,
    search: F,
) -> Result<Vec<RetrievedPassage>>
where
    F: std::future::Future<Output = Result<Vec<RetrievedPassage>>>,
{
    tokio::time::timeout(timeout, search)
        .await
        .unwrap_or_else(|_| {
            Err(AppError::RetrievalUnavailable {
                collection: domain.to_string(),
                reason: "search timed out".to_string(),
            })
        })
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use niibot_common::collections::{MetadataFilter, UnavailableCollection};
    use niibot_common::embeddings::HashEmbedder;
    use niibot_common::Domain;

    async fn retriever() -> CollectionRetriever {
        let catalog = CollectionCatalog::new()
            .with(Arc::new(
                collection(
                    Domain::Publications,
                    vec![
                        doc("pub-1", "T cell responses to tuberculosis vaccines", &["nimesh-gupta"], Some(2022)),
                        doc("pub-2", "Structure of a malaria surface protein", &["sarika-gupta"], Some(2019)),
                    ],
                )
                .await,
            ))
            .with(Arc::new(
                collection(
                    Domain::Research,
                    vec![doc("res-1", "Tuberculosis immunology research group", &[], None)],
                )
                .await,
            ))
            .with(Arc::new(UnavailableCollection::new(Domain::Magazine, "index offline")));

        CollectionRetriever::new(catalog, Arc::new(HashEmbedder::default()), RetrieverSettings::default())
    }

    #[tokio::test]
    async fn test_metadata_strategy() {
        let r = retriever().await;
        let strategy = RetrievalStrategy::MetadataFilter {
            domain: Domain::Publications,
            filter: MetadataFilter::for_entities(["nimesh-gupta"]),
            max_results: 10,
            fallback: vec![],
        };
        let passages = r.retrieve(&strategy, "publications of nimesh gupta").await.unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].doc_id, "pub-1");
        assert_eq!(passages[0].collection, Domain::Publications);
    }

    #[tokio::test]
    async fn test_metadata_strategy_falls_back_when_primary_has_nothing() {
        let r = retriever().await;
        let strategy = RetrievalStrategy::MetadataFilter {
            domain: Domain::Research,
            filter: MetadataFilter::for_entities(["sarika-gupta"]),
            max_results: 10,
            fallback: vec![Domain::Magazine, Domain::FacultyInfo, Domain::Publications],
        };
        let passages = r.retrieve(&strategy, "sarika gupta").await.unwrap();
        assert_eq!(passages.len(), 1);
        assert_eq!(passages[0].doc_id, "pub-2");
        assert_eq!(passages[0].collection, Domain::Publications);
    }

    #[tokio::test]
    async fn test_metadata_strategy_without_matches_anywhere_is_empty() {
        let r = retriever().await;
        let strategy = RetrievalStrategy::MetadataFilter {
            domain: Domain::Research,
            filter: MetadataFilter::for_entities(["nobody"]),
            max_results: 10,
            fallback: vec![Domain::Publications],
        };
        assert!(r.retrieve(&strategy, "nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_semantic_strategy() {
        let r = retriever().await;
        let strategy = RetrievalStrategy::SemanticSearch {
            domain: Domain::Publications,
            top_k: 5,
            threshold: 0.1,
            scope: None,
        };
        let passages = r.retrieve(&strategy, "malaria protein structure").await.unwrap();
        assert_eq!(passages[0].doc_id, "pub-2");
    }

    #[tokio::test]
    async fn test_unconfigured_collection_is_unavailable() {
        let r = retriever().await;
        let strategy = RetrievalStrategy::SemanticSearch {
            domain: Domain::Staff,
            top_k: 5,
            threshold: 0.1,
            scope: None,
        };
        let err = r.retrieve(&strategy, "anything").await.unwrap_err();
        assert!(matches!(err, AppError::RetrievalUnavailable { .. }));
        assert!(err.is_degradable());
    }

    #[tokio::test]
    async fn test_slow_search_times_out_as_unavailable() {
        let slow = SlowCollection {
            inner: collection(Domain::Labs, vec![doc("lab", "structural biology lab", &[], None)]).await,
            delay: Duration::from_millis(200),
        };
        let settings = RetrieverSettings {
            search_timeout: Duration::from_millis(20),
            ..RetrieverSettings::default()
        };
        let r = CollectionRetriever::new(
            CollectionCatalog::new().with(Arc::new(slow)),
            Arc::new(HashEmbedder::default()),
            settings,
        );
        let strategy = RetrievalStrategy::SemanticSearch {
            domain: Domain::Labs,
            top_k: 3,
            threshold: 0.0,
            scope: None,
        };
        let err = r.retrieve(&strategy, "structural biology").await.unwrap_err();
        assert!(matches!(err, AppError::RetrievalUnavailable { ref reason, .. } if reason == "search timed out"));
    }

    #[tokio::test]
    async fn test_fanout_strategy_merges_domains() {
        let r = retriever().await;
        let strategy = RetrievalStrategy::CrossDomainFanout {
            domains: vec![Domain::Research, Domain::Publications, Domain::Magazine],
            per_domain_top_k: 3,
            threshold: 0.1,
            scope: None,
        };
        let passages = r.retrieve(&strategy, "tuberculosis research").await.unwrap();
        let collections: Vec<_> = passages.iter().map(|p| p.collection).collect();
        assert!(collections.contains(&Domain::Research));
        assert!(collections.contains(&Domain::Publications));
        assert!(!collections.contains(&Domain::Magazine));
    }
}
