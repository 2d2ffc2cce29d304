//! Document collections
//!
//! Provides:
//! - The `Collection` seam the retriever searches through
//! - An in-memory collection with brute-force cosine search
//! - A catalog mapping each domain to its collection
//! - `RetrievedPassage` and its total ordering
//!
//! Collections are read-only once loaded. A collection file that fails to
//! load is registered as unavailable so the rest of the service keeps working.

use crate::domain::Domain;
use crate::embeddings::{cosine_similarity, Embedder};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

/// Metadata attached to every document by the ingestion side
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(default)]
    pub title: String,

    /// Source URL
    #[serde(default)]
    pub source: Option<String>,

    /// Registry ids of the entities this document is about
    #[serde(default)]
    pub entity_ids: Vec<String>,

    /// Publication year, when known
    #[serde(default)]
    pub year: Option<i32>,

    #[serde(default)]
    pub category: Option<String>,

    /// Original document this chunk was cut from; used for deduplication
    #[serde(default)]
    pub source_document: Option<String>,
}

/// A stored document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// A document with its similarity to the query vector
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// Whether a collection can serve requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CollectionHealth {
    Available { documents: usize },
    Unavailable { reason: String },
}

impl CollectionHealth {
    pub fn is_available(&self) -> bool {
        matches!(self, CollectionHealth::Available { .. })
    }
}

/// Metadata predicate: documents linked to any of the entities, optionally
/// restricted to a category. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MetadataFilter {
    entity_ids: Vec<String>,
    category: Option<String>,
}

impl MetadataFilter {
    pub fn for_entities<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut entity_ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        entity_ids.sort();
        entity_ids.dedup();
        Self { entity_ids, category: None }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn entity_ids(&self) -> &[String] {
        &self.entity_ids
    }

    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    pub fn matches(&self, metadata: &DocumentMetadata) -> bool {
        let entity_ok = self.entity_ids.is_empty()
            || metadata.entity_ids.iter().any(|id| self.entity_ids.contains(id));
        let category_ok = match (&self.category, &metadata.category) {
            (None, _) => true,
            (Some(wanted), Some(actual)) => wanted.eq_ignore_ascii_case(actual),
            (Some(_), None) => false,
        };
        entity_ok && category_ok
    }

    /// Stable textual form used in cache keys
    pub fn signature(&self) -> String {
        format!(
            "ids={};cat={}",
            self.entity_ids.join(","),
            self.category.as_deref().unwrap_or("")
        )
    }
}

/// A ranked excerpt handed from retrieval to context assembly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub doc_id: String,
    pub collection: Domain,
    pub content: String,
    pub score: f32,
    pub metadata: DocumentMetadata,
}

impl RetrievedPassage {
    pub fn from_document(document: Document, collection: Domain, score: f32) -> Self {
        Self {
            doc_id: document.id,
            collection,
            content: document.content,
            score,
            metadata: document.metadata,
        }
    }

    /// Key used to collapse chunks of the same source
    pub fn dedup_key(&self) -> &str {
        self.metadata.source_document.as_deref().unwrap_or(&self.doc_id)
    }

    pub fn display_title(&self) -> &str {
        if self.metadata.title.is_empty() {
            &self.doc_id
        } else {
            &self.metadata.title
        }
    }
}

/// Total order on passages: score desc, year desc (missing last),
/// collection asc, document id asc
pub fn compare_passages(a: &RetrievedPassage, b: &RetrievedPassage) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| match (a.metadata.year, b.metadata.year) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        })
        .then_with(|| a.collection.cmp(&b.collection))
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

pub fn sort_passages(passages: &mut [RetrievedPassage]) {
    passages.sort_by(compare_passages);
}

/// A searchable, read-only set of documents
#[async_trait]
pub trait Collection: Send + Sync {
    /// Domain this collection serves
    fn domain(&self) -> Domain;

    /// Identifier of the vector space the stored embeddings live in
    fn embedding_space(&self) -> &str;

    /// Nearest neighbours of `vector`, best first
    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>>;

    /// Every document matching the predicate, in storage order
    async fn filter(&self, filter: &MetadataFilter) -> Result<Vec<Document>>;

    async fn health(&self) -> CollectionHealth;
}

#[derive(Debug, Deserialize)]
struct CollectionFile {
    #[serde(default)]
    embedding_space: Option<String>,
    documents: Vec<Document>,
}

/// Collection held entirely in memory
pub struct InMemoryCollection {
    domain: Domain,
    embedding_space: String,
    dimension: usize,
    documents: Vec<Document>,
}

impl InMemoryCollection {
    /// Build a collection, embedding any document that has no vector yet
    pub async fn build(
        domain: Domain,
        mut documents: Vec<Document>,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self> {
        let missing: Vec<usize> = documents
            .iter()
            .enumerate()
            .filter(|(_, d)| d.embedding.is_none())
            .map(|(i, _)| i)
            .collect();

        for chunk in missing.chunks(batch_size.max(1)) {
            let texts: Vec<String> = chunk.iter().map(|&i| documents[i].content.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != chunk.len() {
                return Err(AppError::EmbeddingError {
                    message: format!("expected {} embeddings, got {}", chunk.len(), vectors.len()),
                });
            }
            for (&i, vector) in chunk.iter().zip(vectors) {
                documents[i].embedding = Some(vector);
            }
        }

        let dimension = embedder.dimension();
        if let Some(bad) = documents
            .iter()
            .find(|d| d.embedding.as_ref().map(Vec::len) != Some(dimension))
        {
            return Err(AppError::CollectionLoad {
                path: domain.to_string(),
                message: format!("document {} does not have a {}-dimensional embedding", bad.id, dimension),
            });
        }

        tracing::debug!(
            domain = %domain,
            documents = documents.len(),
            embedded = missing.len(),
            "Built in-memory collection"
        );

        Ok(Self {
            domain,
            embedding_space: embedder.model_name().to_string(),
            dimension,
            documents,
        })
    }

    /// Load `{ embedding_space?, documents: [...] }` from a JSON file
    pub async fn load_from_file(
        path: &Path,
        domain: Domain,
        embedder: &dyn Embedder,
        batch_size: usize,
    ) -> Result<Self> {
        let load_error = |message: String| AppError::CollectionLoad {
            path: path.display().to_string(),
            message,
        };

        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_error(e.to_string()))?;
        let file: CollectionFile = serde_json::from_str(&raw).map_err(|e| load_error(e.to_string()))?;

        if let Some(space) = &file.embedding_space {
            if space != embedder.model_name() {
                return Err(load_error(format!(
                    "stored embeddings come from {}, configured embedder is {}",
                    space,
                    embedder.model_name()
                )));
            }
        }

        Self::build(domain, file.documents, embedder, batch_size).await
    }

    /// Tag the collection with a different vector space name
    pub fn with_embedding_space(mut self, space: impl Into<String>) -> Self {
        self.embedding_space = space.into();
        self
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

#[async_trait]
impl Collection for InMemoryCollection {
    fn domain(&self) -> Domain {
        self.domain
    }

    fn embedding_space(&self) -> &str {
        &self.embedding_space
    }

    async fn search(&self, vector: &[f32], top_k: usize) -> Result<Vec<ScoredDocument>> {
        if vector.len() != self.dimension {
            return Err(AppError::Validation {
                message: format!("query vector has {} dimensions, expected {}", vector.len(), self.dimension),
                field: Some("vector".to_string()),
            });
        }

        // Brute force search with cosine similarity
        let mut results: Vec<(f32, &Document)> = self
            .documents
            .iter()
            .filter_map(|d| d.embedding.as_ref().map(|e| (cosine_similarity(vector, e), d)))
            .collect();

        results.sort_by(|a, b| b.0.total_cmp(&a.0).then_with(|| a.1.id.cmp(&b.1.id)));

        Ok(results
            .into_iter()
            .take(top_k)
            .map(|(score, d)| ScoredDocument { document: d.clone(), score })
            .collect())
    }

    async fn filter(&self, filter: &MetadataFilter) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .iter()
            .filter(|d| filter.matches(&d.metadata))
            .cloned()
            .collect())
    }

    async fn health(&self) -> CollectionHealth {
        CollectionHealth::Available { documents: self.documents.len() }
    }
}

/// Stand-in for a collection that failed to load
pub struct UnavailableCollection {
    domain: Domain,
    reason: String,
}

impl UnavailableCollection {
    pub fn new(domain: Domain, reason: impl Into<String>) -> Self {
        Self { domain, reason: reason.into() }
    }

    fn error(&self) -> AppError {
        AppError::RetrievalUnavailable {
            collection: self.domain.to_string(),
            reason: self.reason.clone(),
        }
    }
}

#[async_trait]
impl Collection for UnavailableCollection {
    fn domain(&self) -> Domain {
        self.domain
    }

    fn embedding_space(&self) -> &str {
        ""
    }

    async fn search(&self, _vector: &[f32], _top_k: usize) -> Result<Vec<ScoredDocument>> {
        Err(self.error())
    }

    async fn filter(&self, _filter: &MetadataFilter) -> Result<Vec<Document>> {
        Err(self.error())
    }

    async fn health(&self) -> CollectionHealth {
        CollectionHealth::Unavailable { reason: self.reason.clone() }
    }
}

/// Domain to collection mapping; each domain owns at most one collection
#[derive(Default, Clone)]
pub struct CollectionCatalog {
    collections: BTreeMap<Domain, Arc<dyn Collection>>,
}

impl CollectionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a collection under its own domain, replacing any previous one
    pub fn insert(&mut self, collection: Arc<dyn Collection>) {
        self.collections.insert(collection.domain(), collection);
    }

    pub fn with(mut self, collection: Arc<dyn Collection>) -> Self {
        self.insert(collection);
        self
    }

    /// Collection for a domain; a missing collection is reported, never treated as empty
    pub fn get(&self, domain: Domain) -> Result<Arc<dyn Collection>> {
        self.collections
            .get(&domain)
            .cloned()
            .ok_or_else(|| AppError::RetrievalUnavailable {
                collection: domain.to_string(),
                reason: "no collection configured".to_string(),
            })
    }

    pub fn domains(&self) -> Vec<Domain> {
        self.collections.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }

    /// Health of every domain; domains without a collection are reported unavailable
    pub async fn health(&self) -> BTreeMap<Domain, CollectionHealth> {
        let mut report = BTreeMap::new();
        for domain in Domain::ALL {
            let health = match self.collections.get(&domain) {
                Some(c) => c.health().await,
                None => CollectionHealth::Unavailable {
                    reason: "no collection configured".to_string(),
                },
            };
            report.insert(domain, health);
        }
        report
    }

    /// Load `<dir>/<domain>.json` for every domain.
    ///
    /// Missing files leave the domain without a collection; unreadable or
    /// malformed files register an unavailable collection.
    pub async fn load_dir(dir: impl AsRef<Path>, embedder: Arc<dyn Embedder>, batch_size: usize) -> Self {
        let dir = dir.as_ref();
        let mut catalog = Self::new();

        for domain in Domain::ALL {
            let path = dir.join(format!("{}.json", domain.as_str()));
            if !path.exists() {
                tracing::warn!(domain = %domain, path = %path.display(), "No collection file for domain");
                continue;
            }

            match InMemoryCollection::load_from_file(&path, domain, embedder.as_ref(), batch_size).await {
                Ok(collection) => {
                    tracing::info!(
                        domain = %domain,
                        documents = collection.len(),
                        "Loaded collection"
                    );
                    catalog.insert(Arc::new(collection));
                }
                Err(e) => {
                    tracing::error!(domain = %domain, error = %e, "Collection failed to load, marking unavailable");
                    catalog.insert(Arc::new(UnavailableCollection::new(domain, e.to_string())));
                }
            }
        }

        catalog
    }
}
