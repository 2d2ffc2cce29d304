//! NIIBot Retriever
//!
//! Executes retrieval strategies against the domain collections:
//! - Metadata filtering (entity-scoped, recency ordered)
//! - Semantic search (nearest neighbours above a threshold)
//! - Cross-domain fan-out with per-branch timeouts and score fusion

pub mod retrieval;

pub use retrieval::{CollectionRetriever, Retriever, RetrieverSettings};
