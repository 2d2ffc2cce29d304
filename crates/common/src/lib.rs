//! NIIBot Common Library
//!
//! Shared code for the NIIBot query pipeline including:
//! - Domain model, query normalization and the entity registry
//! - Security screening, classification and strategy selection
//! - Document collections and the embedding client abstraction
//! - Conversation memory and the three-level cache
//! - Error types, configuration and metrics

pub mod cache;
pub mod collections;
pub mod config;
pub mod context;
pub mod domain;
pub mod embeddings;
pub mod errors;
pub mod metrics;

// Re-export commonly used types
pub use config::AppConfig;
pub use domain::Domain;
pub use embeddings::Embedder;
pub use errors::{AppError, Result};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default embedding model (the built-in hashing embedder)
pub const DEFAULT_EMBEDDING_MODEL: &str = "niibot-hash-v1";

/// Default embedding dimension
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
