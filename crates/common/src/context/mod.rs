//! Query pipeline components
//!
//! The pieces the pipeline is assembled from:
//! - Query normalization and the entity registry
//! - Security screening
//! - Domain classification and strategy selection
//! - Conversation memory
//! - Context assembly and answer generation

pub mod assembler;
pub mod classifier;
pub mod memory;
pub mod query;
pub mod registry;
pub mod security;
pub mod strategy;
pub mod synthesizer;

pub use assembler::{ContextAssembler, ContextPassage, GenerationPayload, SourceCitation};
pub use classifier::{ClassificationResult, DomainClassifier, EntityResolution};
pub use memory::{ConversationMemory, ConversationTurn, SessionFingerprint, SessionSnapshot};
pub use query::Query;
pub use registry::{Entity, EntityKind, EntityMatch, EntityRegistry, EntityScan, MatchKind};
pub use security::{RejectReason, SecurityFilter, Verdict};
pub use strategy::{RetrievalStrategy, StrategySelector};
pub use synthesizer::{create_generator, ExtractiveGenerator, GeneratedAnswer, Generator, LlmGenerator};
