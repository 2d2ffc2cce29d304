//! NIIBot Context Engine
//!
//! The query pipeline behind every chat turn:
//! - Security screening before anything else runs
//! - Classification, strategy selection and retrieval with layered caching
//! - Context assembly with conversation memory
//! - Answer generation under a deadline, degrading instead of failing

pub mod pipeline;
pub mod response;

pub use pipeline::QueryPipeline;
pub use response::{Diagnostic, Outcome, QueryResponse};
