//! Configuration management for NIIBot services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml, config/local.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{AppError, Result};

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Entity registry and collection locations
    #[serde(default)]
    pub data: DataConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Answer generation configuration
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Domain classifier tuning
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Retrieval tuning
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Cache capacities
    #[serde(default)]
    pub cache: CacheConfig,

    /// Conversation memory bounds
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Context assembly budget
    #[serde(default)]
    pub context: ContextConfig,

    /// Input screening
    #[serde(default)]
    pub security: SecurityConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Maximum concurrent requests
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataConfig {
    /// Path to the entity registry JSON file
    #[serde(default = "default_registry_path")]
    pub registry_path: String,

    /// Directory holding one `<domain>.json` file per collection
    #[serde(default = "default_collections_dir")]
    pub collections_dir: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: hash, openai
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Per-query embedding timeout in milliseconds
    #[serde(default = "default_embedding_timeout_ms")]
    pub timeout_ms: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests at collection load
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GenerationConfig {
    /// Generation provider: extractive, openai (any OpenAI-compatible chat endpoint)
    #[serde(default = "default_generation_provider")]
    pub provider: String,

    /// API key for the chat completion endpoint
    pub api_key: Option<String>,

    /// Chat completion endpoint
    #[serde(default = "default_generation_endpoint")]
    pub endpoint: String,

    /// Model name
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens
    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: usize,

    /// Generation timeout in milliseconds
    #[serde(default = "default_generation_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClassifierConfig {
    /// Minimum lead of the top domain score over the runner-up
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f32,

    /// Weight a matched entity adds to each of its domain tags
    #[serde(default = "default_entity_weight")]
    pub entity_weight: f32,

    /// Minimum similarity for fuzzy name matches (0.0 - 1.0)
    #[serde(default = "default_partial_match_threshold")]
    pub partial_match_threshold: f32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Results kept by a single-domain semantic search
    #[serde(default = "default_semantic_top_k")]
    pub semantic_top_k: usize,

    /// Minimum cosine similarity for semantic results
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,

    /// Results kept per domain during a cross-domain fan-out
    #[serde(default = "default_fanout_top_k")]
    pub fanout_top_k: usize,

    /// Cap on metadata-filter results
    #[serde(default = "default_metadata_max_results")]
    pub metadata_max_results: usize,

    /// Timeout for one collection search in milliseconds
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    /// Timeout for one fan-out branch in milliseconds
    #[serde(default = "default_sub_retrieval_timeout_ms")]
    pub sub_retrieval_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Classification level capacity
    #[serde(default = "default_classification_capacity")]
    pub classification_capacity: usize,

    /// Retrieval level capacity
    #[serde(default = "default_retrieval_capacity")]
    pub retrieval_capacity: usize,

    /// Answer level capacity
    #[serde(default = "default_answer_capacity")]
    pub answer_capacity: usize,

    /// Entry time-to-live in seconds (0 disables expiry)
    #[serde(default = "default_cache_ttl")]
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MemoryConfig {
    /// Turns kept per session
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,

    /// Sessions kept in memory
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,

    /// Idle time after which a session is forgotten
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    /// Byte budget for the assembled context
    #[serde(default = "default_max_context_bytes")]
    pub max_context_bytes: usize,

    /// Recent turns summarized into the payload
    #[serde(default = "default_memory_turns")]
    pub memory_turns: usize,

    /// Maximum characters per turn summary
    #[serde(default = "default_turn_summary_chars")]
    pub turn_summary_chars: usize,

    /// Smallest remainder worth filling with a trimmed passage
    #[serde(default = "default_min_passage_bytes")]
    pub min_passage_bytes: usize,

    /// Maximum characters kept from a single passage
    #[serde(default = "default_max_passage_chars")]
    pub max_passage_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// Longest accepted query, in characters
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_max_concurrent() -> usize { 100 }
fn default_registry_path() -> String { "data/entities.json".to_string() }
fn default_collections_dir() -> String { "data/collections".to_string() }
fn default_embedding_provider() -> String { "hash".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout_ms() -> u64 { 2_000 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 32 }
fn default_generation_provider() -> String { "extractive".to_string() }
fn default_generation_endpoint() -> String { "https://api.groq.com/openai/v1/chat/completions".to_string() }
fn default_generation_model() -> String { "llama3-8b-8192".to_string() }
fn default_temperature() -> f32 { 0.1 }
fn default_generation_max_tokens() -> usize { 512 }
fn default_generation_timeout_ms() -> u64 { 15_000 }
fn default_ambiguity_margin() -> f32 { 0.5 }
fn default_entity_weight() -> f32 { 1.0 }
fn default_partial_match_threshold() -> f32 { 0.8 }
fn default_semantic_top_k() -> usize { 5 }
fn default_similarity_threshold() -> f32 { 0.15 }
fn default_fanout_top_k() -> usize { 3 }
fn default_metadata_max_results() -> usize { 8 }
fn default_search_timeout_ms() -> u64 { 3_000 }
fn default_sub_retrieval_timeout_ms() -> u64 { 3_000 }
fn default_classification_capacity() -> usize { 256 }
fn default_retrieval_capacity() -> usize { 512 }
fn default_answer_capacity() -> usize { 128 }
fn default_cache_ttl() -> u64 { 3_600 }
fn default_max_turns() -> usize { 5 }
fn default_max_sessions() -> usize { 10_000 }
fn default_session_ttl() -> u64 { 1_800 }
fn default_max_context_bytes() -> usize { 6_000 }
fn default_memory_turns() -> usize { 2 }
fn default_turn_summary_chars() -> usize { 300 }
fn default_min_passage_bytes() -> usize { 200 }
fn default_max_passage_chars() -> usize { 800 }
fn default_max_query_chars() -> usize { 2_000 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "niibot".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__CACHE__ANSWER_CAPACITY=512
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        let fail = |message: &str| {
            Err(AppError::Configuration {
                message: message.to_string(),
            })
        };

        if self.server.max_concurrent_requests == 0 || self.server.request_timeout_secs == 0 {
            return fail("server.max_concurrent_requests and server.request_timeout_secs must be greater than zero");
        }
        if self.classifier.ambiguity_margin < 0.0 {
            return fail("classifier.ambiguity_margin must not be negative");
        }
        if !(0.0..=1.0).contains(&self.classifier.partial_match_threshold) {
            return fail("classifier.partial_match_threshold must be within 0.0..=1.0");
        }
        if self.cache.classification_capacity == 0
            || self.cache.retrieval_capacity == 0
            || self.cache.answer_capacity == 0
        {
            return fail("cache capacities must be greater than zero");
        }
        if self.memory.max_turns == 0 || self.memory.max_sessions == 0 {
            return fail("memory.max_turns and memory.max_sessions must be greater than zero");
        }
        if self.retrieval.semantic_top_k == 0 || self.retrieval.fanout_top_k == 0 {
            return fail("retrieval top_k values must be greater than zero");
        }
        if self.context.memory_turns * self.context.turn_summary_chars * 4
            >= self.context.max_context_bytes
        {
            return fail("context memory summary budget must stay below context.max_context_bytes");
        }
        if self.embedding.dimension == 0 {
            return fail("embedding.dimension must be greater than zero");
        }
        if self.rate_limit.enabled
            && (self.rate_limit.requests_per_second == 0 || self.rate_limit.burst == 0)
        {
            return fail("rate_limit.requests_per_second and rate_limit.burst must be greater than zero");
        }

        Ok(())
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get generation timeout as Duration
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation.timeout_ms)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            max_concurrent_requests: default_max_concurrent(),
        }
    }
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            collections_dir: default_collections_dir(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            timeout_ms: default_embedding_timeout_ms(),
            max_retries: default_embedding_retries(),
            batch_size: default_batch_size(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            api_key: None,
            endpoint: default_generation_endpoint(),
            model: default_generation_model(),
            temperature: default_temperature(),
            max_tokens: default_generation_max_tokens(),
            timeout_ms: default_generation_timeout_ms(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            ambiguity_margin: default_ambiguity_margin(),
            entity_weight: default_entity_weight(),
            partial_match_threshold: default_partial_match_threshold(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            semantic_top_k: default_semantic_top_k(),
            similarity_threshold: default_similarity_threshold(),
            fanout_top_k: default_fanout_top_k(),
            metadata_max_results: default_metadata_max_results(),
            search_timeout_ms: default_search_timeout_ms(),
            sub_retrieval_timeout_ms: default_sub_retrieval_timeout_ms(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            classification_capacity: default_classification_capacity(),
            retrieval_capacity: default_retrieval_capacity(),
            answer_capacity: default_answer_capacity(),
            ttl_secs: default_cache_ttl(),
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
            max_sessions: default_max_sessions(),
            session_ttl_secs: default_session_ttl(),
        }
    }
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_context_bytes: default_max_context_bytes(),
            memory_turns: default_memory_turns(),
            turn_summary_chars: default_turn_summary_chars(),
            min_passage_bytes: default_min_passage_bytes(),
            max_passage_chars: default_max_passage_chars(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_query_chars: default_max_query_chars(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            data: DataConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            classifier: ClassifierConfig::default(),
            retrieval: RetrievalConfig::default(),
            cache: CacheConfig::default(),
            memory: MemoryConfig::default(),
            context: ContextConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.cache.answer_capacity, 128);
        assert_eq!(config.embedding.provider, "hash");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = AppConfig::default();
        config.cache.retrieval_capacity = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Configuration { .. }));
    }

    #[test]
    fn test_validate_rejects_negative_margin() {
        let mut config = AppConfig::default();
        config.classifier.ambiguity_margin = -0.1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_fills_missing_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[classifier]\nambiguity_margin = 1.25\n\n[cache]\nanswer_capacity = 7").unwrap();

        let path = file.path().to_str().unwrap().trim_end_matches(".toml").to_string();
        let config = AppConfig::from_file(&path).unwrap();

        assert_eq!(config.classifier.ambiguity_margin, 1.25);
        assert_eq!(config.cache.answer_capacity, 7);
        assert_eq!(config.cache.retrieval_capacity, 512);
        assert_eq!(config.memory.max_turns, 5);
    }
}
