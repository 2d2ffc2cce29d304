//! Query pipeline
//!
//! Order of operations for one query:
//! 1. Security screening (rejections never touch a cache)
//! 2. Answer cache
//! 3. Classification (cached), strategy selection, retrieval (cached)
//! 4. Context assembly with recent turns
//! 5. Generation under a deadline, then memory and answer cache updates
//!
//! Every failure after screening is recovered into a response; nothing here
//! returns an error to the caller.

use crate::response::{Diagnostic, Outcome, QueryResponse};
use niibot_common::cache::{keys, CacheManager, CacheStatsReport, CachedAnswer};
use niibot_common::collections::RetrievedPassage;
use niibot_common::config::AppConfig;
use niibot_common::context::{
    ClassificationResult, ContextAssembler, ConversationMemory, ConversationTurn, DomainClassifier,
    EntityRegistry, GenerationPayload, Generator, GeneratedAnswer, Query, SecurityFilter,
    SessionFingerprint, SessionSnapshot, StrategySelector, Verdict,
};
use niibot_common::errors::{AppError, Result};
use niibot_common::metrics;
use niibot_search::Retriever;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Passage titles remembered per turn
const TURN_PASSAGE_TITLES: usize = 3;

/// Registry attributes offered when an entity has no records
const CONTACT_ATTRIBUTES: [&str; 3] = ["email", "extension", "phone"];

const RETRY_MESSAGE: &str =
    "It is taking longer than usual to put the answer together. Please ask again in a moment.";

/// The single entry point from the presentation layer into the core
pub struct QueryPipeline {
    security: SecurityFilter,
    classifier: DomainClassifier,
    selector: StrategySelector,
    retriever: Arc<dyn Retriever>,
    assembler: ContextAssembler,
    generator: Arc<dyn Generator>,
    memory: Arc<ConversationMemory>,
    cache: Arc<CacheManager>,
    generation_timeout: Duration,
    memory_turns: usize,
}

/// Passages for the query plus how they were obtained
struct Retrieval {
    passages: Vec<RetrievedPassage>,
    degraded: bool,
    diagnostic: Option<Diagnostic>,
}

impl QueryPipeline {
    /// Build the pipeline with its own memory and cache stores
    pub fn new(
        config: &AppConfig,
        registry: Arc<EntityRegistry>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self::with_stores(
            config,
            registry,
            retriever,
            generator,
            Arc::new(ConversationMemory::new(&config.memory)),
            Arc::new(CacheManager::new(&config.cache)),
        )
    }

    /// Build the pipeline around shared memory and cache stores
    pub fn with_stores(
        config: &AppConfig,
        registry: Arc<EntityRegistry>,
        retriever: Arc<dyn Retriever>,
        generator: Arc<dyn Generator>,
        memory: Arc<ConversationMemory>,
        cache: Arc<CacheManager>,
    ) -> Self {
        Self {
            security: SecurityFilter::new(config.security.max_query_chars),
            classifier: DomainClassifier::new(registry, config.classifier.clone()),
            selector: StrategySelector::new(config.retrieval.clone()),
            retriever,
            assembler: ContextAssembler::new(config.context.clone()),
            generator,
            memory,
            cache,
            generation_timeout: config.generation_timeout(),
            memory_turns: config.context.memory_turns,
        }
    }

    /// Override the generation deadline
    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn memory(&self) -> &Arc<ConversationMemory> {
        &self.memory
    }

    pub fn cache(&self) -> &Arc<CacheManager> {
        &self.cache
    }

    pub async fn cache_stats(&self) -> CacheStatsReport {
        self.cache.stats().await
    }

    /// Process one user query for `session_id`
    pub async fn process(&self, raw_query: &str, session_id: &str) -> QueryResponse {
        let started = Instant::now();
        let response = self.run(raw_query, session_id).await;
        let elapsed = started.elapsed();

        metrics::record_query(elapsed.as_secs_f64(), response.outcome.as_str(), response.from_cache);
        info!(
            session_id = %session_id,
            outcome = %response.outcome,
            domain = %response.domain,
            from_cache = response.from_cache,
            citations = response.source_citations.len(),
            latency_ms = elapsed.as_millis() as u64,
            "Query processed"
        );

        response
    }

    async fn run(&self, raw_query: &str, session_id: &str) -> QueryResponse {
        if let Verdict::Reject(reason) = self.security.screen(raw_query) {
            metrics::record_rejection(reason.as_str());
            let rejection = AppError::InputRejected {
                reason: reason.as_str().to_string(),
            };
            return QueryResponse::refused(self.security.refusal_message(reason), Diagnostic::from(&rejection));
        }

        let query = Query::new(raw_query, session_id);
        // Every memory read for this query comes from this one snapshot
        let snapshot = self.memory.snapshot(session_id, self.memory_turns).await;
        let fingerprint = &snapshot.fingerprint;

        let answer_key = keys::answer(query.normalized(), fingerprint);
        if let Some(cached) = self.cache.get_answer(&answer_key).await {
            debug!(session_id = %session_id, "Answer cache hit");
            let turn = ConversationTurn::new(query.raw(), query.normalized(), Some(cached.domain))
                .with_entities(cached.entity_ids.clone(), cached.entity_names.clone())
                .with_passages(cached.citations.iter().take(TURN_PASSAGE_TITLES).map(|c| c.title.clone()).collect())
                .with_answer(&cached.answer_text);
            self.memory.append(session_id, turn).await;
            return QueryResponse::cached(cached);
        }

        let classification = self.classify(&query, &snapshot).await;
        let retrieval = self.retrieve(&query, fingerprint, &classification).await;

        if classification.ambiguous_entity {
            if let Some(question) = clarifying_question(&classification, &retrieval.passages) {
                return QueryResponse::clarification(question, classification.primary_domain);
            }
        }

        if retrieval.passages.is_empty() && !retrieval.degraded {
            if let Some(answer) = contact_answer(self.classifier.registry(), &classification) {
                debug!(session_id = %session_id, "No records for entity, answering from registry contacts");
                self.remember(&query, &classification, Vec::new(), &answer).await;
                return QueryResponse::answered(answer, Vec::new(), classification.primary_domain);
            }
        }

        let payload = self.assembler.assemble(
            query.raw(),
            classification.primary_domain,
            &retrieval.passages,
            &snapshot.recent,
            retrieval.degraded,
        );

        match self.generate(&payload).await {
            Ok(answer) => {
                let titles = payload
                    .passages
                    .iter()
                    .take(TURN_PASSAGE_TITLES)
                    .map(|p| p.title.clone())
                    .collect();
                self.remember(&query, &classification, titles, &answer.answer).await;

                if retrieval.degraded {
                    return QueryResponse::answered(answer.answer, answer.citations, payload.domain)
                        .with_outcome(Outcome::Degraded, retrieval.diagnostic);
                }

                if !payload.has_passages() {
                    debug!(session_id = %session_id, "Nothing found, answer not cached");
                    return QueryResponse::answered(answer.answer, answer.citations, payload.domain);
                }

                let cached = CachedAnswer {
                    answer_text: answer.answer.clone(),
                    citations: answer.citations.clone(),
                    domain: payload.domain,
                    entity_ids: classification.entity_ids(),
                    entity_names: classification.entity_names(),
                };
                log_cache_write(self.cache.put_answer(answer_key, cached).await);

                QueryResponse::answered(answer.answer, answer.citations, payload.domain)
            }
            Err(e @ AppError::GenerationTimeout { .. }) => {
                warn!(session_id = %session_id, error = %e, "Generation timed out");
                QueryResponse::answered(RETRY_MESSAGE.to_string(), payload.citations(), payload.domain)
                    .with_outcome(Outcome::RetryLater, Some(Diagnostic::from(&e)))
            }
            Err(e) => {
                warn!(session_id = %session_id, error = %e, "Generation failed");
                QueryResponse::answered(sources_only_answer(&payload), payload.citations(), payload.domain)
                    .with_outcome(Outcome::Degraded, Some(Diagnostic::from(&e)))
            }
        }
    }

    /// The key and the classifier's view of the previous turn come from the same snapshot
    async fn classify(&self, query: &Query, snapshot: &SessionSnapshot) -> ClassificationResult {
        let key = keys::classification(query.normalized(), &snapshot.fingerprint);
        if let Some(cached) = self.cache.get_classification(&key).await {
            debug!("Classification cache hit");
            return cached;
        }

        let classification = self.classifier.classify(query.normalized(), snapshot.last_turn());
        log_cache_write(self.cache.put_classification(key, classification.clone()).await);
        classification
    }

    async fn retrieve(
        &self,
        query: &Query,
        fingerprint: &SessionFingerprint,
        classification: &ClassificationResult,
    ) -> Retrieval {
        let strategy = self.selector.select(classification);
        let key = keys::retrieval(query.normalized(), fingerprint, &strategy.signature());

        if let Some(passages) = self.cache.get_retrieval(&key).await {
            debug!(strategy = strategy.name(), "Retrieval cache hit");
            return Retrieval {
                passages,
                degraded: false,
                diagnostic: None,
            };
        }

        match self.retriever.retrieve(&strategy, query.normalized()).await {
            Ok(passages) => {
                log_cache_write(self.cache.put_retrieval(key, passages.clone()).await);
                Retrieval {
                    passages,
                    degraded: false,
                    diagnostic: None,
                }
            }
            Err(e) => {
                if e.is_degradable() {
                    warn!(strategy = strategy.name(), error = %e, "Retrieval unavailable, answering in degraded mode");
                } else {
                    tracing::error!(strategy = strategy.name(), error = %e, "Retrieval failed");
                }
                Retrieval {
                    passages: Vec::new(),
                    degraded: true,
                    diagnostic: Some(Diagnostic::from(&e)),
                }
            }
        }
    }

    async fn generate(&self, payload: &GenerationPayload) -> Result<GeneratedAnswer> {
        let timeout = self.generation_timeout;
        match tokio::time::timeout(timeout, self.generator.generate(payload, timeout)).await {
            Ok(result) => result,
            Err(_) => {
                metrics::record_generation(timeout.as_secs_f64(), self.generator.model_name(), "timeout");
                Err(AppError::GenerationTimeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    async fn remember(
        &self,
        query: &Query,
        classification: &ClassificationResult,
        passage_titles: Vec<String>,
        answer: &str,
    ) {
        let turn = ConversationTurn::new(query.raw(), query.normalized(), Some(classification.primary_domain))
            .with_entities(classification.entity_ids(), classification.entity_names())
            .with_passages(passage_titles)
            .with_answer(answer);

        self.memory.append(query.session_id(), turn).await;
    }
}

fn log_cache_write(result: Result<()>) {
    if let Err(e) = result {
        warn!(error = %e, "Cache write failed");
    }
}

/// Question to ask when a surname matched several people and the passages
/// do not settle on one of them
fn clarifying_question(classification: &ClassificationResult, passages: &[RetrievedPassage]) -> Option<String> {
    let candidates: BTreeSet<&str> = classification
        .matched_entities
        .iter()
        .map(|m| m.entity_id.as_str())
        .collect();

    let linked: BTreeSet<&str> = passages
        .iter()
        .flat_map(|p| p.metadata.entity_ids.iter().map(String::as_str))
        .filter(|id| candidates.contains(id))
        .collect();

    if linked.len() == 1 {
        return None;
    }

    let names = classification.entity_names();
    let listed = match names.split_last() {
        Some((last, rest)) if !rest.is_empty() => format!("{} or {}", rest.join(", "), last),
        Some((last, _)) => last.clone(),
        None => return None,
    };

    Some(format!(
        "Several people match that name. Did you mean {}? Please include the full name.",
        listed
    ))
}

/// Registry contact details for matched entities, when any are known
fn contact_answer(registry: &EntityRegistry, classification: &ClassificationResult) -> Option<String> {
    let contacts: Vec<String> = classification
        .matched_entities
        .iter()
        .filter_map(|m| {
            let entity = registry.get(&m.entity_id)?;
            let details: Vec<String> = CONTACT_ATTRIBUTES
                .iter()
                .filter_map(|key| entity.attributes.get(*key).map(|value| format!("{} {}", key, value)))
                .collect();
            (!details.is_empty()).then(|| format!("{} ({})", entity.canonical_name, details.join(", ")))
        })
        .collect();

    if contacts.is_empty() {
        return None;
    }
    Some(format!(
        "I couldn't find records about that in the {} documents, but you can reach {}.",
        classification.primary_domain.label(),
        contacts.join("; ")
    ))
}

/// Answer listing the assembled sources when generation failed
fn sources_only_answer(payload: &GenerationPayload) -> String {
    if payload.passages.is_empty() {
        return format!(
            "I couldn't put an answer together and found nothing relevant in the {} records. Please try again shortly.",
            payload.domain.label()
        );
    }

    let sources: Vec<String> = payload
        .passages
        .iter()
        .map(|p| format!("[{}] {}", p.index, p.title))
        .collect();

    format!(
        "I couldn't put an answer together right now, but these sources look relevant: {}",
        sources.join("; ")
    )
}
