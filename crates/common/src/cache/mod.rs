//! Three-level in-process cache
//!
//! Provides:
//! - Independent LRU levels for classification, retrieval and full answers
//! - Content-addressed keys (SHA-256 over length-prefixed parts)
//! - Optional TTL
//! - Hit/miss/eviction counters per level
//!
//! Each level sits behind its own async mutex, so a get or put is atomic.

use crate::collections::RetrievedPassage;
use crate::config::CacheConfig;
use crate::context::assembler::SourceCitation;
use crate::context::classifier::ClassificationResult;
use crate::domain::Domain;
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

/// Cache level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheLevel {
    Classification,
    Retrieval,
    Answer,
}

impl CacheLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheLevel::Classification => "classification",
            CacheLevel::Retrieval => "retrieval",
            CacheLevel::Answer => "answer",
        }
    }
}

impl fmt::Display for CacheLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hex SHA-256 cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A finished answer as stored at the answer level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedAnswer {
    pub answer_text: String,
    pub citations: Vec<SourceCitation>,
    pub domain: Domain,
    pub entity_ids: Vec<String>,
    pub entity_names: Vec<String>,
}

/// Value stored in a level; the variant must match the level
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Classification(ClassificationResult),
    Retrieval(Vec<RetrievedPassage>),
    Answer(CachedAnswer),
}

impl CacheValue {
    pub fn level(&self) -> CacheLevel {
        match self {
            CacheValue::Classification(_) => CacheLevel::Classification,
            CacheValue::Retrieval(_) => CacheLevel::Retrieval,
            CacheValue::Answer(_) => CacheLevel::Answer,
        }
    }
}

/// Stored entry
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub value: CacheValue,
    pub inserted_at: DateTime<Utc>,
    inserted: Instant,
    tick: u64,
}

/// Counters for one level
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl LevelStats {
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Snapshot of all levels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub classification: LevelStats,
    pub retrieval: LevelStats,
    pub answer: LevelStats,
}

/// One LRU level. `order` maps access tick to key; the smallest tick is the
/// least recently used entry.
struct LruLevel {
    level: CacheLevel,
    capacity: usize,
    ttl: Option<Duration>,
    entries: HashMap<CacheKey, CacheEntry>,
    order: BTreeMap<u64, CacheKey>,
    tick: u64,
    stats: LevelStats,
}

impl LruLevel {
    fn new(level: CacheLevel, capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            level,
            capacity: capacity.max(1),
            ttl,
            entries: HashMap::new(),
            order: BTreeMap::new(),
            tick: 0,
            stats: LevelStats::default(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    fn get(&mut self, key: &CacheKey) -> Option<CacheValue> {
        let expired = match (self.entries.get(key), self.ttl) {
            (Some(entry), Some(ttl)) => entry.inserted.elapsed() > ttl,
            _ => false,
        };
        if expired {
            if let Some(entry) = self.entries.remove(key) {
                self.order.remove(&entry.tick);
            }
        }

        let tick = self.next_tick();
        match self.entries.get_mut(key) {
            Some(entry) => {
                self.order.remove(&entry.tick);
                entry.tick = tick;
                self.order.insert(tick, key.clone());
                self.stats.hits += 1;
                crate::metrics::record_cache(true, self.level.as_str());
                debug!(level = %self.level, key = %key, "Cache hit");
                Some(entry.value.clone())
            }
            None => {
                self.stats.misses += 1;
                crate::metrics::record_cache(false, self.level.as_str());
                debug!(level = %self.level, key = %key, "Cache miss");
                None
            }
        }
    }

    fn put(&mut self, key: CacheKey, value: CacheValue) {
        let tick = self.next_tick();
        if let Some(old) = self.entries.remove(&key) {
            self.order.remove(&old.tick);
        }

        self.order.insert(tick, key.clone());
        self.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                value,
                inserted_at: Utc::now(),
                inserted: Instant::now(),
                tick,
            },
        );

        while self.entries.len() > self.capacity {
            let Some((_, victim)) = self.order.pop_first() else { break };
            self.entries.remove(&victim);
            self.stats.evictions += 1;
            crate::metrics::record_eviction(self.level.as_str());
            debug!(level = %self.level, key = %victim, "Cache eviction");
        }
    }

    fn snapshot(&self) -> LevelStats {
        LevelStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            ..self.stats.clone()
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Owner of the three cache levels
pub struct CacheManager {
    classification: Mutex<LruLevel>,
    retrieval: Mutex<LruLevel>,
    answer: Mutex<LruLevel>,
}

impl CacheManager {
    pub fn new(config: &CacheConfig) -> Self {
        let ttl = (config.ttl_secs > 0).then(|| Duration::from_secs(config.ttl_secs));
        Self {
            classification: Mutex::new(LruLevel::new(CacheLevel::Classification, config.classification_capacity, ttl)),
            retrieval: Mutex::new(LruLevel::new(CacheLevel::Retrieval, config.retrieval_capacity, ttl)),
            answer: Mutex::new(LruLevel::new(CacheLevel::Answer, config.answer_capacity, ttl)),
        }
    }

    fn level(&self, level: CacheLevel) -> &Mutex<LruLevel> {
        match level {
            CacheLevel::Classification => &self.classification,
            CacheLevel::Retrieval => &self.retrieval,
            CacheLevel::Answer => &self.answer,
        }
    }

    pub async fn get(&self, level: CacheLevel, key: &CacheKey) -> Option<CacheValue> {
        self.level(level).lock().await.get(key)
    }

    /// Store a value; the value kind must match the level
    pub async fn put(&self, level: CacheLevel, key: CacheKey, value: CacheValue) -> Result<()> {
        if value.level() != level {
            return Err(AppError::CacheError {
                message: format!("cannot store a {} value in the {} cache", value.level(), level),
            });
        }
        self.level(level).lock().await.put(key, value);
        Ok(())
    }

    pub async fn get_classification(&self, key: &CacheKey) -> Option<ClassificationResult> {
        match self.get(CacheLevel::Classification, key).await {
            Some(CacheValue::Classification(c)) => Some(c),
            _ => None,
        }
    }

    pub async fn put_classification(&self, key: CacheKey, value: ClassificationResult) -> Result<()> {
        self.put(CacheLevel::Classification, key, CacheValue::Classification(value)).await
    }

    pub async fn get_retrieval(&self, key: &CacheKey) -> Option<Vec<RetrievedPassage>> {
        match self.get(CacheLevel::Retrieval, key).await {
            Some(CacheValue::Retrieval(p)) => Some(p),
            _ => None,
        }
    }

    pub async fn put_retrieval(&self, key: CacheKey, value: Vec<RetrievedPassage>) -> Result<()> {
        self.put(CacheLevel::Retrieval, key, CacheValue::Retrieval(value)).await
    }

    pub async fn get_answer(&self, key: &CacheKey) -> Option<CachedAnswer> {
        match self.get(CacheLevel::Answer, key).await {
            Some(CacheValue::Answer(a)) => Some(a),
            _ => None,
        }
    }

    pub async fn put_answer(&self, key: CacheKey, value: CachedAnswer) -> Result<()> {
        self.put(CacheLevel::Answer, key, CacheValue::Answer(value)).await
    }

    pub async fn stats(&self) -> CacheStatsReport {
        CacheStatsReport {
            classification: self.classification.lock().await.snapshot(),
            retrieval: self.retrieval.lock().await.snapshot(),
            answer: self.answer.lock().await.snapshot(),
        }
    }

    /// Drop every entry; counters are kept
    pub async fn clear(&self) {
        for level in [CacheLevel::Classification, CacheLevel::Retrieval, CacheLevel::Answer] {
            self.level(level).lock().await.clear();
        }
    }
}

/// Cache key builder helpers
pub mod keys {
    use super::{CacheKey, CacheLevel};
    use crate::context::memory::SessionFingerprint;
    use sha2::{Digest, Sha256};

    fn digest(level: CacheLevel, parts: &[&str]) -> CacheKey {
        let mut hasher = Sha256::new();
        for part in std::iter::once(level.as_str()).chain(parts.iter().copied()) {
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        CacheKey(hex::encode(hasher.finalize()))
    }

    pub fn classification(normalized_query: &str, fingerprint: &SessionFingerprint) -> CacheKey {
        digest(CacheLevel::Classification, &[normalized_query, fingerprint.as_str()])
    }

    pub fn retrieval(normalized_query: &str, fingerprint: &SessionFingerprint, strategy_signature: &str) -> CacheKey {
        digest(
            CacheLevel::Retrieval,
            &[normalized_query, fingerprint.as_str(), strategy_signature],
        )
    }

    /// The strategy is a pure function of the other parts, so it is not included
    pub fn answer(normalized_query: &str, fingerprint: &SessionFingerprint) -> CacheKey {
        digest(CacheLevel::Answer, &[normalized_query, fingerprint.as_str()])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::classifier::EntityResolution;
    use crate::context::memory::{ConversationTurn, SessionFingerprint};
    use proptest::prelude::*;

    fn config(capacity: usize) -> CacheConfig {
        CacheConfig {
            classification_capacity: capacity,
            retrieval_capacity: capacity,
            answer_capacity: capacity,
            ttl_secs: 0,
        }
    }

    fn classification() -> ClassificationResult {
        ClassificationResult {
            primary_domain: Domain::Research,
            secondary_domains: vec![Domain::Publications],
            matched_entities: vec![],
            ambiguous: true,
            ambiguous_entity: false,
            entity_resolution: EntityResolution::None,
            scores: BTreeMap::new(),
        }
    }

    fn answer(text: &str) -> CachedAnswer {
        CachedAnswer {
            answer_text: text.to_string(),
            citations: vec![],
            domain: Domain::Labs,
            entity_ids: vec![],
            entity_names: vec![],
        }
    }

    fn fp() -> SessionFingerprint {
        SessionFingerprint::empty()
    }

    #[tokio::test]
    async fn test_round_trip_all_levels() {
        let cache = CacheManager::new(&config(4));

        let ck = keys::classification("q", &fp());
        cache.put_classification(ck.clone(), classification()).await.unwrap();
        assert_eq!(cache.get_classification(&ck).await, Some(classification()));

        let rk = keys::retrieval("q", &fp(), "semantic|research");
        cache.put_retrieval(rk.clone(), vec![]).await.unwrap();
        assert_eq!(cache.get_retrieval(&rk).await, Some(vec![]));

        let ak = keys::answer("q", &fp());
        cache.put_answer(ak.clone(), answer("hello")).await.unwrap();
        assert_eq!(cache.get_answer(&ak).await, Some(answer("hello")));
    }

    #[tokio::test]
    async fn test_levels_are_independent() {
        let cache = CacheManager::new(&config(4));
        let key = keys::answer("q", &fp());
        cache.put_answer(key.clone(), answer("a")).await.unwrap();
        assert!(cache.get(CacheLevel::Retrieval, &key).await.is_none());
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_rejected() {
        let cache = CacheManager::new(&config(4));
        let result = cache
            .put(CacheLevel::Retrieval, keys::answer("q", &fp()), CacheValue::Answer(answer("a")))
            .await;
        assert!(matches!(result, Err(AppError::CacheError { .. })));
    }

    #[tokio::test]
    async fn test_lru_evicts_least_recently_used() {
        let cache = CacheManager::new(&config(2));
        let (a, b, c) = (keys::answer("a", &fp()), keys::answer("b", &fp()), keys::answer("c", &fp()));

        cache.put_answer(a.clone(), answer("a")).await.unwrap();
        cache.put_answer(b.clone(), answer("b")).await.unwrap();
        // Touch a so b becomes least recently used
        assert!(cache.get_answer(&a).await.is_some());
        cache.put_answer(c.clone(), answer("c")).await.unwrap();

        assert!(cache.get_answer(&b).await.is_none());
        assert!(cache.get_answer(&a).await.is_some());
        assert!(cache.get_answer(&c).await.is_some());

        let stats = cache.stats().await.answer;
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entries, 2);
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.hits, 3);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = CacheManager::new(&config(2));
        {
            let mut level = cache.answer.lock().await;
            level.ttl = Some(Duration::from_millis(10));
        }
        let key = keys::answer("q", &fp());
        cache.put_answer(key.clone(), answer("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(cache.get_answer(&key).await.is_none());
        assert_eq!(cache.stats().await.answer.entries, 0);
    }

    #[test]
    fn test_session_context_changes_keys() {
        let faculty = SessionFingerprint::from_turn(
            &ConversationTurn::new("x", "x", Some(Domain::FacultyInfo)).with_entities(vec!["nimesh-gupta".into()], vec![]),
        );
        let labs = SessionFingerprint::from_turn(&ConversationTurn::new("x", "x", Some(Domain::Labs)));

        assert_ne!(keys::answer("his publications", &faculty), keys::answer("his publications", &labs));
        assert_ne!(
            keys::classification("his publications", &faculty),
            keys::classification("his publications", &labs)
        );
        // Same parts, different level
        assert_ne!(keys::answer("q", &fp()), keys::classification("q", &fp()));
    }

    #[test]
    fn test_length_prefix_prevents_part_collisions() {
        assert_ne!(
            keys::retrieval("ab", &fp(), "c"),
            keys::retrieval("a", &fp(), "bc")
        );
    }

    proptest! {
        #[test]
        fn prop_keys_are_pure(query in ".{0,40}", signature in "[a-z|=,]{0,20}") {
            let first = keys::retrieval(&query, &fp(), &signature);
            let second = keys::retrieval(&query, &fp(), &signature);
            prop_assert_eq!(first.as_str().len(), 64);
            prop_assert_eq!(first, second);
        }
    }
}
