//! Conversation Memory - bounded per-session turn history
//!
//! Sessions hold at most `max_turns` turns with FIFO eviction. Idle sessions
//! expire after the configured TTL and the total number of sessions is capped,
//! dropping the least recently active one first. All mutation goes through a
//! single async mutex so append and read are atomic per call.

use crate::config::MemoryConfig;
use crate::domain::Domain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Longest answer excerpt kept per turn
pub const ANSWER_EXCERPT_CHARS: usize = 300;

/// One completed question/answer exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: String,
    pub normalized_query: String,
    pub domain: Option<Domain>,
    pub entity_ids: Vec<String>,
    pub entity_names: Vec<String>,
    /// Titles (or ids) of the passages the answer was built from
    pub passage_summary: Vec<String>,
    pub answer_excerpt: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn new(query: impl Into<String>, normalized_query: impl Into<String>, domain: Option<Domain>) -> Self {
        Self {
            query: query.into(),
            normalized_query: normalized_query.into(),
            domain,
            entity_ids: Vec::new(),
            entity_names: Vec::new(),
            passage_summary: Vec::new(),
            answer_excerpt: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_entities(mut self, ids: Vec<String>, names: Vec<String>) -> Self {
        self.entity_ids = ids;
        self.entity_names = names;
        self
    }

    pub fn with_passages(mut self, summary: Vec<String>) -> Self {
        self.passage_summary = summary;
        self
    }

    pub fn with_answer(mut self, answer: &str) -> Self {
        self.answer_excerpt = answer.chars().take(ANSWER_EXCERPT_CHARS).collect();
        self
    }
}

/// The part of a session that influences classification, used in cache keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionFingerprint(String);

impl SessionFingerprint {
    pub fn empty() -> Self {
        Self("none".to_string())
    }

    pub fn from_turn(turn: &ConversationTurn) -> Self {
        let mut ids = turn.entity_ids.clone();
        ids.sort();
        ids.dedup();
        let domain = turn.domain.map(|d| d.as_str()).unwrap_or("none");
        Self(format!("{}|{}", domain, ids.join(",")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Recent turns and the fingerprint derived from them, read under one lock
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    /// Oldest first
    pub recent: Vec<ConversationTurn>,
    pub fingerprint: SessionFingerprint,
}

impl SessionSnapshot {
    pub fn last_turn(&self) -> Option<&ConversationTurn> {
        self.recent.last()
    }
}

/// A single conversation
#[derive(Debug)]
pub struct Session {
    id: String,
    turns: VecDeque<ConversationTurn>,
    max_turns: usize,
    last_active: Instant,
}

impl Session {
    fn new(id: &str, max_turns: usize) -> Self {
        Self {
            id: id.to_string(),
            turns: VecDeque::with_capacity(max_turns),
            max_turns,
            last_active: Instant::now(),
        }
    }

    fn push(&mut self, turn: ConversationTurn) {
        while self.turns.len() >= self.max_turns {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
        self.last_active = Instant::now();
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// Shared store of sessions
pub struct ConversationMemory {
    sessions: Mutex<HashMap<String, Session>>,
    max_turns: usize,
    max_sessions: usize,
    session_ttl: Option<Duration>,
}

impl ConversationMemory {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_turns: config.max_turns.max(1),
            max_sessions: config.max_sessions.max(1),
            session_ttl: (config.session_ttl_secs > 0).then(|| Duration::from_secs(config.session_ttl_secs)),
        }
    }

    /// Override the idle TTL (mostly useful for short-lived tests)
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = Some(ttl);
        self
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Append a completed turn, creating the session if needed
    pub async fn append(&self, session_id: &str, turn: ConversationTurn) {
        let mut sessions = self.sessions.lock().await;
        self.expire(&mut sessions);

        if !sessions.contains_key(session_id) && sessions.len() >= self.max_sessions {
            let oldest = sessions
                .iter()
                .min_by_key(|(_, s)| s.last_active)
                .map(|(id, _)| id.clone());
            if let Some(id) = oldest {
                sessions.remove(&id);
                tracing::debug!(session_id = %id, "Evicted least recently active session");
            }
        }

        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session::new(session_id, self.max_turns))
            .push(turn);
    }

    /// Up to `max_turns` most recent turns, oldest first
    pub async fn recent_context(&self, session_id: &str, max_turns: usize) -> Vec<ConversationTurn> {
        let mut sessions = self.sessions.lock().await;
        self.expire(&mut sessions);

        sessions
            .get(session_id)
            .map(|s| {
                let skip = s.turns.len().saturating_sub(max_turns);
                s.turns.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    /// Most recent turn, if any
    pub async fn last_turn(&self, session_id: &str) -> Option<ConversationTurn> {
        self.recent_context(session_id, 1).await.pop()
    }

    /// Fingerprint of the session's resolved context
    pub async fn fingerprint(&self, session_id: &str) -> SessionFingerprint {
        self.snapshot(session_id, 1).await.fingerprint
    }

    /// Up to `max_turns` recent turns (at least the last one) and their fingerprint
    pub async fn snapshot(&self, session_id: &str, max_turns: usize) -> SessionSnapshot {
        let recent = self.recent_context(session_id, max_turns.max(1)).await;
        let fingerprint = recent
            .last()
            .map(SessionFingerprint::from_turn)
            .unwrap_or_else(SessionFingerprint::empty);
        SessionSnapshot { recent, fingerprint }
    }

    /// Forget a session; returns whether it existed
    pub async fn clear(&self, session_id: &str) -> bool {
        self.sessions.lock().await.remove(session_id).is_some()
    }

    pub async fn session_count(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        self.expire(&mut sessions);
        sessions.len()
    }

    fn expire(&self, sessions: &mut HashMap<String, Session>) {
        if let Some(ttl) = self.session_ttl {
            sessions.retain(|_, s| s.last_active.elapsed() <= ttl);
        }
    }
}
