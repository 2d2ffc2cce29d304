//! Context Assembler - builds the generation payload
//!
//! Provides:
//! - Deduplication by source document
//! - Byte budget management (conversation memory is reserved first)
//! - Prompt context rendering with numbered sources

use crate::collections::{compare_passages, RetrievedPassage};
use crate::config::ContextConfig;
use crate::context::memory::ConversationTurn;
use crate::domain::Domain;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A passage as it will be shown to the generator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextPassage {
    /// 1-based citation index
    pub index: usize,
    pub doc_id: String,
    pub collection: Domain,
    pub title: String,
    pub source: Option<String>,
    pub year: Option<i32>,
    pub content: String,
    pub score: f32,
    /// Content was cut to fit the budget
    pub trimmed: bool,
}

/// Reference to a source shown alongside an answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCitation {
    pub index: usize,
    pub doc_id: String,
    pub title: String,
    pub collection: Domain,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
}

impl From<&ContextPassage> for SourceCitation {
    fn from(p: &ContextPassage) -> Self {
        Self {
            index: p.index,
            doc_id: p.doc_id.clone(),
            title: p.title.clone(),
            collection: p.collection,
            source: p.source.clone(),
            year: p.year,
        }
    }
}

/// Everything the generator needs for one answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationPayload {
    pub question: String,
    pub domain: Domain,
    pub passages: Vec<ContextPassage>,
    pub memory_summary: String,
    pub rendered_context: String,
    /// Retrieval failed or was partial; the answer should say so
    pub degraded: bool,
    /// Passages dropped because they did not fit
    pub dropped: usize,
}

impl GenerationPayload {
    pub fn citations(&self) -> Vec<SourceCitation> {
        self.passages.iter().map(SourceCitation::from).collect()
    }

    pub fn has_passages(&self) -> bool {
        !self.passages.is_empty()
    }
}

/// Context assembler
pub struct ContextAssembler {
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(config: ContextConfig) -> Self {
        Self { config }
    }

    /// Assemble passages and recent turns into a payload within the byte budget
    pub fn assemble(
        &self,
        question: &str,
        domain: Domain,
        passages: &[RetrievedPassage],
        recent_turns: &[ConversationTurn],
        degraded: bool,
    ) -> GenerationPayload {
        let summary = self.summarize_memory(recent_turns);
        let memory_summary = truncate_bytes(&summary, self.config.max_context_bytes).to_string();
        let mut remaining = self.config.max_context_bytes.saturating_sub(memory_summary.len());

        let mut ordered: Vec<&RetrievedPassage> = passages.iter().collect();
        ordered.sort_by(|a, b| compare_passages(a, b));

        let mut seen = HashSet::new();
        let unique: Vec<&RetrievedPassage> = ordered
            .into_iter()
            .filter(|p| seen.insert(p.dedup_key().to_string()))
            .collect();

        let mut selected: Vec<ContextPassage> = Vec::new();
        let mut rendered = String::new();

        for passage in &unique {
            let mut candidate = ContextPassage {
                index: selected.len() + 1,
                doc_id: passage.doc_id.clone(),
                collection: passage.collection,
                title: passage.display_title().to_string(),
                source: passage.metadata.source.clone(),
                year: passage.metadata.year,
                content: truncate_chars(&passage.content, self.config.max_passage_chars),
                score: passage.score,
                trimmed: false,
            };

            let block = render_passage(&candidate);
            if block.len() <= remaining {
                remaining -= block.len();
                rendered.push_str(&block);
                selected.push(candidate);
                continue;
            }

            // First passage that does not fit: trim it if enough room is left
            if remaining >= self.config.min_passage_bytes {
                let overhead = block.len() - candidate.content.len();
                let budget = remaining.saturating_sub(overhead);
                if budget > 0 {
                    candidate.content = truncate_bytes(&candidate.content, budget).to_string();
                    candidate.trimmed = true;
                    let block = render_passage(&candidate);
                    rendered.push_str(&block);
                    selected.push(candidate);
                }
            }
            break;
        }

        let dropped = unique.len() - selected.len();
        if dropped > 0 {
            tracing::debug!(dropped, kept = selected.len(), "Passages dropped to fit context budget");
        }

        if !memory_summary.is_empty() {
            rendered.push_str(&memory_summary);
        }

        GenerationPayload {
            question: question.to_string(),
            domain,
            passages: selected,
            memory_summary,
            rendered_context: rendered,
            degraded,
            dropped,
        }
    }

    fn summarize_memory(&self, turns: &[ConversationTurn]) -> String {
        let skip = turns.len().saturating_sub(self.config.memory_turns);
        let lines: Vec<String> = turns[skip..]
            .iter()
            .map(|turn| {
                let mut line = format!("- User asked: {}", turn.query);
                if !turn.entity_names.is_empty() {
                    line.push_str(&format!(" (about {})", turn.entity_names.join(", ")));
                }
                if !turn.answer_excerpt.is_empty() {
                    line.push_str(&format!(" | Answer: {}", turn.answer_excerpt));
                }
                let mut line = truncate_chars(&line, self.config.turn_summary_chars);
                line.push('\n');
                line
            })
            .collect();

        if lines.is_empty() {
            return String::new();
        }
        format!("Recent conversation:\n{}", lines.concat())
    }
}

fn render_passage(p: &ContextPassage) -> String {
    let mut header = format!("[{}] {} ({}", p.index, p.title, p.collection);
    if let Some(year) = p.year {
        header.push_str(&format!(", {}", year));
    }
    header.push(')');
    match &p.source {
        Some(url) => format!("{}\n{}\nSource: {}\n\n", header, p.content, url),
        None => format!("{}\n{}\n\n", header, p.content),
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Longest prefix of at most `max_bytes` that ends on a char boundary
fn truncate_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collections::DocumentMetadata;

    fn passage(id: &str, source_doc: Option<&str>, score: f32, content: &str) -> RetrievedPassage {
        RetrievedPassage {
            doc_id: id.to_string(),
            collection: Domain::Research,
            content: content.to_string(),
            score,
            metadata: DocumentMetadata {
                title: format!("Title {}", id),
                source_document: source_doc.map(str::to_string),
                ..Default::default()
            },
        }
    }

    fn config(max_context_bytes: usize) -> ContextConfig {
        ContextConfig {
            max_context_bytes,
            memory_turns: 2,
            turn_summary_chars: 80,
            min_passage_bytes: 40,
            max_passage_chars: 800,
        }
    }

    #[test]
    fn test_dedupes_by_source_document() {
        let assembler = ContextAssembler::new(config(10_000));
        let payload = assembler.assemble(
            "q",
            Domain::Research,
            &[
                passage("a1", Some("paper-a"), 0.9, "first chunk"),
                passage("a2", Some("paper-a"), 0.7, "second chunk"),
                passage("b1", None, 0.8, "other"),
            ],
            &[],
            false,
        );
        let ids: Vec<_> = payload.passages.iter().map(|p| p.doc_id.as_str()).collect();
        assert_eq!(ids, vec!["a1", "b1"]);
        assert_eq!(payload.passages[1].index, 2);
    }

    #[test]
    fn test_budget_drops_lowest_relevance_first() {
        let body = "x".repeat(300);
        let assembler = ContextAssembler::new(config(680));
        let payload = assembler.assemble(
            "q",
            Domain::Research,
            &[
                passage("low", None, 0.2, &body),
                passage("high", None, 0.9, &body),
                passage("mid", None, 0.5, &body),
            ],
            &[],
            false,
        );

        assert_eq!(payload.passages[0].doc_id, "high");
        assert!(payload.passages.iter().all(|p| p.doc_id != "low"));
        assert!(payload.rendered_context.len() <= 680);
        assert_eq!(payload.dropped, 1);
    }

    #[test]
    fn test_trims_first_passage_that_does_not_fit() {
        let assembler = ContextAssembler::new(config(400));
        let payload = assembler.assemble(
            "q",
            Domain::Research,
            &[passage("big", None, 0.9, &"y".repeat(1_000))],
            &[],
            false,
        );
        assert_eq!(payload.passages.len(), 1);
        assert!(payload.passages[0].trimmed);
        assert!(payload.rendered_context.len() <= 400);
    }

    #[test]
    fn test_memory_is_never_dropped() {
        let turns = vec![
            ConversationTurn::new("who is dr nimesh gupta", "who is dr nimesh gupta", Some(Domain::FacultyInfo))
                .with_entities(vec!["nimesh-gupta".into()], vec!["Dr. Nimesh Gupta".into()]),
        ];
        let assembler = ContextAssembler::new(config(200));
        let payload = assembler.assemble(
            "his lab",
            Domain::Labs,
            &[passage("p", None, 0.9, &"z".repeat(1_000))],
            &turns,
            false,
        );

        assert!(payload.memory_summary.contains("Dr. Nimesh Gupta"));
        assert!(payload.rendered_context.contains(&payload.memory_summary));
        assert!(payload.rendered_context.len() <= 200);
    }

    #[test]
    fn test_memory_summary_is_clamped_to_budget() {
        let turns = vec![
            ConversationTurn::new("a".repeat(200), "a", Some(Domain::Research)).with_answer(&"b".repeat(200)),
            ConversationTurn::new("c".repeat(200), "c", Some(Domain::Research)).with_answer(&"d".repeat(200)),
        ];
        let assembler = ContextAssembler::new(config(60));
        let payload = assembler.assemble("q", Domain::Research, &[passage("p", None, 0.9, "body")], &turns, false);

        assert!(payload.memory_summary.len() <= 60);
        assert!(payload.rendered_context.len() <= 60);
        assert!(payload.passages.is_empty());
    }

    #[test]
    fn test_empty_passages_still_produce_payload() {
        let turns = vec![ConversationTurn::new("hi", "hi", None)];
        let assembler = ContextAssembler::new(config(1_000));
        let payload = assembler.assemble("q", Domain::Staff, &[], &turns, true);
        assert!(!payload.has_passages());
        assert!(payload.degraded);
        assert!(!payload.memory_summary.is_empty());
    }

    #[test]
    fn test_truncate_bytes_respects_char_boundaries() {
        assert_eq!(truncate_bytes("héllo", 2), "h");
        assert_eq!(truncate_bytes("abc", 10), "abc");
    }
}
