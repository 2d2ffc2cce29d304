//! What the pipeline hands back to the presentation layer

use niibot_common::cache::CachedAnswer;
use niibot_common::context::SourceCitation;
use niibot_common::errors::{AppError, ErrorCode};
use niibot_common::Domain;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a query was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Answered,
    Refused,
    Degraded,
    RetryLater,
    Clarification,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Answered => "answered",
            Outcome::Refused => "refused",
            Outcome::Degraded => "degraded",
            Outcome::RetryLater => "retry_later",
            Outcome::Clarification => "clarification",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable note about why a response is not a plain answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub message: String,
}

impl Diagnostic {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<&AppError> for Diagnostic {
    fn from(err: &AppError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Response for one processed query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer_text: String,
    pub source_citations: Vec<SourceCitation>,
    pub domain: Domain,
    pub from_cache: bool,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<Diagnostic>,
}

impl QueryResponse {
    pub fn answered(answer_text: String, source_citations: Vec<SourceCitation>, domain: Domain) -> Self {
        Self {
            answer_text,
            source_citations,
            domain,
            from_cache: false,
            outcome: Outcome::Answered,
            diagnostic: None,
        }
    }

    pub fn cached(answer: CachedAnswer) -> Self {
        Self {
            answer_text: answer.answer_text,
            source_citations: answer.citations,
            domain: answer.domain,
            from_cache: true,
            outcome: Outcome::Answered,
            diagnostic: None,
        }
    }

    /// Refusals are attributed to the default domain; nothing was classified
    pub fn refused(message: String, diagnostic: Diagnostic) -> Self {
        Self {
            answer_text: message,
            source_citations: Vec::new(),
            domain: Domain::DEFAULT,
            from_cache: false,
            outcome: Outcome::Refused,
            diagnostic: Some(diagnostic),
        }
    }

    pub fn clarification(question: String, domain: Domain) -> Self {
        Self {
            answer_text: question,
            source_citations: Vec::new(),
            domain,
            from_cache: false,
            outcome: Outcome::Clarification,
            diagnostic: Some(Diagnostic::new(
                ErrorCode::AmbiguousEntity,
                "several people match the name in the question",
            )),
        }
    }

    pub fn with_outcome(mut self, outcome: Outcome, diagnostic: Option<Diagnostic>) -> Self {
        self.outcome = outcome;
        self.diagnostic = diagnostic;
        self
    }

    pub fn is_answer(&self) -> bool {
        self.outcome == Outcome::Answered
    }
}
