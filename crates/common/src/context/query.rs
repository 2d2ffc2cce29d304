//! Query - the immutable unit of work flowing through the pipeline
//!
//! Provides:
//! - Text normalization (case folding, diacritic folding, whitespace collapse)
//! - Tokenization shared by the classifier, registry and embedder
//! - Stop word filtering

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user question. Fields are private so a Query cannot change after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    raw: String,
    normalized: String,
    session_id: String,
    timestamp: DateTime<Utc>,
}

impl Query {
    /// Create a query, normalizing the raw text once
    pub fn new(raw: impl Into<String>, session_id: impl Into<String>) -> Self {
        let raw = raw.into();
        let normalized = normalize(&raw);
        Self {
            raw,
            normalized,
            session_id: session_id.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Tokens of the normalized text
    pub fn tokens(&self) -> Vec<String> {
        tokenize(&self.normalized)
    }
}

/// Lowercase, fold diacritics and collapse whitespace
pub fn normalize(text: &str) -> String {
    let folded: String = text.chars().flat_map(fold_char).collect();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split on anything that is not alphanumeric, after normalization.
/// Possessive "'s" is dropped so "gupta's" tokenizes to "gupta".
pub fn tokenize(text: &str) -> Vec<String> {
    let normalized = normalize(text);
    normalized
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .map(|t| t.strip_suffix("'s").unwrap_or(t))
        .flat_map(|t| t.split('\''))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokens with honorifics removed ("dr", "prof", ...)
pub fn name_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !TITLES.contains(&t.as_str()))
        .collect()
}

/// Honorifics ignored when matching names
pub const TITLES: &[&str] = &["dr", "prof", "professor", "mr", "mrs", "ms", "sir", "madam"];

const STOP_WORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been",
    "in", "on", "at", "to", "for", "of", "with", "by", "from",
    "and", "or", "but", "not", "this", "that", "these", "those",
    "it", "as", "do", "does", "did", "has", "have", "had",
    "can", "could", "will", "would", "should", "may", "might",
    "me", "my", "i", "you", "your", "what", "who", "which", "tell",
    "about", "please", "give", "show", "any", "some",
];

pub fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Lowercase one character and strip common Latin diacritics
fn fold_char(c: char) -> Vec<char> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ă' | 'ą'
        | 'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' | 'Ā' | 'Ă' | 'Ą' => 'a',
        'ç' | 'ć' | 'č' | 'Ç' | 'Ć' | 'Č' => 'c',
        'ď' | 'đ' | 'Ď' | 'Đ' => 'd',
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ė' | 'ę' | 'ě'
        | 'È' | 'É' | 'Ê' | 'Ë' | 'Ē' | 'Ė' | 'Ę' | 'Ě' => 'e',
        'ğ' | 'Ğ' => 'g',
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'į' | 'ı' | 'Ì' | 'Í' | 'Î' | 'Ï' | 'Ī' | 'Į' | 'İ' => 'i',
        'ł' | 'Ł' => 'l',
        'ñ' | 'ń' | 'ň' | 'Ñ' | 'Ń' | 'Ň' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő'
        | 'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' | 'Ō' | 'Ő' => 'o',
        'ř' | 'Ř' => 'r',
        'ś' | 'š' | 'ş' | 'Ś' | 'Š' | 'Ş' => 's',
        'ť' | 'ţ' | 'Ť' | 'Ţ' => 't',
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' | 'ų'
        | 'Ù' | 'Ú' | 'Û' | 'Ü' | 'Ū' | 'Ů' | 'Ű' | 'Ų' => 'u',
        'ý' | 'ÿ' | 'Ý' | 'Ÿ' => 'y',
        'ź' | 'ż' | 'ž' | 'Ź' | 'Ż' | 'Ž' => 'z',
        'ß' => return vec!['s', 's'],
        'æ' | 'Æ' => return vec!['a', 'e'],
        'œ' | 'Œ' => return vec!['o', 'e'],
        '\u{2018}' | '\u{2019}' => '\'',
        other => return other.to_lowercase().collect(),
    };
    vec![folded]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  Tell me about   Dr. Monica SUNDD "), "tell me about dr. monica sundd");
        assert_eq!(normalize("Café Müller"), "cafe muller");
        assert_eq!(normalize("Straße"), "strasse");
    }

    #[test]
    fn test_tokenize_drops_possessive() {
        assert_eq!(
            tokenize("Dr. Nimesh Gupta's lab"),
            vec!["dr", "nimesh", "gupta", "lab"]
        );
    }

    #[test]
    fn test_name_tokens_strip_titles() {
        assert_eq!(name_tokens("Prof. Anil Kumar"), vec!["anil", "kumar"]);
    }

    #[test]
    fn test_query_is_normalized_once() {
        let q = Query::new("  His   Publications ", "s1");
        assert_eq!(q.raw(), "  His   Publications ");
        assert_eq!(q.normalized(), "his publications");
        assert_eq!(q.session_id(), "s1");
        assert_eq!(q.tokens(), vec!["his", "publications"]);
    }
}
