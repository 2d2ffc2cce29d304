//! Entity Registry - static knowledge of people, departments and labs
//!
//! Loaded once at startup from JSON and read-only afterwards. Matching runs in
//! stages and the first stage that produces a match wins:
//! special positions and exact aliases, first names, shared surnames, fuzzy names.

use crate::context::query::{is_stop_word, name_tokens, tokenize, TITLES};
use crate::domain::Domain;
use crate::errors::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// Kind of named entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    #[default]
    Person,
    Department,
    Lab,
}

/// A known named entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Stable key, also used as the document metadata link
    pub id: String,

    /// Display name, e.g. "Dr. Monica Sundd"
    pub canonical_name: String,

    /// Nicknames, abbreviated forms and title variants
    #[serde(default)]
    pub aliases: Vec<String>,

    /// First name used for casual lookups ("monica email")
    #[serde(default)]
    pub first_name: Option<String>,

    #[serde(default)]
    pub kind: EntityKind,

    /// Domain tags; each match adds weight to these domains
    pub domains: Vec<Domain>,

    /// Optional attributes (email, extension, ...)
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,

    /// Topic words that pick this entity among people sharing a surname
    #[serde(default)]
    pub disambiguation_clues: Vec<String>,
}

/// How an entity was recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    Alias,
    SpecialPosition,
    FirstName,
    Surname,
    Partial,
    /// Carried over from the previous turn of the session
    Inherited,
}

impl MatchKind {
    /// Confidence assigned to matches of this kind
    pub fn confidence(&self) -> f32 {
        match self {
            MatchKind::Exact => 1.0,
            MatchKind::Alias => 0.95,
            MatchKind::SpecialPosition => 0.9,
            MatchKind::FirstName => 0.85,
            MatchKind::Surname => 0.75,
            MatchKind::Partial => 0.7,
            MatchKind::Inherited => 1.0,
        }
    }
}

/// A registry hit within a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMatch {
    pub entity_id: String,
    pub canonical_name: String,
    pub matched_text: String,
    pub kind: MatchKind,
    pub confidence: f32,
    pub domains: Vec<Domain>,
}

/// Result of scanning a query against the registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityScan {
    pub matches: Vec<EntityMatch>,

    /// Several people share the matched surname and nothing in the query
    /// tells them apart; `matches` holds every candidate.
    pub ambiguous: bool,
}

impl EntityScan {
    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.matches.iter().map(|m| m.entity_id.clone()).collect()
    }
}

#[derive(Debug, Deserialize)]
struct RegistryFile {
    entities: Vec<Entity>,
    #[serde(default)]
    special_positions: BTreeMap<String, String>,
    #[serde(default)]
    false_positives: Vec<String>,
}

/// Words that make a bare first name or a fuzzy name plausible
const ACADEMIC_CONTEXT: &[&str] = &[
    "faculty", "scientist", "professor", "research", "researcher", "lab", "laboratory",
    "publication", "publications", "papers", "email", "contact", "phone", "extension",
    "office", "work", "works", "group", "team", "members", "about", "who", "profile",
    "students", "projects",
];

/// Phrases that ask for a list rather than a person
const LIST_PATTERNS: &[&str] = &[
    "list of faculty", "all faculty", "faculty list", "faculty members", "list faculty",
    "list of scientists", "all scientists", "alumni list", "list of alumni", "former faculty",
];

const FAREWELLS: &[&str] = &["bye", "goodbye", "thanks", "thank", "exit", "quit", "ok", "okay"];

/// Registry of known entities with precomputed lookup tables
pub struct EntityRegistry {
    entities: Vec<Entity>,
    by_id: HashMap<String, usize>,
    /// (alias tokens, entity index, kind), longest alias first
    aliases: Vec<(Vec<String>, usize, MatchKind)>,
    first_names: HashMap<String, Vec<usize>>,
    surnames: HashMap<String, Vec<usize>>,
    special_positions: Vec<(Vec<String>, usize)>,
    false_positives: Vec<String>,
}

impl EntityRegistry {
    /// Load the registry from a JSON file. Failure here is fatal at startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| AppError::RegistryLoad {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;

        let registry = Self::from_json(&raw).map_err(|e| match e {
            AppError::RegistryLoad { message, .. } => AppError::RegistryLoad {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })?;

        tracing::info!(
            path = %path.display(),
            entities = registry.len(),
            "Entity registry loaded"
        );
        Ok(registry)
    }

    /// Parse a registry document
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: RegistryFile = serde_json::from_str(raw).map_err(|e| AppError::RegistryLoad {
            path: "<inline>".to_string(),
            message: e.to_string(),
        })?;
        Self::new(file.entities, file.special_positions, file.false_positives)
    }

    /// Build a registry, validating ids and special-position targets
    pub fn new(
        entities: Vec<Entity>,
        special_positions: BTreeMap<String, String>,
        false_positives: Vec<String>,
    ) -> Result<Self> {
        let invalid = |message: String| AppError::RegistryLoad {
            path: "<inline>".to_string(),
            message,
        };

        let mut by_id = HashMap::new();
        for (idx, entity) in entities.iter().enumerate() {
            if entity.id.trim().is_empty() || name_tokens(&entity.canonical_name).is_empty() {
                return Err(invalid(format!("entity #{} has an empty id or name", idx)));
            }
            if entity.domains.is_empty() {
                return Err(invalid(format!("entity '{}' has no domain tags", entity.id)));
            }
            if by_id.insert(entity.id.clone(), idx).is_some() {
                return Err(invalid(format!("duplicate entity id '{}'", entity.id)));
            }
        }

        let mut aliases = Vec::new();
        let mut first_names: HashMap<String, Vec<usize>> = HashMap::new();
        let mut surnames: HashMap<String, Vec<usize>> = HashMap::new();

        for (idx, entity) in entities.iter().enumerate() {
            let canonical = name_tokens(&entity.canonical_name);
            let mut seen: HashSet<Vec<String>> = HashSet::new();

            seen.insert(canonical.clone());
            aliases.push((canonical.clone(), idx, MatchKind::Exact));

            for alias in &entity.aliases {
                let tokens = name_tokens(alias);
                if !tokens.is_empty() && seen.insert(tokens.clone()) {
                    aliases.push((tokens, idx, MatchKind::Alias));
                }
            }

            if entity.kind == EntityKind::Person {
                let first = entity
                    .first_name
                    .as_deref()
                    .map(name_tokens)
                    .and_then(|t| t.into_iter().next())
                    .or_else(|| canonical.first().cloned());
                if let Some(first) = first {
                    first_names.entry(first).or_default().push(idx);
                }
                if canonical.len() > 1 {
                    if let Some(last) = canonical.last() {
                        surnames.entry(last.clone()).or_default().push(idx);
                    }
                }
            }
        }

        // Longest alias first so "rajesh kumar yadav" wins over "rajesh kumar"
        aliases.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.1.cmp(&b.1)));

        let mut positions = Vec::new();
        for (phrase, target) in special_positions {
            let idx = *by_id
                .get(&target)
                .ok_or_else(|| invalid(format!("special position '{}' points to unknown entity '{}'", phrase, target)))?;
            positions.push((tokenize(&phrase), idx));
        }

        Ok(Self {
            entities,
            by_id,
            aliases,
            first_names,
            surnames,
            special_positions: positions,
            false_positives: false_positives.iter().map(|p| tokenize(p).join(" ")).collect(),
        })
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.by_id.get(id).map(|&idx| &self.entities[idx])
    }

    /// Build a match for a known entity that was not named in the query text
    pub fn inherited_match(&self, id: &str, marker: &str) -> Option<EntityMatch> {
        self.get(id).map(|e| EntityMatch {
            entity_id: e.id.clone(),
            canonical_name: e.canonical_name.clone(),
            matched_text: marker.to_string(),
            kind: MatchKind::Inherited,
            confidence: MatchKind::Inherited.confidence(),
            domains: e.domains.clone(),
        })
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Find registry entities mentioned in a normalized query
    pub fn scan(&self, normalized_query: &str, partial_threshold: f32) -> EntityScan {
        let tokens = tokenize(normalized_query);
        if tokens.is_empty() || self.is_list_query(normalized_query) || Self::is_farewell(&tokens) {
            return EntityScan::default();
        }

        let names: Vec<String> = tokens
            .iter()
            .filter(|t| !TITLES.contains(&t.as_str()))
            .cloned()
            .collect();
        let has_title = tokens.iter().any(|t| TITLES.contains(&t.as_str()));
        let academic = has_title || tokens.iter().any(|t| ACADEMIC_CONTEXT.contains(&t.as_str()));

        let direct = self.match_aliases_and_positions(&tokens, &names);
        if !direct.is_empty() {
            return EntityScan { matches: direct, ambiguous: false };
        }

        let joined = tokens.join(" ");
        if self.false_positives.iter().any(|fp| contains_phrase(&joined, fp)) {
            return EntityScan::default();
        }

        if academic {
            let scan = self.match_first_names(&names, &tokens);
            if !scan.is_empty() {
                return scan;
            }
        }

        let scan = self.match_surnames(&names, &tokens, academic);
        if !scan.is_empty() {
            return scan;
        }

        if academic {
            return self.match_partial(&names, partial_threshold);
        }

        EntityScan::default()
    }

    fn match_aliases_and_positions(&self, tokens: &[String], names: &[String]) -> Vec<EntityMatch> {
        let mut matches: Vec<EntityMatch> = Vec::new();
        let mut consumed = vec![false; names.len()];

        for (alias, idx, kind) in &self.aliases {
            if let Some(start) = find_sequence(names, alias, &consumed) {
                for flag in consumed.iter_mut().skip(start).take(alias.len()) {
                    *flag = true;
                }
                self.push_match(&mut matches, *idx, alias.join(" "), *kind, 1.0);
            }
        }

        for (phrase, idx) in &self.special_positions {
            if find_sequence(tokens, phrase, &vec![false; tokens.len()]).is_some() {
                self.push_match(&mut matches, *idx, phrase.join(" "), MatchKind::SpecialPosition, 1.0);
            }
        }

        matches
    }

    fn match_first_names(&self, names: &[String], tokens: &[String]) -> EntityScan {
        for token in names {
            let Some(candidates) = self.first_names.get(token) else {
                continue;
            };
            if candidates.len() == 1 {
                let mut matches = Vec::new();
                self.push_match(&mut matches, candidates[0], token.clone(), MatchKind::FirstName, 1.0);
                return EntityScan { matches, ambiguous: false };
            }
            return self.disambiguate(candidates, token, tokens, MatchKind::FirstName);
        }
        EntityScan::default()
    }

    fn match_surnames(&self, names: &[String], tokens: &[String], academic: bool) -> EntityScan {
        for token in names {
            let Some(candidates) = self.surnames.get(token) else {
                continue;
            };
            if candidates.len() == 1 {
                // A unique surname alone is only trusted with a title or context word
                if !academic {
                    continue;
                }
                let mut matches = Vec::new();
                self.push_match(&mut matches, candidates[0], token.clone(), MatchKind::Surname, 1.0);
                return EntityScan { matches, ambiguous: false };
            }
            return self.disambiguate(candidates, token, tokens, MatchKind::Surname);
        }
        EntityScan::default()
    }

    /// Pick among people sharing a name using clue words and initials
    fn disambiguate(&self, candidates: &[usize], token: &str, tokens: &[String], kind: MatchKind) -> EntityScan {
        let position = tokens.iter().position(|t| t == token);
        let initial = position
            .and_then(|p| p.checked_sub(1))
            .map(|p| tokens[p].as_str())
            .filter(|t| t.chars().count() == 1);

        let mut scored: Vec<(usize, usize)> = candidates
            .iter()
            .map(|&idx| {
                let entity = &self.entities[idx];
                let mut score = entity
                    .disambiguation_clues
                    .iter()
                    .filter(|clue| {
                        let clue_tokens = tokenize(clue);
                        !clue_tokens.is_empty() && find_sequence(tokens, &clue_tokens, &vec![false; tokens.len()]).is_some()
                    })
                    .count();
                if let Some(initial) = initial {
                    let first = name_tokens(&entity.canonical_name);
                    if first.first().is_some_and(|f| f.starts_with(initial)) {
                        score += 2;
                    }
                }
                (idx, score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        let mut matches = Vec::new();
        match scored.as_slice() {
            [(best, top), rest @ ..] if *top > 0 && rest.iter().all(|(_, s)| s < top) => {
                self.push_match(&mut matches, *best, token.to_string(), kind, 1.0);
                EntityScan { matches, ambiguous: false }
            }
            _ => {
                let mut ids: Vec<usize> = candidates.to_vec();
                ids.sort_unstable();
                for idx in ids {
                    self.push_match(&mut matches, idx, token.to_string(), kind, 0.6);
                }
                EntityScan { matches, ambiguous: true }
            }
        }
    }

    /// Word-overlap and edit-distance matching for misspelled names
    fn match_partial(&self, names: &[String], threshold: f32) -> EntityScan {
        let query_words: HashSet<&str> = names.iter().map(String::as_str).collect();

        // Multi-word aliases with enough words present
        let mut best: Option<(usize, f32, String)> = None;
        for (alias, idx, _) in &self.aliases {
            if alias.len() < 2 {
                continue;
            }
            let present = alias.iter().filter(|w| query_words.contains(w.as_str())).count();
            let overlap = present as f32 / alias.len() as f32;
            if overlap >= 0.6 && best.as_ref().map_or(true, |(_, s, _)| overlap > *s) {
                best = Some((*idx, overlap, alias.join(" ")));
            }
        }

        // Single misspelled tokens against first names and surnames
        if best.is_none() {
            let mut fuzzy: Vec<(usize, f32, String)> = Vec::new();
            for token in names.iter().filter(|t| t.chars().count() >= 4 && !is_stop_word(t)) {
                for (name, owners) in self.first_names.iter().chain(self.surnames.iter()) {
                    if owners.len() != 1 || name.chars().count() < 4 {
                        continue;
                    }
                    let similarity = edit_similarity(token, name);
                    if similarity >= threshold {
                        fuzzy.push((owners[0], similarity, token.clone()));
                    }
                }
            }
            fuzzy.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            let distinct: HashSet<usize> = fuzzy
                .iter()
                .filter(|(_, s, _)| fuzzy.first().is_some_and(|(_, top, _)| s == top))
                .map(|(idx, _, _)| *idx)
                .collect();
            if distinct.len() == 1 {
                best = fuzzy.into_iter().next();
            }
        }

        let mut matches = Vec::new();
        if let Some((idx, score, text)) = best {
            self.push_match(&mut matches, idx, text, MatchKind::Partial, score);
        }
        EntityScan { matches, ambiguous: false }
    }

    fn push_match(&self, matches: &mut Vec<EntityMatch>, idx: usize, text: String, kind: MatchKind, scale: f32) {
        let entity = &self.entities[idx];
        if matches.iter().any(|m| m.entity_id == entity.id) {
            return;
        }
        matches.push(EntityMatch {
            entity_id: entity.id.clone(),
            canonical_name: entity.canonical_name.clone(),
            matched_text: text,
            kind,
            confidence: kind.confidence() * scale,
            domains: entity.domains.clone(),
        });
    }

    fn is_list_query(&self, normalized: &str) -> bool {
        let joined = tokenize(normalized).join(" ");
        LIST_PATTERNS.iter().any(|p| contains_phrase(&joined, p))
    }

    fn is_farewell(tokens: &[String]) -> bool {
        tokens.iter().any(|t| FAREWELLS.contains(&t.as_str()))
            && tokens
                .iter()
                .all(|t| FAREWELLS.contains(&t.as_str()) || is_stop_word(t) || t == "you")
    }
}

/// First start index where `needle` occurs contiguously in `haystack`
/// without touching consumed positions
fn find_sequence(haystack: &[String], needle: &[String], consumed: &[bool]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    (0..=haystack.len() - needle.len()).find(|&start| {
        haystack[start..start + needle.len()] == *needle
            && !consumed[start..start + needle.len()].iter().any(|c| *c)
    })
}

/// Phrase containment on token boundaries
pub(crate) fn contains_phrase(joined_tokens: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let padded = format!(" {} ", joined_tokens);
    padded.contains(&format!(" {} ", phrase))
}

/// 1 - levenshtein(a, b) / max(len)
pub fn edit_similarity(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let longest = a.len().max(b.len());
    if longest == 0 {
        return 1.0;
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    1.0 - prev[b.len()] as f32 / longest as f32
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const REGISTRY_JSON: &str = r#"{
        "entities": [
            {"id": "monica-sundd", "canonical_name": "Dr. Monica Sundd",
             "aliases": ["M. Sundd", "Monica Sundd"], "domains": ["faculty"],
             "attributes": {"email": "monica@nii.ac.in", "extension": "2231"}},
            {"id": "nimesh-gupta", "canonical_name": "Dr. Nimesh Gupta",
             "domains": ["faculty"], "disambiguation_clues": ["vaccine", "immunology", "t cell"]},
            {"id": "sarika-gupta", "canonical_name": "Dr. Sarika Gupta",
             "domains": ["faculty"], "disambiguation_clues": ["glycobiology", "molecular"]},
            {"id": "debasisa-mohanty", "canonical_name": "Dr. Debasisa Mohanty",
             "domains": ["faculty", "institutional"]},
            {"id": "rajesh-kumar-yadav", "canonical_name": "Rajesh Kumar Yadav",
             "aliases": ["R K Yadav"], "domains": ["staff"]},
            {"id": "arnab", "canonical_name": "Dr. Arnab", "domains": ["faculty"]},
            {"id": "structural-biology-lab", "canonical_name": "Structural Biology Lab",
             "kind": "lab", "domains": ["labs"]}
        ],
        "special_positions": {"director": "debasisa-mohanty"},
        "false_positives": ["monica geller"]
    }"#;

    pub(crate) fn registry() -> EntityRegistry {
        EntityRegistry::from_json(REGISTRY_JSON).unwrap()
    }

    fn ids(scan: &EntityScan) -> Vec<&str> {
        scan.matches.iter().map(|m| m.entity_id.as_str()).collect()
    }

    #[test]
    fn test_exact_match_ignores_titles() {
        let scan = registry().scan("tell me about dr. monica sundd", 0.8);
        assert_eq!(ids(&scan), vec!["monica-sundd"]);
        assert_eq!(scan.matches[0].kind, MatchKind::Exact);
        assert!(!scan.ambiguous);
    }

    #[test]
    fn test_alias_match() {
        let scan = registry().scan("publications of m. sundd", 0.8);
        assert_eq!(ids(&scan), vec!["monica-sundd"]);
        assert_eq!(scan.matches[0].kind, MatchKind::Alias);
    }

    #[test]
    fn test_multiple_people_in_one_query() {
        let scan = registry().scan("compare nimesh gupta and sarika gupta", 0.8);
        assert_eq!(ids(&scan), vec!["nimesh-gupta", "sarika-gupta"]);
    }

    #[test]
    fn test_special_position() {
        let scan = registry().scan("who is the director", 0.8);
        assert_eq!(ids(&scan), vec!["debasisa-mohanty"]);
        assert_eq!(scan.matches[0].kind, MatchKind::SpecialPosition);
    }

    #[test]
    fn test_first_name_needs_context() {
        let reg = registry();
        assert_eq!(ids(&reg.scan("monica email", 0.8)), vec!["monica-sundd"]);
        assert!(reg.scan("monica", 0.8).is_empty());
        assert!(reg.scan("who is monica geller", 0.8).is_empty());
    }

    #[test]
    fn test_shared_surname_is_ambiguous_without_clues() {
        let scan = registry().scan("dr. gupta", 0.8);
        assert!(scan.ambiguous);
        assert_eq!(ids(&scan), vec!["nimesh-gupta", "sarika-gupta"]);
    }

    #[test]
    fn test_shared_surname_resolved_by_clue() {
        let scan = registry().scan("dr. gupta vaccine research", 0.8);
        assert!(!scan.ambiguous);
        assert_eq!(ids(&scan), vec!["nimesh-gupta"]);
    }

    #[test]
    fn test_shared_surname_resolved_by_initial() {
        let scan = registry().scan("s gupta publications", 0.8);
        assert_eq!(ids(&scan), vec!["sarika-gupta"]);
    }

    #[test]
    fn test_fuzzy_surname() {
        let scan = registry().scan("dr. mohanti publications", 0.8);
        assert_eq!(ids(&scan), vec!["debasisa-mohanty"]);
        assert_eq!(scan.matches[0].kind, MatchKind::Partial);
    }

    #[test]
    fn test_list_and_farewell_queries_skip_matching() {
        let reg = registry();
        assert!(reg.scan("list of faculty", 0.8).is_empty());
        assert!(reg.scan("thank you", 0.8).is_empty());
    }

    #[test]
    fn test_longest_alias_wins() {
        let scan = registry().scan("r k yadav extension", 0.8);
        assert_eq!(ids(&scan), vec!["rajesh-kumar-yadav"]);
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let raw = r#"{"entities": [
            {"id": "a", "canonical_name": "A B", "domains": ["staff"]},
            {"id": "a", "canonical_name": "C D", "domains": ["staff"]}
        ]}"#;
        assert!(matches!(EntityRegistry::from_json(raw), Err(AppError::RegistryLoad { .. })));
    }

    #[test]
    fn test_rejects_dangling_special_position() {
        let raw = r#"{"entities": [{"id": "a", "canonical_name": "A B", "domains": ["staff"]}],
                      "special_positions": {"director": "nobody"}}"#;
        assert!(EntityRegistry::from_json(raw).is_err());
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let err = EntityRegistry::load("/definitely/not/here.json").err().unwrap();
        assert!(matches!(err, AppError::RegistryLoad { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entities.json");
        std::fs::write(&path, REGISTRY_JSON).unwrap();
        let reg = EntityRegistry::load(&path).unwrap();
        assert_eq!(reg.len(), 7);
        assert_eq!(reg.get("monica-sundd").unwrap().attributes["extension"], "2231");
    }

    #[test]
    fn test_edit_similarity() {
        assert_eq!(edit_similarity("sundd", "sundd"), 1.0);
        assert!((edit_similarity("sund", "sundd") - 0.8).abs() < 1e-6);
        assert!(edit_similarity("lab", "gupta") < 0.5);
    }
}
