//! Domain Classifier - maps a question to one or more domains
//!
//! Provides:
//! - Entity scoring through the registry (each match weights its tag domains)
//! - Static keyword rules with per-domain weights
//! - Follow-up resolution from the previous turn ("his publications")
//! - Margin-based ambiguity with a fixed domain priority for ties

use crate::config::ClassifierConfig;
use crate::context::memory::ConversationTurn;
use crate::context::registry::{contains_phrase, EntityMatch, EntityRegistry};
use crate::context::query::tokenize;
use crate::domain::Domain;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Classification output, cached at the classification level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub primary_domain: Domain,

    /// Domains within the ambiguity margin of the primary, best first
    pub secondary_domains: Vec<Domain>,

    pub matched_entities: Vec<EntityMatch>,

    /// The top domain did not beat the runner-up by the configured margin
    pub ambiguous: bool,

    /// Several registry entities share the mentioned name
    pub ambiguous_entity: bool,

    pub entity_resolution: EntityResolution,

    pub scores: BTreeMap<Domain, f32>,
}

impl ClassificationResult {
    /// Primary domain followed by the secondary domains
    pub fn candidate_domains(&self) -> Vec<Domain> {
        std::iter::once(self.primary_domain)
            .chain(self.secondary_domains.iter().copied())
            .collect()
    }

    pub fn entity_ids(&self) -> Vec<String> {
        self.matched_entities.iter().map(|m| m.entity_id.clone()).collect()
    }

    pub fn entity_names(&self) -> Vec<String> {
        self.matched_entities.iter().map(|m| m.canonical_name.clone()).collect()
    }
}

/// Where the matched entities came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EntityResolution {
    #[default]
    None,
    Query,
    Memory,
}

struct KeywordRule {
    domain: Domain,
    phrases: &'static [&'static str],
    weight: f32,
}

/// Keyword rules; each rule adds its weight once when any phrase matches
const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        domain: Domain::FacultyInfo,
        phrases: &["faculty", "professor", "scientist", "profile", "background", "awards", "biography", "qualification"],
        weight: 1.0,
    },
    KeywordRule {
        domain: Domain::Staff,
        phrases: &["email", "e mail", "phone", "contact", "extension", "mobile", "telephone", "staff"],
        weight: 2.0,
    },
    KeywordRule {
        domain: Domain::Research,
        phrases: &["research", "research interests", "works on", "work on", "focus area", "studies", "scientific focus"],
        weight: 2.0,
    },
    KeywordRule {
        domain: Domain::Publications,
        phrases: &["publication", "publications", "paper", "papers", "articles", "journal", "published"],
        weight: 2.0,
    },
    KeywordRule {
        domain: Domain::Labs,
        phrases: &["lab", "labs", "laboratory", "facility", "facilities"],
        weight: 1.5,
    },
    KeywordRule {
        domain: Domain::Labs,
        phrases: &["team", "team members", "lab members", "group members", "alumni"],
        weight: 1.0,
    },
    KeywordRule {
        domain: Domain::ProgramsCourses,
        phrases: &["phd", "postdoc", "program", "programme", "programs", "course", "courses", "admission", "admissions", "training", "academics", "fellowship"],
        weight: 2.0,
    },
    KeywordRule {
        domain: Domain::Recruitments,
        phrases: &["job", "jobs", "vacancy", "vacancies", "recruitment", "recruitments", "hiring", "openings", "position open", "apply"],
        weight: 2.0,
    },
    KeywordRule {
        domain: Domain::Magazine,
        phrases: &["magazine", "immunoscope", "newsletter"],
        weight: 2.5,
    },
    KeywordRule {
        domain: Domain::NiiInfo,
        phrases: &["nii", "institute", "director", "mission", "history", "committee", "organization", "founded"],
        weight: 1.0,
    },
    KeywordRule {
        domain: Domain::NiiInfo,
        phrases: &["list of faculty", "all faculty", "faculty list", "alumni list", "list of alumni", "former faculty"],
        weight: 2.5,
    },
];

/// Words and phrases that point back at the previous turn
const REFERENCE_MARKERS: &[&str] = &[
    "his", "her", "hers", "him", "their", "them", "he", "she", "they", "its",
    "what about", "how about", "tell me more", "more about", "same person",
];

/// Deterministic scoring classifier over static rule tables
pub struct DomainClassifier {
    registry: Arc<EntityRegistry>,
    config: ClassifierConfig,
}

impl DomainClassifier {
    pub fn new(registry: Arc<EntityRegistry>, config: ClassifierConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Classify a normalized query, using the previous turn as a hint
    pub fn classify(&self, normalized_query: &str, last_turn: Option<&ConversationTurn>) -> ClassificationResult {
        let joined = tokenize(normalized_query).join(" ");
        let marker = REFERENCE_MARKERS.iter().find(|m| contains_phrase(&joined, m)).copied();

        let scan = self.registry.scan(normalized_query, self.config.partial_match_threshold);
        let ambiguous_entity = scan.ambiguous;
        let mut entities = scan.matches;
        let mut resolution = if entities.is_empty() { EntityResolution::None } else { EntityResolution::Query };

        let mut scores: BTreeMap<Domain, f32> = BTreeMap::new();
        for rule in KEYWORD_RULES {
            if rule.phrases.iter().any(|p| contains_phrase(&joined, p)) {
                *scores.entry(rule.domain).or_default() += rule.weight;
            }
        }
        let keyword_signal = !scores.is_empty();

        if entities.is_empty() {
            if let Some(turn) = last_turn {
                if marker.is_some() || !keyword_signal {
                    entities = turn
                        .entity_ids
                        .iter()
                        .filter_map(|id| self.registry.inherited_match(id, marker.unwrap_or("")))
                        .collect();
                    if !entities.is_empty() {
                        resolution = EntityResolution::Memory;
                        tracing::debug!(
                            entities = ?turn.entity_ids,
                            marker = marker.unwrap_or(""),
                            "Resolved entities from previous turn"
                        );
                    }
                }

                if entities.is_empty() && !keyword_signal {
                    if let Some(domain) = turn.domain {
                        *scores.entry(domain).or_default() += self.config.entity_weight;
                    }
                }
            }
        }

        for m in &entities {
            for domain in &m.domains {
                *scores.entry(*domain).or_default() += self.config.entity_weight * m.confidence;
            }
        }

        let result = self.decide(scores, entities, ambiguous_entity, resolution);
        crate::metrics::record_classification(result.primary_domain.as_str(), result.ambiguous);
        tracing::debug!(
            primary = %result.primary_domain,
            secondary = ?result.secondary_domains,
            ambiguous = result.ambiguous,
            entities = result.matched_entities.len(),
            "Classified query"
        );
        result
    }

    fn decide(
        &self,
        scores: BTreeMap<Domain, f32>,
        matched_entities: Vec<EntityMatch>,
        ambiguous_entity: bool,
        entity_resolution: EntityResolution,
    ) -> ClassificationResult {
        let mut ranked: Vec<(Domain, f32)> = scores
            .iter()
            .filter(|(_, s)| **s > 0.0)
            .map(|(d, s)| (*d, *s))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.priority().cmp(&b.0.priority()))
        });

        let Some(&(primary_domain, top)) = ranked.first() else {
            return ClassificationResult {
                primary_domain: Domain::DEFAULT,
                secondary_domains: Vec::new(),
                matched_entities,
                ambiguous: false,
                ambiguous_entity,
                entity_resolution,
                scores,
            };
        };

        let secondary_domains: Vec<Domain> = ranked[1..]
            .iter()
            .filter(|(_, s)| top - s <= self.config.ambiguity_margin)
            .map(|(d, _)| *d)
            .collect();

        ClassificationResult {
            primary_domain,
            ambiguous: !secondary_domains.is_empty(),
            secondary_domains,
            matched_entities,
            ambiguous_entity,
            entity_resolution,
            scores,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::query::normalize;
    use crate::context::registry::tests::registry;

    fn classifier() -> DomainClassifier {
        DomainClassifier::new(Arc::new(registry()), ClassifierConfig::default())
    }

    fn classify(q: &str) -> ClassificationResult {
        classifier().classify(&normalize(q), None)
    }

    fn previous_turn(entity: &str, domain: Domain) -> ConversationTurn {
        ConversationTurn::new("earlier", "earlier", Some(domain))
            .with_entities(vec![entity.to_string()], vec![entity.to_string()])
    }

    #[test]
    fn test_named_faculty_member() {
        let result = classify("Tell me about Dr. Monica Sundd");
        assert_eq!(result.primary_domain, Domain::FacultyInfo);
        assert!(!result.ambiguous);
        assert_eq!(result.entity_ids(), vec!["monica-sundd"]);
        assert_eq!(result.entity_resolution, EntityResolution::Query);
    }

    #[test]
    fn test_topic_keyword_outweighs_entity_tag() {
        let result = classify("What are the publications of Dr. Nimesh Gupta in 2021?");
        assert_eq!(result.primary_domain, Domain::Publications);
        assert!(!result.ambiguous);
        assert_eq!(result.entity_ids(), vec!["nimesh-gupta"]);
    }

    #[test]
    fn test_contact_queries_route_to_staff() {
        let result = classify("monica email");
        assert_eq!(result.primary_domain, Domain::Staff);
        assert_eq!(result.entity_ids(), vec!["monica-sundd"]);
    }

    #[test]
    fn test_close_scores_are_ambiguous() {
        let result = classify("research publications on tuberculosis");
        assert!(result.ambiguous);
        // Equal scores: research has the higher fixed priority
        assert_eq!(result.primary_domain, Domain::Research);
        assert_eq!(result.secondary_domains, vec![Domain::Publications]);
    }

    #[test]
    fn test_no_signal_defaults_to_institutional() {
        let result = classify("hello there");
        assert_eq!(result.primary_domain, Domain::DEFAULT);
        assert!(!result.ambiguous);
        assert!(result.secondary_domains.is_empty());
        assert!(result.matched_entities.is_empty());
    }

    #[test]
    fn test_pronoun_inherits_previous_entities() {
        let c = classifier();
        let turn = previous_turn("nimesh-gupta", Domain::FacultyInfo);

        let followup = c.classify(&normalize("his lab team members"), Some(&turn));
        let explicit = c.classify(&normalize("Dr. Nimesh Gupta's lab team members"), None);

        assert_eq!(followup.entity_resolution, EntityResolution::Memory);
        assert_eq!(followup.entity_ids(), explicit.entity_ids());
        assert_eq!(followup.primary_domain, explicit.primary_domain);
        assert_eq!(followup.scores, explicit.scores);
        assert_eq!(followup.primary_domain, Domain::Labs);
    }

    #[test]
    fn test_explicit_name_beats_memory() {
        let c = classifier();
        let turn = previous_turn("nimesh-gupta", Domain::FacultyInfo);
        let result = c.classify(&normalize("what about Dr. Monica Sundd"), Some(&turn));
        assert_eq!(result.entity_ids(), vec!["monica-sundd"]);
        assert_eq!(result.entity_resolution, EntityResolution::Query);
    }

    #[test]
    fn test_bare_followup_keeps_previous_domain() {
        let c = classifier();
        let turn = ConversationTurn::new("phd admissions", "phd admissions", Some(Domain::ProgramsCourses));
        let result = c.classify(&normalize("and the deadline?"), Some(&turn));
        assert_eq!(result.primary_domain, Domain::ProgramsCourses);
        assert!(!result.ambiguous);
    }

    #[test]
    fn test_shared_surname_flags_ambiguous_entity() {
        let result = classify("professor gupta");
        assert!(result.ambiguous_entity);
        assert_eq!(result.matched_entities.len(), 2);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let a = classify("Who is the director of NII?");
        let b = classify("Who is the director of NII?");
        assert_eq!(a, b);
        assert_eq!(a.primary_domain, Domain::NiiInfo);
    }
}
