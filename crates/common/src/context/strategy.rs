//! Strategy Selector - turns a classification into a retrieval plan

use crate::collections::MetadataFilter;
use crate::config::RetrievalConfig;
use crate::context::classifier::ClassificationResult;
use crate::domain::Domain;
use serde::{Deserialize, Serialize};

/// How to fetch passages for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Exact metadata predicate against one collection
    MetadataFilter {
        domain: Domain,
        filter: MetadataFilter,
        max_results: usize,
        /// Collections tried in order when `domain` has nothing for the entities
        #[serde(default)]
        fallback: Vec<Domain>,
    },

    /// Nearest-neighbour search in one collection
    SemanticSearch {
        domain: Domain,
        top_k: usize,
        threshold: f32,
        /// Keep only passages linked to these entities
        scope: Option<MetadataFilter>,
    },

    /// Concurrent semantic search over several collections
    CrossDomainFanout {
        domains: Vec<Domain>,
        per_domain_top_k: usize,
        threshold: f32,
        scope: Option<MetadataFilter>,
    },
}

impl RetrievalStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            RetrievalStrategy::MetadataFilter { .. } => "metadata_filter",
            RetrievalStrategy::SemanticSearch { .. } => "semantic_search",
            RetrievalStrategy::CrossDomainFanout { .. } => "cross_domain_fanout",
        }
    }

    /// Domains the strategy reads from, in order
    pub fn domains(&self) -> Vec<Domain> {
        match self {
            RetrievalStrategy::MetadataFilter { domain, .. }
            | RetrievalStrategy::SemanticSearch { domain, .. } => vec![*domain],
            RetrievalStrategy::CrossDomainFanout { domains, .. } => domains.clone(),
        }
    }

    /// Stable textual form used in cache keys
    pub fn signature(&self) -> String {
        let scope_sig = |scope: &Option<MetadataFilter>| {
            scope.as_ref().map(MetadataFilter::signature).unwrap_or_else(|| "-".to_string())
        };

        match self {
            RetrievalStrategy::MetadataFilter { domain, filter, max_results, fallback } => {
                let names: Vec<&str> = fallback.iter().map(Domain::as_str).collect();
                format!(
                    "metadata|{}|{}|max={}|fallback={}",
                    domain,
                    filter.signature(),
                    max_results,
                    names.join(",")
                )
            }
            RetrievalStrategy::SemanticSearch { domain, top_k, threshold, scope } => {
                format!("semantic|{}|k={}|t={:.4}|scope={}", domain, top_k, threshold, scope_sig(scope))
            }
            RetrievalStrategy::CrossDomainFanout { domains, per_domain_top_k, threshold, scope } => {
                let names: Vec<&str> = domains.iter().map(Domain::as_str).collect();
                format!(
                    "fanout|{}|k={}|t={:.4}|scope={}",
                    names.join(","),
                    per_domain_top_k,
                    threshold,
                    scope_sig(scope)
                )
            }
        }
    }
}

/// Rule-ordered strategy choice; the first matching rule wins
pub struct StrategySelector {
    config: RetrievalConfig,
}

impl StrategySelector {
    pub fn new(config: RetrievalConfig) -> Self {
        Self { config }
    }

    pub fn select(&self, classification: &ClassificationResult) -> RetrievalStrategy {
        let scope = (!classification.matched_entities.is_empty())
            .then(|| MetadataFilter::for_entities(classification.entity_ids()));

        let strategy = match scope {
            Some(filter) if !classification.ambiguous => RetrievalStrategy::MetadataFilter {
                domain: classification.primary_domain,
                filter,
                max_results: self.config.metadata_max_results,
                fallback: fallback_domains(classification),
            },
            scope if classification.ambiguous => RetrievalStrategy::CrossDomainFanout {
                domains: classification.candidate_domains(),
                per_domain_top_k: self.config.fanout_top_k,
                threshold: self.config.similarity_threshold,
                scope,
            },
            _ => RetrievalStrategy::SemanticSearch {
                domain: classification.primary_domain,
                top_k: self.config.semantic_top_k,
                threshold: self.config.similarity_threshold,
                scope: None,
            },
        };

        tracing::debug!(strategy = strategy.name(), signature = %strategy.signature(), "Selected retrieval strategy");
        strategy
    }
}

/// The entities' other tagged domains, then faculty_info, never the primary
fn fallback_domains(classification: &ClassificationResult) -> Vec<Domain> {
    let mut domains: Vec<Domain> = Vec::new();
    let tagged = classification.matched_entities.iter().flat_map(|m| m.domains.iter().copied());
    for domain in tagged.chain(std::iter::once(Domain::FacultyInfo)) {
        if domain != classification.primary_domain && !domains.contains(&domain) {
            domains.push(domain);
        }
    }
    domains
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClassifierConfig;
    use crate::context::classifier::DomainClassifier;
    use crate::context::query::normalize;
    use crate::context::registry::tests::registry;
    use std::sync::Arc;

    fn plan(q: &str) -> (ClassificationResult, RetrievalStrategy) {
        let classifier = DomainClassifier::new(Arc::new(registry()), ClassifierConfig::default());
        let classification = classifier.classify(&normalize(q), None);
        let strategy = StrategySelector::new(RetrievalConfig::default()).select(&classification);
        (classification, strategy)
    }

    #[test]
    fn test_known_alias_uses_metadata_filter() {
        let (_, strategy) = plan("Tell me about Dr. Monica Sundd");
        match strategy {
            RetrievalStrategy::MetadataFilter { domain, filter, .. } => {
                assert_eq!(domain, Domain::FacultyInfo);
                assert_eq!(filter.entity_ids(), ["monica-sundd"]);
            }
            other => panic!("expected metadata filter, got {:?}", other),
        }
    }

    #[test]
    fn test_ambiguous_fans_out_over_candidates() {
        let (classification, strategy) = plan("research publications on tuberculosis");
        assert!(classification.ambiguous);
        match strategy {
            RetrievalStrategy::CrossDomainFanout { domains, scope, .. } => {
                assert_eq!(domains, classification.candidate_domains());
                assert_eq!(domains, vec![Domain::Research, Domain::Publications]);
                assert!(scope.is_none());
            }
            other => panic!("expected fan-out, got {:?}", other),
        }
    }

    #[test]
    fn test_plain_question_uses_semantic_search() {
        let (_, strategy) = plan("what is the phd admission process");
        assert_eq!(strategy.name(), "semantic_search");
        assert_eq!(strategy.domains(), vec![Domain::ProgramsCourses]);
    }

    #[test]
    fn test_signature_is_stable_and_distinct() {
        let (_, a) = plan("Tell me about Dr. Monica Sundd");
        let (_, b) = plan("Tell me about Dr. Monica Sundd");
        let (_, c) = plan("what is the phd admission process");
        assert_eq!(a.signature(), b.signature());
        assert_ne!(a.signature(), c.signature());
        assert!(a.signature().starts_with("metadata|faculty_info|ids=monica-sundd"));
    }

    #[test]
    fn test_metadata_filter_falls_back_to_tagged_domains_then_faculty() {
        let (classification, strategy) = plan("Tell me about Dr. Monica Sundd");
        assert_eq!(classification.primary_domain, Domain::FacultyInfo);
        match strategy {
            RetrievalStrategy::MetadataFilter { fallback, .. } => assert!(fallback.is_empty()),
            other => panic!("expected metadata filter, got {:?}", other),
        }

        let mut staff = classification.clone();
        staff.primary_domain = Domain::Staff;
        staff.matched_entities[0].domains = vec![Domain::Staff, Domain::Research];
        match StrategySelector::new(RetrievalConfig::default()).select(&staff) {
            RetrievalStrategy::MetadataFilter { domain, fallback, .. } => {
                assert_eq!(domain, Domain::Staff);
                assert_eq!(fallback, vec![Domain::Research, Domain::FacultyInfo]);
            }
            other => panic!("expected metadata filter, got {:?}", other),
        }
    }
}
