//! Metadata filter retrieval
//!
//! Every match scores 1.0, so ordering falls through to recency.

use niibot_common::collections::{sort_passages, Collection, MetadataFilter, RetrievedPassage};
use niibot_common::errors::Result;

/// Documents matching `filter`, newest first, capped at `max_results`
pub async fn filter_collection(
    collection: &dyn Collection,
    filter: &MetadataFilter,
    max_results: usize,
) -> Result<Vec<RetrievedPassage>> {
    let domain = collection.domain();
    let mut passages: Vec<RetrievedPassage> = collection
        .filter(filter)
        .await?
        .into_iter()
        .map(|doc| RetrievedPassage::from_document(doc, domain, 1.0))
        .collect();

    sort_passages(&mut passages);
    passages.truncate(max_results);
    Ok(passages)
}
