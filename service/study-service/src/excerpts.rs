//! Topic-grouped excerpts for the browse modes.

use std::collections::HashSet;

use chunk_model::Citation;
use chunking_store::SearchHit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Excerpt {
    pub text: String,
    pub citation: Citation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSection {
    pub topic: String,
    pub excerpts: Vec<Excerpt>,
}

/// Comparison key for excerpts: whitespace collapsed, lowercase.
pub fn excerpt_key(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Group retrieval results by topic, in the order given.
///
/// Excerpts shorter than `min_chars` (after trimming) are dropped and an
/// excerpt already shown under an earlier topic is not repeated.
pub fn group_by_topic<I>(results: I, min_chars: usize) -> Vec<TopicSection>
where
    I: IntoIterator<Item = (String, Vec<SearchHit>)>,
{
    let mut seen = HashSet::new();
    results
        .into_iter()
        .map(|(topic, hits)| {
            let excerpts = hits
                .into_iter()
                .filter_map(|hit| {
                    let text = hit.chunk.text.trim();
                    if text.chars().count() < min_chars || !seen.insert(excerpt_key(text)) {
                        return None;
                    }
                    Some(Excerpt { text: text.to_string(), citation: hit.chunk.meta.citation() })
                })
                .collect();
            TopicSection { topic, excerpts }
        })
        .collect()
}
