use std::collections::HashSet;

use crate::personalize::topic_matcher::TopicMatch;

/// Collapses posts sharing an id. The first occurrence wins; later copies are
/// dropped without error.
pub fn dedup_by_id(matches: Vec<TopicMatch>) -> Vec<TopicMatch> {
    let mut seen = HashSet::with_capacity(matches.len());
    matches
        .into_iter()
        .filter(|m| seen.insert(m.post().id.clone()))
        .collect()
}

/// Newest first. The sort is stable, so posts with equal dates keep their
/// relative order. Undated posts go last.
pub fn sort_newest_first(matches: &mut [TopicMatch]) {
    matches.sort_by(|a, b| b.post().published_at.cmp(&a.post().published_at));
}
