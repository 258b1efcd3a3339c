use crate::models::story::Story;
use crate::personalize::topic_matcher::TopicMatch;

const CHART_KEYWORDS: [&str; 2] = ["chart", "data"];
const POLL_KEYWORDS: [&str; 2] = ["poll", "survey"];

/// Builds the story for a matched post, filed under its resolved topic.
///
/// Hints come only from keywords in the stripped content, so the same post
/// always yields the same story.
pub fn annotate(matched: TopicMatch) -> Story {
    let (post, topic) = matched.into_resolved();

    let lowered = post.content.to_lowercase();
    let has_chart = CHART_KEYWORDS.iter().any(|k| lowered.contains(k));
    let has_poll = POLL_KEYWORDS.iter().any(|k| lowered.contains(k));

    Story {
        id: post.id,
        title: post.title,
        excerpt: post.excerpt,
        content: post.content,
        topic,
        link: post.link,
        published_at: post.published_at,
        has_chart,
        has_poll,
    }
}
