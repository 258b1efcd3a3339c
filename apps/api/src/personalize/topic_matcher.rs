//! Topic matching: decides which recipient topics a post belongs to.
//!
//! Policy: a post matches topic `t` when one of its category slugs `c`
//! equals `t`, or when `c` is a substring of `t` or `t` a substring of `c`.
//! The loose half lets `talent` pick up `talent-marketing` and the reverse.
//! It can also pair unrelated short slugs (`ai` inside `retail`), so partial
//! matching can be restricted to slugs of at least `min_partial_len` chars.
//! The default of 0 applies no restriction.

use serde::Serialize;

use crate::models::post::NormalizedPost;

/// A post together with every recipient topic it matched, in recipient order.
/// Always holds at least one topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopicMatch {
    post: NormalizedPost,
    topics: Vec<String>,
}

impl TopicMatch {
    /// `None` when `topics` is empty.
    pub fn new(post: NormalizedPost, topics: Vec<String>) -> Option<Self> {
        (!topics.is_empty()).then_some(Self { post, topics })
    }

    pub fn post(&self) -> &NormalizedPost {
        &self.post
    }

    /// The topic the post is filed under: the first matching recipient topic.
    pub fn resolved_topic(&self) -> &str {
        &self.topics[0]
    }

    /// Splits into the post and its resolved topic.
    pub fn into_resolved(self) -> (NormalizedPost, String) {
        let topic = self.resolved_topic().to_string();
        (self.post, topic)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopicMatcher {
    min_partial_len: usize,
}

impl TopicMatcher {
    pub fn new(min_partial_len: usize) -> Self {
        Self { min_partial_len }
    }

    /// True when any of `categories` matches `topic`. Case-insensitive.
    pub fn matches(&self, categories: &[String], topic: &str) -> bool {
        let topic = topic.to_lowercase();
        categories.iter().any(|category| {
            let category = category.to_lowercase();
            if category.is_empty() {
                return false;
            }
            if category == topic {
                return true;
            }
            let partial_allowed = category.chars().count() >= self.min_partial_len
                && topic.chars().count() >= self.min_partial_len;
            partial_allowed && (topic.contains(&category) || category.contains(&topic))
        })
    }

    /// Recipient topics matched by `post`, in the order of `topics`.
    pub fn matched_topics(&self, post: &NormalizedPost, topics: &[String]) -> Vec<String> {
        topics
            .iter()
            .filter(|topic| self.matches(&post.categories, topic))
            .cloned()
            .collect()
    }

    /// Keeps the posts that match at least one topic, preserving input order.
    pub fn filter(&self, posts: Vec<NormalizedPost>, topics: &[String]) -> Vec<TopicMatch> {
        posts
            .into_iter()
            .filter_map(|post| {
                let matched = self.matched_topics(&post, topics);
                TopicMatch::new(post, matched)
            })
            .collect()
    }
}
