use chrono::{DateTime, Utc};
use serde::Serialize;

/// A content item from any upstream, reduced to one shape.
///
/// `id` is unique within a fetch cycle and fixes every other field for its
/// lifetime. `categories` holds lowercase, trimmed, non-empty slugs without
/// duplicates, in the order the upstream listed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedPost {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub categories: Vec<String>,
}

impl NormalizedPost {
    /// Adds a category slug, lowercasing and trimming it. Blank and repeated
    /// slugs are ignored.
    pub fn push_category(&mut self, raw: &str) {
        let slug = raw.trim().to_lowercase();
        if !slug.is_empty() && !self.categories.contains(&slug) {
            self.categories.push(slug);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_category_normalizes_and_dedupes() {
        let mut post = NormalizedPost {
            id: "p".to_string(),
            title: String::new(),
            excerpt: String::new(),
            content: String::new(),
            link: String::new(),
            published_at: None,
            categories: vec![],
        };
        post.push_category("  ESG ");
        post.push_category("esg");
        post.push_category("   ");
        post.push_category("Supply-Chain");

        assert_eq!(post.categories, vec!["esg", "supply-chain"]);
    }
}
