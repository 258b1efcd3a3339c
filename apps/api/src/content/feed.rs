//! Syndication feed source (RSS/Atom).

use async_trait::async_trait;
use feed_rs::model::Entry;
use tracing::debug;

use crate::content::text::{strip_html, truncate_excerpt};
use crate::content::{ContentError, ContentSource};
use crate::fetch::chain::FetchStrategyChain;
use crate::fetch::SourceUnavailable;
use crate::models::post::NormalizedPost;

/// Reads one feed document per cycle, whatever the number of topics.
pub struct FeedSource {
    feed_url: String,
    chain: FetchStrategyChain,
}

impl FeedSource {
    pub fn new(feed_url: impl Into<String>, chain: FetchStrategyChain) -> Self {
        Self {
            feed_url: feed_url.into(),
            chain,
        }
    }
}

#[async_trait]
impl ContentSource for FeedSource {
    fn name(&self) -> &str {
        "feed"
    }

    async fn fetch_posts(
        &self,
        _topics: &[String],
    ) -> Result<Vec<NormalizedPost>, SourceUnavailable> {
        let posts = self.chain.fetch(&self.feed_url, parse_feed).await?;
        debug!(feed_url = %self.feed_url, posts = posts.len(), "feed normalized");
        Ok(posts)
    }
}

/// Parses a feed document into posts, one per item.
///
/// A document that is not a feed at all is `FeedMalformed`; a valid feed
/// without items is an empty list.
pub fn parse_feed(payload: &str) -> Result<Vec<NormalizedPost>, ContentError> {
    let feed = feed_rs::parser::parse(payload.as_bytes())
        .map_err(|e| ContentError::FeedMalformed(e.to_string()))?;

    Ok(feed.entries.into_iter().map(normalize_entry).collect())
}

fn normalize_entry(entry: Entry) -> NormalizedPost {
    let link = entry
        .links
        .first()
        .map(|l| l.href.trim().to_string())
        .unwrap_or_default();

    let title = entry
        .title
        .map(|t| strip_html(&t.content))
        .unwrap_or_default();

    // RSS <description> lands in `summary`; fall back to <content:encoded>.
    let content = entry
        .summary
        .map(|t| t.content)
        .or_else(|| entry.content.and_then(|c| c.body))
        .map(|body| strip_html(&body))
        .unwrap_or_default();

    // feed-rs uses the guid, or a deterministic hash of the item without one.
    let id = if entry.id.is_empty() {
        format!("feed:{link}")
    } else {
        format!("feed:{}", entry.id)
    };

    let mut post = NormalizedPost {
        id,
        title,
        excerpt: truncate_excerpt(&content),
        content,
        link,
        published_at: entry.published.or(entry.updated),
        categories: Vec::new(),
    };
    for category in &entry.categories {
        post.push_category(&category.term);
    }
    post
}
