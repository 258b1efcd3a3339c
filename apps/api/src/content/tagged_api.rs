//! Tagged content API source (WordPress REST `posts` endpoint).

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::content::text::{strip_html, truncate_excerpt};
use crate::content::{ContentError, ContentSource};
use crate::fetch::chain::FetchStrategyChain;
use crate::fetch::SourceUnavailable;
use crate::models::post::NormalizedPost;
use crate::personalize::topic_matcher::TopicMatcher;

// ────────────────────────────────────────────────────────────────────────────
// Wire shape
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Rendered {
    #[serde(default)]
    rendered: String,
}

#[derive(Debug, Deserialize)]
struct Term {
    #[serde(default)]
    slug: String,
}

#[derive(Debug, Default, Deserialize)]
struct Embedded {
    #[serde(rename = "wp:term", default)]
    terms: Vec<Vec<Term>>,
}

#[derive(Debug, Deserialize)]
struct ApiPost {
    id: u64,
    #[serde(default)]
    title: Rendered,
    #[serde(default)]
    excerpt: Rendered,
    #[serde(default)]
    content: Rendered,
    #[serde(default)]
    date: Option<String>,
    #[serde(default)]
    link: String,
    #[serde(rename = "_embedded", default)]
    embedded: Embedded,
}

impl ApiPost {
    fn normalize(self) -> NormalizedPost {
        let content = strip_html(&self.content.rendered);
        let supplied = strip_html(&self.excerpt.rendered);
        let excerpt = if supplied.is_empty() {
            truncate_excerpt(&content)
        } else {
            truncate_excerpt(&supplied)
        };

        let mut post = NormalizedPost {
            id: format!("wp:{}", self.id),
            title: strip_html(&self.title.rendered),
            excerpt,
            content,
            link: self.link,
            published_at: self.date.as_deref().and_then(parse_date),
            categories: Vec::new(),
        };
        // Every taxonomy is folded into one slug set.
        for term in self.embedded.terms.iter().flatten() {
            post.push_category(&term.slug);
        }
        post
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Source
// ────────────────────────────────────────────────────────────────────────────

/// Issues one request per recipient topic and concatenates the results.
/// Every topic is attempted; if any fails, the source fails with the
/// failures of all topics.
///
/// Each topic's page is narrowed to the posts that match that topic, so a
/// post reachable through two topics appears twice and is collapsed later by
/// the deduplicator.
pub struct TaggedApiSource {
    posts_url: Url,
    topic_param: Option<String>,
    matcher: TopicMatcher,
    chain: FetchStrategyChain,
}

impl TaggedApiSource {
    /// `api_base` is the REST root, e.g. `https://example.com/wp-json/wp/v2`.
    /// When `topic_param` is set the topic is sent under that query key.
    pub fn new(
        api_base: &str,
        page_size: u32,
        topic_param: Option<String>,
        matcher: TopicMatcher,
        chain: FetchStrategyChain,
    ) -> Result<Self, url::ParseError> {
        let page_size = page_size.to_string();
        let posts_url = Url::parse_with_params(
            &format!("{}/posts", api_base.trim_end_matches('/')),
            &[
                ("per_page", page_size.as_str()),
                ("orderby", "date"),
                ("order", "desc"),
                ("_embed", "wp:term"),
            ],
        )?;

        Ok(Self {
            posts_url,
            topic_param,
            matcher,
            chain,
        })
    }

    fn topic_url(&self, topic: &str) -> String {
        let mut url = self.posts_url.clone();
        if let Some(param) = &self.topic_param {
            url.query_pairs_mut().append_pair(param, topic);
        }
        url.into()
    }
}

#[async_trait]
impl ContentSource for TaggedApiSource {
    fn name(&self) -> &str {
        "tagged-api"
    }

    async fn fetch_posts(
        &self,
        topics: &[String],
    ) -> Result<Vec<NormalizedPost>, SourceUnavailable> {
        let mut posts = Vec::new();
        let mut failed = Vec::new();

        for topic in topics {
            let page = match self.chain.fetch(&self.topic_url(topic), parse_posts).await {
                Ok(page) => page,
                Err(e) => {
                    warn!(topic = %topic, error = %e, "topic page unavailable");
                    failed.push(e);
                    continue;
                }
            };
            let fetched = page.len();
            let topic_posts: Vec<NormalizedPost> = page
                .into_iter()
                .filter(|p| self.matcher.matches(&p.categories, topic))
                .collect();

            debug!(topic = %topic, fetched, matched = topic_posts.len(), "topic page normalized");
            posts.extend(topic_posts);
        }

        if failed.is_empty() {
            Ok(posts)
        } else {
            Err(SourceUnavailable::combine(failed))
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Normalizer
// ────────────────────────────────────────────────────────────────────────────

/// Parses a JSON array of posts. Items that cannot be read (no numeric `id`,
/// wrong field types) are skipped; a body that is not an array is malformed.
pub fn parse_posts(payload: &str) -> Result<Vec<NormalizedPost>, ContentError> {
    let items: Vec<Value> = serde_json::from_str(payload)
        .map_err(|e| ContentError::ApiMalformed(e.to_string()))?;

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ApiPost>(item) {
            Ok(post) => Some(post.normalize()),
            Err(e) => {
                warn!(error = %e, "skipping unreadable API post");
                None
            }
        })
        .collect())
}

/// RFC 3339, or the API's zone-less `YYYY-MM-DDTHH:MM:SS` read as UTC.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").map(|n| n.and_utc()))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::chain::tests::ScriptedStrategy;
    use crate::fetch::strategy::FetchStrategy;
    use crate::fetch::FetchError;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn api_post(id: u64, date: &str, groups: Value) -> Value {
        json!({
            "id": id,
            "date": date,
            "link": format!("https://example.com/?p={id}"),
            "title": { "rendered": format!("Post <em>{id}</em>") },
            "excerpt": { "rendered": "" },
            "content": { "rendered": "<p>Quarterly survey results &amp; more.</p>" },
            "_embedded": { "wp:term": groups }
        })
    }

    fn source(strategies: Vec<Arc<ScriptedStrategy>>) -> TaggedApiSource {
        let strategies = strategies
            .into_iter()
            .map(|s| s as Arc<dyn FetchStrategy>)
            .collect();
        TaggedApiSource::new(
            "https://example.com/wp-json/wp/v2/",
            5,
            None,
            TopicMatcher::default(),
            FetchStrategyChain::new("tagged-api", strategies, Duration::from_secs(1)),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_posts_flattens_all_taxonomies() {
        let body = json!([api_post(
            7,
            "2024-09-10T08:30:00",
            json!([[{"slug": "news"}], [{"slug": "ESG"}, {"slug": "dei"}]])
        )])
        .to_string();

        let posts = parse_posts(&body).unwrap();
        assert_eq!(posts.len(), 1);
        let p = &posts[0];
        assert_eq!(p.id, "wp:7");
        assert_eq!(p.title, "Post 7");
        assert_eq!(p.categories, vec!["news", "esg", "dei"]);
        assert_eq!(p.content, "Quarterly survey results & more.");
        assert_eq!(p.excerpt, p.content);
        assert_eq!(
            p.published_at.unwrap().to_rfc3339(),
            "2024-09-10T08:30:00+00:00"
        );
    }

    #[test]
    fn test_supplied_excerpt_is_stripped_and_bounded() {
        let mut item = api_post(1, "2024-01-01T00:00:00", json!([]));
        item["excerpt"]["rendered"] = json!(format!("<p>{}</p>", "x".repeat(300)));

        let posts = parse_posts(&json!([item]).to_string()).unwrap();
        assert_eq!(posts[0].excerpt.chars().count(), 203);
        assert!(posts[0].excerpt.starts_with("xxx"));
    }

    #[test]
    fn test_missing_optional_fields_default() {
        let posts = parse_posts(r#"[{"id": 3}]"#).unwrap();
        let p = &posts[0];
        assert_eq!(p.title, "");
        assert!(p.categories.is_empty());
        assert!(p.published_at.is_none());
    }

    #[test]
    fn test_unreadable_item_is_skipped() {
        let posts = parse_posts(r#"[{"title": "no id"}, {"id": 4}]"#).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].id, "wp:4");
    }

    #[test]
    fn test_non_array_body_is_malformed() {
        let err = parse_posts(r#"{"code": "rest_no_route"}"#).unwrap_err();
        assert!(matches!(err, ContentError::ApiMalformed(_)));
        assert!(parse_posts("<html></html>").is_err());
    }

    #[test]
    fn test_request_url_carries_paging_and_embed() {
        let s = source(vec![]);
        let url = s.topic_url("esg");
        assert!(url.starts_with("https://example.com/wp-json/wp/v2/posts?"));
        assert!(url.contains("per_page=5"));
        assert!(url.contains("orderby=date"));
        assert!(url.contains("order=desc"));
        assert!(url.contains("_embed=wp%3Aterm"));
    }

    #[test]
    fn test_topic_param_is_appended() {
        let mut s = source(vec![]);
        s.topic_param = Some("tag_slug".to_string());
        assert!(s.topic_url("supply-chain").ends_with("&tag_slug=supply-chain"));
    }

    #[tokio::test]
    async fn test_one_request_per_topic_and_results_concatenated() {
        let body = json!([
            api_post(1, "2024-09-10T00:00:00", json!([[{"slug": "esg"}, {"slug": "dei"}]])),
            api_post(2, "2024-09-09T00:00:00", json!([[{"slug": "dei"}]])),
        ])
        .to_string();
        let direct = ScriptedStrategy::ok("direct", &body);
        let source = source(vec![direct.clone()]);

        let topics = vec!["esg".to_string(), "dei".to_string()];
        let posts = source.fetch_posts(&topics).await.unwrap();

        assert_eq!(direct.calls(), 2);
        let ids: Vec<&str> = posts.iter().map(|p| p.id.as_str()).collect();
        // esg page: post 1; dei page: posts 1 and 2.
        assert_eq!(ids, vec!["wp:1", "wp:1", "wp:2"]);
    }

    #[tokio::test]
    async fn test_failed_topic_fails_whole_source() {
        let source = source(vec![ScriptedStrategy::status("direct", 404)]);
        let err = source.fetch_posts(&["esg".to_string()]).await.unwrap_err();
        assert!(matches!(err.failures[0].error, FetchError::Status { status: 404 }));
    }

    #[tokio::test]
    async fn test_failures_from_every_topic_are_reported() {
        let direct = ScriptedStrategy::status("direct", 503);
        let source = source(vec![direct.clone()]);
        let topics = vec!["esg".to_string(), "dei".to_string(), "talent".to_string()];

        let err = source.fetch_posts(&topics).await.unwrap_err();

        assert_eq!(direct.calls(), 3);
        assert_eq!(err.failures.len(), 3);
        assert_eq!(err.reason, crate::fetch::UnavailableReason::Exhausted);
    }
}
