use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::claims::resolver::ClaimsResolver;
use crate::content::feed::FeedSource;
use crate::content::tagged_api::TaggedApiSource;
use crate::content::ContentSource;
use crate::fetch::chain::FetchStrategyChain;
use crate::fetch::strategy::{DirectFetch, FetchStrategy, RelayEnvelope, RelayFetch};
use crate::personalize::pipeline::PersonalizationPipeline;
use crate::personalize::topic_matcher::TopicMatcher;

const DEFAULT_FEED_URL: &str = "https://theassemble.com/feed/";
const DEFAULT_RELAY_URL: &str = "https://api.allorigins.win/get";
const DEFAULT_RELAY_FIELD: &str = "contents";

/// Display metadata for one topic slug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicConfig {
    pub slug: String,
    pub label: String,
    pub color: String,
}

/// Known topics, in display order. Recipients may carry slugs outside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TopicCatalog(pub Vec<TopicConfig>);

impl TopicCatalog {
    pub fn get(&self, slug: &str) -> Option<&TopicConfig> {
        self.0.iter().find(|t| t.slug == slug)
    }

    /// Catalog label, or the slug with its first letter capitalised.
    pub fn label_for(&self, slug: &str) -> String {
        match self.get(slug) {
            Some(topic) => topic.label.clone(),
            None => {
                let mut chars = slug.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        }
    }

    pub fn color_for(&self, slug: &str) -> Option<&str> {
        self.get(slug).map(|t| t.color.as_str())
    }
}

impl Default for TopicCatalog {
    fn default() -> Self {
        let topic = |slug: &str, label: &str, color: &str| TopicConfig {
            slug: slug.to_string(),
            label: label.to_string(),
            color: color.to_string(),
        };
        TopicCatalog(vec![
            topic("supply-chain", "Supply Chain", "#035E66"),
            topic("talent-marketing", "Talent & Marketing", "#3AC6CD"),
            topic("dei", "Diversity & Inclusion", "#422147"),
            topic("esg", "ESG & Sustainability", "#002642"),
        ])
    }
}

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or invalid.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub port: u16,
    pub rust_log: String,
    pub feed_url: Option<String>,
    pub content_api_url: Option<String>,
    pub content_api_topic_param: Option<String>,
    pub relay_url: Option<String>,
    /// JSON field holding the payload in relay responses; `None` for raw bodies.
    pub relay_field: Option<String>,
    pub server_relay_url: Option<String>,
    pub api_page_size: u32,
    pub fetch_attempt_timeout: Duration,
    pub pipeline_timeout: Duration,
    pub min_partial_match_len: usize,
    pub topic_catalog: TopicCatalog,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = lookup("JWT_SECRET")
            .filter(|s| !s.is_empty())
            .context("Required environment variable 'JWT_SECRET' is not set")?;

        let api_page_size: u32 = parse_or(&lookup, "API_PAGE_SIZE", 5)?;
        if !(1..=100).contains(&api_page_size) {
            bail!("API_PAGE_SIZE must be between 1 and 100, got {api_page_size}");
        }

        let topic_catalog = match lookup("TOPIC_CATALOG").filter(|s| !s.trim().is_empty()) {
            Some(raw) => TopicCatalog(
                serde_json::from_str(&raw)
                    .context("TOPIC_CATALOG must be a JSON array of {slug, label, color}")?,
            ),
            None => TopicCatalog::default(),
        };

        let config = Config {
            jwt_secret,
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            feed_url: optional_or(&lookup, "FEED_URL", Some(DEFAULT_FEED_URL)),
            content_api_url: optional_or(&lookup, "CONTENT_API_URL", None),
            content_api_topic_param: optional_or(&lookup, "CONTENT_API_TOPIC_PARAM", None),
            relay_url: optional_or(&lookup, "RELAY_URL", Some(DEFAULT_RELAY_URL)),
            relay_field: optional_or(&lookup, "RELAY_FIELD", Some(DEFAULT_RELAY_FIELD)),
            server_relay_url: optional_or(&lookup, "SERVER_RELAY_URL", None),
            api_page_size,
            fetch_attempt_timeout: Duration::from_secs(parse_or(
                &lookup,
                "FETCH_ATTEMPT_TIMEOUT_SECS",
                10,
            )?),
            pipeline_timeout: Duration::from_secs(parse_or(&lookup, "PIPELINE_TIMEOUT_SECS", 25)?),
            min_partial_match_len: parse_or(&lookup, "MIN_PARTIAL_MATCH_LEN", 0)?,
            topic_catalog,
        };

        if config.feed_url.is_none() && config.content_api_url.is_none() {
            bail!("No content source configured: set FEED_URL or CONTENT_API_URL");
        }
        Ok(config)
    }
}

/// Unset keeps the default; set-but-empty disables.
fn optional_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: Option<&str>,
) -> Option<String> {
    match lookup(key) {
        Some(value) => Some(value.trim().to_string()).filter(|v| !v.is_empty()),
        None => default.map(str::to_string),
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Wiring
// ────────────────────────────────────────────────────────────────────────────

/// Strategies in fallback order: direct, then query relay, then server relay
/// when requested.
fn strategies(
    config: &Config,
    client: &reqwest::Client,
    with_server_relay: bool,
) -> Vec<Arc<dyn FetchStrategy>> {
    let mut strategies: Vec<Arc<dyn FetchStrategy>> = vec![Arc::new(DirectFetch::new(client.clone()))];

    if let Some(relay_url) = &config.relay_url {
        let envelope = match &config.relay_field {
            Some(field) => RelayEnvelope::JsonField(field.clone()),
            None => RelayEnvelope::Raw,
        };
        strategies.push(Arc::new(
            RelayFetch::query_relay(client.clone(), relay_url).with_envelope(envelope),
        ));
    }
    if with_server_relay {
        if let Some(server_relay_url) = &config.server_relay_url {
            strategies.push(Arc::new(RelayFetch::server_relay(
                client.clone(),
                server_relay_url,
            )));
        }
    }
    strategies
}

fn chain(
    config: &Config,
    source: &str,
    strategies: Vec<Arc<dyn FetchStrategy>>,
) -> FetchStrategyChain {
    let chain = FetchStrategyChain::new(source, strategies, config.fetch_attempt_timeout);
    info!(source, strategies = ?chain.strategy_names(), "fetch chain configured");
    chain
}

/// The server relay always answers with the feed document, so only the feed
/// chain carries it.
fn feed_chain(config: &Config, client: &reqwest::Client) -> FetchStrategyChain {
    chain(config, "feed", strategies(config, client, true))
}

fn api_chain(config: &Config, client: &reqwest::Client) -> FetchStrategyChain {
    chain(config, "tagged-api", strategies(config, client, false))
}

/// Assembles the pipeline and its content sources from config.
pub fn build_pipeline(config: &Config, client: &reqwest::Client) -> Result<PersonalizationPipeline> {
    let matcher = TopicMatcher::new(config.min_partial_match_len);

    let mut sources: Vec<Arc<dyn ContentSource>> = Vec::new();
    if let Some(api_url) = &config.content_api_url {
        let source = TaggedApiSource::new(
            api_url,
            config.api_page_size,
            config.content_api_topic_param.clone(),
            matcher,
            api_chain(config, client),
        )
        .with_context(|| format!("CONTENT_API_URL '{api_url}' is not a valid URL"))?;
        sources.push(Arc::new(source));
    }
    if let Some(feed_url) = &config.feed_url {
        sources.push(Arc::new(FeedSource::new(feed_url, feed_chain(config, client))));
    }

    Ok(PersonalizationPipeline::new(
        ClaimsResolver::new(&config.jwt_secret),
        sources,
        matcher,
        config.pipeline_timeout,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("JWT_SECRET", "s")])).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.feed_url.as_deref(), Some(DEFAULT_FEED_URL));
        assert_eq!(config.relay_url.as_deref(), Some(DEFAULT_RELAY_URL));
        assert_eq!(config.relay_field.as_deref(), Some("contents"));
        assert!(config.content_api_url.is_none());
        assert_eq!(config.api_page_size, 5);
        assert_eq!(config.fetch_attempt_timeout, Duration::from_secs(10));
        assert_eq!(config.pipeline_timeout, Duration::from_secs(25));
        assert_eq!(config.min_partial_match_len, 0);
        assert_eq!(config.topic_catalog.0.len(), 4);
    }

    #[test]
    fn test_missing_secret_fails() {
        assert!(Config::from_lookup(lookup(&[])).is_err());
        assert!(Config::from_lookup(lookup(&[("JWT_SECRET", "")])).is_err());
    }

    #[test]
    fn test_no_content_source_fails() {
        let err = Config::from_lookup(lookup(&[("JWT_SECRET", "s"), ("FEED_URL", "")]))
            .unwrap_err();
        assert!(err.to_string().contains("No content source"));
    }

    #[test]
    fn test_page_size_bounds() {
        for bad in ["0", "101", "five"] {
            let vars = [("JWT_SECRET", "s"), ("API_PAGE_SIZE", bad)];
            assert!(Config::from_lookup(lookup(&vars)).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_empty_relay_disables_it() {
        let config =
            Config::from_lookup(lookup(&[("JWT_SECRET", "s"), ("RELAY_URL", "")])).unwrap();
        assert!(config.relay_url.is_none());
        let chain = feed_chain(&config, &reqwest::Client::new());
        assert_eq!(chain.strategy_names(), vec!["direct"]);
    }

    #[test]
    fn test_feed_chain_has_all_strategies_in_fallback_order() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("SERVER_RELAY_URL", "https://proxy.local/rss"),
        ]))
        .unwrap();
        let chain = feed_chain(&config, &reqwest::Client::new());
        assert_eq!(
            chain.strategy_names(),
            vec!["direct", "relay", "server-relay"]
        );
    }

    #[test]
    fn test_api_chain_never_uses_server_relay() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("CONTENT_API_URL", "https://example.com/wp-json/wp/v2"),
            ("SERVER_RELAY_URL", "https://proxy.local/rss"),
        ]))
        .unwrap();
        let chain = api_chain(&config, &reqwest::Client::new());
        assert_eq!(chain.strategy_names(), vec!["direct", "relay"]);
    }

    #[test]
    fn test_custom_catalog() {
        let catalog = r##"[{"slug":"ai","label":"AI","color":"#000"}]"##;
        let config =
            Config::from_lookup(lookup(&[("JWT_SECRET", "s"), ("TOPIC_CATALOG", catalog)]))
                .unwrap();
        assert_eq!(config.topic_catalog.label_for("ai"), "AI");
        assert!(config.topic_catalog.get("esg").is_none());

        let bad = Config::from_lookup(lookup(&[("JWT_SECRET", "s"), ("TOPIC_CATALOG", "{}")]));
        assert!(bad.is_err());
    }

    #[test]
    fn test_label_fallback_capitalises_slug() {
        let catalog = TopicCatalog::default();
        assert_eq!(catalog.label_for("esg"), "ESG & Sustainability");
        assert_eq!(catalog.label_for("talent-marketing"), "Talent & Marketing");
        assert_eq!(catalog.color_for("dei"), Some("#422147"));
        assert_eq!(catalog.label_for("finance"), "Finance");
        assert_eq!(catalog.color_for("finance"), None);
    }

    #[test]
    fn test_build_pipeline_orders_sources() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("CONTENT_API_URL", "https://example.com/wp-json/wp/v2"),
        ]))
        .unwrap();
        let pipeline = build_pipeline(&config, &reqwest::Client::new()).unwrap();
        assert_eq!(pipeline.source_names(), vec!["tagged-api", "feed"]);
    }

    #[test]
    fn test_build_pipeline_rejects_bad_api_url() {
        let config = Config::from_lookup(lookup(&[
            ("JWT_SECRET", "s"),
            ("CONTENT_API_URL", "not a url"),
        ]))
        .unwrap();
        assert!(build_pipeline(&config, &reqwest::Client::new()).is_err());
    }
}
