//! Personalization pipeline: claims → sources → match → dedup/sort → annotate.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::claims::resolver::ClaimsResolver;
use crate::claims::ClaimsError;
use crate::content::ContentSource;
use crate::fetch::{SourceUnavailable, UnavailableReason};
use crate::models::claims::AccessClaims;
use crate::models::post::NormalizedPost;
use crate::models::story::Story;
use crate::personalize::annotator::annotate;
use crate::personalize::dedup::{dedup_by_id, sort_newest_first};
use crate::personalize::topic_matcher::TopicMatcher;

/// A personalized newsletter: who it is for and what they get, newest first.
#[derive(Debug, Clone)]
pub struct Newsletter {
    pub claims: AccessClaims,
    pub stories: Vec<Story>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Claims(#[from] ClaimsError),

    /// Claims were valid but no content could be fetched. The claims are
    /// handed back so the caller can serve a flagged placeholder.
    #[error("{source}")]
    SourceUnavailable {
        claims: Box<AccessClaims>,
        source: SourceUnavailable,
    },
}

impl PipelineError {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Claims(e) => e.kind(),
            PipelineError::SourceUnavailable { source, .. } => match source.reason {
                UnavailableReason::Exhausted => "source_unavailable",
                UnavailableReason::TimedOut(_) => "source_timeout",
            },
        }
    }
}

/// Everything one request needs, fixed at construction. Cheap to clone;
/// requests share no mutable state.
#[derive(Clone)]
pub struct PersonalizationPipeline {
    resolver: ClaimsResolver,
    sources: Vec<Arc<dyn ContentSource>>,
    matcher: TopicMatcher,
    timeout: Duration,
}

impl PersonalizationPipeline {
    pub fn new(
        resolver: ClaimsResolver,
        sources: Vec<Arc<dyn ContentSource>>,
        matcher: TopicMatcher,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            sources,
            matcher,
            timeout,
        }
    }

    pub fn source_names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name()).collect()
    }

    pub async fn personalize(
        &self,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Newsletter, PipelineError> {
        let claims = self.resolver.resolve(token, now)?;

        match self.stories_for(&claims.topics).await {
            Ok(stories) => {
                info!(
                    subject = %claims.subject_id,
                    topics = ?claims.topics,
                    tier = ?claims.tier,
                    stories = stories.len(),
                    "newsletter view"
                );
                Ok(Newsletter { claims, stories })
            }
            Err(source) => {
                let err = PipelineError::SourceUnavailable {
                    claims: Box::new(claims),
                    source,
                };
                warn!(kind = err.kind(), error = %err, "no content for newsletter view");
                Err(err)
            }
        }
    }

    /// Fetches, filters, de-duplicates, orders and annotates content for
    /// `topics`, all under the pipeline deadline.
    pub async fn stories_for(&self, topics: &[String]) -> Result<Vec<Story>, SourceUnavailable> {
        let posts = tokio::time::timeout(self.timeout, self.gather(topics))
            .await
            .map_err(|_| {
                warn!(timeout = ?self.timeout, "content fetch exceeded pipeline deadline");
                SourceUnavailable::timed_out(self.timeout)
            })??;

        let matched = self.matcher.filter(posts, topics);
        let mut unique = dedup_by_id(matched);
        sort_newest_first(&mut unique);

        Ok(unique.into_iter().map(annotate).collect())
    }

    /// Queries every source in order. Unavailable sources are skipped as long
    /// as one succeeds.
    async fn gather(&self, topics: &[String]) -> Result<Vec<NormalizedPost>, SourceUnavailable> {
        let mut posts = Vec::new();
        let mut failures = Vec::new();
        let mut succeeded = false;

        for source in &self.sources {
            match source.fetch_posts(topics).await {
                Ok(fetched) => {
                    succeeded = true;
                    posts.extend(fetched);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "content source unavailable");
                    failures.push(e);
                }
            }
        }

        if succeeded {
            Ok(posts)
        } else {
            Err(SourceUnavailable::combine(failures))
        }
    }
}

/// Stand-in stories served when content could not be fetched. Ids are
/// prefixed `placeholder-` and links are `#` so they cannot pass for real posts.
pub fn placeholder_stories(claims: &AccessClaims, now: DateTime<Utc>) -> Vec<Story> {
    let topic = claims.topics.first().cloned().unwrap_or_default();
    vec![Story {
        id: "placeholder-1".to_string(),
        title: "Content feed temporarily unavailable".to_string(),
        excerpt: "We could not reach the content feed. Your stories will be back shortly."
            .to_string(),
        content: "There was an issue connecting to the content feed.".to_string(),
        topic,
        link: "#".to_string(),
        published_at: Some(now),
        has_chart: false,
        has_poll: false,
    }]
}
