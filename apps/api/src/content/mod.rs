//! Content sources and the normalizers that turn their payloads into
//! `NormalizedPost` values.

pub mod feed;
pub mod tagged_api;
pub mod text;

use async_trait::async_trait;
use thiserror::Error;

use crate::fetch::SourceUnavailable;
use crate::models::post::NormalizedPost;

/// A payload was retrieved but could not be read. Counts as a failed fetch
/// attempt, so the chain moves on to its next strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContentError {
    #[error("feed document is malformed: {0}")]
    FeedMalformed(String),

    #[error("API response is malformed: {0}")]
    ApiMalformed(String),
}

/// One upstream that can supply posts for a set of recipient topics.
///
/// Carried by the pipeline as `Arc<dyn ContentSource>`.
#[async_trait]
pub trait ContentSource: Send + Sync {
    fn name(&self) -> &str;

    async fn fetch_posts(&self, topics: &[String])
        -> Result<Vec<NormalizedPost>, SourceUnavailable>;
}
