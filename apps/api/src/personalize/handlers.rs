use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::{TopicCatalog, TopicConfig};
use crate::errors::AppError;
use crate::models::claims::{AccessClaims, Tier};
use crate::models::story::Story;
use crate::personalize::pipeline::{placeholder_stories, PipelineError};
use crate::state::AppState;

const UNAVAILABLE_NOTICE: &str =
    "We're having trouble loading the latest stories. Please check back shortly.";

#[derive(Deserialize)]
pub struct NewsletterQuery {
    pub token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct Recipient {
    pub first_name: String,
    pub tier: Tier,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TopicSection {
    pub topic: String,
    pub label: String,
    pub color: Option<String>,
    pub stories: Vec<Story>,
}

#[derive(Debug, Serialize)]
pub struct NewsletterResponse {
    pub recipient: Recipient,
    pub premium: bool,
    /// Set when the stories are stand-ins, not fetched content.
    pub placeholder: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub sections: Vec<TopicSection>,
}

impl NewsletterResponse {
    fn build(
        claims: &AccessClaims,
        stories: Vec<Story>,
        catalog: &TopicCatalog,
        notice: Option<String>,
    ) -> Self {
        Self {
            recipient: Recipient {
                first_name: claims.display_name.clone(),
                tier: claims.tier,
                expires_at: claims.expires_at,
            },
            premium: claims.tier.is_premium(),
            placeholder: notice.is_some(),
            notice,
            sections: sections(&claims.topics, stories, catalog),
        }
    }
}

/// Groups stories by topic in recipient order. Story order within a section
/// is preserved; topics without stories get no section.
fn sections(topics: &[String], stories: Vec<Story>, catalog: &TopicCatalog) -> Vec<TopicSection> {
    let mut sections: Vec<TopicSection> = topics
        .iter()
        .map(|topic| TopicSection {
            topic: topic.clone(),
            label: catalog.label_for(topic),
            color: catalog.color_for(topic).map(str::to_string),
            stories: Vec::new(),
        })
        .collect();

    for story in stories {
        if let Some(section) = sections.iter_mut().find(|s| s.topic == story.topic) {
            section.stories.push(story);
        }
    }

    sections.retain(|s| !s.stories.is_empty());
    sections
}

/// GET /api/v1/newsletter
pub async fn handle_newsletter(
    State(state): State<AppState>,
    Query(params): Query<NewsletterQuery>,
) -> Result<Json<NewsletterResponse>, AppError> {
    let now = Utc::now();

    match state.pipeline.personalize(params.token.as_deref(), now).await {
        Ok(newsletter) => Ok(Json(NewsletterResponse::build(
            &newsletter.claims,
            newsletter.stories,
            &state.catalog,
            None,
        ))),
        Err(PipelineError::Claims(e)) => Err(e.into()),
        Err(PipelineError::SourceUnavailable { claims, source }) => {
            warn!(
                subject = %claims.subject_id,
                failures = source.failures.len(),
                "serving placeholder stories"
            );
            let stories = placeholder_stories(&claims, now);
            Ok(Json(NewsletterResponse::build(
                &claims,
                stories,
                &state.catalog,
                Some(UNAVAILABLE_NOTICE.to_string()),
            )))
        }
    }
}

/// GET /api/v1/topics
pub async fn handle_topics(State(state): State<AppState>) -> Json<Vec<TopicConfig>> {
    Json(state.catalog.0.clone())
}
