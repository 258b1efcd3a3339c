use crate::config::TopicCatalog;
use crate::personalize::pipeline::PersonalizationPipeline;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: PersonalizationPipeline,
    /// Labels and colors for topic sections.
    pub catalog: TopicCatalog,
}
