use chrono::{DateTime, Utc};
use serde::Serialize;

/// A matched post filed under exactly one recipient topic, with rendering hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Story {
    pub id: String,
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub topic: String,
    pub link: String,
    pub published_at: Option<DateTime<Utc>>,
    pub has_chart: bool,
    pub has_poll: bool,
}
