use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Recipient classification carried in the access token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tier {
    Standard,
    Gold,
}

impl Tier {
    /// Case-insensitive parse. Anything unrecognized is `Standard`.
    pub fn from_claim(raw: Option<&str>) -> Self {
        match raw.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("gold") => Tier::Gold,
            _ => Tier::Standard,
        }
    }

    pub fn is_premium(self) -> bool {
        matches!(self, Tier::Gold)
    }
}

/// Validated claims of a newsletter access token.
///
/// `topics` is an ordered set: entries are unique lowercase slugs and the
/// order is the recipient's own, which decides the topic a story is filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessClaims {
    pub subject_id: String,
    pub display_name: String,
    pub email: String,
    pub topics: Vec<String>,
    pub tier: Tier,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
