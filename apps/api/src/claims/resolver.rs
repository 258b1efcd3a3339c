use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::claims::ClaimsError;
use crate::models::claims::{AccessClaims, Tier};

// ────────────────────────────────────────────────────────────────────────────
// Wire shape of the token payload
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SubjectClaim {
    Text(String),
    Number(i64),
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    sub: SubjectClaim,
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    email: String,
    topics: Vec<String>,
    #[serde(default)]
    tier: Option<String>,
    iat: i64,
    exp: i64,
}

impl RawClaims {
    fn into_claims(self) -> Result<AccessClaims, ClaimsError> {
        let topics = normalize_topics(&self.topics)?;

        let issued_at = timestamp(self.iat, "iat")?;
        let expires_at = timestamp(self.exp, "exp")?;
        if expires_at <= issued_at {
            return Err(ClaimsError::TokenMalformed(
                "exp must be later than iat".to_string(),
            ));
        }

        let subject_id = match self.sub {
            SubjectClaim::Text(s) => s,
            SubjectClaim::Number(n) => n.to_string(),
        };

        Ok(AccessClaims {
            subject_id,
            display_name: self.first_name,
            email: self.email,
            topics,
            tier: Tier::from_claim(self.tier.as_deref()),
            issued_at,
            expires_at,
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resolver
// ────────────────────────────────────────────────────────────────────────────

/// Turns an access token into validated claims.
///
/// Checks run in a fixed order so the recipient gets the most useful message:
/// missing → malformed → expired → unverified. The result depends only on the
/// token, the secret, and the `now` passed in.
#[derive(Clone)]
pub struct ClaimsResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl ClaimsResolver {
    pub fn new(secret: &str) -> Self {
        // Expiry is checked against the caller's clock before verification.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn resolve(
        &self,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AccessClaims, ClaimsError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(ClaimsError::TokenMissing)?;

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(ClaimsError::TokenMalformed(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        }

        let header: serde_json::Value = serde_json::from_slice(&decode_segment(segments[0])?)
            .map_err(|e| ClaimsError::TokenMalformed(format!("header is not JSON: {e}")))?;
        if !header.is_object() {
            return Err(ClaimsError::TokenMalformed(
                "header is not a JSON object".to_string(),
            ));
        }

        let raw: RawClaims = serde_json::from_slice(&decode_segment(segments[1])?)
            .map_err(|e| ClaimsError::TokenMalformed(format!("payload: {e}")))?;
        let claims = raw.into_claims()?;

        if claims.expires_at < now {
            return Err(ClaimsError::TokenExpired {
                expired_at: claims.expires_at,
            });
        }

        jsonwebtoken::decode::<serde_json::Value>(token, &self.decoding_key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "token signature rejected");
                ClaimsError::TokenUnverified
            })?;

        Ok(claims)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

fn decode_segment(segment: &str) -> Result<Vec<u8>, ClaimsError> {
    if segment.is_empty() {
        return Err(ClaimsError::TokenMalformed("empty segment".to_string()));
    }
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| ClaimsError::TokenMalformed(format!("segment is not base64url: {e}")))
}

fn timestamp(secs: i64, field: &str) -> Result<DateTime<Utc>, ClaimsError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| ClaimsError::TokenMalformed(format!("{field} is out of range")))
}

/// Lowercases, trims and de-duplicates topic slugs, keeping first occurrence order.
fn normalize_topics(raw: &[String]) -> Result<Vec<String>, ClaimsError> {
    let mut topics: Vec<String> = Vec::with_capacity(raw.len());
    for topic in raw {
        let slug = topic.trim().to_lowercase();
        if !is_slug(&slug) {
            return Err(ClaimsError::TokenMalformed(format!(
                "topic '{topic}' is not a slug"
            )));
        }
        if !topics.contains(&slug) {
            topics.push(slug);
        }
    }

    if topics.is_empty() {
        return Err(ClaimsError::TokenMalformed("topics is empty".to_string()));
    }
    Ok(topics)
}

fn is_slug(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
