use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::AuthError;

/// Sports a sync pipeline exists for. Key scopes are validated against this
/// list at creation time so a typo never silently locks a key out.
pub const KNOWN_SPORTS: &[&str] = &["soccer", "basketball"];

/// The set of sports an API key may query.
///
/// Persisted as a JSON array for compatibility with the `sports` column
/// (`["*"]` means all sports), but represented as a tagged type in memory so
/// the wildcard is not a magic string floating through the code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SportScope {
    Wildcard,
    Tags(BTreeSet<String>),
}

impl SportScope {
    /// Builds a scope from raw tags, rejecting empty or unknown lists.
    pub fn from_tags<I, S>(tags: I) -> Result<Self, AuthError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = BTreeSet::new();
        for tag in tags {
            let tag = tag.as_ref().trim();
            if tag == "*" {
                return Ok(SportScope::Wildcard);
            }
            if !KNOWN_SPORTS.contains(&tag) {
                return Err(AuthError::InvalidRequest(format!(
                    "invalid sport: {tag}. Valid options: soccer, basketball, *"
                )));
            }
            set.insert(tag.to_string());
        }
        if set.is_empty() {
            return Err(AuthError::InvalidRequest(
                "sports scope must contain at least one sport or \"*\"".to_string(),
            ));
        }
        Ok(SportScope::Tags(set))
    }

    pub fn allows(&self, sport: &str) -> bool {
        match self {
            SportScope::Wildcard => true,
            SportScope::Tags(tags) => tags.contains(sport),
        }
    }

    /// JSON-array form used by the `sports` column and API responses.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            SportScope::Wildcard => vec!["*".to_string()],
            SportScope::Tags(tags) => tags.iter().cloned().collect(),
        }
    }

    pub fn to_json(&self) -> String {
        // Serializing a Vec<String> cannot fail.
        serde_json::to_string(&self.as_list()).unwrap_or_else(|_| "[\"*\"]".to_string())
    }

    pub fn from_json(raw: &str) -> Result<Self, AuthError> {
        let tags: Vec<String> = serde_json::from_str(raw)?;
        SportScope::from_tags(tags)
    }
}

impl Serialize for SportScope {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_list().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SportScope {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tags = Vec::<String>::deserialize(deserializer)?;
        SportScope::from_tags(tags).map_err(serde::de::Error::custom)
    }
}

/// A stored API key record. `key_hash` is the SHA-256 hex digest of the full
/// plaintext key; the plaintext itself is never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ApiKeyRecord {
    pub id: i64,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub name: String,
    pub sports: SportScope,
    pub rate_limit_per_minute: u32,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl ApiKeyRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at < now)
    }
}

// Request/Response models
#[derive(Debug, Deserialize)]
pub struct CreateApiKeyRequest {
    pub name: String,
    pub sports: Vec<String>,
    pub rate_limit_per_minute: Option<u32>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct CreateApiKeyResponse {
    /// Shown exactly once; only the digest is stored.
    pub api_key: String,
    pub key_prefix: String,
    pub name: String,
    pub sports: Vec<String>,
    pub rate_limit_per_minute: u32,
}
