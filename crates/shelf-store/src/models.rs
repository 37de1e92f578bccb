//! Typed bookmark records, validated where rows enter the client.

use crate::{StoreError, StoreResult, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shelf_auth::UserId;
use std::fmt;
use tracing::warn;

/// Row id. PostgREST may return it as a string (uuid) or an integer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkId(String);

impl BookmarkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(Self(n.to_string())),
            _ => None,
        }
    }
}

impl fmt::Display for BookmarkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookmarkId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bookmark {
    pub id: BookmarkId,
    pub title: String,
    pub url: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<&Value> for Bookmark {
    type Error = StoreError;

    fn try_from(row: &Value) -> StoreResult<Self> {
        let field = |name: &str| row.get(name).unwrap_or(&Value::Null);
        let text = |name: &str| -> StoreResult<String> {
            field(name)
                .as_str()
                .map(String::from)
                .ok_or_else(|| StoreError::InvalidRecord(format!("`{}` is not a string", name)))
        };

        let id = BookmarkId::from_value(field("id"))
            .ok_or_else(|| StoreError::InvalidRecord("missing or malformed `id`".to_string()))?;
        let title = text("title")?;
        let url = text("url")?;
        let user_id = text("user_id")?;
        if user_id.is_empty() {
            return Err(StoreError::InvalidRecord("empty `user_id`".to_string()));
        }
        let created_at = DateTime::parse_from_rfc3339(&text("created_at")?)
            .map_err(|e| StoreError::InvalidRecord(format!("bad `created_at`: {}", e)))?
            .with_timezone(&Utc);

        Ok(Bookmark {
            id,
            title,
            url,
            user_id: UserId::new(user_id),
            created_at,
        })
    }
}

/// Decode a PostgREST result set, dropping rows that fail validation.
pub fn decode_rows(rows: &[Value]) -> Vec<Bookmark> {
    rows.iter()
        .filter_map(|row| match Bookmark::try_from(row) {
            Ok(bookmark) => Some(bookmark),
            Err(e) => {
                warn!(error = %e, "Dropping malformed bookmark row");
                None
            }
        })
        .collect()
}

/// A validated insert. Both fields are trimmed and must be non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewBookmark {
    title: String,
    url: String,
    user_id: UserId,
}

impl NewBookmark {
    pub fn new(title: &str, url: &str, user_id: &UserId) -> Result<Self, ValidationError> {
        let title = title.trim();
        let url = url.trim();
        if title.is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if url.is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        Ok(Self {
            title: title.to_string(),
            url: url.to_string(),
            user_id: user_id.clone(),
        })
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }
}
