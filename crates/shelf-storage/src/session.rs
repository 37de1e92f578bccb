//! Persisted Supabase session: tokens plus metadata.

use crate::{SecureStorage, StorageError, StorageKeys, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds of remaining validity below which a token counts as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    /// When the access token expires (RFC 3339)
    pub expires_at: String,
    /// Supabase project the tokens were issued by
    pub project_ref: String,
}

/// A complete persisted session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: String,
    pub meta: SessionMeta,
}

impl StoredSession {
    pub fn is_expired(&self) -> bool {
        meta_is_expired(&self.meta)
    }
}

/// Session persistence scoped to one Supabase project.
///
/// A session written for another project is reported as absent, so pointing
/// the config at a different project never reuses foreign tokens.
pub struct SessionStore {
    storage: Box<dyn SecureStorage>,
    project_ref: String,
}

impl SessionStore {
    pub fn new(storage: Box<dyn SecureStorage>, project_ref: impl Into<String>) -> Self {
        Self {
            storage,
            project_ref: project_ref.into(),
        }
    }

    pub fn project_ref(&self) -> &str {
        &self.project_ref
    }

    pub fn set_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        user_id: &str,
        email: Option<&str>,
        expires_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        self.storage.set(StorageKeys::ACCESS_TOKEN, access_token)?;
        self.storage.set(StorageKeys::REFRESH_TOKEN, refresh_token)?;
        self.set_meta(&SessionMeta {
            user_id: user_id.to_string(),
            email: email.map(String::from),
            expires_at: expires_at.to_rfc3339(),
            project_ref: self.project_ref.clone(),
        })?;
        tracing::debug!(user_id, "session persisted");
        Ok(())
    }

    pub fn access_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::ACCESS_TOKEN)
    }

    pub fn refresh_token(&self) -> StorageResult<Option<String>> {
        self.storage.get(StorageKeys::REFRESH_TOKEN)
    }

    fn set_meta(&self, meta: &SessionMeta) -> StorageResult<()> {
        let json = serde_json::to_string(meta).map_err(|e| StorageError::Encoding(e.to_string()))?;
        self.storage.set(StorageKeys::SESSION_META, &json)
    }

    /// Metadata for this project, if any.
    pub fn meta(&self) -> StorageResult<Option<SessionMeta>> {
        let Some(json) = self.storage.get(StorageKeys::SESSION_META)? else {
            return Ok(None);
        };
        let meta: SessionMeta =
            serde_json::from_str(&json).map_err(|e| StorageError::Encoding(e.to_string()))?;
        if meta.project_ref != self.project_ref {
            tracing::debug!(
                stored = %meta.project_ref,
                current = %self.project_ref,
                "ignoring session for another project"
            );
            return Ok(None);
        }
        Ok(Some(meta))
    }

    /// The full session, when tokens and metadata are all present.
    pub fn session(&self) -> StorageResult<Option<StoredSession>> {
        let Some(meta) = self.meta()? else {
            return Ok(None);
        };
        let (Some(access_token), Some(refresh_token)) =
            (self.access_token()?, self.refresh_token()?)
        else {
            return Ok(None);
        };
        Ok(Some(StoredSession {
            access_token,
            refresh_token,
            meta,
        }))
    }

    pub fn has_session(&self) -> StorageResult<bool> {
        Ok(self.storage.has(StorageKeys::ACCESS_TOKEN)? && self.meta()?.is_some())
    }

    /// True when no session exists or the access token is about to lapse.
    pub fn is_session_expired(&self) -> StorageResult<bool> {
        Ok(self.meta()?.map(|m| meta_is_expired(&m)).unwrap_or(true))
    }

    pub fn clear_session(&self) -> StorageResult<()> {
        self.storage.delete(StorageKeys::ACCESS_TOKEN)?;
        self.storage.delete(StorageKeys::REFRESH_TOKEN)?;
        self.storage.delete(StorageKeys::SESSION_META)?;
        tracing::debug!("session cleared");
        Ok(())
    }
}

fn meta_is_expired(meta: &SessionMeta) -> bool {
    match DateTime::parse_from_rfc3339(&meta.expires_at) {
        Ok(expires_at) => expires_at.signed_duration_since(Utc::now()).num_seconds() < EXPIRY_SKEW_SECS,
        Err(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStorage;
    use chrono::Duration;

    fn store() -> SessionStore {
        SessionStore::new(Box::new(MemoryStorage::new()), "abcd")
    }

    #[test]
    fn test_session_roundtrip() {
        let store = store();
        assert!(!store.has_session().unwrap());
        assert!(store.session().unwrap().is_none());

        store
            .set_session(
                "access-token",
                "refresh-token",
                "user-123",
                Some("test@example.com"),
                Utc::now() + Duration::hours(1),
            )
            .unwrap();

        assert!(store.has_session().unwrap());
        let session = store.session().unwrap().unwrap();
        assert_eq!(session.access_token, "access-token");
        assert_eq!(session.refresh_token, "refresh-token");
        assert_eq!(session.meta.user_id, "user-123");
        assert_eq!(session.meta.email.as_deref(), Some("test@example.com"));
        assert_eq!(session.meta.project_ref, "abcd");
        assert!(!session.is_expired());

        store.clear_session().unwrap();
        assert!(!store.has_session().unwrap());
        assert!(store.access_token().unwrap().is_none());
    }

    #[test]
    fn test_session_expiry_with_skew() {
        let store = store();
        assert!(store.is_session_expired().unwrap());

        store
            .set_session("a", "r", "u", None, Utc::now() + Duration::seconds(30))
            .unwrap();
        assert!(store.is_session_expired().unwrap());

        store
            .set_session("a", "r", "u", None, Utc::now() + Duration::hours(1))
            .unwrap();
        assert!(!store.is_session_expired().unwrap());
    }

    #[test]
    fn test_session_for_other_project_is_ignored() {
        let storage = std::sync::Arc::new(MemoryStorage::new());

        SessionStore::new(Box::new(storage.clone()), "one")
            .set_session("a", "r", "u", None, Utc::now() + Duration::hours(1))
            .unwrap();

        let other = SessionStore::new(Box::new(storage), "two");
        assert!(other.session().unwrap().is_none());
        assert!(!other.has_session().unwrap());
    }
}
