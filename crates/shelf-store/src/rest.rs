//! PostgREST implementation of [`BookmarkBackend`].

use crate::realtime::RealtimeClient;
use crate::{
    decode_rows, Bookmark, BookmarkBackend, BookmarkId, ChangeSubscription, NewBookmark,
    StoreError, StoreResult,
};
use async_trait::async_trait;
use serde_json::Value;
use shelf_auth::{TokenSource, UserId};
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

const TABLE: &str = "bookmarks";

#[derive(Debug, Default, serde::Deserialize)]
struct PostgrestErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// Talks to `{supabase_url}/rest/v1/bookmarks` as the signed-in user.
///
/// Row ownership is enforced by the table's row-level security; this client
/// only adds the `user_id` filter that keeps listings scoped.
#[derive(Clone)]
pub struct PostgrestBackend {
    http_client: reqwest::Client,
    base_url: String,
    anon_key: String,
    tokens: Arc<dyn TokenSource>,
    realtime: RealtimeClient,
}

impl PostgrestBackend {
    pub fn new(
        supabase_url: &str,
        anon_key: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> StoreResult<Self> {
        let base_url = supabase_url.trim_end_matches('/').to_string();
        Ok(Self {
            http_client: reqwest::Client::new(),
            realtime: RealtimeClient::new(&base_url, anon_key)?,
            base_url,
            anon_key: anon_key.to_string(),
            tokens,
        })
    }

    fn table_url(&self) -> StoreResult<Url> {
        Ok(Url::parse(&format!("{}/rest/v1/{}", self.base_url, TABLE))?)
    }

    /// `GET` target for a user's listing, newest first.
    pub fn list_url(&self, user_id: &UserId) -> StoreResult<Url> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("select", "*")
            .append_pair("user_id", &format!("eq.{}", user_id))
            .append_pair("order", "created_at.desc");
        Ok(url)
    }

    pub fn delete_url(&self, id: &BookmarkId) -> StoreResult<Url> {
        let mut url = self.table_url()?;
        url.query_pairs_mut()
            .append_pair("id", &format!("eq.{}", id));
        Ok(url)
    }

    async fn authorized(&self, builder: reqwest::RequestBuilder) -> StoreResult<reqwest::RequestBuilder> {
        let token = self.tokens.access_token().await?;
        Ok(builder
            .header("apikey", &self.anon_key)
            .header("Authorization", format!("Bearer {}", token))
            .header("Accept", "application/json"))
    }

    async fn rows(&self, response: reqwest::Response, op: &'static str) -> StoreResult<Vec<Value>> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let parsed: PostgrestErrorBody = serde_json::from_str(&body).unwrap_or_default();
            let message = match (parsed.message, parsed.hint) {
                (Some(m), Some(h)) => format!("{} ({})", m, h),
                (Some(m), None) => m,
                _ => status.to_string(),
            };
            warn!(op, status = status.as_u16(), message = %message, "PostgREST request failed");
            return Err(StoreError::Supabase {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl BookmarkBackend for PostgrestBackend {
    async fn list(&self, user_id: &UserId) -> StoreResult<Vec<Bookmark>> {
        let request = self
            .authorized(self.http_client.get(self.list_url(user_id)?))
            .await?;
        let rows = self.rows(request.send().await?, "list").await?;
        let bookmarks = decode_rows(&rows);
        debug!(count = bookmarks.len(), dropped = rows.len() - bookmarks.len(), "Fetched bookmarks");
        Ok(bookmarks)
    }

    async fn insert(&self, bookmark: &NewBookmark) -> StoreResult<Bookmark> {
        let request = self
            .authorized(self.http_client.post(self.table_url()?))
            .await?
            .header("Prefer", "return=representation")
            .json(bookmark);
        let rows = self.rows(request.send().await?, "insert").await?;
        let row = rows
            .first()
            .ok_or_else(|| StoreError::InvalidRecord("insert returned no rows".to_string()))?;
        Bookmark::try_from(row)
    }

    async fn delete(&self, id: &BookmarkId) -> StoreResult<bool> {
        let request = self
            .authorized(self.http_client.delete(self.delete_url(id)?))
            .await?
            .header("Prefer", "return=representation");
        let rows = self.rows(request.send().await?, "delete").await?;
        // RLS hides rows the caller does not own, so those deletes match nothing.
        Ok(!rows.is_empty())
    }

    async fn subscribe(&self, user_id: &UserId) -> StoreResult<ChangeSubscription> {
        let token = self.tokens.access_token().await?;
        self.realtime.subscribe(user_id, &token).await
    }
}
