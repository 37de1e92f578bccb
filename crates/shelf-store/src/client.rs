//! Validating front door over a [`BookmarkBackend`].

use crate::{
    Bookmark, BookmarkBackend, BookmarkId, ChangeSubscription, NewBookmark, StoreResult,
};
use shelf_auth::UserId;
use std::sync::Arc;
use tracing::{error, info};

/// Bookmark operations for the front ends.
///
/// Validation happens here, before the backend sees anything. Failures are
/// logged and returned unchanged; callers decide what to keep.
#[derive(Clone)]
pub struct BookmarkStore {
    backend: Arc<dyn BookmarkBackend>,
}

impl BookmarkStore {
    pub fn new(backend: Arc<dyn BookmarkBackend>) -> Self {
        Self { backend }
    }

    pub async fn list(&self, user_id: &UserId) -> StoreResult<Vec<Bookmark>> {
        self.backend.list(user_id).await.inspect_err(|e| {
            error!(user_id = %user_id, error = %e, "Failed to list bookmarks");
        })
    }

    pub async fn add(&self, title: &str, url: &str, user_id: &UserId) -> StoreResult<Bookmark> {
        let bookmark = NewBookmark::new(title, url, user_id)?;
        self.insert(&bookmark).await
    }

    pub async fn insert(&self, bookmark: &NewBookmark) -> StoreResult<Bookmark> {
        let created = self.backend.insert(bookmark).await.inspect_err(|e| {
            error!(error = %e, "Failed to add bookmark");
        })?;
        info!(id = %created.id, "Bookmark added");
        Ok(created)
    }

    /// Delete by id. Deleting a missing or foreign id is not an error.
    pub async fn remove(&self, id: &BookmarkId) -> StoreResult<bool> {
        let removed = self.backend.delete(id).await.inspect_err(|e| {
            error!(id = %id, error = %e, "Failed to delete bookmark");
        })?;
        if removed {
            info!(id = %id, "Bookmark deleted");
        } else {
            info!(id = %id, "Delete matched no rows");
        }
        Ok(removed)
    }

    pub async fn subscribe(&self, user_id: &UserId) -> StoreResult<ChangeSubscription> {
        self.backend.subscribe(user_id).await.inspect_err(|e| {
            error!(user_id = %user_id, error = %e, "Failed to subscribe to bookmark changes");
        })
    }
}
