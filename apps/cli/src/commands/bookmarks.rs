//! One-shot bookmark commands.

use super::require_user;
use crate::context::AppContext;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use shelf_auth::UserId;
use shelf_store::{Bookmark, BookmarkId, BookmarkStore};
use tracing::{debug, info, warn};

/// List bookmarks, newest first.
pub async fn list(ctx: &AppContext, format: &OutputFormat) -> Result<()> {
    let user = require_user(ctx).await?;
    let bookmarks = ctx.store.list(&user.id).await?;
    output::print_bookmarks(&bookmarks, format);
    Ok(())
}

pub async fn add(ctx: &AppContext, title: &str, url: &str, format: &OutputFormat) -> Result<()> {
    let user = require_user(ctx).await?;
    let bookmark = ctx.store.add(title, url, &user.id).await?;
    match format {
        OutputFormat::Json => output::print_json(&bookmark),
        OutputFormat::Text => println!("Added {}", output::bookmark_line(&bookmark)),
    }
    Ok(())
}

pub async fn remove(ctx: &AppContext, id: &str, format: &OutputFormat) -> Result<()> {
    require_user(ctx).await?;
    let id = BookmarkId::new(id.trim());
    if !ctx.store.remove(&id).await? {
        anyhow::bail!("No bookmark with id {}", id);
    }
    output::print_success(&format!("Deleted bookmark {}", id), format);
    Ok(())
}

/// Print the list, then again after every change until Ctrl-C or until the
/// feed ends.
pub async fn watch(ctx: &AppContext, format: &OutputFormat) -> Result<()> {
    let user = require_user(ctx).await?;
    let mut subscription = ctx.store.subscribe(&user.id).await?;
    info!(user_id = %user.id, "Watching bookmarks");

    output::print_bookmarks(&ctx.store.list(&user.id).await?, format);

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                debug!("Interrupted");
                break Ok(());
            }
            change = subscription.next() => match change {
                Some(change) => {
                    debug!(kind = ?change.kind, "Change received");
                    if let Some(bookmarks) = relist(&ctx.store, &user.id).await {
                        output::print_bookmarks(&bookmarks, format);
                    }
                }
                None => {
                    output::print_error("Live updates stopped", format);
                    break Ok(());
                }
            }
        }
    };

    subscription.close().await;
    result
}

/// Re-fetch after a change. A failure is logged and the last printed list
/// stays on screen.
async fn relist(store: &BookmarkStore, user_id: &UserId) -> Option<Vec<Bookmark>> {
    match store.list(user_id).await {
        Ok(bookmarks) => Some(bookmarks),
        Err(e) => {
            warn!(error = %e, "Re-fetch failed, keeping the last list");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shelf_store::{InMemoryBackend, InMemoryDatabase};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_failed_relist_is_skipped_and_next_one_recovers() {
        let db = InMemoryDatabase::new();
        let ada = UserId::new("u-ada");
        let store = BookmarkStore::new(Arc::new(InMemoryBackend::as_user(&db, ada.clone())));
        store.add("Rust", "https://rust-lang.org", &ada).await.unwrap();

        db.fail_next(1);
        assert!(relist(&store, &ada).await.is_none());

        let bookmarks = relist(&store, &ada).await.unwrap();
        assert_eq!(bookmarks.len(), 1);
        assert_eq!(bookmarks[0].title, "Rust");
    }
}
