//! The remote seam: table operations plus the change feed.

use crate::{Bookmark, BookmarkId, NewBookmark, StoreResult};
use async_trait::async_trait;
use shelf_auth::UserId;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::debug;

/// How long `close()` waits for the feed to say goodbye.
const CLOSE_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "INSERT" => Some(ChangeKind::Insert),
            "UPDATE" => Some(ChangeKind::Update),
            "DELETE" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

/// Something changed in the user's rows. Carries no row data; the receiver
/// re-fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeNotification {
    pub kind: ChangeKind,
}

/// A live change feed.
///
/// The stream is finite: it ends when the server closes the channel, the
/// join is rejected, or the connection fails, and it is never restarted.
/// Call [`close`](Self::close) on teardown. Dropping also signals the feed
/// to stop, without waiting for it.
pub struct ChangeSubscription {
    events: mpsc::Receiver<ChangeNotification>,
    close_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ChangeSubscription {
    /// Assemble a subscription from a driver task. The driver must stop when
    /// `close_rx` resolves (sent or dropped).
    pub fn new(
        events: mpsc::Receiver<ChangeNotification>,
        close_tx: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            events,
            close_tx: Some(close_tx),
            task: Some(task),
        }
    }

    /// The next notification, or `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<ChangeNotification> {
        self.events.recv().await
    }

    pub async fn close(mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
        if let Some(mut task) = self.task.take() {
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_err() {
                debug!("Change feed did not stop in time, aborting");
                task.abort();
            }
        }
    }
}

impl Drop for ChangeSubscription {
    fn drop(&mut self) {
        if let Some(tx) = self.close_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[async_trait]
pub trait BookmarkBackend: Send + Sync {
    /// The user's rows, newest first.
    async fn list(&self, user_id: &UserId) -> StoreResult<Vec<Bookmark>>;

    async fn insert(&self, bookmark: &NewBookmark) -> StoreResult<Bookmark>;

    /// Delete by id. `false` when no visible row matched.
    async fn delete(&self, id: &BookmarkId) -> StoreResult<bool>;

    async fn subscribe(&self, user_id: &UserId) -> StoreResult<ChangeSubscription>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_kind_parse() {
        assert_eq!(ChangeKind::parse("INSERT"), Some(ChangeKind::Insert));
        assert_eq!(ChangeKind::parse("DELETE"), Some(ChangeKind::Delete));
        assert_eq!(ChangeKind::parse("TRUNCATE"), None);
    }

    #[tokio::test]
    async fn test_close_stops_driver() {
        let (tx, rx) = mpsc::channel(4);
        let (close_tx, close_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            tx.send(ChangeNotification {
                kind: ChangeKind::Insert,
            })
            .await
            .unwrap();
            let _ = close_rx.await;
        });

        let mut sub = ChangeSubscription::new(rx, close_tx, task);
        assert_eq!(
            sub.next().await,
            Some(ChangeNotification {
                kind: ChangeKind::Insert
            })
        );
        sub.close().await;
    }

    #[tokio::test]
    async fn test_stream_ends_when_driver_exits() {
        let (tx, rx) = mpsc::channel(4);
        let (close_tx, _close_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            drop(tx);
        });
        let mut sub = ChangeSubscription::new(rx, close_tx, task);
        assert_eq!(sub.next().await, None);
    }
}
