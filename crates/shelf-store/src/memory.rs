//! In-process [`BookmarkBackend`] with per-user row access.
//!
//! Several backends can share one [`InMemoryDatabase`], each acting as
//! whichever identity its resolver reports, the way separate clients share
//! one Supabase project. Rows are visible only to their owner, inserts for
//! another user are refused, and every write is broadcast to subscribers of
//! the owning user.

use crate::{
    Bookmark, BookmarkBackend, BookmarkId, ChangeKind, ChangeNotification, ChangeSubscription,
    NewBookmark, StoreError, StoreResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use shelf_auth::UserId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::debug;

type IdentityFn = Arc<dyn Fn() -> Option<UserId> + Send + Sync>;

struct Tables {
    rows: Vec<Bookmark>,
    next_id: u64,
    last_created_at: Option<DateTime<Utc>>,
}

/// Shared table state plus test controls.
pub struct InMemoryDatabase {
    tables: Mutex<Tables>,
    changes: broadcast::Sender<(UserId, ChangeKind)>,
    hangups: broadcast::Sender<()>,
    remote_calls: AtomicUsize,
    open_subscriptions: Arc<AtomicUsize>,
    failures_pending: AtomicUsize,
    latency: Mutex<Duration>,
}

impl InMemoryDatabase {
    pub fn new() -> Arc<Self> {
        let (changes, _) = broadcast::channel(64);
        let (hangups, _) = broadcast::channel(1);
        Arc::new(Self {
            tables: Mutex::new(Tables {
                rows: Vec::new(),
                next_id: 1,
                last_created_at: None,
            }),
            changes,
            hangups,
            remote_calls: AtomicUsize::new(0),
            open_subscriptions: Arc::new(AtomicUsize::new(0)),
            failures_pending: AtomicUsize::new(0),
            latency: Mutex::new(Duration::ZERO),
        })
    }

    /// Number of backend calls made against this database, subscribes included.
    pub fn remote_calls(&self) -> usize {
        self.remote_calls.load(Ordering::SeqCst)
    }

    pub fn open_subscriptions(&self) -> usize {
        self.open_subscriptions.load(Ordering::SeqCst)
    }

    /// End every open subscription from the server side, as Realtime does
    /// when a channel's token expires.
    pub fn drop_feeds(&self) {
        let _ = self.hangups.send(());
    }

    /// Make the next `n` calls fail with a 503.
    pub fn fail_next(&self, n: usize) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Delay applied to every call before it touches the tables.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock() = latency;
    }

    /// Every row, regardless of owner. For assertions only.
    pub fn all_rows(&self) -> Vec<Bookmark> {
        self.tables.lock().rows.clone()
    }

    async fn begin_call(&self) -> StoreResult<()> {
        self.remote_calls.fetch_add(1, Ordering::SeqCst);
        let latency = *self.latency.lock();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let injected = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Supabase {
                status: 503,
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }

    fn notify(&self, owner: &UserId, kind: ChangeKind) {
        // No receivers is fine.
        let _ = self.changes.send((owner.clone(), kind));
    }
}

#[derive(Clone)]
pub struct InMemoryBackend {
    db: Arc<InMemoryDatabase>,
    identity: IdentityFn,
}

impl InMemoryBackend {
    /// A backend permanently signed in as `user_id`.
    pub fn as_user(db: &Arc<InMemoryDatabase>, user_id: UserId) -> Self {
        Self::with_identity(db, move || Some(user_id.clone()))
    }

    /// A backend whose identity is resolved on every call, e.g. from a
    /// session manager.
    pub fn with_identity<F>(db: &Arc<InMemoryDatabase>, identity: F) -> Self
    where
        F: Fn() -> Option<UserId> + Send + Sync + 'static,
    {
        Self {
            db: db.clone(),
            identity: Arc::new(identity),
        }
    }

    pub fn database(&self) -> &Arc<InMemoryDatabase> {
        &self.db
    }

    fn caller(&self) -> StoreResult<UserId> {
        (self.identity)().ok_or(StoreError::NotAuthenticated)
    }
}

#[async_trait]
impl BookmarkBackend for InMemoryBackend {
    async fn list(&self, user_id: &UserId) -> StoreResult<Vec<Bookmark>> {
        let caller = self.caller()?;
        self.db.begin_call().await?;

        let mut rows: Vec<Bookmark> = self
            .db
            .tables
            .lock()
            .rows
            .iter()
            .filter(|b| b.user_id == caller && &b.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, bookmark: &NewBookmark) -> StoreResult<Bookmark> {
        let caller = self.caller()?;
        self.db.begin_call().await?;

        if bookmark.user_id() != &caller {
            return Err(StoreError::Supabase {
                status: 403,
                message: "new row violates row-level security policy for table \"bookmarks\""
                    .to_string(),
            });
        }

        let row = {
            let mut tables = self.db.tables.lock();
            // Strictly increasing so newest-first ordering is total.
            let mut created_at = Utc::now();
            if let Some(last) = tables.last_created_at {
                if created_at <= last {
                    created_at = last + ChronoDuration::microseconds(1);
                }
            }
            tables.last_created_at = Some(created_at);

            let row = Bookmark {
                id: BookmarkId::new(tables.next_id.to_string()),
                title: bookmark.title().to_string(),
                url: bookmark.url().to_string(),
                user_id: caller.clone(),
                created_at,
            };
            tables.next_id += 1;
            tables.rows.push(row.clone());
            row
        };

        debug!(id = %row.id, "Inserted bookmark");
        self.db.notify(&caller, ChangeKind::Insert);
        Ok(row)
    }

    async fn delete(&self, id: &BookmarkId) -> StoreResult<bool> {
        let caller = self.caller()?;
        self.db.begin_call().await?;

        let removed = {
            let mut tables = self.db.tables.lock();
            let before = tables.rows.len();
            tables
                .rows
                .retain(|b| !(&b.id == id && b.user_id == caller));
            tables.rows.len() != before
        };

        if removed {
            self.db.notify(&caller, ChangeKind::Delete);
        }
        Ok(removed)
    }

    async fn subscribe(&self, user_id: &UserId) -> StoreResult<ChangeSubscription> {
        let caller = self.caller()?;
        self.db.begin_call().await?;

        let watched = user_id.clone();
        let mut changes = self.db.changes.subscribe();
        let mut hangup = self.db.hangups.subscribe();
        let (events_tx, events_rx) = mpsc::channel(32);
        let (close_tx, mut close_rx) = oneshot::channel::<()>();
        let open = self.db.open_subscriptions.clone();
        open.fetch_add(1, Ordering::SeqCst);

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut close_rx => break,
                    _ = hangup.recv() => break,
                    change = changes.recv() => match change {
                        Ok((owner, kind)) => {
                            if owner != watched || owner != caller {
                                continue;
                            }
                            if events_tx.send(ChangeNotification { kind }).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            // Notifications carry no data, so one stands in for many.
                            let notification = ChangeNotification { kind: ChangeKind::Update };
                            if events_tx.send(notification).await.is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
            open.fetch_sub(1, Ordering::SeqCst);
        });

        Ok(ChangeSubscription::new(events_rx, close_tx, task))
    }
}
