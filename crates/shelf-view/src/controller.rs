//! The controller: single owner of [`ViewState`].
//!
//! Front ends send [`Action`]s through a [`ControllerHandle`] and watch the
//! state. Everything that changes state arrives as a message on one queue:
//! actions, auth changes from the session manager, results of remote calls
//! and change notifications. Remote calls run as tracked tasks and report
//! back through the same queue, tagged with the session epoch they started
//! in.

use crate::tasks::TaskTracker;
use crate::{Action, ActionKind, ViewError, ViewState};
use shelf_auth::{AuthListenerGuard, SessionManager, User, UserId};
use shelf_store::{
    Bookmark, BookmarkId, BookmarkStore, ChangeSubscription, NewBookmark, StoreError, StoreResult,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Pause before subscribing again after the server ends a feed.
const FEED_REOPEN_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub enum Outcome {
    Completed(ActionKind),
    Failed {
        action: ActionKind,
        error: Arc<ViewError>,
    },
}

enum Msg {
    Action(Action),
    /// From the session manager's listener
    AuthChanged(Option<User>),
    /// From the controller's own initial `current_user()` call
    Resolved(Option<User>),
    Finished {
        action: ActionKind,
        result: Result<(), ViewError>,
    },
    Fetched {
        epoch: u64,
        generation: u64,
        result: StoreResult<Vec<Bookmark>>,
    },
    Added {
        epoch: u64,
        result: StoreResult<Bookmark>,
    },
    Removed {
        epoch: u64,
        result: StoreResult<bool>,
    },
    Subscribed {
        epoch: u64,
        /// Re-fetch once live, to pick up changes made while disconnected
        resync: bool,
        result: StoreResult<ChangeSubscription>,
    },
    Changed {
        epoch: u64,
    },
    FeedEnded {
        epoch: u64,
    },
    Dispose,
}

/// Weak sender for tasks, so in-flight work never keeps the loop alive.
#[derive(Clone)]
struct Mailbox(mpsc::WeakUnboundedSender<Msg>);

impl Mailbox {
    fn post(&self, msg: Msg) -> bool {
        match self.0.upgrade() {
            Some(tx) => tx.send(msg).is_ok(),
            None => false,
        }
    }
}

struct Feed {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<Msg>,
    state_rx: watch::Receiver<ViewState>,
    outcomes: broadcast::Sender<Outcome>,
}

impl ControllerHandle {
    /// Queue an action. Returns false once the controller has stopped.
    pub fn dispatch(&self, action: Action) -> bool {
        self.tx.send(Msg::Action(action)).is_ok()
    }

    pub fn state(&self) -> ViewState {
        self.state_rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ViewState> {
        self.state_rx.clone()
    }

    pub fn outcomes(&self) -> broadcast::Receiver<Outcome> {
        self.outcomes.subscribe()
    }

    /// Wait until the state satisfies `predicate`. `None` if the controller
    /// stops first.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&ViewState) -> bool,
    ) -> Option<ViewState> {
        let mut rx = self.state_rx.clone();
        let state = rx.wait_for(predicate).await.ok()?.clone();
        Some(state)
    }

    /// Stop the controller: abort its tasks and close the change feed.
    pub fn dispose(&self) {
        let _ = self.tx.send(Msg::Dispose);
    }
}

pub struct ShelfController {
    session: Arc<SessionManager>,
    store: BookmarkStore,
    state_tx: watch::Sender<ViewState>,
    outcomes: broadcast::Sender<Outcome>,
    mailbox: Mailbox,
    inbox: mpsc::UnboundedReceiver<Msg>,
    tasks: TaskTracker,
    issued_generation: u64,
    applied_generation: u64,
    feed: Option<Feed>,
    _auth_listener: AuthListenerGuard,
}

impl ShelfController {
    pub fn new(session: Arc<SessionManager>, store: BookmarkStore) -> (Self, ControllerHandle) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let mailbox = Mailbox(tx.downgrade());
        let (state_tx, state_rx) = watch::channel(ViewState::default());
        let (outcomes, _) = broadcast::channel(64);

        let listener_mailbox = mailbox.clone();
        let auth_listener = session.on_auth_state_change(move |user| {
            listener_mailbox.post(Msg::AuthChanged(user));
        });

        let handle = ControllerHandle {
            tx,
            state_rx,
            outcomes: outcomes.clone(),
        };
        let controller = Self {
            session,
            store,
            state_tx,
            outcomes,
            mailbox,
            inbox,
            tasks: TaskTracker::new(),
            issued_generation: 0,
            applied_generation: 0,
            feed: None,
            _auth_listener: auth_listener,
        };
        (controller, handle)
    }

    /// Create a controller and run it on the current runtime.
    pub fn spawn(
        session: Arc<SessionManager>,
        store: BookmarkStore,
    ) -> (ControllerHandle, JoinHandle<()>) {
        let (controller, handle) = Self::new(session, store);
        (handle, tokio::spawn(controller.run()))
    }

    /// Process messages until disposed or every handle is gone.
    pub async fn run(mut self) {
        self.start();
        while let Some(msg) = self.inbox.recv().await {
            self.tasks.reap();
            if matches!(msg, Msg::Dispose) {
                break;
            }
            self.handle(msg);
        }
        self.shutdown().await;
    }

    fn start(&mut self) {
        let session = self.session.clone();
        let mailbox = self.mailbox.clone();
        self.tasks.spawn(async move {
            let user = session.current_user().await;
            mailbox.post(Msg::Resolved(user));
        });
    }

    async fn shutdown(&mut self) {
        self.tasks.shutdown().await;
        if let Some(feed) = self.feed.take() {
            let _ = feed.stop.send(());
            let _ = feed.task.await;
        }
        info!("View controller stopped");
    }

    fn handle(&mut self, msg: Msg) {
        match msg {
            Msg::Action(action) => self.on_action(action),
            Msg::AuthChanged(user) => self.on_auth_changed(user),
            Msg::Resolved(user) => {
                if !self.state_tx.borrow().session_resolved {
                    self.on_auth_changed(user);
                }
            }
            Msg::Finished { action, result } => match result {
                Ok(()) => self.report_success(action),
                Err(error) => self.report_failure(action, error),
            },
            Msg::Fetched {
                epoch,
                generation,
                result,
            } => self.on_fetched(epoch, generation, result),
            Msg::Added { epoch, result } => {
                if !self.tasks.is_current(epoch) {
                    return;
                }
                match result {
                    Ok(_) => {
                        self.state_tx.send_modify(|s| {
                            s.title.clear();
                            s.url.clear();
                        });
                        self.fetch();
                        self.report_success(ActionKind::Add);
                    }
                    Err(e) => self.report_failure(ActionKind::Add, e.into()),
                }
            }
            Msg::Removed { epoch, result } => {
                if !self.tasks.is_current(epoch) {
                    return;
                }
                match result {
                    Ok(_) => {
                        self.fetch();
                        self.report_success(ActionKind::Delete);
                    }
                    Err(e) => self.report_failure(ActionKind::Delete, e.into()),
                }
            }
            Msg::Subscribed {
                epoch,
                resync,
                result,
            } => self.on_subscribed(epoch, resync, result),
            Msg::Changed { epoch } => {
                if self.tasks.is_current(epoch) {
                    debug!("Bookmarks changed remotely, re-fetching");
                    self.fetch();
                }
            }
            Msg::FeedEnded { epoch } => {
                if !self.tasks.is_current(epoch) {
                    return;
                }
                self.feed = None;
                if let Some(user_id) = self.current_user_id() {
                    warn!(user_id = %user_id, "Change feed ended, reconnecting");
                    self.subscribe(user_id, FEED_REOPEN_DELAY);
                }
            }
            Msg::Dispose => {}
        }
    }

    fn current_user_id(&self) -> Option<UserId> {
        self.state_tx.borrow().user.as_ref().map(|u| u.id.clone())
    }

    fn on_action(&mut self, action: Action) {
        match action {
            Action::SetTitle(title) => self.state_tx.send_modify(|s| s.title = title),
            Action::SetUrl(url) => self.state_tx.send_modify(|s| s.url = url),
            Action::SignIn => {
                let (resolved, signed_in) = {
                    let state = self.state_tx.borrow();
                    (state.session_resolved, state.user.is_some())
                };
                if !resolved || signed_in {
                    debug!("Ignoring sign-in outside the sign-in screen");
                    return;
                }
                let session = self.session.clone();
                let mailbox = self.mailbox.clone();
                self.tasks.spawn(async move {
                    let result = session.sign_in().await.map(|_| ()).map_err(ViewError::from);
                    mailbox.post(Msg::Finished {
                        action: ActionKind::SignIn,
                        result,
                    });
                });
            }
            Action::SignOut => {
                if self.current_user_id().is_none() {
                    return;
                }
                info!("Signing out");
                self.end_session();
                let session = self.session.clone();
                let mailbox = self.mailbox.clone();
                self.tasks.spawn(async move {
                    let result = session.sign_out().await.map_err(ViewError::from);
                    mailbox.post(Msg::Finished {
                        action: ActionKind::SignOut,
                        result,
                    });
                });
            }
            Action::Add => {
                let (user_id, title, url) = {
                    let state = self.state_tx.borrow();
                    let Some(user) = state.user.as_ref() else {
                        return;
                    };
                    (user.id.clone(), state.title.clone(), state.url.clone())
                };
                let bookmark = match NewBookmark::new(&title, &url, &user_id) {
                    Ok(bookmark) => bookmark,
                    Err(e) => {
                        self.report_failure(ActionKind::Add, StoreError::from(e).into());
                        return;
                    }
                };
                let store = self.store.clone();
                let mailbox = self.mailbox.clone();
                let epoch = self.tasks.epoch();
                self.tasks.spawn(async move {
                    let result = store.insert(&bookmark).await;
                    mailbox.post(Msg::Added { epoch, result });
                });
            }
            Action::Delete(id) => self.delete(id),
            Action::Refresh => self.fetch(),
        }
    }

    fn delete(&mut self, id: BookmarkId) {
        if self.current_user_id().is_none() {
            return;
        }
        let store = self.store.clone();
        let mailbox = self.mailbox.clone();
        let epoch = self.tasks.epoch();
        self.tasks.spawn(async move {
            let result = store.remove(&id).await;
            mailbox.post(Msg::Removed { epoch, result });
        });
    }

    fn on_auth_changed(&mut self, user: Option<User>) {
        let (resolved, current) = {
            let state = self.state_tx.borrow();
            (state.session_resolved, state.user.as_ref().map(|u| u.id.clone()))
        };
        let incoming = user.as_ref().map(|u| u.id.clone());
        if resolved && current == incoming {
            return;
        }

        if current.is_some() {
            self.end_session();
        }
        self.state_tx.send_modify(|s| {
            s.session_resolved = true;
            s.user = user.clone();
        });

        match user {
            Some(user) => {
                info!(user_id = %user.id, "Session started");
                self.fetch();
                self.open_feed(user.id);
            }
            None => debug!("No signed-in user"),
        }
    }

    /// Forget the current user: abort their work, close their feed and clear
    /// everything shown for them.
    fn end_session(&mut self) {
        self.tasks.cancel_all();
        self.close_feed();
        self.state_tx.send_modify(ViewState::clear_session);
    }

    fn fetch(&mut self) {
        let Some(user_id) = self.current_user_id() else {
            return;
        };
        self.issued_generation += 1;
        let generation = self.issued_generation;
        let epoch = self.tasks.epoch();
        let store = self.store.clone();
        let mailbox = self.mailbox.clone();
        self.tasks.spawn(async move {
            let result = store.list(&user_id).await;
            mailbox.post(Msg::Fetched {
                epoch,
                generation,
                result,
            });
        });
    }

    fn on_fetched(&mut self, epoch: u64, generation: u64, result: StoreResult<Vec<Bookmark>>) {
        if !self.tasks.is_current(epoch) {
            debug!(epoch, "Discarding fetch from an ended session");
            return;
        }
        match result {
            Ok(bookmarks) => {
                if generation < self.applied_generation {
                    debug!(generation, applied = self.applied_generation, "Discarding stale fetch");
                    return;
                }
                self.applied_generation = generation;
                self.state_tx.send_modify(|s| s.bookmarks = bookmarks);
                self.report_success(ActionKind::Fetch);
            }
            Err(e) => self.report_failure(ActionKind::Fetch, e.into()),
        }
    }

    fn open_feed(&mut self, user_id: UserId) {
        self.close_feed();
        self.subscribe(user_id, Duration::ZERO);
    }

    /// Subscribe after `delay`. A non-zero delay marks a reconnect, which
    /// re-fetches once the new feed is live.
    fn subscribe(&mut self, user_id: UserId, delay: Duration) {
        let store = self.store.clone();
        let mailbox = self.mailbox.clone();
        let epoch = self.tasks.epoch();
        let resync = !delay.is_zero();
        self.tasks.spawn(async move {
            if resync {
                tokio::time::sleep(delay).await;
            }
            let result = store.subscribe(&user_id).await;
            mailbox.post(Msg::Subscribed {
                epoch,
                resync,
                result,
            });
        });
    }

    fn on_subscribed(
        &mut self,
        epoch: u64,
        resync: bool,
        result: StoreResult<ChangeSubscription>,
    ) {
        let mut subscription = match result {
            Ok(subscription) => subscription,
            Err(e) => {
                if self.tasks.is_current(epoch) {
                    self.report_failure(ActionKind::Subscribe, e.into());
                }
                return;
            }
        };
        if !self.tasks.is_current(epoch) {
            tokio::spawn(subscription.close());
            return;
        }

        let (stop, mut stop_rx) = oneshot::channel::<()>();
        let mailbox = self.mailbox.clone();
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    change = subscription.next() => match change {
                        Some(_) => {
                            if !mailbox.post(Msg::Changed { epoch }) {
                                break;
                            }
                        }
                        None => {
                            mailbox.post(Msg::FeedEnded { epoch });
                            break;
                        }
                    }
                }
            }
            subscription.close().await;
        });
        self.feed = Some(Feed { stop, task });
        if resync {
            self.fetch();
        }
        self.report_success(ActionKind::Subscribe);
    }

    fn close_feed(&mut self) {
        if let Some(feed) = self.feed.take() {
            debug!("Closing change feed");
            let _ = feed.stop.send(());
        }
    }

    fn report_success(&self, action: ActionKind) {
        let _ = self.outcomes.send(Outcome::Completed(action));
    }

    fn report_failure(&self, action: ActionKind, error: ViewError) {
        warn!(action = ?action, error = %error, "Action failed");
        let _ = self.outcomes.send(Outcome::Failed {
            action,
            error: Arc::new(error),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Screen;
    use chrono::Utc;
    use shelf_auth::fake::{user, FakeAuthBackend};
    use shelf_auth::RefreshConfig;
    use shelf_storage::{MemoryStorage, SessionStore};
    use shelf_store::{InMemoryBackend, InMemoryDatabase, ValidationError};
    use std::time::Duration;

    struct World {
        auth: Arc<FakeAuthBackend>,
        db: Arc<InMemoryDatabase>,
    }

    impl World {
        fn new() -> Self {
            Self {
                auth: Arc::new(FakeAuthBackend::new()),
                db: InMemoryDatabase::new(),
            }
        }

        fn session(&self, signed_in: Option<&User>) -> Arc<SessionManager> {
            let store = SessionStore::new(Box::new(MemoryStorage::new()), "test");
            if let Some(u) = signed_in {
                let grant = self.auth.issue(u);
                store
                    .set_session(
                        &grant.access_token,
                        &grant.refresh_token,
                        u.id.as_str(),
                        u.email.as_deref(),
                        Utc::now() + chrono::Duration::hours(1),
                    )
                    .unwrap();
            }
            Arc::new(SessionManager::with_refresh_config(
                self.auth.clone(),
                store,
                RefreshConfig {
                    max_retries: 3,
                    initial_delay_ms: 1,
                    max_delay_ms: 5,
                },
            ))
        }

        fn store_for(&self, session: &Arc<SessionManager>) -> BookmarkStore {
            let s = session.clone();
            BookmarkStore::new(Arc::new(InMemoryBackend::with_identity(&self.db, move || {
                s.phase().user().map(|u| u.id.clone())
            })))
        }

        fn controller(&self, session: Arc<SessionManager>) -> (ControllerHandle, JoinHandle<()>) {
            let store = self.store_for(&session);
            ShelfController::spawn(session, store)
        }

        async fn seed(&self, owner: &User, title: &str, url: &str) -> Bookmark {
            BookmarkStore::new(Arc::new(InMemoryBackend::as_user(&self.db, owner.id.clone())))
                .add(title, url, &owner.id)
                .await
                .unwrap()
        }
    }

    async fn wait_until(
        handle: &ControllerHandle,
        predicate: impl FnMut(&ViewState) -> bool,
    ) -> ViewState {
        tokio::time::timeout(Duration::from_secs(5), handle.wait_for(predicate))
            .await
            .expect("timed out waiting for view state")
            .expect("controller stopped")
    }

    async fn next_outcome(
        outcomes: &mut broadcast::Receiver<Outcome>,
        mut predicate: impl FnMut(&Outcome) -> bool,
    ) -> Outcome {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let outcome = outcomes.recv().await.expect("outcome channel closed");
                if predicate(&outcome) {
                    return outcome;
                }
            }
        })
        .await
        .expect("timed out waiting for outcome")
    }

    async fn eventually(mut condition: impl FnMut() -> bool) {
        for _ in 0..500 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    fn is_completed(kind: ActionKind) -> impl FnMut(&Outcome) -> bool {
        move |o| matches!(o, Outcome::Completed(k) if *k == kind)
    }

    #[tokio::test]
    async fn test_anonymous_session_shows_sign_in() {
        let world = World::new();
        let (handle, _task) = world.controller(world.session(None));
        assert_eq!(handle.state().screen(), Screen::Loading);

        let state = wait_until(&handle, |s| s.session_resolved).await;
        assert_eq!(state.screen(), Screen::SignIn);
        assert_eq!(world.db.remote_calls(), 0);
    }

    #[tokio::test]
    async fn test_restored_session_loads_list_and_subscribes() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        world.seed(&ada, "Docs", "https://docs.rs").await;

        let (handle, _task) = world.controller(world.session(Some(&ada)));
        let state = wait_until(&handle, |s| s.bookmarks.len() == 1).await;
        assert_eq!(state.screen(), Screen::Shelf);
        assert_eq!(state.greeting().as_deref(), Some("Welcome, ada@example.com"));
        eventually(|| world.db.open_subscriptions() == 1).await;
    }

    #[tokio::test]
    async fn test_sign_in_action_starts_session() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        world.auth.set_sign_in_user(Some(ada.clone()));
        world.seed(&ada, "Docs", "https://docs.rs").await;

        let (handle, _task) = world.controller(world.session(None));
        wait_until(&handle, |s| s.screen() == Screen::SignIn).await;

        handle.dispatch(Action::SignIn);
        let state = wait_until(&handle, |s| s.bookmarks.len() == 1).await;
        assert_eq!(state.user, Some(ada));
    }

    #[tokio::test]
    async fn test_denied_sign_in_is_reported() {
        let world = World::new();
        let (handle, _task) = world.controller(world.session(None));
        let mut outcomes = handle.outcomes();
        wait_until(&handle, |s| s.session_resolved).await;

        handle.dispatch(Action::SignIn);
        let outcome = next_outcome(&mut outcomes, |o| matches!(o, Outcome::Failed { .. })).await;
        assert!(matches!(
            outcome,
            Outcome::Failed {
                action: ActionKind::SignIn,
                ..
            }
        ));
        assert_eq!(handle.state().screen(), Screen::SignIn);
    }

    #[tokio::test]
    async fn test_docs_scenario_add_clears_inputs() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let (handle, _task) = world.controller(world.session(Some(&ada)));
        wait_until(&handle, |s| s.screen() == Screen::Shelf).await;

        handle.dispatch(Action::SetTitle("Docs".into()));
        handle.dispatch(Action::SetUrl("https://docs.rs".into()));
        handle.dispatch(Action::Add);

        let state = wait_until(&handle, |s| s.bookmarks.len() == 1 && s.title.is_empty()).await;
        assert!(state.url.is_empty());
        let row = &state.bookmarks[0];
        assert_eq!(row.title, "Docs");
        assert_eq!(row.url, "https://docs.rs");
        assert!(!row.id.as_str().is_empty());
        assert!(row.created_at.timestamp() > 0);
    }

    #[tokio::test]
    async fn test_empty_fields_issue_no_remote_call() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let (handle, _task) = world.controller(world.session(Some(&ada)));
        let mut outcomes = handle.outcomes();

        next_outcome(&mut outcomes, is_completed(ActionKind::Fetch)).await;
        eventually(|| world.db.open_subscriptions() == 1).await;
        let calls = world.db.remote_calls();

        handle.dispatch(Action::SetUrl("https://docs.rs".into()));
        handle.dispatch(Action::Add);
        let outcome = next_outcome(&mut outcomes, |o| matches!(o, Outcome::Failed { .. })).await;
        match outcome {
            Outcome::Failed { action, error } => {
                assert_eq!(action, ActionKind::Add);
                assert!(matches!(
                    *error,
                    ViewError::Store(StoreError::Validation(ValidationError::EmptyTitle))
                ));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        handle.dispatch(Action::SetTitle("Docs".into()));
        handle.dispatch(Action::SetUrl("   ".into()));
        handle.dispatch(Action::Add);
        next_outcome(&mut outcomes, |o| matches!(o, Outcome::Failed { .. })).await;

        assert_eq!(world.db.remote_calls(), calls);
        assert_eq!(handle.state().title, "Docs");
    }

    #[tokio::test]
    async fn test_delete_twice_is_safe() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let row = world.seed(&ada, "Docs", "https://docs.rs").await;
        let (handle, _task) = world.controller(world.session(Some(&ada)));
        let mut outcomes = handle.outcomes();
        wait_until(&handle, |s| s.bookmarks.len() == 1).await;

        handle.dispatch(Action::Delete(row.id.clone()));
        handle.dispatch(Action::Delete(row.id.clone()));
        next_outcome(&mut outcomes, is_completed(ActionKind::Delete)).await;
        next_outcome(&mut outcomes, is_completed(ActionKind::Delete)).await;

        let state = wait_until(&handle, |s| s.bookmarks.is_empty()).await;
        assert!(state.bookmark(&row.id).is_none());
        assert!(world.db.all_rows().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_clears_list_with_fetch_in_flight() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        world.seed(&ada, "Docs", "https://docs.rs").await;
        let (handle, _task) = world.controller(world.session(Some(&ada)));
        wait_until(&handle, |s| s.bookmarks.len() == 1).await;
        eventually(|| world.db.open_subscriptions() == 1).await;

        world.db.set_latency(Duration::from_millis(200));
        handle.dispatch(Action::Refresh);
        handle.dispatch(Action::SignOut);

        let state = wait_until(&handle, |s| s.user.is_none()).await;
        assert!(state.bookmarks.is_empty());
        assert_eq!(state.screen(), Screen::SignIn);

        tokio::time::sleep(Duration::from_millis(400)).await;
        let state = handle.state();
        assert!(state.bookmarks.is_empty());
        assert!(state.user.is_none());
        eventually(|| world.db.open_subscriptions() == 0).await;
        assert_eq!(world.auth.sign_out_calls(), 1);
    }

    #[tokio::test]
    async fn test_second_session_sees_first_sessions_add() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let (first, _t1) = world.controller(world.session(Some(&ada)));
        let (second, _t2) = world.controller(world.session(Some(&ada)));
        wait_until(&first, |s| s.screen() == Screen::Shelf).await;
        wait_until(&second, |s| s.screen() == Screen::Shelf).await;
        eventually(|| world.db.open_subscriptions() == 2).await;

        first.dispatch(Action::SetTitle("Docs".into()));
        first.dispatch(Action::SetUrl("https://docs.rs".into()));
        first.dispatch(Action::Add);

        let state = wait_until(&second, |s| s.bookmarks.len() == 1).await;
        assert_eq!(state.bookmarks[0].title, "Docs");
    }

    #[tokio::test]
    async fn test_cross_user_delete_leaves_owner_list() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let bob = user("u-bob", "bob@example.com");
        let bobs_row = world.seed(&bob, "Bob's", "https://bob.dev").await;

        let (bob_view, _t1) = world.controller(world.session(Some(&bob)));
        let (ada_view, _t2) = world.controller(world.session(Some(&ada)));
        let mut ada_outcomes = ada_view.outcomes();
        wait_until(&bob_view, |s| s.bookmarks.len() == 1).await;
        wait_until(&ada_view, |s| s.screen() == Screen::Shelf).await;

        ada_view.dispatch(Action::Delete(bobs_row.id.clone()));
        next_outcome(&mut ada_outcomes, is_completed(ActionKind::Delete)).await;

        assert_eq!(world.db.all_rows(), vec![bobs_row.clone()]);
        assert_eq!(bob_view.state().bookmarks, vec![bobs_row]);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_prior_list() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        world.seed(&ada, "Docs", "https://docs.rs").await;
        let (handle, _task) = world.controller(world.session(Some(&ada)));
        let mut outcomes = handle.outcomes();
        wait_until(&handle, |s| s.bookmarks.len() == 1).await;
        eventually(|| world.db.open_subscriptions() == 1).await;

        world.db.fail_next(1);
        handle.dispatch(Action::Refresh);
        let outcome = next_outcome(&mut outcomes, |o| matches!(o, Outcome::Failed { .. })).await;
        assert!(matches!(
            outcome,
            Outcome::Failed {
                action: ActionKind::Fetch,
                ..
            }
        ));
        assert_eq!(handle.state().bookmarks.len(), 1);
    }

    #[tokio::test]
    async fn test_dispose_closes_feed_and_stops() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let (handle, task) = world.controller(world.session(Some(&ada)));
        wait_until(&handle, |s| s.screen() == Screen::Shelf).await;
        eventually(|| world.db.open_subscriptions() == 1).await;

        handle.dispose();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(world.db.open_subscriptions(), 0);
        assert!(!handle.dispatch(Action::Refresh));
    }

    fn bookmark(id: &str, owner: &User) -> Bookmark {
        Bookmark {
            id: BookmarkId::new(id),
            title: id.to_string(),
            url: format!("https://{}.example", id),
            user_id: owner.id.clone(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_last_issued_fetch_wins() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let session = world.session(None);
        let store = world.store_for(&session);
        let (mut controller, handle) = ShelfController::new(session, store);

        controller.handle(Msg::Resolved(Some(ada.clone())));
        let epoch = controller.tasks.epoch();

        let newer = vec![bookmark("new", &ada)];
        let older = vec![bookmark("old", &ada)];
        controller.handle(Msg::Fetched {
            epoch,
            generation: 2,
            result: Ok(newer.clone()),
        });
        controller.handle(Msg::Fetched {
            epoch,
            generation: 1,
            result: Ok(older),
        });
        assert_eq!(handle.state().bookmarks, newer);
    }

    #[tokio::test]
    async fn test_results_from_ended_session_are_ignored() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let session = world.session(None);
        let store = world.store_for(&session);
        let (mut controller, handle) = ShelfController::new(session, store);

        controller.handle(Msg::Resolved(Some(ada.clone())));
        let old_epoch = controller.tasks.epoch();
        controller.handle(Msg::AuthChanged(None));
        assert!(handle.state().user.is_none());

        controller.handle(Msg::Fetched {
            epoch: old_epoch,
            generation: 99,
            result: Ok(vec![bookmark("late", &ada)]),
        });
        assert!(handle.state().bookmarks.is_empty());
    }

    /// Drive a controller that is not running on its own task until `done`.
    async fn pump(controller: &mut ShelfController, mut done: impl FnMut(&ShelfController) -> bool) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while !done(&*controller) {
                let msg = controller.inbox.recv().await.expect("inbox closed");
                controller.tasks.reap();
                controller.handle(msg);
            }
        })
        .await
        .expect("timed out pumping controller");
    }

    #[tokio::test]
    async fn test_switching_users_moves_the_single_feed() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let bob = user("u-bob", "bob@example.com");
        let acting = Arc::new(std::sync::Mutex::new(Some(ada.id.clone())));
        let identity = acting.clone();
        let store = BookmarkStore::new(Arc::new(InMemoryBackend::with_identity(
            &world.db,
            move || identity.lock().unwrap().clone(),
        )));
        let (mut controller, handle) = ShelfController::new(world.session(None), store);

        controller.handle(Msg::AuthChanged(Some(ada.clone())));
        pump(&mut controller, |c| c.feed.is_some()).await;
        assert_eq!(world.db.open_subscriptions(), 1);

        *acting.lock().unwrap() = Some(bob.id.clone());
        controller.handle(Msg::AuthChanged(Some(bob.clone())));
        assert!(controller.feed.is_none());
        pump(&mut controller, |c| c.feed.is_some()).await;
        eventually(|| world.db.open_subscriptions() == 1).await;

        // The remaining feed is Bob's: his change reaches the list.
        let row = world.seed(&bob, "Bob's", "https://bob.example").await;
        pump(&mut controller, |_| handle.state().bookmarks.iter().any(|b| b.id == row.id)).await;
        assert_eq!(handle.state().user.map(|u| u.id), Some(bob.id.clone()));
    }

    #[tokio::test]
    async fn test_feed_closed_by_server_is_reopened() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let (handle, _task) = world.controller(world.session(Some(&ada)));
        let mut outcomes = handle.outcomes();
        next_outcome(&mut outcomes, is_completed(ActionKind::Subscribe)).await;
        assert_eq!(world.db.open_subscriptions(), 1);

        world.db.drop_feeds();
        next_outcome(&mut outcomes, is_completed(ActionKind::Subscribe)).await;
        assert_eq!(world.db.open_subscriptions(), 1);

        // Live again: a change from another client shows up.
        let row = world.seed(&ada, "Rust", "https://rust-lang.org").await;
        let state = wait_until(&handle, |s| !s.bookmarks.is_empty()).await;
        assert_eq!(state.bookmarks[0].id, row.id);
    }

    #[tokio::test]
    async fn test_feed_end_after_sign_out_does_not_reopen() {
        let world = World::new();
        let ada = user("u-ada", "ada@example.com");
        let store = BookmarkStore::new(Arc::new(InMemoryBackend::as_user(
            &world.db,
            ada.id.clone(),
        )));
        let (mut controller, _handle) = ShelfController::new(world.session(None), store);

        controller.handle(Msg::Resolved(Some(ada.clone())));
        let epoch = controller.tasks.epoch();
        controller.handle(Msg::AuthChanged(None));
        let calls = world.db.remote_calls();

        controller.handle(Msg::FeedEnded { epoch });
        tokio::time::sleep(FEED_REOPEN_DELAY + Duration::from_millis(200)).await;
        assert_eq!(world.db.remote_calls(), calls);
        assert!(controller.feed.is_none());
    }
}
