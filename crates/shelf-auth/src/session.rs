//! Session management with FSM-based state tracking.
//!
//! The FSM tracks transient states (signing in, refreshing, signing out) that
//! are never persisted, while the tokens themselves live in the
//! [`SessionStore`]. The first call that needs the session resolves the
//! persisted one against the server and leaves `Loading`.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, RefreshConfig, SessionPhase};
use crate::{AuthBackend, AuthError, AuthResult, OAuthProvider, TokenGrant, User};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use parking_lot::Mutex;
use shelf_storage::{SessionMeta, SessionStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Anything that can hand out a valid access token for backend calls.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> AuthResult<String>;
}

type AuthStateCallback = Arc<dyn Fn(Option<User>) + Send + Sync>;

#[derive(Default)]
struct ListenerRegistry {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(u64, AuthStateCallback)>>,
}

impl ListenerRegistry {
    fn add(&self, callback: AuthStateCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, callback));
        id
    }

    fn remove(&self, id: u64) {
        self.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    fn emit(&self, user: Option<User>) {
        // Callbacks run outside the lock so they may register or drop guards.
        let callbacks: Vec<AuthStateCallback> =
            self.listeners.lock().iter().map(|(_, cb)| cb.clone()).collect();
        for callback in callbacks {
            callback(user.clone());
        }
    }
}

/// Keeps an auth listener registered. Dropping it unsubscribes.
#[must_use = "dropping the guard unsubscribes the listener"]
pub struct AuthListenerGuard {
    registry: Weak<ListenerRegistry>,
    id: Option<u64>,
}

impl AuthListenerGuard {
    pub fn unsubscribe(mut self) {
        self.detach();
    }

    fn detach(&mut self) {
        if let (Some(id), Some(registry)) = (self.id.take(), self.registry.upgrade()) {
            registry.remove(id);
        }
    }
}

impl Drop for AuthListenerGuard {
    fn drop(&mut self) {
        self.detach();
    }
}

/// Read-only view of the session phase. The [`SessionManager`] is the only writer.
#[derive(Clone)]
pub struct SessionContext {
    rx: watch::Receiver<SessionPhase>,
}

impl SessionContext {
    pub fn phase(&self) -> SessionPhase {
        self.rx.borrow().clone()
    }

    pub fn user(&self) -> Option<User> {
        self.rx.borrow().user().cloned()
    }

    /// Wait for the next phase change. Returns false once the manager is gone.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

struct Inner {
    fsm: AuthMachine,
    user: Option<User>,
}

/// What an exhausted refresh does with the stored tokens when every attempt
/// failed with a transient error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OnOutage {
    ClearSession,
    KeepTokens,
}

/// Puts the FSM into a resting state if an in-flight operation is dropped.
struct CancelGuard<'a> {
    manager: &'a SessionManager,
    input: AuthMachineInput,
    announce_sign_out: bool,
    armed: bool,
}

impl CancelGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        debug!(input = ?self.input, "auth operation cancelled");
        let _ = self.manager.transition(&self.input);
        if self.announce_sign_out {
            self.manager.listeners.emit(None);
        }
    }
}

pub struct SessionManager {
    backend: Arc<dyn AuthBackend>,
    store: SessionStore,
    inner: Mutex<Inner>,
    refresh_config: RefreshConfig,
    phase_tx: watch::Sender<SessionPhase>,
    listeners: Arc<ListenerRegistry>,
    /// Serializes the initial check, refreshes and sign-out.
    op_lock: tokio::sync::Mutex<()>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn AuthBackend>, store: SessionStore) -> Self {
        Self::with_refresh_config(backend, store, RefreshConfig::default())
    }

    pub fn with_refresh_config(
        backend: Arc<dyn AuthBackend>,
        store: SessionStore,
        refresh_config: RefreshConfig,
    ) -> Self {
        let (phase_tx, _) = watch::channel(SessionPhase::Loading);
        Self {
            backend,
            store,
            inner: Mutex::new(Inner {
                fsm: AuthMachine::new(),
                user: None,
            }),
            refresh_config,
            phase_tx,
            listeners: Arc::new(ListenerRegistry::default()),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn machine_state(&self) -> AuthMachineState {
        self.inner.lock().fsm.state().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase_tx.borrow().clone()
    }

    pub fn context(&self) -> SessionContext {
        SessionContext {
            rx: self.phase_tx.subscribe(),
        }
    }

    /// Persisted session metadata, for status display.
    pub fn session_meta(&self) -> AuthResult<Option<SessionMeta>> {
        Ok(self.store.meta()?)
    }

    /// Register a listener for sign-in, sign-out, session expiry and the
    /// resolution of the initial check.
    pub fn on_auth_state_change<F>(&self, callback: F) -> AuthListenerGuard
    where
        F: Fn(Option<User>) + Send + Sync + 'static,
    {
        let id = self.listeners.add(Arc::new(callback));
        AuthListenerGuard {
            registry: Arc::downgrade(&self.listeners),
            id: Some(id),
        }
    }

    fn transition(&self, input: &AuthMachineInput) -> AuthResult<AuthMachineState> {
        let mut inner = self.inner.lock();
        let old_state = inner.fsm.state().clone();

        inner.fsm.consume(input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input, old_state
            ))
        })?;

        let new_state = inner.fsm.state().clone();
        let phase = SessionPhase::from_machine(&new_state, inner.user.as_ref());
        drop(inner);

        if old_state != new_state {
            debug!(old_state = ?old_state, new_state = ?new_state, "Auth state transition");
        }
        self.publish(phase);
        Ok(new_state)
    }

    fn set_user(&self, user: Option<User>) {
        let mut inner = self.inner.lock();
        inner.user = user;
        let phase = SessionPhase::from_machine(inner.fsm.state(), inner.user.as_ref());
        drop(inner);
        self.publish(phase);
    }

    fn publish(&self, phase: SessionPhase) {
        self.phase_tx.send_if_modified(|current| {
            if *current == phase {
                false
            } else {
                *current = phase;
                true
            }
        });
    }

    fn persist(&self, grant: &TokenGrant) -> AuthResult<()> {
        let expires_at = Utc::now() + Duration::seconds(grant.expires_in);
        self.store.set_session(
            &grant.access_token,
            &grant.refresh_token,
            grant.user.id.as_str(),
            grant.user.email.as_deref(),
            expires_at,
        )?;
        Ok(())
    }

    fn clear_store(&self) {
        if let Err(e) = self.store.clear_session() {
            warn!(error = %e, "Failed to clear persisted session");
        }
    }

    async fn ensure_initialized(&self) {
        if !self.phase().is_loading() {
            return;
        }
        let _op = self.op_lock.lock().await;
        if !self.phase().is_loading() {
            return;
        }
        let user = self.resolve_initial_session().await;
        self.listeners.emit(user);
    }

    async fn resolve_initial_session(&self) -> Option<User> {
        let session = match self.store.session() {
            Ok(session) => session,
            Err(e) => {
                warn!(error = %e, "Could not read persisted session");
                None
            }
        };

        let resuming_refresh = self.machine_state() == AuthMachineState::Refreshing;

        let Some(session) = session else {
            info!("No existing session found");
            if resuming_refresh {
                let _ = self.fail_refresh(AuthError::NotLoggedIn);
            } else {
                let _ = self.transition(&AuthMachineInput::NoUser);
            }
            return None;
        };

        if resuming_refresh || session.is_expired() {
            info!(user_id = %session.meta.user_id, "Persisted session expired, refreshing");
            return self.refresh_from_loading(&session.refresh_token).await;
        }

        match self.backend.get_user(&session.access_token).await {
            Ok(user) => {
                info!(user_id = %user.id, "Session restored (verified with server)");
                self.set_user(Some(user.clone()));
                let _ = self.transition(&AuthMachineInput::UserFound);
                Some(user)
            }
            Err(AuthError::SessionInvalid(reason)) => {
                info!(reason = %reason, "Server rejected access token, trying refresh");
                self.refresh_from_loading(&session.refresh_token).await
            }
            Err(e) if e.is_transient() => {
                // Keep the tokens; the next launch can verify them again.
                warn!(error = %e, "Could not verify session, continuing signed out");
                let _ = self.transition(&AuthMachineInput::NoUser);
                None
            }
            Err(e) => {
                warn!(error = %e, "Session verification failed, clearing session");
                self.clear_store();
                let _ = self.transition(&AuthMachineInput::NoUser);
                None
            }
        }
    }

    async fn refresh_from_loading(&self, refresh_token: &str) -> Option<User> {
        if self.machine_state() != AuthMachineState::Refreshing {
            let _ = self.transition(&AuthMachineInput::TokenExpired);
        }
        match self
            .refresh_with_backoff(refresh_token, OnOutage::KeepTokens)
            .await
        {
            Ok(grant) => Some(grant.user),
            Err(e) => {
                warn!(error = %e, "Session refresh failed, continuing signed out");
                None
            }
        }
    }

    /// Refresh with exponential backoff. Must be called in `Refreshing`.
    ///
    /// A refresh token the server rejects always clears the session.
    /// `on_outage` decides what happens when every attempt failed with a
    /// transient error.
    async fn refresh_with_backoff(
        &self,
        refresh_token: &str,
        on_outage: OnOutage,
    ) -> AuthResult<TokenGrant> {
        let mut last_error = None;

        for attempt in 0..self.refresh_config.max_retries {
            match self.backend.refresh(refresh_token).await {
                Ok(grant) => {
                    if let Err(e) = self.persist(&grant) {
                        return Err(self.fail_refresh(e));
                    }
                    self.set_user(Some(grant.user.clone()));
                    self.transition(&AuthMachineInput::RefreshSucceeded)?;
                    info!(user_id = %grant.user.id, "Token refreshed successfully");
                    return Ok(grant);
                }
                Err(e) if e.is_transient() => {
                    last_error = Some(e);

                    if attempt + 1 < self.refresh_config.max_retries {
                        let _ = self.transition(&AuthMachineInput::RefreshRetry);
                        let delay = self.refresh_config.delay_for_attempt(attempt);
                        debug!(
                            attempt = attempt + 1,
                            max_retries = self.refresh_config.max_retries,
                            delay_ms = delay.as_millis() as u64,
                            "Refresh failed with transient error, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Refresh failed with non-transient error");
                    return Err(self.fail_refresh(e));
                }
            }
        }

        warn!(attempts = self.refresh_config.max_retries, "Refresh retries exhausted");
        let error =
            last_error.unwrap_or(AuthError::RefreshExhausted(self.refresh_config.max_retries));
        match on_outage {
            OnOutage::ClearSession => Err(self.fail_refresh(error)),
            OnOutage::KeepTokens => {
                self.set_user(None);
                let _ = self.transition(&AuthMachineInput::RefreshFailed);
                Err(error)
            }
        }
    }

    fn fail_refresh(&self, error: AuthError) -> AuthError {
        self.clear_store();
        self.set_user(None);
        let _ = self.transition(&AuthMachineInput::RefreshFailed);
        error
    }

    /// The signed-in user, resolving the persisted session on first use.
    /// Network failures during that first check surface as no user.
    pub async fn current_user(&self) -> Option<User> {
        self.ensure_initialized().await;
        self.phase().user().cloned()
    }

    /// Sign in with Google through the browser. Returns once the provider has
    /// redirected back and the code has been exchanged.
    pub async fn sign_in(&self) -> AuthResult<User> {
        self.ensure_initialized().await;
        self.transition(&AuthMachineInput::SignInStarted)?;
        let guard = CancelGuard {
            manager: self,
            input: AuthMachineInput::SignInFailed,
            announce_sign_out: false,
            armed: true,
        };

        let result = self.backend.sign_in_with_oauth(OAuthProvider::Google).await;
        guard.disarm();

        let grant = match result {
            Ok(grant) => grant,
            Err(e) => {
                warn!(error = %e, "Sign-in failed");
                let _ = self.transition(&AuthMachineInput::SignInFailed);
                return Err(e);
            }
        };

        if let Err(e) = self.persist(&grant) {
            let _ = self.transition(&AuthMachineInput::SignInFailed);
            return Err(e);
        }

        self.set_user(Some(grant.user.clone()));
        self.transition(&AuthMachineInput::SignInCompleted)?;
        info!(user_id = %grant.user.id, "Sign-in complete");
        self.listeners.emit(Some(grant.user.clone()));
        Ok(grant.user)
    }

    /// Clear the local session and revoke it server-side (best effort).
    pub async fn sign_out(&self) -> AuthResult<()> {
        self.ensure_initialized().await;
        let _op = self.op_lock.lock().await;

        let was_authenticated = self.machine_state() == AuthMachineState::Authenticated;
        if was_authenticated {
            self.transition(&AuthMachineInput::SignOutRequested)?;
        }
        let guard = CancelGuard {
            manager: self,
            input: AuthMachineInput::SignOutCompleted,
            announce_sign_out: true,
            armed: was_authenticated,
        };

        let token = self.store.access_token().ok().flatten();
        let cleared = self.store.clear_session();
        self.set_user(None);

        if let Some(token) = token {
            if let Err(e) = self.backend.sign_out(&token).await {
                warn!(error = %e, "Server sign-out failed, local session cleared anyway");
            }
        }
        guard.disarm();

        if was_authenticated {
            self.transition(&AuthMachineInput::SignOutCompleted)?;
            info!("Signed out");
            self.listeners.emit(None);
        }
        cleared.map_err(AuthError::from)
    }

    /// A valid access token, refreshed with backoff when the stored one has
    /// lapsed. A failed refresh ends the session and notifies listeners.
    pub async fn access_token(&self) -> AuthResult<String> {
        self.ensure_initialized().await;
        let _op = self.op_lock.lock().await;

        let state = self.machine_state();
        if !matches!(
            state,
            AuthMachineState::Authenticated | AuthMachineState::Refreshing
        ) {
            return Err(AuthError::NotLoggedIn);
        }

        let Some(session) = self.store.session()? else {
            warn!("Session tokens missing while authenticated");
            self.set_user(None);
            if state == AuthMachineState::Refreshing {
                let _ = self.transition(&AuthMachineInput::RefreshFailed);
            } else {
                let _ = self.transition(&AuthMachineInput::SessionExpired);
            }
            self.listeners.emit(None);
            return Err(AuthError::SessionExpired);
        };

        // A refresh left in `Refreshing` by a cancelled caller is resumed here.
        if state == AuthMachineState::Authenticated && !session.is_expired() {
            return Ok(session.access_token);
        }

        if state == AuthMachineState::Authenticated {
            info!("Access token expired, refreshing");
            self.transition(&AuthMachineInput::TokenExpired)?;
        }

        match self
            .refresh_with_backoff(&session.refresh_token, OnOutage::ClearSession)
            .await
        {
            Ok(grant) => Ok(grant.access_token),
            Err(e) => {
                self.listeners.emit(None);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl TokenSource for SessionManager {
    async fn access_token(&self) -> AuthResult<String> {
        SessionManager::access_token(self).await
    }
}
