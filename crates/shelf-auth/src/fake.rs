//! In-process [`AuthBackend`] for tests.
//!
//! Issues opaque tokens, remembers which user each token belongs to, and can
//! be told to go offline or fail upcoming refreshes.

use crate::{AuthBackend, AuthError, AuthResult, OAuthProvider, TokenGrant, User, UserId};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Kind of failure to inject into the next refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    /// Network error, retried by the session manager
    Transient,
    /// The server rejected the refresh token
    Rejected,
}

struct FakeState {
    next_sign_in: Option<User>,
    access_tokens: HashMap<String, User>,
    refresh_tokens: HashMap<String, User>,
    counter: u64,
    expires_in: i64,
    offline: bool,
    refresh_failures: VecDeque<FakeFailure>,
}

pub struct FakeAuthBackend {
    state: Mutex<FakeState>,
    sign_in_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    sign_out_calls: AtomicUsize,
    get_user_calls: AtomicUsize,
}

/// Shorthand for a test identity.
pub fn user(id: &str, email: &str) -> User {
    User {
        id: UserId::new(id),
        email: Some(email.to_string()),
    }
}

impl Default for FakeAuthBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAuthBackend {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(FakeState {
                next_sign_in: None,
                access_tokens: HashMap::new(),
                refresh_tokens: HashMap::new(),
                counter: 0,
                expires_in: 3600,
                offline: false,
                refresh_failures: VecDeque::new(),
            }),
            sign_in_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            sign_out_calls: AtomicUsize::new(0),
            get_user_calls: AtomicUsize::new(0),
        }
    }

    /// The identity the next browser sign-in resolves to. `None` makes the
    /// provider deny access.
    pub fn set_sign_in_user(&self, user: Option<User>) {
        self.state.lock().next_sign_in = user;
    }

    pub fn set_offline(&self, offline: bool) {
        self.state.lock().offline = offline;
    }

    /// Lifetime of tokens issued from now on.
    pub fn set_expires_in(&self, secs: i64) {
        self.state.lock().expires_in = secs;
    }

    pub fn fail_next_refreshes(&self, failures: impl IntoIterator<Item = FakeFailure>) {
        self.state.lock().refresh_failures.extend(failures);
    }

    /// Mint tokens for `user` as if they had signed in.
    pub fn issue(&self, user: &User) -> TokenGrant {
        let mut state = self.state.lock();
        state.counter += 1;
        let n = state.counter;
        let grant = TokenGrant {
            access_token: format!("access-{}-{}", user.id, n),
            refresh_token: format!("refresh-{}-{}", user.id, n),
            expires_in: state.expires_in,
            user: user.clone(),
        };
        state
            .access_tokens
            .insert(grant.access_token.clone(), user.clone());
        state
            .refresh_tokens
            .insert(grant.refresh_token.clone(), user.clone());
        grant
    }

    /// Invalidate every issued token, as an admin revocation would.
    pub fn revoke_all(&self) {
        let mut state = self.state.lock();
        state.access_tokens.clear();
        state.refresh_tokens.clear();
    }

    pub fn sign_in_calls(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn sign_out_calls(&self) -> usize {
        self.sign_out_calls.load(Ordering::SeqCst)
    }

    pub fn get_user_calls(&self) -> usize {
        self.get_user_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthBackend for FakeAuthBackend {
    async fn get_user(&self, access_token: &str) -> AuthResult<User> {
        self.get_user_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.offline {
            return Err(AuthError::NetworkUnavailable);
        }
        state
            .access_tokens
            .get(access_token)
            .cloned()
            .ok_or_else(|| AuthError::SessionInvalid("invalid JWT".to_string()))
    }

    async fn sign_in_with_oauth(&self, _provider: OAuthProvider) -> AuthResult<TokenGrant> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        let next = {
            let state = self.state.lock();
            if state.offline {
                return Err(AuthError::NetworkUnavailable);
            }
            state.next_sign_in.clone()
        };
        match next {
            Some(user) => Ok(self.issue(&user)),
            None => Err(AuthError::OAuth("access_denied".to_string())),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenGrant> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let user = {
            let mut state = self.state.lock();
            match state.refresh_failures.pop_front() {
                Some(FakeFailure::Transient) => return Err(AuthError::NetworkUnavailable),
                Some(FakeFailure::Rejected) => {
                    return Err(AuthError::TokenRefresh("Invalid Refresh Token".to_string()))
                }
                None => {}
            }
            if state.offline {
                return Err(AuthError::NetworkUnavailable);
            }
            // Refresh tokens rotate: each one is single-use.
            state
                .refresh_tokens
                .remove(refresh_token)
                .ok_or_else(|| AuthError::TokenRefresh("Refresh Token Not Found".to_string()))?
        };
        Ok(self.issue(&user))
    }

    async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock();
        if state.offline {
            return Err(AuthError::NetworkUnavailable);
        }
        state.access_tokens.remove(access_token);
        Ok(())
    }
}
