//! Authentication for Linkshelf.
//!
//! This crate provides:
//! - An explicit FSM for the session lifecycle
//! - Google sign-in through the GoTrue PKCE flow with a local callback server
//! - Token refresh with exponential backoff
//! - Persisted sessions through `shelf-storage`
//! - Auth change listeners and a watchable [`SessionContext`]

mod auth_fsm;
mod error;
mod gotrue;
mod oauth;
mod pkce;
mod session;
mod user;

#[cfg(any(test, feature = "test-util"))]
pub mod fake;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, RefreshConfig, SessionPhase};
pub use error::{AuthError, AuthResult};
pub use gotrue::{AuthBackend, GoTrueClient, OAuthProvider, TokenGrant, UrlOpener};
pub use oauth::OAuthCallbackServer;
pub use pkce::PkcePair;
pub use session::{AuthListenerGuard, SessionContext, SessionManager, TokenSource};
pub use user::{User, UserId};

/// Project ref from a Supabase URL (`abcd` for `https://abcd.supabase.co`).
pub fn project_ref_from_url(supabase_url: &str) -> String {
    url::Url::parse(supabase_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.split('.').next().unwrap_or(h).to_string()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "default".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_ref_from_url() {
        assert_eq!(project_ref_from_url("https://abcd.supabase.co"), "abcd");
        assert_eq!(project_ref_from_url("http://localhost:54321"), "localhost");
        assert_eq!(project_ref_from_url("not a url"), "default");
    }
}
