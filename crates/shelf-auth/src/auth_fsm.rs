//! Session lifecycle state machine using rust-fsm.
//!
//! ```text
//! Loading ──UserFound──────────► Authenticated
//! Loading ──NoUser─────────────► Anonymous
//! Loading ──TokenExpired───────► Refreshing
//!
//! Anonymous ──SignInStarted────► SigningIn ──SignInCompleted──► Authenticated
//!                                SigningIn ──SignInFailed─────► Anonymous
//!
//! Authenticated ──TokenExpired──────► Refreshing ──RefreshSucceeded──► Authenticated
//!                                     Refreshing ──RefreshFailed─────► Anonymous
//! Authenticated ──SignOutRequested──► SigningOut ──SignOutCompleted──► Anonymous
//! Authenticated ──SessionExpired────► Anonymous
//! ```

use crate::User;
use rust_fsm::*;
use std::time::Duration;

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Loading)

    Loading => {
        UserFound => Authenticated,
        NoUser => Anonymous,
        TokenExpired => Refreshing
    },
    Anonymous => {
        SignInStarted => SigningIn
    },
    SigningIn => {
        SignInCompleted => Authenticated,
        SignInFailed => Anonymous
    },
    Authenticated => {
        TokenExpired => Refreshing,
        SignOutRequested => SigningOut,
        SessionExpired => Anonymous
    },
    Refreshing => {
        RefreshSucceeded => Authenticated,
        RefreshRetry => Refreshing,
        RefreshFailed => Anonymous
    },
    SigningOut => {
        SignOutCompleted => Anonymous
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// User-facing session phase.
///
/// The transient machine states fold into these: `SigningIn` is still
/// anonymous, `SigningOut` is still authenticated, and `Refreshing` keeps
/// whatever identity was last known (or `Loading` before the first check).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Loading,
    Anonymous,
    Authenticated(User),
}

impl SessionPhase {
    pub fn from_machine(state: &AuthMachineState, user: Option<&User>) -> Self {
        match (state, user) {
            (AuthMachineState::Loading, _) => SessionPhase::Loading,
            (AuthMachineState::Anonymous | AuthMachineState::SigningIn, _) => {
                SessionPhase::Anonymous
            }
            (
                AuthMachineState::Authenticated
                | AuthMachineState::SigningOut
                | AuthMachineState::Refreshing,
                Some(user),
            ) => SessionPhase::Authenticated(user.clone()),
            (AuthMachineState::Refreshing, None) => SessionPhase::Loading,
            (AuthMachineState::Authenticated | AuthMachineState::SigningOut, None) => {
                SessionPhase::Anonymous
            }
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            SessionPhase::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, SessionPhase::Loading)
    }
}

/// Configuration for retry behavior during token refresh.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

impl RefreshConfig {
    /// Delay before retry `attempt` (0-indexed), doubling and capped.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .initial_delay_ms
            .saturating_mul(2u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.max_delay_ms))
    }
}
