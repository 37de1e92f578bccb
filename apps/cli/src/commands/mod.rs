//! CLI command implementations.

mod auth;
mod bookmarks;

pub use auth::{login, logout, status};
pub use bookmarks::{add, list, remove, watch};

use crate::context::AppContext;
use anyhow::Result;
use shelf_auth::User;

/// The signed-in user, or an error telling how to sign in.
async fn require_user(ctx: &AppContext) -> Result<User> {
    match ctx.session.current_user().await {
        Some(user) => Ok(user),
        None => anyhow::bail!("Not signed in. Sign in with 'shelf login'"),
    }
}
