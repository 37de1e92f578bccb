//! Session commands.

use crate::context::AppContext;
use crate::output::{self, OutputFormat};
use anyhow::Result;
use shelf_auth::project_ref_from_url;

/// Sign in with Google through the browser.
pub async fn login(ctx: &AppContext, format: &OutputFormat) -> Result<()> {
    if let Some(user) = ctx.session.current_user().await {
        output::print_success(
            &format!("Already signed in as {}", user.display_name()),
            format,
        );
        return Ok(());
    }

    if matches!(format, OutputFormat::Text) {
        println!("Opening your browser to sign in with Google...");
        println!(
            "Waiting up to {} seconds for the sign-in to finish.",
            ctx.config.oauth_timeout_secs
        );
    }

    let user = ctx.session.sign_in().await?;
    output::print_success(&format!("Signed in as {}", user.display_name()), format);
    Ok(())
}

/// Sign out and clear the local session.
///
/// Stored tokens are cleared even when the server could not verify them,
/// so an offline logout still takes effect.
pub async fn logout(ctx: &AppContext, format: &OutputFormat) -> Result<()> {
    let user = ctx.session.current_user().await;
    if user.is_none() && ctx.session.session_meta()?.is_none() {
        output::print_success("Not signed in", format);
        return Ok(());
    }

    ctx.session.sign_out().await?;
    output::print_success("Signed out", format);
    Ok(())
}

/// Show who is signed in and when the access token expires.
pub async fn status(ctx: &AppContext, format: &OutputFormat) -> Result<()> {
    let user = ctx.session.current_user().await;
    let meta = if user.is_some() {
        ctx.session.session_meta()?
    } else {
        None
    };
    let project = project_ref_from_url(&ctx.config.supabase_url);

    match format {
        OutputFormat::Text => {
            output::print_row("Project", &project);
            match &user {
                Some(user) => {
                    output::print_row("Auth", "signed in");
                    output::print_row("User ID", user.id.as_str());
                    output::print_row("Email", user.email.as_deref().unwrap_or("-"));
                    if let Some(meta) = &meta {
                        output::print_row("Expires", &meta.expires_at);
                    }
                }
                None => output::print_row("Auth", "not signed in"),
            }
        }
        OutputFormat::Json => {
            output::print_json(&serde_json::json!({
                "project_ref": project,
                "logged_in": user.is_some(),
                "user_id": user.as_ref().map(|u| u.id.as_str()),
                "email": user.as_ref().and_then(|u| u.email.as_deref()),
                "expires_at": meta.as_ref().map(|m| m.expires_at.as_str()),
            }));
        }
    }
    Ok(())
}
