//! Wiring from configuration to a session manager and a bookmark store.

use anyhow::{Context, Result};
use shelf_auth::{project_ref_from_url, GoTrueClient, SessionManager, TokenSource, UrlOpener};
use shelf_config::{Config, Paths};
use shelf_store::{BookmarkStore, PostgrestBackend};
use std::sync::Arc;
use tracing::{debug, warn};

/// Load and validate configuration. `log_level` from the command line wins
/// over the file and the environment.
pub fn load_config(log_level: Option<&str>) -> Result<(Paths, Config)> {
    let paths = Paths::new().context("Could not locate the home directory")?;
    let mut config = Config::load(&paths)
        .with_context(|| format!("Failed to read {}", paths.config_file().display()))?;
    if let Some(level) = log_level {
        config.log_level = level.to_string();
    }
    config.validate()?;
    Ok((paths, config))
}

/// Long-lived services shared by every command.
pub struct AppContext {
    pub config: Config,
    pub session: Arc<SessionManager>,
    pub store: BookmarkStore,
}

impl AppContext {
    pub fn new(paths: Paths, config: Config) -> Result<Self> {
        let project_ref = project_ref_from_url(&config.supabase_url);
        debug!(project_ref = %project_ref, "Opening session store");
        let session_store = shelf_storage::create_session_store(&paths, &project_ref);

        let opener: UrlOpener = Arc::new(|url: &str| open::that(url));
        let gotrue = GoTrueClient::new(
            &config.supabase_url,
            &config.supabase_anon_key,
            config.oauth_callback_port,
            config.oauth_timeout(),
            opener,
        );
        let session = Arc::new(SessionManager::new(Arc::new(gotrue), session_store));

        let tokens: Arc<dyn TokenSource> = session.clone();
        let backend = PostgrestBackend::new(&config.supabase_url, &config.supabase_anon_key, tokens)
            .context("Invalid Supabase URL")?;

        Ok(Self {
            config,
            session,
            store: BookmarkStore::new(Arc::new(backend)),
        })
    }
}

/// Open `url` in the system browser.
pub fn open_link(url: &str) -> Result<()> {
    open::that(url).map_err(|e| {
        warn!(error = %e, "Failed to open link");
        anyhow::anyhow!("Could not open {}: {}", url, e)
    })
}
