//! # Observability
//!
//! Centralized logging for the Linkshelf workspace.
//!
//! Binaries call [`init_with_config`] once at startup and use the standard
//! `tracing` macros everywhere else. Library crates never install a
//! subscriber; they only emit events.
//!
//! Every event is written as one JSON object per line to
//! `~/.linkshelf/logs/shelf.jsonl` (or a custom path), which keeps the
//! terminal free for the TUI:
//!
//! - `tail -f ~/.linkshelf/logs/shelf.jsonl | jq` for pretty JSON
//! - `lnav ~/.linkshelf/logs/shelf.jsonl` for interactive exploration
//!
//! Fields that carry credentials (access/refresh tokens, API keys, PKCE
//! verifiers, bearer headers) are redacted before they reach the file.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init_with_config(observability::LogConfig {
//!         service_name: "cli".into(),
//!         default_level: "debug".into(),
//!         ..Default::default()
//!     });
//!     tracing::info!("ready");
//! }
//! ```

mod json_layer;
mod redact;
mod sink;

use std::path::PathBuf;

pub use json_layer::LogEntry;
pub use redact::{is_sensitive_key, redact_value};
pub use sink::{default_log_path, CentralLogWriter};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service (e.g., "cli", "tui").
    /// Included in every log line for filtering.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional custom log file path.
    /// Defaults to `~/.linkshelf/logs/shelf.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit logs to stderr. Must stay off while the TUI owns the terminal.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize logging with custom configuration.
///
/// Falls back to a compact stderr subscriber when the log file cannot be
/// opened, so a read-only home directory never prevents the app from starting.
pub fn init_with_config(config: LogConfig) {
    if let Err(e) = sink::init_file_subscriber(&config) {
        use tracing_subscriber::util::SubscriberInitExt;
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.default_level)),
            )
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .finish()
            .try_init();
        tracing::warn!(error = %e, "log file unavailable, logging to stderr");
    }
}
