//! Linkshelf CLI - your bookmark shelf from the terminal.

mod commands;
mod context;
mod output;
mod tui;

use clap::{Parser, Subcommand};
use context::AppContext;
use tracing::debug;

/// Linkshelf CLI - Sign in with Google and manage your bookmarks.
#[derive(Parser)]
#[command(name = "shelf")]
#[command(about = "Linkshelf CLI for your personal bookmark shelf")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Output format (text or json)
    #[arg(short, long, default_value = "text", global = true)]
    format: output::OutputFormat,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level.
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Launch the interactive terminal UI (the default)
    Ui {
        /// Use terminal-adaptive colors instead of the Linkshelf theme
        #[arg(long)]
        terminal_colors: bool,
    },

    /// Sign in with Google in the browser
    Login,

    /// Sign out and clear the local session
    Logout,

    /// Show the current session
    Status,

    /// List your bookmarks, newest first
    List,

    /// Add a bookmark
    Add {
        /// Bookmark title
        title: String,
        /// Bookmark URL
        url: String,
    },

    /// Delete a bookmark by id
    Rm {
        /// Bookmark id (see `shelf list`)
        id: String,
    },

    /// Print the list and re-print it whenever it changes (Ctrl-C to stop)
    Watch,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let (paths, config) = match context::load_config(cli.log_level.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            output::print_error(&format!("{:#}", e), &cli.format);
            std::process::exit(1);
        }
    };

    // Never log to stderr: the TUI owns the terminal and one-shot output stays clean.
    shelf_config::init_logging("cli", &config.log_level, &paths, false);
    debug!(command = ?cli.command.as_ref().map(command_name), "Starting");

    let ctx = match AppContext::new(paths, config) {
        Ok(ctx) => ctx,
        Err(e) => {
            output::print_error(&format!("{:#}", e), &cli.format);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        None => tui::run(ctx, tui::ThemeMode::Shelf).await,
        Some(Commands::Ui { terminal_colors }) => {
            let theme_mode = if terminal_colors {
                tui::ThemeMode::Terminal
            } else {
                tui::ThemeMode::Shelf
            };
            tui::run(ctx, theme_mode).await
        }
        Some(Commands::Login) => commands::login(&ctx, &cli.format).await,
        Some(Commands::Logout) => commands::logout(&ctx, &cli.format).await,
        Some(Commands::Status) => commands::status(&ctx, &cli.format).await,
        Some(Commands::List) => commands::list(&ctx, &cli.format).await,
        Some(Commands::Add { title, url }) => {
            commands::add(&ctx, &title, &url, &cli.format).await
        }
        Some(Commands::Rm { id }) => commands::remove(&ctx, &id, &cli.format).await,
        Some(Commands::Watch) => commands::watch(&ctx, &cli.format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e), &cli.format);
        std::process::exit(1);
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::Ui { .. } => "ui",
        Commands::Login => "login",
        Commands::Logout => "logout",
        Commands::Status => "status",
        Commands::List => "list",
        Commands::Add { .. } => "add",
        Commands::Rm { .. } => "rm",
        Commands::Watch => "watch",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_means_tui() {
        let cli = Cli::try_parse_from(["shelf"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.log_level.is_none());
    }

    #[test]
    fn test_add_takes_title_then_url() {
        let cli =
            Cli::try_parse_from(["shelf", "--format", "json", "add", "Rust", "https://rust-lang.org"])
                .unwrap();
        assert!(matches!(cli.format, output::OutputFormat::Json));
        match cli.command {
            Some(Commands::Add { title, url }) => {
                assert_eq!(title, "Rust");
                assert_eq!(url, "https://rust-lang.org");
            }
            _ => panic!("expected add"),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["shelf", "rm", "42", "--log-level", "debug"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert!(matches!(cli.command, Some(Commands::Rm { ref id }) if id == "42"));
    }
}
