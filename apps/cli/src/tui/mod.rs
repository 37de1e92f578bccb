//! Ratatui-based terminal UI for Linkshelf.
//!
//! The screen follows the controller's state: a loading view while the
//! stored session is checked, a sign-in prompt, then the shelf itself (title
//! and url inputs above the bookmark list).

mod app;
mod event;
pub mod theme;
mod ui;

pub use theme::ThemeMode;

use crate::context::{self, AppContext};
use anyhow::Result;
use app::App;
use crossterm::{
    cursor::Show,
    event::{Event, EventStream, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use event::Command;
use futures_util::StreamExt;
use ratatui::{backend::CrosstermBackend, Terminal};
use shelf_view::{ControllerHandle, ShelfController};
use std::time::Duration;
use std::{io, panic};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

const SPINNER_INTERVAL: Duration = Duration::from_millis(120);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Restore the terminal. Used on normal exit and from the panic hook, so
/// each step ignores errors.
fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen, Show);
}

fn install_panic_hook() {
    let original_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        restore_terminal();
        original_hook(panic_info);
    }));
}

/// Run the TUI until the user quits.
pub async fn run(ctx: AppContext, theme_mode: ThemeMode) -> Result<()> {
    install_panic_hook();

    let (handle, controller) = ShelfController::spawn(ctx.session.clone(), ctx.store.clone());
    info!("TUI started");

    let result = run_with_terminal(&handle, theme_mode).await;
    restore_terminal();

    handle.dispose();
    if tokio::time::timeout(SHUTDOWN_GRACE, controller).await.is_err() {
        warn!("Controller did not stop in time");
    }
    result
}

async fn run_with_terminal(handle: &ControllerHandle, theme_mode: ThemeMode) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let mut app = App::new(theme_mode);
    run_app(&mut terminal, &mut app, handle).await
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    handle: &ControllerHandle,
) -> Result<()> {
    let mut state_rx = handle.watch();
    let mut outcomes = handle.outcomes();
    let mut events = EventStream::new();
    let mut spinner = tokio::time::interval(SPINNER_INTERVAL);

    app.apply_state(state_rx.borrow_and_update().clone());

    loop {
        terminal.draw(|f| ui::render(f, app))?;

        tokio::select! {
            maybe_event = events.next() => match maybe_event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    app.clear_status_message();
                    match event::handle_key(app, key) {
                        Command::None => {}
                        Command::Dispatch(action) => {
                            debug!(action = ?action.kind(), "Dispatching");
                            if !handle.dispatch(action) {
                                anyhow::bail!("The view controller stopped unexpectedly");
                            }
                        }
                        Command::Open(url) => match context::open_link(&url) {
                            Ok(()) => app.set_status(format!("Opened {}", url)),
                            Err(e) => app.set_error(e.to_string()),
                        },
                        Command::Quit => break,
                    }
                }
                // Resize and other events only need a redraw.
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            },
            changed = state_rx.changed() => {
                if changed.is_err() {
                    anyhow::bail!("The view controller stopped unexpectedly");
                }
                let state = state_rx.borrow_and_update().clone();
                app.apply_state(state);
            }
            outcome = outcomes.recv() => match outcome {
                Ok(outcome) => app.apply_outcome(&outcome),
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "Missed outcomes"),
                Err(RecvError::Closed) => break,
            },
            _ = spinner.tick(), if app.is_busy() => app.advance_spinner(),
        }
    }

    info!("TUI closed");
    Ok(())
}
