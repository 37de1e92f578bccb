//! Keyboard handling for the TUI.

use super::app::{App, Focus};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use shelf_view::{Action, Screen};

/// What the event loop should do after a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    None,
    Dispatch(Action),
    /// Open a link in the system browser
    Open(String),
    Quit,
}

pub const HELP_LINES: &[(&str, &str)] = &[
    ("s", "sign in with Google"),
    ("o", "sign out"),
    ("Tab", "switch between title, url and list"),
    ("Enter", "add bookmark (editor) / open link (list)"),
    ("j/k", "move in the list"),
    ("d", "delete the selected bookmark"),
    ("r", "refresh"),
    ("Esc", "leave the editor"),
    ("q", "quit"),
    ("?", "this help"),
];

/// Handle a key press.
pub fn handle_key(app: &mut App, key: KeyEvent) -> Command {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Command::Quit;
    }
    if app.show_help {
        app.show_help = false;
        return Command::None;
    }

    match app.screen() {
        Screen::Loading => match key.code {
            KeyCode::Char('q') | KeyCode::Esc => Command::Quit,
            _ => Command::None,
        },
        Screen::SignIn => handle_sign_in(app, key),
        Screen::Shelf if app.focus.is_editor() => handle_editor(app, key),
        Screen::Shelf => handle_list(app, key),
    }
}

fn handle_sign_in(app: &mut App, key: KeyEvent) -> Command {
    match key.code {
        KeyCode::Char('s') | KeyCode::Enter => {
            if app.signing_in {
                return Command::None;
            }
            app.signing_in = true;
            app.set_status("Finish signing in with Google in your browser");
            Command::Dispatch(Action::SignIn)
        }
        KeyCode::Char('q') | KeyCode::Esc => Command::Quit,
        KeyCode::Char('?') => {
            app.show_help = true;
            Command::None
        }
        _ => Command::None,
    }
}

/// Title and url fields. Printable keys are text here, so only Tab, Esc,
/// Enter and Backspace act.
fn handle_editor(app: &mut App, key: KeyEvent) -> Command {
    match key.code {
        KeyCode::Tab => {
            app.focus = app.focus.next();
            Command::None
        }
        KeyCode::BackTab => {
            app.focus = app.focus.prev();
            Command::None
        }
        KeyCode::Esc => {
            app.focus = Focus::List;
            Command::None
        }
        KeyCode::Enter => Command::Dispatch(Action::Add),
        KeyCode::Backspace => edit(app, |input| {
            input.pop();
        }),
        KeyCode::Char(c)
            if !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
        {
            edit(app, |input| input.push(c))
        }
        _ => Command::None,
    }
}

fn edit(app: &mut App, change: impl FnOnce(&mut String)) -> Command {
    let focus = app.focus;
    let Some(input) = app.focused_input() else {
        return Command::None;
    };
    change(input);
    let value = input.clone();
    match focus {
        Focus::Title => Command::Dispatch(Action::SetTitle(value)),
        Focus::Url => Command::Dispatch(Action::SetUrl(value)),
        Focus::List => Command::None,
    }
}

fn handle_list(app: &mut App, key: KeyEvent) -> Command {
    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Command::Quit,
        KeyCode::Tab => {
            app.focus = app.focus.next();
            Command::None
        }
        KeyCode::BackTab => {
            app.focus = app.focus.prev();
            Command::None
        }
        KeyCode::Char('j') | KeyCode::Down => {
            app.select_next();
            Command::None
        }
        KeyCode::Char('k') | KeyCode::Up => {
            app.select_prev();
            Command::None
        }
        KeyCode::Enter => match app.selected_bookmark() {
            Some(bookmark) => Command::Open(bookmark.url.clone()),
            None => Command::None,
        },
        KeyCode::Char('d') | KeyCode::Delete => match app.selected_bookmark() {
            Some(bookmark) => Command::Dispatch(Action::Delete(bookmark.id.clone())),
            None => Command::None,
        },
        KeyCode::Char('r') => {
            app.set_status("Refreshing...");
            Command::Dispatch(Action::Refresh)
        }
        KeyCode::Char('o') => Command::Dispatch(Action::SignOut),
        KeyCode::Char('a') | KeyCode::Char('i') => {
            app.focus = Focus::Title;
            Command::None
        }
        KeyCode::Char('?') => {
            app.show_help = true;
            Command::None
        }
        _ => Command::None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::app::tests::{bookmark, shelf_state};
    use crate::tui::theme::ThemeMode;
    use shelf_store::BookmarkId;
    use shelf_view::ViewState;

    fn press(app: &mut App, code: KeyCode) -> Command {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn shelf_app() -> App {
        let mut app = App::new(ThemeMode::Terminal);
        app.apply_state(shelf_state(vec![
            bookmark("2", "Tokio", "https://tokio.rs"),
            bookmark("1", "Rust", "https://rust-lang.org"),
        ]));
        app
    }

    #[test]
    fn test_typing_sends_whole_field() {
        let mut app = shelf_app();
        assert_eq!(
            press(&mut app, KeyCode::Char('R')),
            Command::Dispatch(Action::SetTitle("R".into()))
        );
        // 'q' is text in the editor, not quit.
        assert_eq!(
            press(&mut app, KeyCode::Char('q')),
            Command::Dispatch(Action::SetTitle("Rq".into()))
        );
        assert_eq!(
            press(&mut app, KeyCode::Backspace),
            Command::Dispatch(Action::SetTitle("R".into()))
        );

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.focus, Focus::Url);
        assert_eq!(
            press(&mut app, KeyCode::Char('h')),
            Command::Dispatch(Action::SetUrl("h".into()))
        );
        assert_eq!(press(&mut app, KeyCode::Enter), Command::Dispatch(Action::Add));
    }

    #[test]
    fn test_list_keys() {
        let mut app = shelf_app();
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.focus, Focus::List);

        assert_eq!(
            press(&mut app, KeyCode::Enter),
            Command::Open("https://tokio.rs".into())
        );
        press(&mut app, KeyCode::Char('j'));
        assert_eq!(
            press(&mut app, KeyCode::Char('d')),
            Command::Dispatch(Action::Delete(BookmarkId::new("1")))
        );
        assert_eq!(
            press(&mut app, KeyCode::Char('r')),
            Command::Dispatch(Action::Refresh)
        );
        assert_eq!(
            press(&mut app, KeyCode::Char('o')),
            Command::Dispatch(Action::SignOut)
        );
        assert_eq!(press(&mut app, KeyCode::Char('q')), Command::Quit);
    }

    #[test]
    fn test_empty_list_ignores_enter_and_delete() {
        let mut app = App::new(ThemeMode::Terminal);
        app.apply_state(shelf_state(vec![]));
        app.focus = Focus::List;
        assert_eq!(press(&mut app, KeyCode::Enter), Command::None);
        assert_eq!(press(&mut app, KeyCode::Char('d')), Command::None);
    }

    #[test]
    fn test_sign_in_is_sent_once_while_waiting() {
        let mut app = App::new(ThemeMode::Terminal);
        app.apply_state(ViewState {
            session_resolved: true,
            ..Default::default()
        });
        assert_eq!(
            press(&mut app, KeyCode::Char('s')),
            Command::Dispatch(Action::SignIn)
        );
        assert!(app.signing_in);
        assert_eq!(press(&mut app, KeyCode::Char('s')), Command::None);
    }

    #[test]
    fn test_help_swallows_next_key() {
        let mut app = shelf_app();
        app.focus = Focus::List;
        press(&mut app, KeyCode::Char('?'));
        assert!(app.show_help);
        assert_eq!(press(&mut app, KeyCode::Char('q')), Command::None);
        assert!(!app.show_help);
    }

    #[test]
    fn test_ctrl_c_quits_from_editor() {
        let mut app = shelf_app();
        let key = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        assert_eq!(handle_key(&mut app, key), Command::Quit);
        assert!(app.title_input.is_empty());
    }

    #[test]
    fn test_loading_only_quits() {
        let mut app = App::new(ThemeMode::Terminal);
        assert_eq!(press(&mut app, KeyCode::Char('s')), Command::None);
        assert_eq!(press(&mut app, KeyCode::Char('q')), Command::Quit);
    }
}
