//! Front-end state for the TUI.
//!
//! The controller owns the bookmark list and the session. `App` keeps a
//! snapshot of its state plus what only the terminal cares about: focus,
//! selection, the text being typed, and status messages.

use super::theme::{Theme, ThemeMode};
use shelf_store::Bookmark;
use shelf_view::{ActionKind, Outcome, Screen, ViewState};

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Which part of the shelf screen receives keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Title,
    Url,
    List,
}

impl Focus {
    pub fn next(self) -> Self {
        match self {
            Focus::Title => Focus::Url,
            Focus::Url => Focus::List,
            Focus::List => Focus::Title,
        }
    }

    pub fn prev(self) -> Self {
        match self {
            Focus::Title => Focus::List,
            Focus::Url => Focus::Title,
            Focus::List => Focus::Url,
        }
    }

    pub fn is_editor(self) -> bool {
        matches!(self, Focus::Title | Focus::Url)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

pub struct App {
    pub state: ViewState,

    // Inputs as typed. Every edit is also sent to the controller, so these
    // stay ahead of the state snapshot while keys arrive faster than updates.
    pub title_input: String,
    pub url_input: String,

    pub focus: Focus,
    pub selected: usize,
    pub show_help: bool,
    pub status_message: Option<StatusMessage>,
    /// Sign-in waiting on the browser
    pub signing_in: bool,
    pub spinner_frame: usize,
    pub theme: Theme,
}

impl App {
    pub fn new(theme_mode: ThemeMode) -> Self {
        Self {
            state: ViewState::default(),
            title_input: String::new(),
            url_input: String::new(),
            focus: Focus::Title,
            selected: 0,
            show_help: false,
            status_message: None,
            signing_in: false,
            spinner_frame: 0,
            theme: Theme::from_mode(theme_mode),
        }
    }

    pub fn screen(&self) -> Screen {
        self.state.screen()
    }

    /// Adopt a new controller snapshot.
    pub fn apply_state(&mut self, state: ViewState) {
        if state.user.is_none() {
            self.title_input.clear();
            self.url_input.clear();
            self.focus = Focus::Title;
            self.selected = 0;
        } else {
            self.signing_in = false;
        }
        self.state = state;
        self.clamp_selection();
    }

    pub fn apply_outcome(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Completed(ActionKind::Add) => {
                self.title_input.clear();
                self.url_input.clear();
                self.focus = Focus::Title;
                self.set_status("Bookmark added");
            }
            Outcome::Completed(ActionKind::Delete) => self.set_status("Bookmark deleted"),
            Outcome::Completed(ActionKind::SignIn) => self.signing_in = false,
            Outcome::Completed(ActionKind::SignOut) => self.set_status("Signed out"),
            Outcome::Completed(_) => {}
            // The controller logs failures; the list just keeps its prior state.
            Outcome::Failed {
                action: ActionKind::SignIn,
                error,
            } => {
                self.signing_in = false;
                self.set_error(format!("Sign-in failed: {}", error));
            }
            Outcome::Failed { .. } => {}
        }
    }

    pub fn is_busy(&self) -> bool {
        self.signing_in || self.screen() == Screen::Loading
    }

    pub fn spinner(&self) -> &'static str {
        SPINNER_FRAMES[self.spinner_frame % SPINNER_FRAMES.len()]
    }

    pub fn advance_spinner(&mut self) {
        self.spinner_frame = (self.spinner_frame + 1) % SPINNER_FRAMES.len();
    }

    pub fn selected_bookmark(&self) -> Option<&Bookmark> {
        self.state.bookmarks.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if self.selected + 1 < self.state.bookmarks.len() {
            self.selected += 1;
        }
    }

    pub fn select_prev(&mut self) {
        self.selected = self.selected.saturating_sub(1);
    }

    fn clamp_selection(&mut self) {
        let len = self.state.bookmarks.len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    /// The input the focus points at, if it is an editor field.
    pub fn focused_input(&mut self) -> Option<&mut String> {
        match self.focus {
            Focus::Title => Some(&mut self.title_input),
            Focus::Url => Some(&mut self.url_input),
            Focus::List => None,
        }
    }

    pub fn set_status(&mut self, text: impl Into<String>) {
        self.status_message = Some(StatusMessage {
            text: text.into(),
            is_error: false,
        });
    }

    pub fn set_error(&mut self, text: impl Into<String>) {
        self.status_message = Some(StatusMessage {
            text: text.into(),
            is_error: true,
        });
    }

    pub fn clear_status_message(&mut self) {
        self.status_message = None;
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use shelf_auth::{AuthError, User, UserId};
    use shelf_store::{BookmarkId, StoreError, ValidationError};
    use shelf_view::ViewError;
    use std::sync::Arc;

    pub(crate) fn bookmark(id: &str, title: &str, url: &str) -> Bookmark {
        Bookmark {
            id: BookmarkId::new(id),
            title: title.into(),
            url: url.into(),
            user_id: UserId::new("u-1"),
            created_at: Utc::now() - Duration::minutes(5),
        }
    }

    /// A signed-in state holding `bookmarks`.
    pub(crate) fn shelf_state(bookmarks: Vec<Bookmark>) -> ViewState {
        ViewState {
            user: Some(User {
                id: UserId::new("u-1"),
                email: Some("ada@example.com".into()),
            }),
            bookmarks,
            session_resolved: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_focus_cycles_through_editor_and_list() {
        assert_eq!(Focus::Title.next(), Focus::Url);
        assert_eq!(Focus::Url.next(), Focus::List);
        assert_eq!(Focus::List.next(), Focus::Title);
        assert_eq!(Focus::Title.prev(), Focus::List);
    }

    #[test]
    fn test_selection_is_clamped_when_list_shrinks() {
        let mut app = App::new(ThemeMode::Terminal);
        app.apply_state(shelf_state(vec![
            bookmark("1", "a", "https://a.example"),
            bookmark("2", "b", "https://b.example"),
            bookmark("3", "c", "https://c.example"),
        ]));
        app.select_next();
        app.select_next();
        app.select_next();
        assert_eq!(app.selected, 2);

        app.apply_state(shelf_state(vec![bookmark("1", "a", "https://a.example")]));
        assert_eq!(app.selected, 0);
        assert_eq!(app.selected_bookmark().map(|b| b.id.as_str()), Some("1"));
    }

    #[test]
    fn test_session_end_clears_inputs() {
        let mut app = App::new(ThemeMode::Terminal);
        app.apply_state(shelf_state(vec![]));
        app.title_input = "Rust".into();
        app.focus = Focus::List;

        app.apply_state(ViewState {
            session_resolved: true,
            ..Default::default()
        });

        assert_eq!(app.screen(), Screen::SignIn);
        assert!(app.title_input.is_empty());
        assert_eq!(app.focus, Focus::Title);
    }

    #[test]
    fn test_add_completion_clears_inputs() {
        let mut app = App::new(ThemeMode::Terminal);
        app.apply_state(shelf_state(vec![]));
        app.title_input = "Rust".into();
        app.url_input = "https://rust-lang.org".into();
        app.focus = Focus::Url;

        app.apply_outcome(&Outcome::Completed(ActionKind::Add));
        assert!(app.title_input.is_empty() && app.url_input.is_empty());
        assert_eq!(app.focus, Focus::Title);
        assert!(!app.status_message.as_ref().unwrap().is_error);
    }

    fn failed(action: ActionKind, error: ViewError) -> Outcome {
        Outcome::Failed {
            action,
            error: Arc::new(error),
        }
    }

    #[test]
    fn test_background_failures_stay_silent() {
        let mut app = App::new(ThemeMode::Terminal);
        app.apply_state(shelf_state(vec![bookmark("1", "a", "https://a.example")]));

        let outage = || {
            ViewError::Store(StoreError::Supabase {
                status: 503,
                message: "down".into(),
            })
        };
        for action in [
            ActionKind::Fetch,
            ActionKind::Subscribe,
            ActionKind::Delete,
            ActionKind::SignOut,
        ] {
            app.apply_outcome(&failed(action, outage()));
            assert!(app.status_message.is_none(), "{action:?} failure was shown");
        }
        assert_eq!(app.state.bookmarks.len(), 1);
    }

    #[test]
    fn test_rejected_add_keeps_inputs_without_message() {
        let mut app = App::new(ThemeMode::Terminal);
        app.apply_state(shelf_state(vec![]));
        app.title_input = "Rust".into();
        app.focus = Focus::Url;

        app.apply_outcome(&failed(
            ActionKind::Add,
            ViewError::Store(StoreError::Validation(ValidationError::EmptyUrl)),
        ));
        assert!(app.status_message.is_none());
        assert_eq!(app.title_input, "Rust");
        assert_eq!(app.focus, Focus::Url);
    }

    #[test]
    fn test_sign_in_failure_settles_indicator() {
        let mut app = App::new(ThemeMode::Terminal);
        app.apply_state(ViewState {
            session_resolved: true,
            ..Default::default()
        });
        app.signing_in = true;

        app.apply_outcome(&failed(
            ActionKind::Fetch,
            ViewError::Store(StoreError::Validation(ValidationError::EmptyUrl)),
        ));
        // Only a sign-in outcome settles the sign-in indicator.
        assert!(app.signing_in);

        app.apply_outcome(&failed(
            ActionKind::SignIn,
            ViewError::Auth(AuthError::OAuth("access_denied".into())),
        ));
        assert!(!app.signing_in);
        let status = app.status_message.clone().unwrap();
        assert!(status.is_error);
        assert!(status.text.starts_with("Sign-in failed"));
    }
}
