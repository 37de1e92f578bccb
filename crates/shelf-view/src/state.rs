use shelf_auth::User;
use shelf_store::{Bookmark, BookmarkId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Initial session check still pending
    Loading,
    SignIn,
    /// Editor plus the bookmark list
    Shelf,
}

/// Everything a front end renders. Only the controller writes it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub user: Option<User>,
    pub bookmarks: Vec<Bookmark>,
    pub title: String,
    pub url: String,
    /// The initial session check has completed.
    pub session_resolved: bool,
}

impl ViewState {
    pub fn screen(&self) -> Screen {
        match (&self.user, self.session_resolved) {
            (_, false) => Screen::Loading,
            (None, true) => Screen::SignIn,
            (Some(_), true) => Screen::Shelf,
        }
    }

    pub fn greeting(&self) -> Option<String> {
        self.user
            .as_ref()
            .map(|u| format!("Welcome, {}", u.display_name()))
    }

    pub fn bookmark(&self, id: &BookmarkId) -> Option<&Bookmark> {
        self.bookmarks.iter().find(|b| &b.id == id)
    }

    /// Drop everything tied to the signed-in user.
    pub(crate) fn clear_session(&mut self) {
        self.user = None;
        self.bookmarks.clear();
        self.title.clear();
        self.url.clear();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SignIn,
    SignOut,
    SetTitle(String),
    SetUrl(String),
    Add,
    Delete(BookmarkId),
    Refresh,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::SignIn => ActionKind::SignIn,
            Action::SignOut => ActionKind::SignOut,
            Action::SetTitle(_) | Action::SetUrl(_) => ActionKind::Edit,
            Action::Add => ActionKind::Add,
            Action::Delete(_) => ActionKind::Delete,
            Action::Refresh => ActionKind::Fetch,
        }
    }
}

/// What a reported outcome was about. `Fetch` and `Subscribe` also cover
/// work the controller starts on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    SignIn,
    SignOut,
    Edit,
    Add,
    Delete,
    Fetch,
    Subscribe,
}
