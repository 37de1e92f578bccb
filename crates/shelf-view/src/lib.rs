//! View layer for Linkshelf.
//!
//! A [`ShelfController`] owns the [`ViewState`] (current user, bookmark
//! list, and the title and url inputs) and is its only writer. Front ends
//! dispatch [`Action`]s and render whatever the state watch reports.

mod controller;
mod error;
mod state;
mod tasks;

pub use controller::{ControllerHandle, Outcome, ShelfController};
pub use error::ViewError;
pub use state::{Action, ActionKind, Screen, ViewState};
pub use tasks::TaskTracker;
