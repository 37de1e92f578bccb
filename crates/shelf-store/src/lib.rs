//! Bookmark storage for Linkshelf.
//!
//! [`BookmarkStore`] validates input and delegates to a [`BookmarkBackend`]:
//! [`PostgrestBackend`] for Supabase (REST plus a Realtime change feed) or
//! [`InMemoryBackend`] for tests and offline use.

mod backend;
mod client;
mod error;
mod memory;
mod models;
mod realtime;
mod rest;

pub use backend::{BookmarkBackend, ChangeKind, ChangeNotification, ChangeSubscription};
pub use client::BookmarkStore;
pub use error::{StoreError, StoreResult, ValidationError};
pub use memory::{InMemoryBackend, InMemoryDatabase};
pub use models::{decode_rows, Bookmark, BookmarkId, NewBookmark};
pub use realtime::{websocket_url, RealtimeClient, RealtimeConfig};
pub use rest::PostgrestBackend;
