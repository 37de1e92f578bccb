//! Session persistence for Linkshelf.
//!
//! Tokens live in `~/.linkshelf/session.json` (owner-only on Unix) through
//! [`FileStorage`]. [`MemoryStorage`] backs tests and throwaway sessions.

mod file;
mod keys;
mod memory;
mod session;
mod traits;

pub use file::FileStorage;
pub use keys::StorageKeys;
pub use memory::MemoryStorage;
pub use session::{SessionMeta, SessionStore, StoredSession};
pub use traits::SecureStorage;

use shelf_config::Paths;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// The default on-disk storage at `paths.session_file()`.
pub fn create_storage(paths: &Paths) -> Box<dyn SecureStorage> {
    Box::new(FileStorage::new(paths.session_file()))
}

/// A [`SessionStore`] on the default storage for the given project.
pub fn create_session_store(paths: &Paths, project_ref: &str) -> SessionStore {
    SessionStore::new(create_storage(paths), project_ref)
}
