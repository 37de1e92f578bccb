use shelf_auth::AuthError;
use shelf_store::StoreError;
use thiserror::Error;

/// A failed action, as reported on the outcome channel.
#[derive(Error, Debug)]
pub enum ViewError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
