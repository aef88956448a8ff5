//! Shared error types for the services crate.

use thiserror::Error;

use cycle_core::model::{ItemId, SubjectError};
use storage::repository::StorageError;

/// Errors emitted by `SubjectService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SubjectServiceError {
    #[error(transparent)]
    Subject(#[from] SubjectError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors emitted by `CycleService`.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CycleServiceError {
    #[error("completed session {0} is frozen; reopen it before editing")]
    ItemFrozen(ItemId),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
