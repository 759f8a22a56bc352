use thiserror::Error;

use crate::store::StoreError;

/// Errors surfaced by queue operations.
///
/// Store failures inside the worker loops are logged and absorbed; only
/// operations invoked by callers (push/pop/open/close) return errors.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error(transparent)]
    Store(#[from] StoreError),
}
