use thiserror::Error;

use crate::blocks::BlockId;
use crate::cache::CacheError;
use crate::remote::RemoteError;

/// Engine-level failure.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("remote call failed: {0}")]
    Remote(#[from] RemoteError),

    /// A create referenced a parent or sibling that was never resolved to a
    /// real id.
    #[error("anchor {0} was never created")]
    MissingParent(BlockId),

    #[error("malformed remote response: {0}")]
    MalformedResponse(String),

    #[error("sync cancelled")]
    Cancelled,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
