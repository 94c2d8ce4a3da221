//! Remote document store.
//!
//! The store is reached only through [`RemoteStore`], so the sync engine
//! runs the same code path against a real API client and against
//! [`InMemoryStore`] in tests.

pub mod memory;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::blocks::BlockId;

pub use memory::{FailOn, InMemoryStore, RemoteCall};

/// A single remote call failed. Failures are isolated per operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("{0} not found")]
    NotFound(BlockId),

    #[error("rejected: {0}")]
    Rejected(String),

    #[error("transport error: {0}")]
    Transport(String),
}

pub type RemoteResult<T> = std::result::Result<T, RemoteError>;

/// Page metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub id: BlockId,
    pub title: String,
    pub raw: Value,
}

/// Operations the sync engine needs from the document store.
///
/// Retries and timeouts are the implementation's concern.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get_page(&self, page_id: &BlockId) -> RemoteResult<Page>;

    /// Direct children of a page or block, in order.
    async fn get_children(&self, parent: &BlockId) -> RemoteResult<Vec<Value>>;

    /// Appends `blocks` under `parent`, in order, right after `after` (or at
    /// the end). Returns the created blocks in the same order.
    async fn append_children(
        &self,
        parent: &BlockId,
        blocks: Vec<Value>,
        after: Option<&BlockId>,
    ) -> RemoteResult<Vec<Value>>;

    async fn update_block(&self, id: &BlockId, payload: Value) -> RemoteResult<Value>;

    /// Deletes a block together with its descendants.
    async fn delete_block(&self, id: &BlockId) -> RemoteResult<()>;
}
