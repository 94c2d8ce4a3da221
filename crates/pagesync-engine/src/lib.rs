//! Keeps a plain-text buffer in sync with a remote page of typed blocks.
//!
//! A [`SyncSession`] renders the page into an [`EditorBuffer`], tracks which
//! lines belong to which block while the text is edited freely, and turns
//! the edits into the smallest set of remote updates, creates, deletes and
//! type changes.

pub mod blocks;
pub mod buffer;
pub mod cache;
pub mod error;
pub mod mapping;
pub mod remote;
pub mod richtext;
pub mod sync;

pub use blocks::{Block, BlockContent, BlockId, BlockTree, BlockType, LineSpan, Registry};
pub use buffer::{EditorBuffer, RopeBuffer};
pub use cache::{FileCache, PageCache};
pub use error::{Result, SyncError};
pub use remote::{InMemoryStore, Page, RemoteError, RemoteStore};
pub use richtext::{MarkerRichText, RichText, Segment};
pub use sync::{SyncOutcome, SyncPlan, SyncReport, SyncSession};
