//! # Block Model
//!
//! Local representation of remote page content.
//!
//! ## Modules
//!
//! - **`kinds`**: the closed set of block variants (`BlockContent`) and the
//!   markup each variant owns (heading hashes, list markers, fences...)
//! - **`classify`**: prefix classification of a buffer line into a `BlockType`
//! - **`tree`**: `BlockTree`, an arena holding blocks with index-based
//!   parent/child links
//! - **`registry`**: `Registry`, dispatch from a remote type tag to variant
//!   behavior (deserialize, format, serialize, update from lines)
//!
//! ## Key Invariants
//!
//! - `depth == parent.depth + 1`, or 0 for top-level blocks
//! - `span == None` is the only signal that a block left the buffer
//! - Blocks the registry cannot handle keep their raw payload and are never
//!   editable, so they round-trip byte for byte

pub mod classify;
pub mod kinds;
pub mod registry;
pub mod tree;

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

pub use kinds::{BlockContent, BlockType};
pub use registry::Registry;
pub use tree::BlockTree;

/// Remote identifier of a block, or a provisional one for a block that has
/// not been created yet.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(String);

impl BlockId {
    pub const PROVISIONAL_PREFIX: &'static str = "tmp-";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh provisional id.
    pub fn provisional() -> Self {
        Self(format!("{}{}", Self::PROVISIONAL_PREFIX, Uuid::new_v4()))
    }

    pub fn is_provisional(&self) -> bool {
        self.0.starts_with(Self::PROVISIONAL_PREFIX)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BlockId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for BlockId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Slot of a block inside a [`BlockTree`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockIndex(pub(crate) usize);

/// 1-indexed, inclusive range of buffer lines.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LineSpan {
    pub start: usize,
    pub end: usize,
}

impl LineSpan {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start >= 1 && start <= end, "invalid span {start}..={end}");
        Self { start, end }
    }

    pub fn single(line: usize) -> Self {
        Self::new(line, line)
    }

    /// Number of lines covered.
    pub fn len(self) -> usize {
        self.end + 1 - self.start
    }

    pub fn contains(self, line: usize) -> bool {
        self.start <= line && line <= self.end
    }

    /// The same lines as 0-indexed buffer rows, end exclusive.
    pub fn rows(self) -> std::ops::Range<usize> {
        (self.start - 1)..self.end
    }
}

/// A typed unit of page content.
#[derive(Debug, Clone)]
pub struct Block {
    pub id: BlockId,
    pub content: BlockContent,
    /// Payload as last received from (or sent to) the remote store.
    pub raw: Value,
    pub(crate) parent: Option<BlockIndex>,
    pub(crate) children: Vec<BlockIndex>,
    pub(crate) depth: usize,
    pub editable: bool,
    pub dirty: bool,
    /// Whether the remote reports children for this block.
    pub has_children: bool,
    pub span: Option<LineSpan>,
    /// Buffer text (indent stripped) at the last successful load or sync.
    pub original_text: String,
    /// Buffer text (indent stripped) as of the last refresh.
    pub current_text: String,
}

impl Block {
    pub fn new(id: BlockId, content: BlockContent, raw: Value) -> Self {
        let editable = content.is_editable();
        Self {
            id,
            content,
            raw,
            parent: None,
            children: Vec::new(),
            depth: 0,
            editable,
            dirty: false,
            has_children: false,
            span: None,
            original_text: String::new(),
            current_text: String::new(),
        }
    }

    pub fn block_type(&self) -> BlockType {
        self.content.block_type()
    }

    pub fn parent(&self) -> Option<BlockIndex> {
        self.parent
    }

    pub fn children(&self) -> &[BlockIndex] {
        &self.children
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn supports_children(&self) -> bool {
        self.block_type().supports_children()
    }

    /// Records `text` as the synced state of this block.
    pub fn mark_synced(&mut self, text: String) {
        self.original_text = text.clone();
        self.current_text = text;
        self.dirty = false;
    }
}
