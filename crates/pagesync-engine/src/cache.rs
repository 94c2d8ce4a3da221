//! Optional on-disk cache of pages and their rendered buffer content.
//!
//! The content hash lets a session tell whether a freshly fetched page
//! renders differently from what was last synced.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::blocks::BlockId;
use crate::remote::Page;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry is not valid json: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedContent {
    pub lines: Vec<String>,
    pub hash: String,
}

impl CachedContent {
    pub fn new(lines: Vec<String>) -> Self {
        let hash = content_hash(&lines);
        Self { lines, hash }
    }
}

pub trait PageCache {
    fn save_page(&self, page: &Page) -> Result<(), CacheError>;
    fn save_content(&self, page_id: &BlockId, lines: &[String]) -> Result<(), CacheError>;
    fn get_content(&self, page_id: &BlockId) -> Result<Option<CachedContent>, CacheError>;
}

/// Hex SHA-256 over the lines joined with `\n`.
pub fn content_hash(lines: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(lines.join("\n").as_bytes());
    hex::encode(hasher.finalize())
}

/// [`PageCache`] writing one JSON file per page and per content snapshot.
#[derive(Debug, Clone)]
pub struct FileCache {
    root: PathBuf,
}

impl FileCache {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn page_path(&self, page_id: &BlockId) -> PathBuf {
        self.root.join(format!("{page_id}.page.json"))
    }

    fn content_path(&self, page_id: &BlockId) -> PathBuf {
        self.root.join(format!("{page_id}.content.json"))
    }

    fn write(&self, path: &Path, json: String) -> Result<(), CacheError> {
        fs::create_dir_all(&self.root)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl PageCache for FileCache {
    fn save_page(&self, page: &Page) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(page)?;
        self.write(&self.page_path(&page.id), json)
    }

    fn save_content(&self, page_id: &BlockId, lines: &[String]) -> Result<(), CacheError> {
        let json = serde_json::to_string_pretty(&CachedContent::new(lines.to_vec()))?;
        self.write(&self.content_path(page_id), json)
    }

    fn get_content(&self, page_id: &BlockId) -> Result<Option<CachedContent>, CacheError> {
        let path = self.content_path(page_id);
        if !path.exists() {
            return Ok(None);
        }
        let json = fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&json)?))
    }
}
