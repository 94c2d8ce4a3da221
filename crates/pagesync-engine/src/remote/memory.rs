//! In-memory remote store.
//!
//! Behaves like the real store for the operations the engine uses, records
//! every call, and can be told to fail specific operations.

use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;
use serde_json::{Value, json};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{Page, RemoteError, RemoteResult, RemoteStore};
use crate::blocks::BlockId;

/// A recorded call, in issue order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    GetPage(BlockId),
    GetChildren(BlockId),
    Append {
        parent: BlockId,
        count: usize,
        after: Option<BlockId>,
    },
    Update(BlockId),
    Delete(BlockId),
}

/// Failure injection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOn {
    Update(BlockId),
    Delete(BlockId),
    AppendTo(BlockId),
    AnyAppend,
}

#[derive(Default)]
struct State {
    pages: HashMap<BlockId, Page>,
    blocks: HashMap<BlockId, Value>,
    children: HashMap<BlockId, Vec<BlockId>>,
    parents: HashMap<BlockId, BlockId>,
    failures: Vec<FailOn>,
    calls: Vec<RemoteCall>,
}

impl State {
    fn exists(&self, id: &BlockId) -> bool {
        self.pages.contains_key(id) || self.blocks.contains_key(id)
    }

    fn fails(&self, rule: &FailOn) -> bool {
        self.failures.contains(rule)
    }

    fn with_has_children(&self, id: &BlockId) -> Option<Value> {
        let mut value = self.blocks.get(id)?.clone();
        let has_children = self.children.get(id).is_some_and(|c| !c.is_empty());
        value["has_children"] = Value::Bool(has_children);
        Some(value)
    }

    fn attach(&mut self, parent: &BlockId, id: BlockId, at: usize) {
        let list = self.children.entry(parent.clone()).or_default();
        list.insert(at.min(list.len()), id.clone());
        self.parents.insert(id, parent.clone());
    }

    fn remove(&mut self, id: &BlockId) {
        if let Some(parent) = self.parents.remove(id) {
            if let Some(list) = self.children.get_mut(&parent) {
                list.retain(|c| c != id);
            }
        }
        for child in self.children.remove(id).unwrap_or_default() {
            self.parents.remove(&child);
            self.remove(&child);
        }
        self.blocks.remove(id);
    }
}

/// [`RemoteStore`] holding pages and blocks in memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn generate_id() -> BlockId {
        BlockId::new(Uuid::new_v4().to_string())
    }

    pub async fn create_page(&self, title: &str) -> BlockId {
        let id = Self::generate_id();
        let raw = json!({
            "object": "page",
            "id": id,
            "properties": {"title": {"title": [{"type": "text", "text": {"content": title}, "plain_text": title}]}}
        });
        let page = Page {
            id: id.clone(),
            title: title.to_string(),
            raw,
        };
        self.state.lock().await.pages.insert(id.clone(), page);
        id
    }

    /// Stores `payload` as the last child of `parent` without recording a
    /// call. Returns the assigned id.
    pub async fn insert_block(&self, parent: &BlockId, payload: Value) -> BlockId {
        let mut state = self.state.lock().await;
        let id = Self::generate_id();
        let value = stamp(payload, &id);
        state.blocks.insert(id.clone(), value);
        let at = state.children.get(parent).map_or(0, Vec::len);
        state.attach(parent, id.clone(), at);
        id
    }

    pub async fn fail_on(&self, rule: FailOn) {
        self.state.lock().await.failures.push(rule);
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failures.clear();
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.state.lock().await.calls.clone()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    pub async fn children_of(&self, parent: &BlockId) -> Vec<BlockId> {
        self.state
            .lock()
            .await
            .children
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn block(&self, id: &BlockId) -> Option<Value> {
        self.state.lock().await.with_has_children(id)
    }

    pub async fn contains(&self, id: &BlockId) -> bool {
        self.state.lock().await.blocks.contains_key(id)
    }
}

fn stamp(payload: Value, id: &BlockId) -> Value {
    let mut value = match payload {
        Value::Object(map) => Value::Object(map),
        _ => json!({}),
    };
    value["object"] = json!("block");
    value["id"] = json!(id);
    value["has_children"] = json!(false);
    value
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn get_page(&self, page_id: &BlockId) -> RemoteResult<Page> {
        let mut state = self.state.lock().await;
        state.calls.push(RemoteCall::GetPage(page_id.clone()));
        state
            .pages
            .get(page_id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(page_id.clone()))
    }

    async fn get_children(&self, parent: &BlockId) -> RemoteResult<Vec<Value>> {
        let mut state = self.state.lock().await;
        state.calls.push(RemoteCall::GetChildren(parent.clone()));
        if !state.exists(parent) {
            return Err(RemoteError::NotFound(parent.clone()));
        }
        let ids = state.children.get(parent).cloned().unwrap_or_default();
        Ok(ids
            .iter()
            .filter_map(|id| state.with_has_children(id))
            .collect())
    }

    async fn append_children(
        &self,
        parent: &BlockId,
        blocks: Vec<Value>,
        after: Option<&BlockId>,
    ) -> RemoteResult<Vec<Value>> {
        let mut state = self.state.lock().await;
        state.calls.push(RemoteCall::Append {
            parent: parent.clone(),
            count: blocks.len(),
            after: after.cloned(),
        });
        if state.fails(&FailOn::AnyAppend) || state.fails(&FailOn::AppendTo(parent.clone())) {
            return Err(RemoteError::Transport("injected append failure".into()));
        }
        if !state.exists(parent) {
            return Err(RemoteError::NotFound(parent.clone()));
        }

        let siblings = state.children.get(parent).cloned().unwrap_or_default();
        let mut at = match after {
            Some(after) => {
                siblings.iter().position(|s| s == after).ok_or_else(|| {
                    RemoteError::Rejected(format!("{after} is not a child of {parent}"))
                })? + 1
            }
            None => siblings.len(),
        };

        let mut created = Vec::with_capacity(blocks.len());
        for payload in blocks {
            let id = Self::generate_id();
            let value = stamp(payload, &id);
            state.blocks.insert(id.clone(), value.clone());
            state.attach(parent, id, at);
            at += 1;
            created.push(value);
        }
        debug!("appended {} blocks under {parent}", created.len());
        Ok(created)
    }

    async fn update_block(&self, id: &BlockId, payload: Value) -> RemoteResult<Value> {
        let mut state = self.state.lock().await;
        state.calls.push(RemoteCall::Update(id.clone()));
        if state.fails(&FailOn::Update(id.clone())) {
            return Err(RemoteError::Transport("injected update failure".into()));
        }
        let Some(stored) = state.blocks.get(id) else {
            return Err(RemoteError::NotFound(id.clone()));
        };
        if payload.get("type").is_some_and(|t| Some(t) != stored.get("type")) {
            return Err(RemoteError::Rejected("block type cannot be changed".into()));
        }

        let mut updated = stored.clone();
        if let (Value::Object(target), Value::Object(fields)) = (&mut updated, payload) {
            for (key, value) in fields {
                if key != "id" && key != "has_children" {
                    target.insert(key, value);
                }
            }
        }
        state.blocks.insert(id.clone(), updated);
        Ok(state.with_has_children(id).unwrap_or(Value::Null))
    }

    async fn delete_block(&self, id: &BlockId) -> RemoteResult<()> {
        let mut state = self.state.lock().await;
        state.calls.push(RemoteCall::Delete(id.clone()));
        if state.fails(&FailOn::Delete(id.clone())) {
            return Err(RemoteError::Transport("injected delete failure".into()));
        }
        if !state.blocks.contains_key(id) {
            return Err(RemoteError::NotFound(id.clone()));
        }
        state.remove(id);
        Ok(())
    }
}
