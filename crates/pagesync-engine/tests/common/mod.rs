#![allow(dead_code)]

use pagesync_config::{Config, ConfirmPolicy};
use pagesync_engine::buffer::{EditorBuffer, Position};
use pagesync_engine::remote::InMemoryStore;
use pagesync_engine::{BlockId, RopeBuffer, SyncOutcome, SyncReport, SyncSession};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn typed(tag: &str, text: &str) -> Value {
    json!({
        "type": tag,
        tag: {"rich_text": [{"type": "text", "text": {"content": text}, "plain_text": text}]}
    })
}

pub fn paragraph(text: &str) -> Value {
    typed("paragraph", text)
}

pub fn divider() -> Value {
    json!({"type": "divider", "divider": {}})
}

pub fn config() -> Config {
    Config {
        confirm_sync: ConfirmPolicy::Never,
        ..Config::default()
    }
}

/// A page titled "T" holding `blocks` at the top level.
pub async fn page_with(store: &InMemoryStore, blocks: Vec<Value>) -> (BlockId, Vec<BlockId>) {
    let page = store.create_page("T").await;
    let mut ids = Vec::new();
    for block in blocks {
        ids.push(store.insert_block(&page, block).await);
    }
    (page, ids)
}

pub async fn open(store: &InMemoryStore, page: &BlockId) -> SyncSession<RopeBuffer> {
    let session = SyncSession::open(store, page, RopeBuffer::new(), &config())
        .await
        .unwrap();
    store.clear_calls().await;
    session
}

pub async fn sync(session: &mut SyncSession<RopeBuffer>, store: &InMemoryStore) -> SyncReport {
    match session.sync(store, &CancellationToken::new(), |_| true).await {
        SyncOutcome::Applied(report) => report,
        other => panic!("expected an applied sync, got {other:?}"),
    }
}

pub fn type_at(session: &mut SyncSession<RopeBuffer>, row: usize, col: usize, text: &str) {
    session.buffer_mut().insert(Position::new(row, col), text);
}

pub fn delete_row(session: &mut SyncSession<RopeBuffer>, row: usize) {
    session.buffer_mut().set_lines(row, row + 1, &[]);
}

pub async fn remote_text(store: &InMemoryStore, id: &BlockId) -> String {
    let block = store.block(id).await.unwrap();
    let tag = block["type"].as_str().unwrap().to_string();
    block[&tag]["rich_text"][0]["text"]["content"]
        .as_str()
        .unwrap_or_default()
        .to_string()
}
