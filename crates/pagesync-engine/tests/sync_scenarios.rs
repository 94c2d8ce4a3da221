mod common;

use common::*;
use pagesync_engine::remote::{InMemoryStore, RemoteCall};
use pagesync_engine::buffer::Position;
use pagesync_engine::{BlockId, BlockType};
use pretty_assertions::assert_eq;
use serde_json::json;

#[tokio::test]
async fn appended_text_becomes_one_update() {
    init_logging();
    let store = InMemoryStore::new();
    let (page, ids) = page_with(&store, vec![paragraph("Hello")]).await;
    let mut session = open(&store, &page).await;

    type_at(&mut session, 2, 5, " world");
    let plan = session.prepare();

    assert_eq!(plan.updates.len(), 1);
    assert_eq!(plan.updates[0].content, "Hello world");
    assert!(plan.creates.is_empty() && plan.deletes.is_empty() && plan.type_changes.is_empty());

    let report = session.execute(&store, plan, &Default::default()).await;
    assert!(report.is_success());
    assert_eq!(remote_text(&store, &ids[0]).await, "Hello world");
    assert!(session.prepare().is_empty());
}

#[tokio::test]
async fn replacing_a_whole_line_updates_the_block() {
    init_logging();
    let store = InMemoryStore::new();
    let (page, ids) = page_with(&store, vec![paragraph("Hello"), paragraph("World")]).await;
    let mut session = open(&store, &page).await;

    session
        .buffer_mut()
        .replace(Position::new(2, 0)..Position::new(2, 5), "Bye");
    let plan = session.prepare();

    assert!(plan.deletes.is_empty() && plan.creates.is_empty());
    assert_eq!(plan.updates.len(), 1);
    assert_eq!(plan.updates[0].block_id, ids[0]);
    assert_eq!(plan.updates[0].content, "Bye");

    sync(&mut session, &store).await;
    assert_eq!(store.children_of(&page).await, ids);
    assert_eq!(remote_text(&store, &ids[0]).await, "Bye");
    assert!(session.prepare().is_empty());
}

#[tokio::test]
async fn cleared_then_retyped_line_updates_the_block() {
    init_logging();
    let store = InMemoryStore::new();
    let (page, ids) = page_with(&store, vec![paragraph("Hello"), paragraph("World")]).await;
    let mut session = open(&store, &page).await;

    session
        .buffer_mut()
        .replace(Position::new(2, 0)..Position::new(2, 5), "");
    type_at(&mut session, 2, 0, "Bye");
    let plan = session.prepare();

    assert!(plan.deletes.is_empty() && plan.creates.is_empty());
    assert_eq!(plan.updates.len(), 1);
    assert_eq!(plan.updates[0].content, "Bye");
    assert_eq!(plan.updates[0].block_id, ids[0]);
}

#[tokio::test]
async fn mixed_markup_typed_without_blank_lines_is_one_block() {
    init_logging();
    let store = InMemoryStore::new();
    let (page, _) = page_with(&store, vec![paragraph("A")]).await;
    let mut session = open(&store, &page).await;

    type_at(&mut session, 2, 1, "\nintro line\n- x\n## y");
    let plan = session.prepare();

    assert_eq!(plan.creates.len(), 1);
    assert_eq!(plan.creates[0].block_type, BlockType::Paragraph);
    assert_eq!(plan.creates[0].content, vec!["intro line", "- x", "## y"]);
}

#[tokio::test]
async fn deleting_a_divider_line_plans_one_delete() {
    init_logging();
    let store = InMemoryStore::new();
    let (page, ids) = page_with(
        &store,
        vec![paragraph("Before"), divider(), paragraph("After")],
    )
    .await;
    let mut session = open(&store, &page).await;
    assert_eq!(
        session.buffer().lines(),
        vec!["# T", "", "Before", "---", "After"]
    );

    delete_row(&mut session, 3);
    let plan = session.prepare();

    let divider = session.tree().lookup(&ids[1]).unwrap();
    assert_eq!(session.tree().get(divider).unwrap().span, None);
    assert_eq!(plan.deletes.len(), 1);
    assert_eq!(plan.deletes[0].block_id, ids[1]);
    assert!(plan.updates.is_empty());
    assert!(plan.creates.is_empty());

    let report = sync(&mut session, &store).await;
    assert!(report.is_success());
    assert_eq!(store.children_of(&page).await, vec![ids[0].clone(), ids[2].clone()]);
    assert!(session.tree().lookup(&ids[1]).is_none());
    assert!(session.prepare().is_empty());
}

#[tokio::test]
async fn bullet_marker_typed_over_paragraph_changes_type() {
    init_logging();
    let store = InMemoryStore::new();
    let (page, ids) = page_with(&store, vec![paragraph("first"), paragraph("item")]).await;
    let mut session = open(&store, &page).await;

    type_at(&mut session, 3, 0, "- ");
    let plan = session.prepare();

    assert!(plan.updates.is_empty());
    assert_eq!(plan.type_changes.len(), 1);
    assert_eq!(plan.type_changes[0].new_type, BlockType::BulletedListItem);
    assert_eq!(plan.type_changes[0].content, "item");

    let report = session.execute(&store, plan, &Default::default()).await;
    assert!(report.is_success());
    assert_eq!(report.completed, 2);

    let new_id = report.id_map.get(&ids[1]).unwrap().clone();
    assert!(!store.contains(&ids[1]).await);
    assert_eq!(store.children_of(&page).await, vec![ids[0].clone(), new_id.clone()]);
    assert_eq!(store.block(&new_id).await.unwrap()["type"], "bulleted_list_item");
    assert_eq!(remote_text(&store, &new_id).await, "item");

    let index = session.tree().lookup(&new_id).unwrap();
    assert_eq!(
        session.tree().get(index).unwrap().block_type(),
        BlockType::BulletedListItem
    );
    assert!(session.prepare().is_empty());
}

#[tokio::test]
async fn new_lines_after_a_block_are_created_in_one_ordered_append() {
    init_logging();
    let store = InMemoryStore::new();
    let (page, ids) = page_with(&store, vec![paragraph("A"), paragraph("Z")]).await;
    let mut session = open(&store, &page).await;

    type_at(&mut session, 2, 1, "\n## B\n\n- C\n\n- D");
    let plan = session.prepare();
    assert_eq!(plan.creates.len(), 3);

    let provisional: Vec<BlockId> = plan.creates.iter().map(|c| c.provisional_id.clone()).collect();
    let report = session.execute(&store, plan, &Default::default()).await;
    assert!(report.is_success(), "{:?}", report.errors);

    assert_eq!(
        store.calls().await,
        vec![RemoteCall::Append {
            parent: page.clone(),
            count: 3,
            after: Some(ids[0].clone()),
        }]
    );
    let real: Vec<BlockId> = provisional
        .iter()
        .map(|p| report.id_map.get(p).unwrap().clone())
        .collect();
    for id in &real {
        assert!(store.contains(id).await);
        assert!(session.tree().lookup(id).is_some());
    }

    let mut expected = vec![ids[0].clone()];
    expected.extend(real.iter().cloned());
    expected.push(ids[1].clone());
    assert_eq!(store.children_of(&page).await, expected);
    assert_eq!(store.block(&real[0]).await.unwrap()["type"], "heading_2");
    assert_eq!(remote_text(&store, &real[2]).await, "D");

    assert!(session.prepare().is_empty());
}

#[tokio::test]
async fn indented_lines_under_a_toggle_become_its_children() {
    init_logging();
    let store = InMemoryStore::new();
    let (page, ids) = page_with(&store, vec![typed("toggle", "More")]).await;
    let mut session = open(&store, &page).await;

    type_at(&mut session, 2, 6, "\n  x\n  y");
    let plan = session.prepare();

    assert_eq!(plan.creates.len(), 2);
    for create in &plan.creates {
        assert_eq!(create.anchor.target(), &ids[0]);
        assert!(matches!(create.anchor, pagesync_engine::mapping::Anchor::Parent(_)));
    }

    let report = sync(&mut session, &store).await;
    assert!(report.is_success());

    let children = store.children_of(&ids[0]).await;
    assert_eq!(children.len(), 2);
    assert_eq!(remote_text(&store, &children[0]).await, "x");
    assert_eq!(remote_text(&store, &children[1]).await, "y");

    let toggle = session.tree().lookup(&ids[0]).unwrap();
    assert_eq!(session.tree().get(toggle).unwrap().children().len(), 2);
    assert!(session.prepare().is_empty());
}

#[tokio::test]
async fn over_indented_child_settles_at_its_depth() {
    init_logging();
    let store = InMemoryStore::new();
    let (page, ids) = page_with(&store, vec![typed("toggle", "More")]).await;
    let mut session = open(&store, &page).await;

    type_at(&mut session, 2, 6, "\n    deep");
    let report = sync(&mut session, &store).await;
    assert!(report.is_success());

    let children = store.children_of(&ids[0]).await;
    assert_eq!(children.len(), 1);
    assert_eq!(remote_text(&store, &children[0]).await, "deep");
    assert_eq!(session.buffer().lines()[3], "  deep");
    assert!(session.prepare().is_empty());
}

#[tokio::test]
async fn nested_child_edits_strip_indentation() {
    init_logging();
    let store = InMemoryStore::new();
    let page = store.create_page("T").await;
    let toggle = store.insert_block(&page, typed("toggle", "More")).await;
    let child = store.insert_block(&toggle, paragraph("inside")).await;
    let mut session = open(&store, &page).await;

    type_at(&mut session, 3, 8, " too");
    let plan = session.prepare();

    assert_eq!(plan.updates.len(), 1);
    assert_eq!(plan.updates[0].block_id, child);
    assert_eq!(plan.updates[0].content, "inside too");

    sync(&mut session, &store).await;
    assert_eq!(remote_text(&store, &child).await, "inside too");
}

#[tokio::test]
async fn code_block_edits_update_the_code_body() {
    init_logging();
    let store = InMemoryStore::new();
    let code = json!({
        "type": "code",
        "code": {"rich_text": [{"type": "text", "text": {"content": "fn main() {}"}}], "language": "rust"}
    });
    let (page, ids) = page_with(&store, vec![code]).await;
    let mut session = open(&store, &page).await;
    assert_eq!(
        session.buffer().lines(),
        vec!["# T", "", "```rust", "fn main() {}", "```"]
    );

    type_at(&mut session, 3, 12, "\n// done");
    let report = sync(&mut session, &store).await;

    assert!(report.is_success());
    let stored = store.block(&ids[0]).await.unwrap();
    assert_eq!(stored["code"]["language"], "rust");
    assert_eq!(remote_text(&store, &ids[0]).await, "fn main() {}\n// done");
}

#[tokio::test]
async fn unsupported_blocks_are_left_alone() {
    init_logging();
    let store = InMemoryStore::new();
    let table = json!({"type": "table", "table": {"table_width": 2}});
    let (page, ids) = page_with(&store, vec![paragraph("a"), table.clone()]).await;
    let mut session = open(&store, &page).await;
    assert_eq!(session.buffer().lines()[3], "[unsupported: table]");

    type_at(&mut session, 2, 1, "b");
    let report = sync(&mut session, &store).await;

    assert!(report.is_success());
    assert_eq!(store.calls().await, vec![RemoteCall::Update(ids[0].clone())]);
    assert_eq!(store.block(&ids[1]).await.unwrap()["table"], table["table"]);
}

#[tokio::test]
async fn declined_confirmation_leaves_remote_untouched() {
    init_logging();
    let store = InMemoryStore::new();
    let (page, _) = page_with(&store, vec![paragraph("a"), paragraph("b")]).await;
    let mut session = pagesync_engine::SyncSession::open(
        &store,
        &page,
        pagesync_engine::RopeBuffer::new(),
        &pagesync_config::Config::default(),
    )
    .await
    .unwrap();
    store.clear_calls().await;

    delete_row(&mut session, 3);
    let outcome = session
        .sync(&store, &Default::default(), |plan| {
            assert_eq!(plan.deletes.len(), 1);
            false
        })
        .await;

    assert!(matches!(outcome, pagesync_engine::SyncOutcome::Declined(_)));
    assert!(store.calls().await.is_empty());
}
