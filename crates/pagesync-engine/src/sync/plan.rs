use std::collections::HashSet;

use log::debug;
use pagesync_config::ConfirmPolicy;
use serde_json::Value;

use crate::blocks::{BlockId, BlockIndex, BlockTree, BlockType, LineSpan, Registry};
use crate::mapping::{Anchor, OrphanRange};

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedUpdate {
    pub index: BlockIndex,
    pub block_id: BlockId,
    /// New buffer text of the block, indentation stripped.
    pub content: String,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedCreate {
    pub provisional_id: BlockId,
    pub anchor: Anchor,
    pub block_type: BlockType,
    pub content: Vec<String>,
    pub span: LineSpan,
    pub payload: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedDelete {
    pub index: BlockIndex,
    pub block_id: BlockId,
    /// Text the block had when it was last seen.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlannedTypeChange {
    pub index: BlockIndex,
    pub block_id: BlockId,
    pub old_type: BlockType,
    pub new_type: BlockType,
    /// Text with the new type's markup removed.
    pub content: String,
    /// Full buffer text, markup included.
    pub text: String,
    pub payload: Value,
}

/// Remote mutations needed to bring the store in line with the buffer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncPlan {
    pub updates: Vec<PlannedUpdate>,
    pub creates: Vec<PlannedCreate>,
    pub deletes: Vec<PlannedDelete>,
    pub type_changes: Vec<PlannedTypeChange>,
    /// New text whose placement could not be inferred. Never executed.
    pub unmatched: Vec<OrphanRange>,
    pub needs_confirmation: bool,
}

impl SyncPlan {
    /// True when there is nothing to execute.
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
            && self.creates.is_empty()
            && self.deletes.is_empty()
            && self.type_changes.is_empty()
    }

    /// Elementary remote operations; a type change is a delete plus a create.
    pub fn operation_count(&self) -> usize {
        self.updates.len() + self.creates.len() + self.deletes.len() + 2 * self.type_changes.len()
    }
}

/// Diffs the block model against its last synced state.
pub struct Planner<'a> {
    tree: &'a BlockTree,
    registry: &'a Registry,
    policy: ConfirmPolicy,
}

impl<'a> Planner<'a> {
    pub fn new(tree: &'a BlockTree, registry: &'a Registry, policy: ConfirmPolicy) -> Self {
        Self {
            tree,
            registry,
            policy,
        }
    }

    /// Expects spans and current text to be fresh.
    pub fn plan(&self, orphans: Vec<OrphanRange>) -> SyncPlan {
        let mut plan = SyncPlan::default();
        // Descendants of deleted or retyped blocks go away with them remotely.
        let mut skip: HashSet<BlockIndex> = HashSet::new();

        for (index, block) in self.tree.iter() {
            if skip.contains(&index) {
                continue;
            }
            if block.span.is_none() {
                plan.deletes.push(PlannedDelete {
                    index,
                    block_id: block.id.clone(),
                    content: block.current_text.clone(),
                });
                skip.extend(self.tree.descendants(index));
                continue;
            }
            if !block.editable {
                continue;
            }
            if self.registry.type_changed(block) {
                let new_type = self.registry.detected_type(block);
                let lines: Vec<String> = block.current_text.split('\n').map(String::from).collect();
                let content = self.registry.content_from_lines(new_type, &lines);
                let mut stripped = new_type.strip_prefix(&lines[0]).to_string();
                for line in &lines[1..] {
                    stripped.push('\n');
                    stripped.push_str(line);
                }
                plan.type_changes.push(PlannedTypeChange {
                    index,
                    block_id: block.id.clone(),
                    old_type: block.block_type(),
                    new_type,
                    content: stripped,
                    text: block.current_text.clone(),
                    payload: self.registry.payload_for(&content),
                });
                skip.extend(self.tree.descendants(index));
                continue;
            }
            if block.current_text != block.original_text {
                plan.updates.push(PlannedUpdate {
                    index,
                    block_id: block.id.clone(),
                    content: block.current_text.clone(),
                    payload: self.registry.serialize(block),
                });
            }
        }

        for orphan in orphans {
            let Some(anchor) = orphan.anchor.clone() else {
                plan.unmatched.push(orphan);
                continue;
            };
            let block_type = orphan.block_type();
            let content = self.registry.content_from_lines(block_type, &orphan.content);
            plan.creates.push(PlannedCreate {
                provisional_id: orphan.id,
                anchor,
                block_type,
                span: LineSpan::new(orphan.start_line, orphan.end_line),
                payload: self.registry.payload_for(&content),
                content: orphan.content,
            });
        }

        plan.needs_confirmation = match self.policy {
            ConfirmPolicy::Always => !plan.is_empty() || !plan.unmatched.is_empty(),
            ConfirmPolicy::OnAmbiguity => !plan.deletes.is_empty() || !plan.unmatched.is_empty(),
            ConfirmPolicy::Never => false,
        };

        debug!(
            "planned {} updates, {} creates, {} deletes, {} type changes, {} unmatched",
            plan.updates.len(),
            plan.creates.len(),
            plan.deletes.len(),
            plan.type_changes.len(),
            plan.unmatched.len()
        );
        plan
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{Block, BlockContent};
    use crate::richtext::Segment;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn synced(registry: &Registry, id: &str, content: BlockContent, line: usize) -> Block {
        let mut block = Block::new(BlockId::from(id), content, Value::Null);
        let text = registry.text_of(&block.content);
        block.mark_synced(text);
        block.span = Some(LineSpan::single(line));
        block
    }

    fn edit(registry: &Registry, block: &mut Block, text: &str) {
        let lines: Vec<String> = text.split('\n').map(String::from).collect();
        registry.update_from_lines(block, &lines);
    }

    fn orphan(anchor: Option<Anchor>, line: usize, text: &str) -> OrphanRange {
        OrphanRange {
            id: BlockId::provisional(),
            start_line: line,
            end_line: line,
            content: vec![text.to_string()],
            indent_level: 0,
            anchor,
        }
    }

    #[test]
    fn unchanged_tree_plans_nothing() {
        let registry = Registry::default();
        let mut tree = BlockTree::new();
        tree.push_root(synced(&registry, "a", BlockContent::paragraph("a"), 3));

        let plan = Planner::new(&tree, &registry, ConfirmPolicy::OnAmbiguity).plan(vec![]);

        assert!(plan.is_empty());
        assert!(!plan.needs_confirmation);
    }

    #[test]
    fn edited_text_is_an_update() {
        let registry = Registry::default();
        let mut tree = BlockTree::new();
        let a = tree.push_root(synced(&registry, "a", BlockContent::paragraph("Hello"), 3));
        edit(&registry, tree.get_mut(a).unwrap(), "Hello world");

        let plan = Planner::new(&tree, &registry, ConfirmPolicy::OnAmbiguity).plan(vec![]);

        assert_eq!(plan.updates.len(), 1);
        assert_eq!(plan.updates[0].content, "Hello world");
        assert_eq!(
            plan.updates[0].payload["paragraph"]["rich_text"][0]["text"]["content"],
            "Hello world"
        );
        assert!(plan.creates.is_empty() && plan.deletes.is_empty());
    }

    #[test]
    fn typed_bullet_is_a_type_change() {
        let registry = Registry::default();
        let mut tree = BlockTree::new();
        let a = tree.push_root(synced(&registry, "a", BlockContent::paragraph("item"), 3));
        edit(&registry, tree.get_mut(a).unwrap(), "- item");

        let plan = Planner::new(&tree, &registry, ConfirmPolicy::OnAmbiguity).plan(vec![]);

        assert!(plan.updates.is_empty());
        assert_eq!(plan.type_changes.len(), 1);
        let change = &plan.type_changes[0];
        assert_eq!(change.old_type, BlockType::Paragraph);
        assert_eq!(change.new_type, BlockType::BulletedListItem);
        assert_eq!(change.content, "item");
        assert_eq!(change.payload["type"], "bulleted_list_item");
        assert_eq!(plan.operation_count(), 2);
    }

    #[test]
    fn deleted_parent_skips_descendants() {
        let registry = Registry::default();
        let mut tree = BlockTree::new();
        let parent = tree.push_root(synced(
            &registry,
            "p",
            BlockContent::Toggle {
                text: vec![Segment::plain("p")],
            },
            3,
        ));
        let child = tree
            .add_child(parent, synced(&registry, "c", BlockContent::paragraph("c"), 4), None)
            .unwrap();
        tree.get_mut(parent).unwrap().span = None;
        tree.get_mut(child).unwrap().span = None;

        let plan = Planner::new(&tree, &registry, ConfirmPolicy::OnAmbiguity).plan(vec![]);

        assert_eq!(plan.deletes.len(), 1);
        assert_eq!(plan.deletes[0].block_id, BlockId::from("p"));
        assert!(plan.needs_confirmation);
    }

    #[test]
    fn orphans_become_creates_or_unmatched() {
        let registry = Registry::default();
        let mut tree = BlockTree::new();
        tree.push_root(synced(&registry, "a", BlockContent::paragraph("a"), 3));

        let anchored = orphan(Some(Anchor::After(BlockId::from("a"))), 4, "## New");
        let lost = orphan(None, 5, "where");
        let plan = Planner::new(&tree, &registry, ConfirmPolicy::OnAmbiguity)
            .plan(vec![anchored.clone(), lost]);

        assert_eq!(plan.creates.len(), 1);
        assert_eq!(plan.creates[0].provisional_id, anchored.id);
        assert_eq!(plan.creates[0].block_type, BlockType::Heading2);
        assert_eq!(plan.creates[0].payload["type"], "heading_2");
        assert_eq!(plan.unmatched.len(), 1);
        assert!(plan.needs_confirmation);
    }

    #[rstest]
    #[case(ConfirmPolicy::Always, true)]
    #[case(ConfirmPolicy::OnAmbiguity, false)]
    #[case(ConfirmPolicy::Never, false)]
    fn confirmation_policy_for_plain_update(#[case] policy: ConfirmPolicy, #[case] expected: bool) {
        let registry = Registry::default();
        let mut tree = BlockTree::new();
        let a = tree.push_root(synced(&registry, "a", BlockContent::paragraph("x"), 3));
        edit(&registry, tree.get_mut(a).unwrap(), "y");

        let plan = Planner::new(&tree, &registry, policy).plan(vec![]);
        assert_eq!(plan.needs_confirmation, expected);
    }

    #[rstest]
    #[case(ConfirmPolicy::Always, true)]
    #[case(ConfirmPolicy::OnAmbiguity, true)]
    #[case(ConfirmPolicy::Never, false)]
    fn confirmation_policy_for_unplaceable_lines(
        #[case] policy: ConfirmPolicy,
        #[case] expected: bool,
    ) {
        let registry = Registry::default();
        let mut tree = BlockTree::new();
        tree.push_root(synced(&registry, "a", BlockContent::paragraph("a"), 4));

        let plan = Planner::new(&tree, &registry, policy).plan(vec![orphan(None, 3, "first")]);

        assert!(plan.is_empty());
        assert_eq!(plan.unmatched.len(), 1);
        assert_eq!(plan.needs_confirmation, expected);
    }

    #[test]
    fn unsupported_blocks_are_never_updated() {
        let registry = Registry::default();
        let mut tree = BlockTree::new();
        let t = tree.push_root(synced(
            &registry,
            "t",
            BlockContent::Unsupported {
                tag: "table".into(),
            },
            3,
        ));
        edit(&registry, tree.get_mut(t).unwrap(), "[unsupported: table] edited");

        let plan = Planner::new(&tree, &registry, ConfirmPolicy::Never).plan(vec![]);
        assert!(plan.is_empty());
    }
}
