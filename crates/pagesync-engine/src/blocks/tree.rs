use std::collections::HashMap;

use super::{Block, BlockId, BlockIndex};

/// Arena of blocks with index-based parent/child links.
///
/// Removed blocks leave an empty slot so outstanding indices never alias a
/// different block.
#[derive(Debug, Default, Clone)]
pub struct BlockTree {
    slots: Vec<Option<Block>>,
    roots: Vec<BlockIndex>,
    by_id: HashMap<BlockId, BlockIndex>,
}

impl BlockTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: BlockIndex) -> Option<&Block> {
        self.slots.get(index.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, index: BlockIndex) -> Option<&mut Block> {
        self.slots.get_mut(index.0).and_then(Option::as_mut)
    }

    pub fn lookup(&self, id: &BlockId) -> Option<BlockIndex> {
        self.by_id.get(id).copied()
    }

    pub fn roots(&self) -> &[BlockIndex] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn alloc(&mut self, block: Block) -> BlockIndex {
        let index = BlockIndex(self.slots.len());
        self.by_id.insert(block.id.clone(), index);
        self.slots.push(Some(block));
        index
    }

    /// Appends a top-level block.
    pub fn push_root(&mut self, block: Block) -> BlockIndex {
        let at = self.roots.len();
        self.insert_root(at, block)
    }

    pub fn insert_root(&mut self, at: usize, mut block: Block) -> BlockIndex {
        block.parent = None;
        block.depth = 0;
        let index = self.alloc(block);
        self.roots.insert(at.min(self.roots.len()), index);
        index
    }

    /// Adds `block` under `parent` at `at` (appended when `None`).
    pub fn add_child(
        &mut self,
        parent: BlockIndex,
        block: Block,
        at: Option<usize>,
    ) -> Option<BlockIndex> {
        self.get(parent)?;
        let index = self.alloc(block);
        self.attach(parent, index, at);
        Some(index)
    }

    /// Links an existing, detached block under `parent`.
    fn attach(&mut self, parent: BlockIndex, child: BlockIndex, at: Option<usize>) {
        let depth = self.get(parent).map_or(0, |p| p.depth + 1);
        if let Some(p) = self.get_mut(parent) {
            let at = at.unwrap_or(p.children.len()).min(p.children.len());
            p.children.insert(at, child);
        }
        if let Some(c) = self.get_mut(child) {
            c.parent = Some(parent);
        }
        self.set_depth(child, depth);
    }

    /// Unlinks `child` from `parent`; the child becomes a detached root-less
    /// block until re-attached.
    pub fn remove_child(&mut self, parent: BlockIndex, child: BlockIndex) -> bool {
        let Some(p) = self.get_mut(parent) else {
            return false;
        };
        let Some(pos) = p.children.iter().position(|&c| c == child) else {
            return false;
        };
        p.children.remove(pos);
        if let Some(c) = self.get_mut(child) {
            c.parent = None;
        }
        self.set_depth(child, 0);
        true
    }

    /// Moves `child` under `new_parent` (or to the top level).
    pub fn move_to(&mut self, child: BlockIndex, new_parent: Option<BlockIndex>, at: Option<usize>) {
        self.detach(child);
        match new_parent {
            Some(parent) => self.attach(parent, child, at),
            None => {
                let at = at.unwrap_or(self.roots.len()).min(self.roots.len());
                self.roots.insert(at, child);
                self.set_depth(child, 0);
            }
        }
    }

    fn detach(&mut self, index: BlockIndex) {
        match self.get(index).and_then(|b| b.parent) {
            Some(parent) => {
                self.remove_child(parent, index);
            }
            None => self.roots.retain(|&r| r != index),
        }
    }

    fn set_depth(&mut self, index: BlockIndex, depth: usize) {
        let mut stack = vec![(index, depth)];
        while let Some((i, d)) = stack.pop() {
            if let Some(b) = self.get_mut(i) {
                b.depth = d;
                stack.extend(b.children.iter().map(|&c| (c, d + 1)));
            }
        }
    }

    /// Inserts `block` as the next sibling of `sibling`.
    pub fn insert_after(&mut self, sibling: BlockIndex, block: Block) -> Option<BlockIndex> {
        let parent = self.get(sibling)?.parent;
        match parent {
            Some(p) => {
                let at = self.position_in(p, sibling).map(|i| i + 1);
                self.add_child(p, block, at)
            }
            None => {
                let at = self.roots.iter().position(|&r| r == sibling)? + 1;
                Some(self.insert_root(at, block))
            }
        }
    }

    fn position_in(&self, parent: BlockIndex, child: BlockIndex) -> Option<usize> {
        self.get(parent)?.children.iter().position(|&c| c == child)
    }

    /// Removes a block and all of its descendants. Returns the removed
    /// indices, the block itself first.
    pub fn remove_subtree(&mut self, index: BlockIndex) -> Vec<BlockIndex> {
        if self.get(index).is_none() {
            return Vec::new();
        }
        self.detach(index);
        let removed: Vec<BlockIndex> = std::iter::once(index)
            .chain(self.descendants(index))
            .collect();
        for &i in &removed {
            if let Some(block) = self.slots.get_mut(i.0).and_then(Option::take) {
                self.by_id.remove(&block.id);
            }
        }
        removed
    }

    /// Drops every descendant of `index`, keeping the block itself.
    pub fn clear_children(&mut self, index: BlockIndex) -> Vec<BlockIndex> {
        let children = self
            .get(index)
            .map(|b| b.children.clone())
            .unwrap_or_default();
        children
            .into_iter()
            .flat_map(|c| self.remove_subtree(c))
            .collect()
    }

    /// Re-keys a block after the remote assigned it a new id.
    pub fn rename(&mut self, index: BlockIndex, id: BlockId) {
        if let Some(block) = self.slots.get_mut(index.0).and_then(Option::as_mut) {
            self.by_id.remove(&block.id);
            block.id = id.clone();
            self.by_id.insert(id, index);
        }
    }

    pub fn parent_id(&self, index: BlockIndex) -> Option<&BlockId> {
        let parent = self.get(index)?.parent?;
        self.get(parent).map(|p| &p.id)
    }

    /// Siblings of `index` (including itself), in order.
    pub fn siblings(&self, index: BlockIndex) -> &[BlockIndex] {
        match self.get(index).and_then(|b| b.parent) {
            Some(p) => self
                .get(p)
                .map(|b| b.children.as_slice())
                .unwrap_or_default(),
            None => &self.roots,
        }
    }

    pub fn previous_sibling(&self, index: BlockIndex) -> Option<BlockIndex> {
        let siblings = self.siblings(index);
        let pos = siblings.iter().position(|&s| s == index)?;
        pos.checked_sub(1).map(|p| siblings[p])
    }

    /// Preorder descendants of `index`, excluding itself.
    pub fn descendants(&self, index: BlockIndex) -> Vec<BlockIndex> {
        let mut out = Vec::new();
        let mut stack: Vec<BlockIndex> = self
            .get(index)
            .map(|b| b.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(i) = stack.pop() {
            out.push(i);
            if let Some(b) = self.get(i) {
                stack.extend(b.children.iter().rev().copied());
            }
        }
        out
    }

    /// Every block in document order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockIndex, &Block)> + '_ {
        let mut order = Vec::with_capacity(self.len());
        for &root in &self.roots {
            order.push(root);
            order.extend(self.descendants(root));
        }
        order
            .into_iter()
            .filter_map(move |i| self.get(i).map(|b| (i, b)))
    }

    pub fn indices(&self) -> Vec<BlockIndex> {
        self.iter().map(|(i, _)| i).collect()
    }
}
