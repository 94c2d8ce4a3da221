use log::debug;

use crate::blocks::classify::detect_type;
use crate::blocks::kinds::CodeFence;
use crate::blocks::{BlockId, BlockIndex, BlockTree, BlockType};
use crate::buffer::EditorBuffer;

/// Where a new block goes relative to existing content.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Anchor {
    /// Next sibling of the given block.
    After(BlockId),
    /// Last child of the given block.
    Parent(BlockId),
}

impl Anchor {
    pub fn target(&self) -> &BlockId {
        match self {
            Anchor::After(id) | Anchor::Parent(id) => id,
        }
    }
}

/// Buffer lines owned by no block: a candidate new block.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrphanRange {
    /// Provisional id assigned at detection.
    pub id: BlockId,
    /// 1-indexed, inclusive.
    pub start_line: usize,
    pub end_line: usize,
    /// Lines with indentation stripped.
    pub content: Vec<String>,
    pub indent_level: usize,
    /// `None` when no placement could be inferred.
    pub anchor: Option<Anchor>,
}

impl OrphanRange {
    pub fn block_type(&self) -> BlockType {
        self.content
            .first()
            .map_or(BlockType::Paragraph, |line| detect_type(line))
    }
}

/// A block or earlier orphan that later orphans may attach to.
struct Entry {
    id: BlockId,
    depth: usize,
    end_line: usize,
    supports_children: bool,
}

/// Finds uncovered buffer lines and turns them into anchored ranges.
pub struct OrphanDetector<'a> {
    tree: &'a BlockTree,
    indent_size: usize,
}

impl<'a> OrphanDetector<'a> {
    pub fn new(tree: &'a BlockTree, indent_size: usize) -> Self {
        Self {
            tree,
            indent_size: indent_size.max(1),
        }
    }

    /// Scans rows from `first_row` (0-indexed) to the end of the buffer.
    pub fn detect(&self, buffer: &dyn EditorBuffer, first_row: usize) -> Vec<OrphanRange> {
        let lines = buffer.get_lines(0, buffer.line_count());
        let owner = self.owners(lines.len());

        let mut ranges: Vec<OrphanRange> = Vec::new();
        let mut entries: Vec<Entry> = Vec::new();
        let mut last_top: Option<BlockId> = None;
        // Index into `ranges` of the level-0 run still accepting lines.
        let mut open: Option<usize> = None;

        for (row, line) in lines.iter().enumerate().skip(first_row) {
            let line_no = row + 1;

            if let Some(index) = owner[row] {
                open = None;
                if let Some(block) = self.tree.get(index) {
                    if block.span.is_some_and(|s| s.start == line_no) {
                        entries.push(Entry {
                            id: block.id.clone(),
                            depth: block.depth(),
                            end_line: block.span.map_or(line_no, |s| s.end),
                            supports_children: block.supports_children(),
                        });
                        if block.depth() == 0 {
                            last_top = Some(block.id.clone());
                        }
                    }
                }
                continue;
            }

            if line.trim().is_empty() {
                if !open.is_some_and(|i| in_open_fence(&ranges[i])) {
                    open = None;
                    continue;
                }
            }

            let leading = line.bytes().take_while(|&b| b == b' ').count();
            let level = leading / self.indent_size;

            if level == 0 || open.is_some_and(|i| in_open_fence(&ranges[i])) {
                if let Some(i) = open {
                    let range = &mut ranges[i];
                    range.end_line = line_no;
                    range.content.push(line.clone());
                    if let Some(entry) = entries.last_mut() {
                        entry.end_line = line_no;
                    }
                    if is_fence(range) && !in_open_fence(range) {
                        open = None;
                    }
                    continue;
                }

                let id = BlockId::provisional();
                let content = vec![line.clone()];
                let block_type = detect_type(line);
                ranges.push(OrphanRange {
                    id: id.clone(),
                    start_line: line_no,
                    end_line: line_no,
                    content,
                    indent_level: 0,
                    anchor: last_top.clone().map(Anchor::After),
                });
                entries.push(Entry {
                    id: id.clone(),
                    depth: 0,
                    end_line: line_no,
                    supports_children: block_type.supports_children(),
                });
                last_top = Some(id);
                open = Some(ranges.len() - 1);
                continue;
            }

            open = None;
            let content = line.trim_start().to_string();
            let block_type = detect_type(&content);
            let id = BlockId::provisional();
            let anchor = match parent_of(&entries, level, line_no) {
                Some(parent) => Some(Anchor::Parent(parent)),
                // Placed as a top-level sibling, so later siblings follow it.
                None => last_top.replace(id.clone()).map(Anchor::After),
            };
            ranges.push(OrphanRange {
                id: id.clone(),
                start_line: line_no,
                end_line: line_no,
                content: vec![content],
                indent_level: level,
                anchor,
            });
            entries.push(Entry {
                id,
                depth: level,
                end_line: line_no,
                supports_children: block_type.supports_children(),
            });
        }

        if !ranges.is_empty() {
            debug!("found {} orphan ranges", ranges.len());
        }
        ranges
    }

    /// Owning block per row, from current spans.
    fn owners(&self, rows: usize) -> Vec<Option<BlockIndex>> {
        let mut owner = vec![None; rows];
        for (index, block) in self.tree.iter() {
            if let Some(span) = block.span {
                for row in span.rows() {
                    if let Some(slot) = owner.get_mut(row) {
                        *slot = Some(index);
                    }
                }
            }
        }
        owner
    }
}

fn is_fence(range: &OrphanRange) -> bool {
    range
        .content
        .first()
        .is_some_and(|first| CodeFence::opens(first).is_some())
}

fn in_open_fence(range: &OrphanRange) -> bool {
    if !is_fence(range) {
        return false;
    }
    !(range.content.len() > 1 && range.content.last().is_some_and(|l| CodeFence::closes(l)))
}

/// Nearest earlier entry that can own an orphan at `level`.
///
/// A candidate is skipped when a sibling of it that cannot hold children
/// sits between it and the orphan: the orphan's indentation then belongs to
/// that sibling's position, not to the candidate.
fn parent_of(entries: &[Entry], level: usize, line_no: usize) -> Option<BlockId> {
    for (pos, candidate) in entries.iter().enumerate().rev() {
        if candidate.end_line >= line_no
            || !candidate.supports_children
            || candidate.depth >= level
        {
            continue;
        }
        let blocked = entries[pos + 1..]
            .iter()
            .any(|e| e.depth == candidate.depth && !e.supports_children);
        if !blocked {
            return Some(candidate.id.clone());
        }
    }
    None
}
