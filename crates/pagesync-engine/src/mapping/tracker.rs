use std::collections::HashMap;

use log::{debug, warn};

use crate::blocks::{Block, BlockIndex, BlockTree, LineSpan, Registry};
use crate::buffer::{EditorBuffer, Gravity, MarkerId, MarkerRange, Position};

/// Outcome of [`PositionTracker::refresh`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub intact: Vec<BlockIndex>,
    pub moved: Vec<BlockIndex>,
    pub deleted: Vec<BlockIndex>,
}

/// Binds blocks to buffer line spans through editor markers.
#[derive(Debug)]
pub struct PositionTracker {
    markers: HashMap<BlockIndex, MarkerId>,
    indent_size: usize,
}

impl PositionTracker {
    pub fn new(indent_size: usize) -> Self {
        Self {
            markers: HashMap::new(),
            indent_size,
        }
    }

    pub fn indent_size(&self) -> usize {
        self.indent_size
    }

    pub fn indent(&self, depth: usize) -> String {
        " ".repeat(depth * self.indent_size)
    }

    pub fn marker(&self, index: BlockIndex) -> Option<MarkerId> {
        self.markers.get(&index).copied()
    }

    /// Buffer lines for every block in document order.
    pub fn render(&self, tree: &BlockTree, registry: &Registry) -> Vec<String> {
        tree.iter()
            .flat_map(|(_, block)| registry.format(block, &self.indent(block.depth())))
            .collect()
    }

    /// Assigns spans and markers to every block, assuming the buffer holds
    /// [`render`](Self::render) output starting at `first_row`.
    pub fn bind(
        &mut self,
        tree: &mut BlockTree,
        registry: &Registry,
        buffer: &mut dyn EditorBuffer,
        first_row: usize,
    ) {
        self.clear(buffer);
        let mut row = first_row;
        for index in tree.indices() {
            let Some(block) = tree.get_mut(index) else {
                continue;
            };
            let lines = registry.format(block, &" ".repeat(block.depth() * self.indent_size));
            let last = lines.len().max(1) - 1;
            let end_col = lines.last().map_or(0, String::len);
            let marker = buffer.create_marker(
                Position::new(row, 0),
                Position::new(row + last, end_col),
                Gravity::EXCLUSIVE,
            );
            block.span = Some(LineSpan::new(row + 1, row + last + 1));
            self.markers.insert(index, marker);
            row += last + 1;
        }
        debug!("bound {} blocks from row {first_row}", self.markers.len());
    }

    /// Recomputes spans from marker positions and classifies every block.
    ///
    /// Zero-width markers that survive are re-anchored over their line so the
    /// text typed into an empty block is owned by it from now on.
    pub fn refresh(&mut self, tree: &mut BlockTree, buffer: &mut dyn EditorBuffer) -> RefreshReport {
        let line_count = buffer.line_count();
        let positions: Vec<(BlockIndex, Option<MarkerRange>)> = tree
            .indices()
            .into_iter()
            .map(|index| {
                let range = self.marker(index).and_then(|m| buffer.get_marker(m));
                (index, range)
            })
            .collect();

        let covered: Vec<MarkerRange> = positions
            .iter()
            .filter_map(|(_, r)| r.filter(|r| !r.is_zero_width()))
            .collect();

        let mut report = RefreshReport::default();
        for (index, range) in positions {
            let Some(block) = tree.get(index) else {
                continue;
            };
            let present = match range {
                None => {
                    warn!("block {} has no marker, treating it as deleted", block.id);
                    false
                }
                Some(r) => is_present(block, &r, &covered, line_count, buffer),
            };

            if !present {
                if let Some(block) = tree.get_mut(index) {
                    block.span = None;
                }
                self.forget(index, buffer);
                report.deleted.push(index);
                continue;
            }

            let Some(r) = range else { continue };
            if r.is_zero_width() {
                self.forget(index, buffer);
                let end_col = buffer.get_line(r.start.row).map_or(0, |l| l.len());
                let marker = buffer.create_marker(
                    Position::new(r.start.row, 0),
                    Position::new(r.start.row, end_col),
                    Gravity::EXCLUSIVE,
                );
                self.markers.insert(index, marker);
            }

            let span = LineSpan::new(r.start.row + 1, r.end.row.max(r.start.row) + 1);
            if let Some(block) = tree.get_mut(index) {
                if block.span == Some(span) {
                    report.intact.push(index);
                } else {
                    block.span = Some(span);
                    report.moved.push(index);
                }
            }
        }

        if !report.deleted.is_empty() {
            debug!("refresh: {} blocks left the buffer", report.deleted.len());
        }
        report
    }

    /// Drops all markers and recreates one per block from its span.
    pub fn rebuild(&mut self, tree: &BlockTree, buffer: &mut dyn EditorBuffer) {
        self.clear(buffer);
        for (index, block) in tree.iter() {
            if let Some(span) = block.span {
                self.track(index, span, buffer);
            }
        }
    }

    /// Adds a marker covering `span` for one block.
    pub fn track(&mut self, index: BlockIndex, span: LineSpan, buffer: &mut dyn EditorBuffer) {
        if let Some(old) = self.markers.remove(&index) {
            buffer.delete_marker(old);
        }
        let end_col = buffer.get_line(span.end - 1).map_or(0, |l| l.len());
        let marker = buffer.create_marker(
            Position::new(span.start - 1, 0),
            Position::new(span.end - 1, end_col),
            Gravity::EXCLUSIVE,
        );
        self.markers.insert(index, marker);
    }

    pub fn forget(&mut self, index: BlockIndex, buffer: &mut dyn EditorBuffer) {
        if let Some(marker) = self.markers.remove(&index) {
            buffer.delete_marker(marker);
        }
    }

    fn clear(&mut self, buffer: &mut dyn EditorBuffer) {
        buffer.clear_markers();
        self.markers.clear();
    }

    /// Current lines of a block with its indentation removed.
    pub fn lines_of(&self, block: &Block, buffer: &dyn EditorBuffer) -> Vec<String> {
        let Some(span) = block.span else {
            return Vec::new();
        };
        let width = block.depth() * self.indent_size;
        buffer
            .get_lines(span.start - 1, span.end)
            .into_iter()
            .map(|line| strip_indent(&line, width).to_string())
            .collect()
    }
}

fn is_present(
    block: &Block,
    r: &MarkerRange,
    covered: &[MarkerRange],
    line_count: usize,
    buffer: &dyn EditorBuffer,
) -> bool {
    if r.start.row >= line_count {
        return false;
    }
    if r.is_zero_width() {
        // Collapsed into a neighbour: the block's lines were removed.
        if covered.iter().any(|o| o.start <= r.start && r.start <= o.end) {
            return false;
        }
        // Its whole text was replaced or it was empty to begin with. Only a
        // line emptied of previous text counts as removal.
        let line_empty = buffer
            .get_line(r.start.row)
            .is_none_or(|line| line.trim().is_empty());
        if line_empty && !block.current_text.is_empty() {
            return false;
        }
    }
    match block.content.fixed_shape() {
        Some(shape) => buffer
            .get_line(r.start.row)
            .is_some_and(|line| line.trim() == shape),
        None => true,
    }
}

/// Removes up to `width` leading spaces.
pub fn strip_indent(line: &str, width: usize) -> &str {
    let spaces = line.bytes().take(width).take_while(|&b| b == b' ').count();
    &line[spaces..]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::{BlockContent, BlockId};
    use crate::buffer::RopeBuffer;
    use pretty_assertions::assert_eq;
    use serde_json::Value;

    fn block(id: &str, content: BlockContent, registry: &Registry) -> crate::blocks::Block {
        let mut b = crate::blocks::Block::new(BlockId::from(id), content, Value::Null);
        let text = registry.text_of(&b.content);
        b.mark_synced(text);
        b
    }

    fn setup(contents: Vec<BlockContent>) -> (BlockTree, Registry, PositionTracker, RopeBuffer) {
        let registry = Registry::default();
        let mut tree = BlockTree::new();
        for (i, c) in contents.into_iter().enumerate() {
            tree.push_root(block(&format!("b{i}"), c, &registry));
        }
        let mut tracker = PositionTracker::new(2);
        let mut lines = vec!["# Page".to_string(), String::new()];
        lines.extend(tracker.render(&tree, &registry));
        let mut buffer = RopeBuffer::from_lines(&lines);
        tracker.bind(&mut tree, &registry, &mut buffer, 2);
        (tree, registry, tracker, buffer)
    }

    fn span(tree: &BlockTree, id: &str) -> Option<LineSpan> {
        tree.get(tree.lookup(&BlockId::from(id)).unwrap()).unwrap().span
    }

    #[test]
    fn bind_assigns_consecutive_spans() {
        let (tree, ..) = setup(vec![
            BlockContent::paragraph("one"),
            BlockContent::Code {
                code: "a\nb".into(),
                language: String::new(),
            },
            BlockContent::paragraph("two"),
        ]);

        assert_eq!(span(&tree, "b0"), Some(LineSpan::single(3)));
        assert_eq!(span(&tree, "b1"), Some(LineSpan::new(4, 7)));
        assert_eq!(span(&tree, "b2"), Some(LineSpan::single(8)));
    }

    #[test]
    fn untouched_buffer_is_intact() {
        let (mut tree, _, mut tracker, mut buffer) =
            setup(vec![BlockContent::paragraph("a"), BlockContent::paragraph("b")]);

        let report = tracker.refresh(&mut tree, &mut buffer);

        assert_eq!(report.intact.len(), 2);
        assert!(report.moved.is_empty());
        assert!(report.deleted.is_empty());
    }

    #[test]
    fn inserted_line_moves_later_blocks() {
        let (mut tree, _, mut tracker, mut buffer) =
            setup(vec![BlockContent::paragraph("a"), BlockContent::paragraph("b")]);

        buffer.insert(Position::new(2, 1), "\nnew");
        let report = tracker.refresh(&mut tree, &mut buffer);

        assert_eq!(report.moved.len(), 1);
        assert_eq!(span(&tree, "b0"), Some(LineSpan::single(3)));
        assert_eq!(span(&tree, "b1"), Some(LineSpan::single(5)));
    }

    #[test]
    fn deleted_line_clears_span() {
        let (mut tree, _, mut tracker, mut buffer) = setup(vec![
            BlockContent::paragraph("a"),
            BlockContent::paragraph("b"),
            BlockContent::paragraph("c"),
        ]);

        buffer.set_lines(3, 4, &[]);
        let report = tracker.refresh(&mut tree, &mut buffer);

        assert_eq!(report.deleted.len(), 1);
        assert_eq!(span(&tree, "b1"), None);
        assert_eq!(span(&tree, "b2"), Some(LineSpan::single(4)));
    }

    #[test]
    fn deleting_last_line_clears_span() {
        let (mut tree, _, mut tracker, mut buffer) =
            setup(vec![BlockContent::paragraph("a"), BlockContent::paragraph("b")]);

        buffer.set_lines(3, 4, &[]);
        tracker.refresh(&mut tree, &mut buffer);

        assert_eq!(span(&tree, "b1"), None);
        assert_eq!(span(&tree, "b0"), Some(LineSpan::single(3)));
    }

    #[test]
    fn empty_block_survives_and_owns_typed_text() {
        let (mut tree, registry, mut tracker, mut buffer) =
            setup(vec![BlockContent::paragraph("a"), BlockContent::paragraph("")]);

        buffer.insert(Position::new(3, 0), "typed");
        tracker.refresh(&mut tree, &mut buffer);
        assert_eq!(span(&tree, "b1"), Some(LineSpan::single(4)));

        let index = tree.lookup(&BlockId::from("b1")).unwrap();
        let lines = tracker.lines_of(tree.get(index).unwrap(), &buffer);
        registry.update_from_lines(tree.get_mut(index).unwrap(), &lines);

        buffer.insert(Position::new(3, 5), "!");
        tracker.refresh(&mut tree, &mut buffer);
        let block = tree.get(index).unwrap();
        assert_eq!(block.span, Some(LineSpan::single(4)));
        assert_eq!(tracker.lines_of(block, &buffer), vec!["typed!"]);
    }

    #[test]
    fn replacing_whole_text_keeps_block() {
        let (mut tree, _, mut tracker, mut buffer) =
            setup(vec![BlockContent::paragraph("Hello"), BlockContent::paragraph("World")]);

        buffer.replace(Position::new(2, 0)..Position::new(2, 5), "Bye");
        let report = tracker.refresh(&mut tree, &mut buffer);

        assert!(report.deleted.is_empty());
        assert_eq!(span(&tree, "b0"), Some(LineSpan::single(3)));
        let index = tree.lookup(&BlockId::from("b0")).unwrap();
        assert_eq!(tracker.lines_of(tree.get(index).unwrap(), &buffer), vec!["Bye"]);
    }

    #[test]
    fn clearing_then_retyping_keeps_block() {
        let (mut tree, _, mut tracker, mut buffer) =
            setup(vec![BlockContent::paragraph("Hello"), BlockContent::paragraph("World")]);

        buffer.replace(Position::new(2, 0)..Position::new(2, 5), "");
        buffer.insert(Position::new(2, 0), "Bye");
        let report = tracker.refresh(&mut tree, &mut buffer);

        assert!(report.deleted.is_empty());
        assert_eq!(span(&tree, "b0"), Some(LineSpan::single(3)));

        // The re-anchored marker owns the line from now on.
        buffer.insert(Position::new(2, 3), "!");
        tracker.refresh(&mut tree, &mut buffer);
        let index = tree.lookup(&BlockId::from("b0")).unwrap();
        assert_eq!(tracker.lines_of(tree.get(index).unwrap(), &buffer), vec!["Bye!"]);
        assert_eq!(span(&tree, "b1"), Some(LineSpan::single(4)));
    }

    #[test]
    fn emptied_line_is_deleted() {
        let (mut tree, _, mut tracker, mut buffer) =
            setup(vec![BlockContent::paragraph("Hello"), BlockContent::paragraph("World")]);

        buffer.replace(Position::new(2, 0)..Position::new(2, 5), "");
        let report = tracker.refresh(&mut tree, &mut buffer);

        assert_eq!(report.deleted.len(), 1);
        assert_eq!(span(&tree, "b0"), None);
        assert_eq!(span(&tree, "b1"), Some(LineSpan::single(4)));
    }

    #[test]
    fn divider_overwritten_is_deleted() {
        let (mut tree, _, mut tracker, mut buffer) = setup(vec![
            BlockContent::paragraph("Before"),
            BlockContent::Divider,
            BlockContent::paragraph("After"),
        ]);

        buffer.replace(Position::new(3, 1)..Position::new(3, 2), "x");
        let report = tracker.refresh(&mut tree, &mut buffer);

        assert_eq!(report.deleted.len(), 1);
        assert_eq!(span(&tree, "b1"), None);
    }

    #[test]
    fn rebuild_restores_markers_from_spans() {
        let (mut tree, _, mut tracker, mut buffer) =
            setup(vec![BlockContent::paragraph("a"), BlockContent::paragraph("b")]);

        tracker.rebuild(&tree, &mut buffer);
        let report = tracker.refresh(&mut tree, &mut buffer);

        assert_eq!(report.intact.len(), 2);
    }

    #[test]
    fn strip_indent_only_removes_spaces() {
        assert_eq!(strip_indent("    x", 2), "  x");
        assert_eq!(strip_indent(" x", 2), "x");
        assert_eq!(strip_indent("\tx", 2), "\tx");
    }
}
