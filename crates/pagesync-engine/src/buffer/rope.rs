use std::collections::HashMap;
use std::ops::Range;

use xi_rope::Rope;
use xi_rope::delta::{Builder, Transformer};

use super::{Bias, EditorBuffer, Gravity, MarkerId, MarkerRange, Position};

#[derive(Clone, Debug)]
struct Marker {
    range: Range<usize>,
    gravity: Gravity,
}

/// [`EditorBuffer`] backed by an xi-rope.
///
/// The rope holds the text without a trailing newline, so a buffer always has
/// at least one (possibly empty) line. Markers are byte ranges pushed through
/// every edit delta.
#[derive(Clone, Debug)]
pub struct RopeBuffer {
    text: Rope,
    markers: HashMap<MarkerId, Marker>,
    next_marker: u64,
    valid: bool,
}

impl Default for RopeBuffer {
    fn default() -> Self {
        Self::from_text("")
    }
}

impl RopeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            text: Rope::from(text),
            markers: HashMap::new(),
            next_marker: 0,
            valid: true,
        }
    }

    pub fn from_lines(lines: &[impl AsRef<str>]) -> Self {
        let joined: Vec<&str> = lines.iter().map(AsRef::as_ref).collect();
        Self::from_text(&joined.join("\n"))
    }

    pub fn text(&self) -> String {
        self.text.slice_to_cow(..).into_owned()
    }

    pub fn lines(&self) -> Vec<String> {
        self.get_lines(0, self.line_count())
    }

    /// Marks the buffer closed.
    pub fn invalidate(&mut self) {
        self.valid = false;
    }

    /// Inserts `text` at `at`, like typing.
    pub fn insert(&mut self, at: Position, text: &str) {
        let offset = self.offset(at);
        self.edit(offset..offset, text);
    }

    /// Replaces the text between two positions.
    pub fn replace(&mut self, range: Range<Position>, text: &str) {
        let start = self.offset(range.start);
        let end = self.offset(range.end).max(start);
        self.edit(start..end, text);
    }

    fn line_start(&self, row: usize) -> usize {
        self.text.offset_of_line(row.min(self.line_count()))
    }

    /// Offset just before the newline ending `row`, or the end of text.
    fn line_end(&self, row: usize) -> usize {
        if row + 1 < self.line_count() {
            self.text.offset_of_line(row + 1) - 1
        } else {
            self.text.len()
        }
    }

    fn offset(&self, pos: Position) -> usize {
        if pos.row >= self.line_count() {
            return self.text.len();
        }
        let start = self.line_start(pos.row);
        (start + pos.col).min(self.line_end(pos.row))
    }

    fn position(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let row = self.text.line_of_offset(offset);
        Position::new(row, offset - self.text.offset_of_line(row))
    }

    fn edit(&mut self, range: Range<usize>, text: &str) {
        if range.is_empty() && text.is_empty() {
            return;
        }
        let mut builder = Builder::new(self.text.len());
        builder.replace(range, Rope::from(text));
        let delta = builder.build();

        let mut transformer = Transformer::new(&delta);
        for marker in self.markers.values_mut() {
            let start = transformer.transform(marker.range.start, marker.gravity.start == Bias::Right);
            let end = transformer.transform(marker.range.end, marker.gravity.end == Bias::Right);
            // Typing into a zero-width marker pushes start past end.
            marker.range = if start <= end { start..end } else { end..end };
        }

        self.text = delta.apply(&self.text);
    }
}

impl EditorBuffer for RopeBuffer {
    fn is_valid(&self) -> bool {
        self.valid
    }

    fn line_count(&self) -> usize {
        self.text.line_of_offset(self.text.len()) + 1
    }

    fn get_lines(&self, start: usize, end: usize) -> Vec<String> {
        let end = end.min(self.line_count());
        (start..end)
            .map(|row| {
                self.text
                    .slice_to_cow(self.line_start(row)..self.line_end(row))
                    .into_owned()
            })
            .collect()
    }

    fn set_lines(&mut self, start: usize, end: usize, lines: &[String]) {
        let count = self.line_count();
        let start = start.min(count);
        let end = end.clamp(start, count);
        let joined = lines.join("\n");

        if start == end {
            if lines.is_empty() {
                return;
            }
            if start < count {
                let at = self.line_start(start);
                self.edit(at..at, &format!("{joined}\n"));
            } else {
                let at = self.text.len();
                self.edit(at..at, &format!("\n{joined}"));
            }
        } else if !lines.is_empty() {
            let range = self.line_start(start)..self.line_end(end - 1);
            self.edit(range, &joined);
        } else if end < count {
            let range = self.line_start(start)..self.line_start(end);
            self.edit(range, "");
        } else if start > 0 {
            // Removing trailing rows takes the newline before them.
            let range = (self.line_start(start) - 1)..self.text.len();
            self.edit(range, "");
        } else {
            let len = self.text.len();
            self.edit(0..len, "");
        }
    }

    fn create_marker(&mut self, start: Position, end: Position, gravity: Gravity) -> MarkerId {
        let id = MarkerId(self.next_marker);
        self.next_marker += 1;
        let start = self.offset(start);
        let end = self.offset(end).max(start);
        self.markers.insert(
            id,
            Marker {
                range: start..end,
                gravity,
            },
        );
        id
    }

    fn get_marker(&self, id: MarkerId) -> Option<MarkerRange> {
        self.markers.get(&id).map(|m| MarkerRange {
            start: self.position(m.range.start),
            end: self.position(m.range.end),
        })
    }

    fn delete_marker(&mut self, id: MarkerId) -> bool {
        self.markers.remove(&id).is_some()
    }

    fn clear_markers(&mut self) {
        self.markers.clear();
    }
}
