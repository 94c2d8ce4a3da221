//! # Editor Buffer
//!
//! The text surface the user edits, with movable markers that follow edits.
//!
//! Rows and columns are 0-indexed; columns are byte offsets within a line.
//! Line ranges passed to [`EditorBuffer::get_lines`] and
//! [`EditorBuffer::set_lines`] are end-exclusive.

pub mod rope;

pub use rope::RopeBuffer;

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// Which side of an insertion exactly at a marker boundary the boundary
/// ends up on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Bias {
    /// Stays before the inserted text.
    Left,
    /// Moves after the inserted text.
    Right,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Gravity {
    pub start: Bias,
    pub end: Bias,
}

impl Gravity {
    /// Text typed exactly at either boundary stays outside the marker.
    pub const EXCLUSIVE: Gravity = Gravity {
        start: Bias::Right,
        end: Bias::Left,
    };
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerId(pub u64);

/// Current extent of a marker.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MarkerRange {
    pub start: Position,
    pub end: Position,
}

impl MarkerRange {
    pub fn is_zero_width(&self) -> bool {
        self.start == self.end
    }
}

pub trait EditorBuffer {
    /// False once the buffer has been closed; engine work against it stops.
    fn is_valid(&self) -> bool;

    fn line_count(&self) -> usize;

    fn get_lines(&self, start: usize, end: usize) -> Vec<String>;

    fn get_line(&self, row: usize) -> Option<String> {
        self.get_lines(row, row + 1).into_iter().next()
    }

    /// Replaces rows `start..end` with `lines`. `start == end` inserts;
    /// empty `lines` deletes.
    fn set_lines(&mut self, start: usize, end: usize, lines: &[String]);

    fn create_marker(&mut self, start: Position, end: Position, gravity: Gravity) -> MarkerId;

    fn get_marker(&self, id: MarkerId) -> Option<MarkerRange>;

    fn delete_marker(&mut self, id: MarkerId) -> bool;

    fn clear_markers(&mut self);
}
