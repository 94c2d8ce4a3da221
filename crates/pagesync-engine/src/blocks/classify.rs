//! Prefix classification of a single buffer line.

use super::kinds::{BlockType, Bullet, CodeFence, Divider, Heading, Numbered, Quote, ToDo, Toggle};

/// Result of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineClass<'a> {
    pub block_type: BlockType,
    /// Only meaningful for to-do lines.
    pub checked: bool,
    /// The line with the type's markup removed.
    pub rest: &'a str,
}

impl<'a> LineClass<'a> {
    fn new(block_type: BlockType, rest: &'a str) -> Self {
        Self {
            block_type,
            checked: false,
            rest,
        }
    }
}

/// Classifies an unindented line by its leading markup.
///
/// Order matters: a to-do line also starts with a bullet, and `---` would
/// otherwise read as a bullet-less paragraph.
pub fn classify(line: &str) -> LineClass<'_> {
    if let Some(language) = CodeFence::opens(line) {
        return LineClass::new(BlockType::Code, language);
    }
    if Divider::matches(line) {
        return LineClass::new(BlockType::Divider, "");
    }
    if let Some((level, rest)) = Heading::strip(line) {
        if let Some(ty) = BlockType::heading(level) {
            return LineClass::new(ty, rest);
        }
    }
    if let Some((checked, rest)) = ToDo::strip(line) {
        return LineClass {
            block_type: BlockType::ToDo,
            checked,
            rest,
        };
    }
    if let Some(rest) = Bullet::strip(line) {
        return LineClass::new(BlockType::BulletedListItem, rest);
    }
    if let Some(rest) = Numbered::strip(line) {
        return LineClass::new(BlockType::NumberedListItem, rest);
    }
    if let Some(rest) = Toggle::strip(line) {
        return LineClass::new(BlockType::Toggle, rest);
    }
    if let Some(rest) = Quote::strip(line) {
        return LineClass::new(BlockType::Quote, rest);
    }
    LineClass::new(BlockType::Paragraph, line)
}

/// Shorthand for `classify(line).block_type`.
pub fn detect_type(line: &str) -> BlockType {
    classify(line).block_type
}
