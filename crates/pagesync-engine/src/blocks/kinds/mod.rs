//! Block variants and the markup each variant owns.
//!
//! Each kind keeps its delimiters next to the code that reads and writes
//! them, so classification, formatting and prefix stripping cannot drift
//! apart.

mod code_fence;
mod container;
mod heading;
mod list;

pub use code_fence::CodeFence;
pub use container::{Divider, Quote, Toggle};
pub use heading::Heading;
pub use list::{Bullet, Numbered, ToDo};

use serde_json::{Map, Value, json};

use crate::richtext::{RichText, Segment, plain_text, segments_from_json, segments_to_json};

/// Remote type tag of a block.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum BlockType {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletedListItem,
    NumberedListItem,
    ToDo,
    Toggle,
    Quote,
    Code,
    Divider,
    Unsupported,
}

impl BlockType {
    /// Every type with a handler, in registration order.
    pub const SUPPORTED: [BlockType; 11] = [
        BlockType::Paragraph,
        BlockType::Heading1,
        BlockType::Heading2,
        BlockType::Heading3,
        BlockType::BulletedListItem,
        BlockType::NumberedListItem,
        BlockType::ToDo,
        BlockType::Toggle,
        BlockType::Quote,
        BlockType::Code,
        BlockType::Divider,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            BlockType::Paragraph => "paragraph",
            BlockType::Heading1 => "heading_1",
            BlockType::Heading2 => "heading_2",
            BlockType::Heading3 => "heading_3",
            BlockType::BulletedListItem => "bulleted_list_item",
            BlockType::NumberedListItem => "numbered_list_item",
            BlockType::ToDo => "to_do",
            BlockType::Toggle => "toggle",
            BlockType::Quote => "quote",
            BlockType::Code => "code",
            BlockType::Divider => "divider",
            BlockType::Unsupported => "unsupported",
        }
    }

    pub fn heading(level: u8) -> Option<BlockType> {
        match level {
            1 => Some(BlockType::Heading1),
            2 => Some(BlockType::Heading2),
            3 => Some(BlockType::Heading3),
            _ => None,
        }
    }

    pub fn supports_children(self) -> bool {
        matches!(
            self,
            BlockType::Paragraph
                | BlockType::BulletedListItem
                | BlockType::NumberedListItem
                | BlockType::ToDo
                | BlockType::Toggle
                | BlockType::Quote
        )
    }

    /// Types whose buffer form is a prefix followed by rich text.
    pub fn is_text(self) -> bool {
        !matches!(
            self,
            BlockType::Code | BlockType::Divider | BlockType::Unsupported
        )
    }

    /// Markup written before the first line of text.
    pub fn prefix(self, checked: bool) -> String {
        match self {
            BlockType::Heading1 => Heading::prefix(1),
            BlockType::Heading2 => Heading::prefix(2),
            BlockType::Heading3 => Heading::prefix(3),
            BlockType::BulletedListItem => Bullet::PREFIX.to_string(),
            BlockType::NumberedListItem => Numbered::PREFIX.to_string(),
            BlockType::ToDo => ToDo::prefix(checked).to_string(),
            BlockType::Toggle => Toggle::PREFIX.to_string(),
            BlockType::Quote => Quote::PREFIX.to_string(),
            _ => String::new(),
        }
    }

    /// Removes this type's markup from the start of `line`. Lines that do
    /// not carry the markup are returned unchanged.
    pub fn strip_prefix(self, line: &str) -> &str {
        let stripped = match self {
            BlockType::Heading1 | BlockType::Heading2 | BlockType::Heading3 => {
                Heading::strip(line).map(|(_, rest)| rest)
            }
            BlockType::BulletedListItem => Bullet::strip(line),
            BlockType::NumberedListItem => Numbered::strip(line),
            BlockType::ToDo => ToDo::strip(line).map(|(_, rest)| rest),
            BlockType::Toggle => Toggle::strip(line),
            BlockType::Quote => Quote::strip(line),
            _ => None,
        };
        stripped.unwrap_or(line)
    }
}

/// Variant data of a block.
#[derive(Clone, Debug, PartialEq)]
pub enum BlockContent {
    Paragraph { text: Vec<Segment> },
    Heading { level: u8, text: Vec<Segment> },
    BulletedListItem { text: Vec<Segment> },
    NumberedListItem { text: Vec<Segment> },
    ToDo { text: Vec<Segment>, checked: bool },
    Toggle { text: Vec<Segment> },
    Quote { text: Vec<Segment> },
    Code { code: String, language: String },
    Divider,
    Unsupported { tag: String },
}

impl BlockContent {
    pub fn paragraph(text: &str) -> Self {
        BlockContent::Paragraph {
            text: vec![Segment::plain(text)],
        }
    }

    pub fn block_type(&self) -> BlockType {
        match self {
            BlockContent::Paragraph { .. } => BlockType::Paragraph,
            BlockContent::Heading { level, .. } => match level {
                1 => BlockType::Heading1,
                2 => BlockType::Heading2,
                _ => BlockType::Heading3,
            },
            BlockContent::BulletedListItem { .. } => BlockType::BulletedListItem,
            BlockContent::NumberedListItem { .. } => BlockType::NumberedListItem,
            BlockContent::ToDo { .. } => BlockType::ToDo,
            BlockContent::Toggle { .. } => BlockType::Toggle,
            BlockContent::Quote { .. } => BlockType::Quote,
            BlockContent::Code { .. } => BlockType::Code,
            BlockContent::Divider => BlockType::Divider,
            BlockContent::Unsupported { .. } => BlockType::Unsupported,
        }
    }

    /// Remote tag. For unsupported blocks this is the tag the remote sent.
    pub fn tag(&self) -> &str {
        match self {
            BlockContent::Unsupported { tag } => tag,
            other => other.block_type().tag(),
        }
    }

    pub fn is_editable(&self) -> bool {
        !matches!(self, BlockContent::Unsupported { .. })
    }

    /// The constant line a fixed-shape block always renders as.
    pub fn fixed_shape(&self) -> Option<String> {
        match self {
            BlockContent::Divider => Some(Divider::SHAPE.to_string()),
            BlockContent::Unsupported { tag } => Some(format!("[unsupported: {tag}]")),
            _ => None,
        }
    }

    pub fn text(&self) -> Option<&[Segment]> {
        match self {
            BlockContent::Paragraph { text }
            | BlockContent::Heading { text, .. }
            | BlockContent::BulletedListItem { text }
            | BlockContent::NumberedListItem { text }
            | BlockContent::ToDo { text, .. }
            | BlockContent::Toggle { text }
            | BlockContent::Quote { text } => Some(text),
            _ => None,
        }
    }

    fn checked(&self) -> bool {
        matches!(self, BlockContent::ToDo { checked: true, .. })
    }

    /// Buffer lines for this content, without indentation.
    pub fn format(&self, rich: &dyn RichText) -> Vec<String> {
        if let Some(shape) = self.fixed_shape() {
            return vec![shape];
        }
        if let BlockContent::Code { code, language } = self {
            let mut lines = vec![CodeFence::open_line(language)];
            if !code.is_empty() {
                lines.extend(code.split('\n').map(String::from));
            }
            lines.push(CodeFence::BACKTICKS.to_string());
            return lines;
        }

        let body = rich.render(self.text().unwrap_or_default());
        let prefix = self.block_type().prefix(self.checked());
        let mut lines: Vec<String> = body.split('\n').map(String::from).collect();
        if let Some(first) = lines.first_mut() {
            first.insert_str(0, &prefix);
        }
        lines
    }

    /// Builds content of `block_type` from unindented buffer lines. The
    /// first line's markup is stripped if present.
    pub fn from_lines(block_type: BlockType, lines: &[String], rich: &dyn RichText) -> Self {
        match block_type {
            BlockType::Code => {
                let (language, body) = CodeFence::split(lines);
                BlockContent::Code {
                    code: body.join("\n"),
                    language,
                }
            }
            BlockType::Divider => BlockContent::Divider,
            BlockType::Unsupported => BlockContent::Unsupported {
                tag: BlockType::Unsupported.tag().to_string(),
            },
            text_type => {
                let first = lines.first().map(String::as_str).unwrap_or_default();
                let checked = ToDo::strip(first).is_some_and(|(checked, _)| checked);
                let mut body = text_type.strip_prefix(first).to_string();
                for line in lines.iter().skip(1) {
                    body.push('\n');
                    body.push_str(line);
                }
                Self::with_text(text_type, rich.parse(&body), checked)
            }
        }
    }

    fn with_text(block_type: BlockType, text: Vec<Segment>, checked: bool) -> Self {
        match block_type {
            BlockType::Heading1 => BlockContent::Heading { level: 1, text },
            BlockType::Heading2 => BlockContent::Heading { level: 2, text },
            BlockType::Heading3 => BlockContent::Heading { level: 3, text },
            BlockType::BulletedListItem => BlockContent::BulletedListItem { text },
            BlockType::NumberedListItem => BlockContent::NumberedListItem { text },
            BlockType::ToDo => BlockContent::ToDo { text, checked },
            BlockType::Toggle => BlockContent::Toggle { text },
            BlockType::Quote => BlockContent::Quote { text },
            _ => BlockContent::Paragraph { text },
        }
    }

    /// Reads variant data from the type-specific body of a remote payload.
    pub fn from_body(block_type: BlockType, body: &Value) -> Self {
        match block_type {
            BlockType::Code => BlockContent::Code {
                code: plain_text(&segments_from_json(&body["rich_text"])),
                language: body["language"].as_str().unwrap_or_default().to_string(),
            },
            BlockType::Divider => BlockContent::Divider,
            BlockType::Unsupported => BlockContent::Unsupported {
                tag: BlockType::Unsupported.tag().to_string(),
            },
            text_type => Self::with_text(
                text_type,
                segments_from_json(&body["rich_text"]),
                body["checked"].as_bool().unwrap_or(false),
            ),
        }
    }

    /// The type-specific body of a remote payload.
    pub fn body(&self) -> Value {
        match self {
            BlockContent::Code { code, language } => json!({
                "rich_text": segments_to_json(&[Segment::plain(code.as_str())]),
                "language": language,
            }),
            BlockContent::Divider | BlockContent::Unsupported { .. } => Value::Object(Map::new()),
            BlockContent::ToDo { text, checked } => json!({
                "rich_text": segments_to_json(text),
                "checked": checked,
            }),
            other => json!({
                "rich_text": segments_to_json(other.text().unwrap_or_default()),
            }),
        }
    }
}
