//! # Rich Text
//!
//! Conversion between the remote store's annotated rich-text items and the
//! inline marker syntax shown in the buffer.
//!
//! ## Modules
//!
//! - **`cursor`**: byte cursor used by the marker parser
//! - **`parser`**: `MarkerRichText`, the shipped [`RichText`] implementation
//!
//! ## Raw Zone Precedence
//!
//! Code spans are raw: `` `**not bold**` `` is a single code segment.

pub mod cursor;
pub mod parser;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use parser::MarkerRichText;

/// Converts between buffer text and annotated segments.
pub trait RichText: Send + Sync {
    fn parse(&self, text: &str) -> Vec<Segment>;
    fn render(&self, segments: &[Segment]) -> String;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotations {
    #[serde(default)]
    pub bold: bool,
    #[serde(default)]
    pub italic: bool,
    #[serde(default)]
    pub strikethrough: bool,
    #[serde(default)]
    pub code: bool,
}

/// A run of text sharing the same annotations and link.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub annotations: Annotations,
    pub link: Option<String>,
}

impl Segment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn with_annotations(text: impl Into<String>, annotations: Annotations) -> Self {
        Self {
            text: text.into(),
            annotations,
            link: None,
        }
    }

    pub fn linked(text: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            annotations: Annotations::default(),
            link: Some(url.into()),
        }
    }
}

/// Concatenated text of all segments, markers excluded.
pub fn plain_text(segments: &[Segment]) -> String {
    segments.iter().map(|s| s.text.as_str()).collect()
}

/// Wire shape of one remote rich-text item.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RichTextItem {
    #[serde(rename = "type", default = "RichTextItem::text_kind")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default)]
    pub plain_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub href: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TextContent {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<Link>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub url: String,
}

impl RichTextItem {
    fn text_kind() -> String {
        "text".to_string()
    }
}

impl From<RichTextItem> for Segment {
    fn from(item: RichTextItem) -> Self {
        // Mentions and equations carry no `text` object; fall back to plain_text.
        let (text, link) = match item.text {
            Some(t) => (t.content, t.link.map(|l| l.url)),
            None => (item.plain_text, None),
        };
        Segment {
            text,
            annotations: item.annotations,
            link: link.or(item.href),
        }
    }
}

impl From<&Segment> for RichTextItem {
    fn from(seg: &Segment) -> Self {
        RichTextItem {
            kind: Self::text_kind(),
            text: Some(TextContent {
                content: seg.text.clone(),
                link: seg.link.as_ref().map(|url| Link { url: url.clone() }),
            }),
            annotations: seg.annotations.clone(),
            plain_text: seg.text.clone(),
            href: seg.link.clone(),
        }
    }
}

/// Reads a `rich_text` array. Items that do not match the wire shape are
/// skipped.
pub fn segments_from_json(value: &Value) -> Vec<Segment> {
    let Some(items) = value.as_array() else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value::<RichTextItem>(item.clone()).ok())
        .map(Segment::from)
        .collect()
}

pub fn segments_to_json(segments: &[Segment]) -> Value {
    Value::Array(
        segments
            .iter()
            .map(RichTextItem::from)
            .filter_map(|item| serde_json::to_value(item).ok())
            .collect(),
    )
}
