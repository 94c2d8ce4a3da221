use std::collections::HashMap;

use log::debug;
use serde_json::{Map, Value};

use super::classify::detect_type;
use super::{Block, BlockContent, BlockId, BlockType};
use crate::error::SyncError;
use crate::richtext::{MarkerRichText, RichText};

/// Dispatch table from a remote type tag to block behavior.
///
/// Tags without a registered handler deserialize to
/// [`BlockContent::Unsupported`] and serialize back to their exact payload.
pub struct Registry {
    handlers: HashMap<String, BlockType>,
    rich_text: Box<dyn RichText>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(MarkerRichText)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// A registry handling every supported type.
    pub fn new(rich_text: impl RichText + 'static) -> Self {
        let mut registry = Self::empty(rich_text);
        for ty in BlockType::SUPPORTED {
            registry.register(ty);
        }
        registry
    }

    pub fn empty(rich_text: impl RichText + 'static) -> Self {
        Self {
            handlers: HashMap::new(),
            rich_text: Box::new(rich_text),
        }
    }

    pub fn register(&mut self, ty: BlockType) {
        if ty != BlockType::Unsupported {
            self.handlers.insert(ty.tag().to_string(), ty);
        }
    }

    pub fn unregister(&mut self, tag: &str) -> bool {
        self.handlers.remove(tag).is_some()
    }

    pub fn handles(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    pub fn rich_text(&self) -> &dyn RichText {
        self.rich_text.as_ref()
    }

    /// Builds a block from a remote payload.
    pub fn deserialize(&self, raw: Value) -> Result<Block, SyncError> {
        let id = raw["id"]
            .as_str()
            .ok_or_else(|| SyncError::MalformedResponse("block without id".into()))?;
        let tag = raw["type"]
            .as_str()
            .ok_or_else(|| SyncError::MalformedResponse(format!("block {id} without type")))?;

        let content = match self.handlers.get(tag) {
            Some(&ty) => BlockContent::from_body(ty, &raw[tag]),
            None => {
                debug!("no handler for block type {tag}, keeping raw payload");
                BlockContent::Unsupported {
                    tag: tag.to_string(),
                }
            }
        };

        let mut block = Block::new(BlockId::from(id), content, Value::Null);
        block.has_children = raw["has_children"].as_bool().unwrap_or(false);
        block.raw = raw;
        let text = self.text_of(&block.content);
        block.mark_synced(text);
        Ok(block)
    }

    /// Unindented buffer lines for `content`.
    pub fn format_content(&self, content: &BlockContent) -> Vec<String> {
        content.format(self.rich_text())
    }

    /// Buffer lines for `block`, each prefixed with `indent`.
    pub fn format(&self, block: &Block, indent: &str) -> Vec<String> {
        self.format_content(&block.content)
            .into_iter()
            .map(|line| format!("{indent}{line}"))
            .collect()
    }

    pub fn text_of(&self, content: &BlockContent) -> String {
        self.format_content(content).join("\n")
    }

    /// Payload to send for `block`. Unsupported blocks return their raw
    /// payload untouched; other blocks overlay their body on it so fields the
    /// engine does not model survive.
    pub fn serialize(&self, block: &Block) -> Value {
        if !block.editable {
            return block.raw.clone();
        }
        let mut payload = match &block.raw {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        if let Some(old_tag) = payload.get("type").and_then(Value::as_str) {
            if old_tag != block.content.tag() {
                let old_tag = old_tag.to_string();
                payload.remove(&old_tag);
            }
        }
        merge_body(&mut payload, &block.content);
        Value::Object(payload)
    }

    /// Payload for a block that does not exist remotely yet.
    pub fn payload_for(&self, content: &BlockContent) -> Value {
        let mut payload = Map::new();
        merge_body(&mut payload, content);
        Value::Object(payload)
    }

    pub fn content_from_lines(&self, ty: BlockType, lines: &[String]) -> BlockContent {
        BlockContent::from_lines(ty, lines, self.rich_text())
    }

    /// Applies unindented buffer lines to `block`.
    ///
    /// Content is only rewritten while the lines still describe the stored
    /// type; a retyped block keeps its old content until the type change is
    /// synced.
    pub fn update_from_lines(&self, block: &mut Block, lines: &[String]) {
        let text = lines.join("\n");
        block.dirty = text != block.original_text;
        block.current_text = text;
        if !block.editable || block.content.fixed_shape().is_some() {
            return;
        }
        if self.type_changed(block) {
            return;
        }
        block.content = self.content_from_lines(block.block_type(), lines);
    }

    /// Type implied by the first line of the block's current text.
    pub fn detected_type(&self, block: &Block) -> BlockType {
        detect_type(first_line(&block.current_text))
    }

    /// Whether the markup of the first line now implies a different type.
    ///
    /// The comparison is against the markup the block was synced with, so a
    /// paragraph whose text happens to start with `- ` is not retyped until
    /// that markup changes.
    pub fn type_changed(&self, block: &Block) -> bool {
        if !block.editable || !block.block_type().is_text() {
            return false;
        }
        let current = first_line(&block.current_text);
        let original = first_line(&block.original_text);
        if current == original {
            return false;
        }
        detect_type(current) != detect_type(original) && detect_type(current) != block.block_type()
    }
}

fn first_line(text: &str) -> &str {
    text.split('\n').next().unwrap_or_default()
}

fn merge_body(payload: &mut Map<String, Value>, content: &BlockContent) {
    let tag = content.tag().to_string();
    payload.insert("object".into(), Value::from("block"));
    payload.insert("type".into(), Value::from(tag.clone()));
    payload.insert(tag, content.body());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::richtext::Segment;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn paragraph(id: &str, text: &str) -> Value {
        json!({
            "object": "block",
            "id": id,
            "type": "paragraph",
            "has_children": false,
            "paragraph": {"rich_text": [{"type": "text", "text": {"content": text}, "plain_text": text}]}
        })
    }

    fn lines(text: &str) -> Vec<String> {
        text.split('\n').map(String::from).collect()
    }

    #[test]
    fn deserialize_paragraph() {
        let block = Registry::default().deserialize(paragraph("p1", "Hello")).unwrap();

        assert_eq!(block.id, BlockId::from("p1"));
        assert_eq!(block.block_type(), BlockType::Paragraph);
        assert_eq!(block.original_text, "Hello");
        assert!(block.editable);
        assert!(!block.dirty);
    }

    #[test]
    fn unknown_type_round_trips_raw_payload() {
        let raw = json!({
            "object": "block",
            "id": "t1",
            "type": "table",
            "has_children": true,
            "table": {"table_width": 3, "has_column_header": true}
        });
        let registry = Registry::default();
        let block = registry.deserialize(raw.clone()).unwrap();

        assert!(!block.editable);
        assert_eq!(block.original_text, "[unsupported: table]");
        assert_eq!(registry.serialize(&block), raw);
    }

    #[test]
    fn unregistered_type_is_unsupported() {
        let mut registry = Registry::default();
        assert!(registry.unregister("quote"));
        let raw = json!({"id": "q", "type": "quote", "quote": {"rich_text": []}});

        let block = registry.deserialize(raw).unwrap();
        assert_eq!(block.block_type(), BlockType::Unsupported);
    }

    #[test]
    fn missing_id_is_malformed() {
        let err = Registry::default()
            .deserialize(json!({"type": "paragraph"}))
            .unwrap_err();
        assert!(matches!(err, SyncError::MalformedResponse(_)));
    }

    #[test]
    fn serialize_keeps_unmodelled_fields() {
        let registry = Registry::default();
        let mut raw = paragraph("p1", "Hi");
        raw["paragraph"]["color"] = json!("blue");
        raw["created_time"] = json!("2024-01-01");
        let mut block = registry.deserialize(raw).unwrap();

        registry.update_from_lines(&mut block, &lines("Hi there"));
        let payload = registry.serialize(&block);

        assert_eq!(payload["created_time"], "2024-01-01");
        assert_eq!(payload["paragraph"]["rich_text"][0]["text"]["content"], "Hi there");
    }

    #[test]
    fn update_from_lines_sets_dirty() {
        let registry = Registry::default();
        let mut block = registry.deserialize(paragraph("p1", "Hello")).unwrap();

        registry.update_from_lines(&mut block, &lines("Hello world"));
        assert!(block.dirty);
        assert_eq!(
            block.content,
            BlockContent::Paragraph {
                text: vec![Segment::plain("Hello world")]
            }
        );

        registry.update_from_lines(&mut block, &lines("Hello"));
        assert!(!block.dirty);
    }

    #[test]
    fn typing_a_bullet_over_a_paragraph_is_a_type_change() {
        let registry = Registry::default();
        let mut block = registry.deserialize(paragraph("p1", "item")).unwrap();

        registry.update_from_lines(&mut block, &lines("- item"));

        assert!(registry.type_changed(&block));
        assert_eq!(registry.detected_type(&block), BlockType::BulletedListItem);
        assert_eq!(block.block_type(), BlockType::Paragraph);
    }

    #[test]
    fn removing_heading_markup_is_a_type_change() {
        let registry = Registry::default();
        let raw = json!({
            "id": "h", "type": "heading_2",
            "heading_2": {"rich_text": [{"type": "text", "text": {"content": "Title"}}]}
        });
        let mut block = registry.deserialize(raw).unwrap();
        assert_eq!(block.original_text, "## Title");

        registry.update_from_lines(&mut block, &lines("Title"));
        assert!(registry.type_changed(&block));
    }

    #[test]
    fn paragraph_that_looks_like_a_list_is_stable() {
        let registry = Registry::default();
        let mut block = registry.deserialize(paragraph("p1", "- not a list")).unwrap();

        registry.update_from_lines(&mut block, &lines("- not a list, edited"));
        assert!(!registry.type_changed(&block));
        assert!(block.dirty);
    }

    #[test]
    fn code_blocks_never_change_type() {
        let registry = Registry::default();
        let raw = json!({
            "id": "c", "type": "code",
            "code": {"rich_text": [{"type": "text", "text": {"content": "x = 1"}}], "language": "python"}
        });
        let mut block = registry.deserialize(raw).unwrap();

        registry.update_from_lines(&mut block, &lines("- x = 1"));
        assert!(!registry.type_changed(&block));
    }

    #[test]
    fn fresh_payload_shape() {
        let registry = Registry::default();
        let content = registry.content_from_lines(BlockType::ToDo, &lines("- [x] done"));
        let payload = registry.payload_for(&content);

        insta::assert_snapshot!(
            payload.to_string(),
            @r#"{"object":"block","to_do":{"checked":true,"rich_text":[{"annotations":{"bold":false,"code":false,"italic":false,"strikethrough":false},"plain_text":"done","text":{"content":"done"},"type":"text"}]},"type":"to_do"}"#
        );
    }
}
