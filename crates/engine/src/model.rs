//! Document model exchanged with the editor

use blocksync_protocol::Caret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Block attribute bag
pub type Attributes = Map<String, Value>;

/// A content block and its nested children
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub id: String,
    /// Block type, e.g. `core/paragraph`
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub inner_blocks: Vec<Block>,
}

impl Block {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_inner_blocks(mut self, inner_blocks: Vec<Block>) -> Self {
        self.inner_blocks = inner_blocks;
        self
    }
}

/// Reply in a comment thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    pub id: String,
    pub content: String,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub author_id: String,
    pub author_name: String,
}

/// Comment thread anchored to a selection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub content: String,
    /// Milliseconds since the Unix epoch
    pub created_at: i64,
    pub status: String,
    #[serde(default)]
    pub start: Option<Caret>,
    #[serde(default)]
    pub end: Option<Caret>,
    pub author_id: String,
    pub author_name: String,
    /// Ordered by `created_at`
    #[serde(default)]
    pub replies: Vec<Reply>,
}

/// Everything the editor edits collaboratively
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub blocks: Vec<Block>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Document {
    pub fn with_blocks(blocks: Vec<Block>) -> Self {
        Self {
            blocks,
            ..Self::default()
        }
    }

    /// Find a block anywhere in the tree
    pub fn find_block(&self, id: &str) -> Option<&Block> {
        fn find<'a>(blocks: &'a [Block], id: &str) -> Option<&'a Block> {
            blocks.iter().find_map(|block| {
                if block.id == id {
                    Some(block)
                } else {
                    find(&block.inner_blocks, id)
                }
            })
        }
        find(&self.blocks, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_wire_shape() {
        let block = Block::new("b1", "core/group")
            .with_attribute("align", "wide")
            .with_inner_blocks(vec![Block::new("b2", "core/paragraph")]);
        let json = serde_json::to_value(&block).unwrap();
        assert_eq!(json["innerBlocks"][0]["id"], "b2");
        assert_eq!(json["attributes"]["align"], "wide");
    }

    #[test]
    fn find_nested_block() {
        let doc = Document::with_blocks(vec![Block::new("b1", "core/group")
            .with_inner_blocks(vec![Block::new("b2", "core/paragraph")])]);
        assert_eq!(doc.find_block("b2").map(|b| b.name.as_str()), Some("core/paragraph"));
        assert!(doc.find_block("b3").is_none());
    }
}
