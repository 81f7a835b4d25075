use serde::{Deserialize, Serialize};

/// A caret position inside a block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Caret {
    /// Block the caret sits in
    pub block_id: String,
    /// Rich-text attribute holding the caret (e.g. `content`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Character offset within the attribute
    pub offset: u32,
}

impl Caret {
    pub fn new(block_id: impl Into<String>, offset: u32) -> Self {
        Self {
            block_id: block_id.into(),
            attribute: None,
            offset,
        }
    }

    #[must_use]
    pub fn in_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }
}

/// Editor selection, exchanged as an ephemeral presence payload
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<Caret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<Caret>,
}

impl Selection {
    /// Selection spanning `start..end`
    pub fn range(start: Caret, end: Caret) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
        }
    }

    /// Collapsed selection (plain caret)
    pub fn collapsed(caret: Caret) -> Self {
        Self {
            start: Some(caret.clone()),
            end: Some(caret),
        }
    }

    pub const fn has_start(&self) -> bool {
        self.start.is_some()
    }

    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_has_no_start() {
        let sel: Selection = serde_json::from_str("{}").unwrap();
        assert!(!sel.has_start());
        assert!(sel.is_collapsed());
    }

    #[test]
    fn caret_wire_shape() {
        let sel = Selection::collapsed(Caret::new("b1", 4).in_attribute("content"));
        let json = serde_json::to_value(&sel).unwrap();
        assert_eq!(json["start"]["blockId"], "b1");
        assert_eq!(json["start"]["attribute"], "content");
        assert_eq!(json["end"]["offset"], 4);
    }
}
