//! Turn input items

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One element of a `turn/start` input list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputItem {
    /// User text
    Text {
        /// Text content
        text: String,
    },
    /// Remote or data-URL image
    Image {
        /// Image URL
        url: String,
    },
    /// Image file on the agent's filesystem
    LocalImage {
        /// File path
        path: PathBuf,
    },
}

/// Input submitted with one turn
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TurnInput {
    items: Vec<InputItem>,
}

impl TurnInput {
    /// Input consisting of one text item
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            items: vec![InputItem::Text { text: text.into() }],
        }
    }

    /// Append an item
    #[must_use]
    pub fn with_item(mut self, item: InputItem) -> Self {
        self.items.push(item);
        self
    }

    /// Items in submission order
    #[must_use]
    pub fn items(&self) -> &[InputItem] {
        &self.items
    }

    /// Whether there is nothing to submit
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl From<&str> for TurnInput {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<String> for TurnInput {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<Vec<InputItem>> for TurnInput {
    fn from(items: Vec<InputItem>) -> Self {
        Self { items }
    }
}
