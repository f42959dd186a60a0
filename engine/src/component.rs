//! Operation components.
//!
//! A component is a single insert or delete at a codepoint position. On the
//! wire it is `{"p": 5, "i": "text"}` or `{"p": 5, "d": "text"}`.

use crate::text::{codepoint_len, codepoint_to_byte};
use crate::{error::Result, Error};
use serde::{Deserialize, Serialize};

/// A single insert or delete.
///
/// `position` is a codepoint offset into the text as it is immediately before
/// this component applies.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Component {
    /// Insert `text` at `position`.
    Insert {
        #[serde(rename = "p")]
        position: usize,
        #[serde(rename = "i")]
        text: String,
    },
    /// Delete `text`, which starts at `position`.
    Delete {
        #[serde(rename = "p")]
        position: usize,
        #[serde(rename = "d")]
        text: String,
    },
}

impl Component {
    /// Create an insert component.
    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Component::Insert {
            position,
            text: text.into(),
        }
    }

    /// Create a delete component.
    pub fn delete(position: usize, text: impl Into<String>) -> Self {
        Component::Delete {
            position,
            text: text.into(),
        }
    }

    /// Codepoint position of the component.
    pub fn position(&self) -> usize {
        match self {
            Component::Insert { position, .. } | Component::Delete { position, .. } => *position,
        }
    }

    /// Inserted or deleted text.
    pub fn text(&self) -> &str {
        match self {
            Component::Insert { text, .. } | Component::Delete { text, .. } => text,
        }
    }

    /// Length of the inserted or deleted text in codepoints.
    pub fn len(&self) -> usize {
        codepoint_len(self.text())
    }

    /// True when the component carries no text and so has no effect.
    pub fn is_empty(&self) -> bool {
        self.text().is_empty()
    }

    /// True for inserts.
    pub fn is_insert(&self) -> bool {
        matches!(self, Component::Insert { .. })
    }

    /// The component that undoes this one once it has been applied.
    pub fn invert(&self) -> Component {
        match self {
            Component::Insert { position, text } => Component::delete(*position, text.clone()),
            Component::Delete { position, text } => Component::insert(*position, text.clone()),
        }
    }

    /// Apply this component to `content` in place.
    ///
    /// Deletes remove as many bytes as `text` occupies, starting at the
    /// converted position. The removed span is not compared with `text`.
    pub fn apply_to(&self, content: &mut String) -> Result<()> {
        match self {
            Component::Insert { position, text } => {
                let at = codepoint_to_byte(content, *position)?;
                content.insert_str(at, text);
            }
            Component::Delete { position, text } => {
                let start = codepoint_to_byte(content, *position)?;
                let end = start + text.len();
                if end > content.len() {
                    return Err(Error::MalformedOperation(format!(
                        "delete of {} bytes at codepoint {} runs past the end of the text",
                        text.len(),
                        position
                    )));
                }
                if !content.is_char_boundary(end) {
                    return Err(Error::NotCharBoundary(end));
                }
                content.replace_range(start..end, "");
            }
        }
        Ok(())
    }
}
