//! Operations: ordered lists of components.
//!
//! Components of one operation apply strictly in order, each against the
//! text produced by the ones before it. Positions are therefore never
//! offsets into a single fixed pre-image, and composing two operations needs
//! no renumbering: it is concatenation.

use crate::text::{byte_to_codepoint, slice_codepoints};
use crate::{error::Result, Component, Error};
use serde::{Deserialize, Serialize};

/// An ordered sequence of components.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Operation(Vec<Component>);

impl Operation {
    /// Create an empty operation.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Create an operation from a list of components.
    pub fn from_components(components: Vec<Component>) -> Self {
        Self(components)
    }

    /// A single-insert operation.
    pub fn insert(position: usize, text: impl Into<String>) -> Self {
        Self(vec![Component::insert(position, text)])
    }

    /// A single-delete operation.
    pub fn delete(position: usize, text: impl Into<String>) -> Self {
        Self(vec![Component::delete(position, text)])
    }

    /// Build an operation from an edit reported as a byte range.
    ///
    /// Bytes `start..end` of `content` are replaced by `replacement`. The
    /// result deletes the old span (if any) and then inserts the new text
    /// (if any), both at codepoint positions.
    pub fn from_byte_edit(content: &str, start: usize, end: usize, replacement: &str) -> Result<Self> {
        if start > end {
            return Err(Error::MalformedOperation(format!(
                "inverted byte range {start}..{end}"
            )));
        }
        let from = byte_to_codepoint(content, start)?;
        let to = byte_to_codepoint(content, end)?;

        let mut op = Operation::new();
        if to > from {
            op.push(Component::delete(from, slice_codepoints(content, from, to)?));
        }
        if !replacement.is_empty() {
            op.push(Component::insert(from, replacement));
        }
        Ok(op)
    }

    /// The components, in application order.
    pub fn components(&self) -> &[Component] {
        &self.0
    }

    /// Consume the operation, returning its components.
    pub fn into_components(self) -> Vec<Component> {
        self.0
    }

    /// Append a component.
    pub fn push(&mut self, component: Component) {
        self.0.push(component);
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the operation has no components.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the components.
    pub fn iter(&self) -> std::slice::Iter<'_, Component> {
        self.0.iter()
    }

    /// Apply the operation to `content`, returning the new text.
    ///
    /// Either every component applies or an error is returned; `content`
    /// itself is never modified.
    pub fn apply(&self, content: &str) -> Result<String> {
        let mut text = content.to_owned();
        for component in &self.0 {
            component.apply_to(&mut text)?;
        }
        Ok(text)
    }

    /// Sequential composition: `self` followed by `next`.
    pub fn compose(mut self, next: Operation) -> Operation {
        self.0.extend(next.0);
        self
    }

    /// The operation that undoes this one once it has been applied.
    pub fn invert(&self) -> Operation {
        self.0.iter().rev().map(Component::invert).collect()
    }
}

impl From<Component> for Operation {
    fn from(component: Component) -> Self {
        Self(vec![component])
    }
}

impl From<Vec<Component>> for Operation {
    fn from(components: Vec<Component>) -> Self {
        Self(components)
    }
}

impl FromIterator<Component> for Operation {
    fn from_iter<I: IntoIterator<Item = Component>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for Operation {
    type Item = Component;
    type IntoIter = std::vec::IntoIter<Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Operation {
    type Item = &'a Component;
    type IntoIter = std::slice::Iter<'a, Component>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
