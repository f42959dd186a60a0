//! Editor-facing view updates.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tandem_engine::{error::Result, Operation};

/// Receives the changes a document makes to the editor's view.
pub trait Renderer: Send + 'static {
    /// Replace the whole view, after joining or rejoining.
    fn replace_all(&mut self, text: &str);

    /// Apply a remote operation, already transformed against local edits.
    fn apply_transformed(&mut self, op: &Operation) -> Result<()>;
}

/// A thread-safe text buffer usable as a renderer.
///
/// Clones share the same text.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    text: Arc<Mutex<String>>,
}

impl SharedBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        self.text.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current text.
    pub fn text(&self) -> String {
        self.lock().clone()
    }
}

impl Renderer for SharedBuffer {
    fn replace_all(&mut self, text: &str) {
        *self.lock() = text.to_string();
    }

    fn apply_transformed(&mut self, op: &Operation) -> Result<()> {
        let mut text = self.lock();
        *text = op.apply(&text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_text() {
        let buffer = SharedBuffer::new();
        let mut renderer = buffer.clone();

        renderer.replace_all("héllo");
        renderer
            .apply_transformed(&Operation::insert(5, " 世界"))
            .unwrap();
        assert_eq!(buffer.text(), "héllo 世界");
    }

    #[test]
    fn test_failed_apply_keeps_text() {
        let mut buffer = SharedBuffer::new();
        buffer.replace_all("abc");
        assert!(buffer.apply_transformed(&Operation::delete(2, "cd")).is_err());
        assert_eq!(buffer.text(), "abc");
    }
}
