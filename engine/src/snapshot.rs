//! Document snapshots as delivered by the server on join.

use crate::{error::Result, Error, Version};
use serde::{Deserialize, Serialize};

/// Authoritative document state at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocSnapshot {
    /// Full document text
    pub text: String,
    /// Version the text corresponds to
    pub version: Version,
    /// Auxiliary ranges (comments, tracked changes) passed through untouched
    #[serde(default)]
    pub ranges: serde_json::Value,
}

impl DocSnapshot {
    /// Create a snapshot without auxiliary ranges.
    pub fn new(text: impl Into<String>, version: Version) -> Self {
        Self {
            text: text.into(),
            version,
            ranges: serde_json::Value::Null,
        }
    }

    /// Attach auxiliary ranges.
    pub fn with_ranges(mut self, ranges: serde_json::Value) -> Self {
        self.ranges = ranges;
        self
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }

    /// Deserialize from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::InvalidSnapshot(e.to_string()))
    }
}
