//! JSON input resolution
//!
//! Every JSON argument (contract data, state, requests, clause parameters)
//! arrives either as a path to a file or as inline text. Both resolve to a
//! `serde_json::Value` exactly once.

use std::path::PathBuf;

use serde_json::Value;

use crate::{Error, Result};

/// Where a JSON document comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonInput {
    /// Path to a UTF-8 file holding the document
    File(PathBuf),
    /// The document text itself
    Inline(String),
}

impl JsonInput {
    pub fn file(path: impl Into<PathBuf>) -> Self {
        JsonInput::File(path.into())
    }

    pub fn inline(content: impl Into<String>) -> Self {
        JsonInput::Inline(content.into())
    }

    /// Build an input from a pair of mutually exclusive command-line values.
    /// The file path is preferred when both are present.
    pub fn from_pair(file: Option<PathBuf>, content: Option<String>) -> Option<Self> {
        match (file, content) {
            (Some(path), _) => Some(JsonInput::File(path)),
            (None, Some(text)) => Some(JsonInput::Inline(text)),
            (None, None) => None,
        }
    }

    /// Read (if needed) and parse the document
    ///
    /// # Errors
    /// `IoError` when the file cannot be read, `ParseError` when the text is
    /// not valid JSON.
    pub fn resolve(&self) -> Result<Value> {
        match self {
            JsonInput::File(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
                parse_json(&text, &path.display().to_string())
            }
            JsonInput::Inline(text) => parse_json(text, "inline content"),
        }
    }

    /// Human-readable label for log lines
    pub fn describe(&self) -> String {
        match self {
            JsonInput::File(path) => path.display().to_string(),
            JsonInput::Inline(_) => "<inline>".to_string(),
        }
    }
}

fn parse_json(text: &str, origin: &str) -> Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| Error::ParseError(format!("invalid JSON in {}: {}", origin, e)))
}

/// Resolve a list of inputs in order, stopping at the first failure
pub fn resolve_all(inputs: &[JsonInput]) -> Result<Vec<Value>> {
    inputs.iter().map(JsonInput::resolve).collect()
}
