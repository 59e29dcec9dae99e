//! Runtime configuration
//!
//! Loaded from an optional JSON file; every field has a default so an empty
//! object (or no file at all) is a valid configuration.
//!
//! ```json
//! {
//!   "engine": { "program": "clause-engine", "args": ["--stdio"] },
//!   "logicExtensions": ["ergo"]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::engine::process::{EngineCommand, ProcessEngineFactory};
use crate::template::{FsLoader, DEFAULT_LOGIC_EXTENSION};
use crate::{Error, Result};

/// Program started when no engine is configured
pub const DEFAULT_ENGINE_PROGRAM: &str = "clause-engine";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub engine: EngineCommand,
    pub logic_extensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            engine: EngineCommand::new(DEFAULT_ENGINE_PROGRAM),
            logic_extensions: vec![DEFAULT_LOGIC_EXTENSION.to_string()],
        }
    }
}

impl Config {
    /// Read a configuration file
    ///
    /// # Errors
    /// `IoError` if the file cannot be read, `ParseError` if it is not a
    /// valid configuration document.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_str(&text).map_err(|e| {
            Error::ParseError(format!("invalid configuration in {}: {}", path.display(), e))
        })
    }

    pub fn loader(&self) -> FsLoader {
        FsLoader::new().with_logic_extensions(self.logic_extensions.iter().cloned())
    }

    pub fn engine_factory(&self) -> ProcessEngineFactory {
        ProcessEngineFactory::new(self.engine.clone())
    }
}
