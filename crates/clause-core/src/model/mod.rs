//! Model transcoding
//!
//! Reads a model definition file, hands its text to a [`ModelParser`] and
//! writes the JSON result next to the source with the extension replaced by
//! [`TRANSCODED_EXTENSION`].

pub mod ast;
pub mod parser;
pub mod tokenizer;

use std::path::{Path, PathBuf};

use log::info;
use serde_json::Value;

use crate::{Error, Result};

/// Extension of transcoded model files (`model.cto` → `model.ctoj`)
pub const TRANSCODED_EXTENSION: &str = "ctoj";

/// Turns model source text into its JSON representation. Pure and synchronous.
pub trait ModelParser: Send + Sync {
    fn parse_model(&self, source: &str) -> Result<Value>;
}

/// Built-in parser for `.cto` model files
#[derive(Debug, Clone, Copy, Default)]
pub struct CtoParser;

impl ModelParser for CtoParser {
    fn parse_model(&self, source: &str) -> Result<Value> {
        let model = parser::parse(source)?;
        serde_json::to_value(&model)
            .map_err(|e| Error::ParseError(format!("cannot encode model: {}", e)))
    }
}

/// Path of the transcoded file for a model source path
pub fn transcoded_path(path: &Path) -> PathBuf {
    path.with_extension(TRANSCODED_EXTENSION)
}

/// Transcode a model file and return the path of the written output
///
/// # Errors
/// `IoError` if the source cannot be read or the output cannot be written,
/// `ParseError` if the parser rejects the source.
pub fn transcode_to_file_sync<P: ModelParser + ?Sized>(parser: &P, path: &Path) -> Result<PathBuf> {
    let source = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
    let result = parser.parse_model(&source)?;

    let out_file = transcoded_path(path);
    let text = serde_json::to_string(&result)
        .map_err(|e| Error::ParseError(format!("cannot encode model: {}", e)))?;
    std::fs::write(&out_file, text).map_err(|e| Error::io(&out_file, e))?;

    info!("transcoded {} -> {}", path.display(), out_file.display());
    Ok(out_file)
}

/// Async form of [`transcode_to_file_sync`]; the work happens before the
/// future is first polled
pub fn transcode_to_file<P: ModelParser + ?Sized>(
    parser: &P,
    path: &Path,
) -> std::future::Ready<Result<PathBuf>> {
    std::future::ready(transcode_to_file_sync(parser, path))
}
