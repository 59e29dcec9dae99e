//! Clause Core - command layer for contract templates
//!
//! Loads a template (contract logic plus its data model), resolves JSON
//! inputs and hands execution to an external engine.
//!
//! # Architecture
//!
//! ```text
//! TemplateSource → Loader → LogicBundle ─┐
//! JsonInput ────────────→ serde_json::Value ─┼→ Commands → Engine → ExecutionResponse
//!                                        │
//! model.cto → ModelParser → model.ctoj   │
//! ```
//!
//! The loader, the engine and the model parser are traits. [`FsLoader`],
//! [`ProcessEngine`] and [`CtoParser`] are the implementations used by the
//! command-line front-end.
//!
//! # Guarantees
//!
//! - **Sequential**: trigger requests run one after another, each consuming
//!   the previous state
//! - **Isolated**: every command builds its own engine instance
//! - **Transparent**: errors reach the caller exactly as they were raised

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod input;
pub mod model;
pub mod template;

pub use commands::{Commands, InitializeArgs, InvokeArgs, TriggerArgs};
pub use config::Config;
pub use engine::process::EngineCommand;
pub use engine::{
    Engine, EngineFactory, ExecutionOptions, ExecutionResponse, ProcessEngine,
    ProcessEngineFactory,
};
pub use error::{Error, Result};
pub use input::JsonInput;
pub use model::{CtoParser, ModelParser};
pub use template::{FsLoader, Loader, LogicBundle, SourceFile, TemplateSource};
