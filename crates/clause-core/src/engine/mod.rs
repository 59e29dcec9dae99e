//! Execution engine seam
//!
//! Contract logic is compiled and executed outside this crate. Commands talk
//! to it through the [`Engine`] trait; a fresh engine is obtained from an
//! [`EngineFactory`] for every command so no state leaks between commands.

pub mod process;

use async_trait::async_trait;
use serde_json::Value;

use crate::template::LogicBundle;
use crate::Result;

pub use process::{ProcessEngine, ProcessEngineFactory};

/// Per-execution overrides forwarded to the engine untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// The definition of "now"; the engine defaults to the current time
    pub current_time: Option<String>,
    /// UTC offset in minutes; the engine defaults to the local offset
    pub utc_offset: Option<i32>,
}

/// Result of an init, trigger or invoke call
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ExecutionResponse {
    /// Contract state after the call
    pub state: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub emit: Vec<Value>,
    /// Compiled form of the template, when the engine hands one back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compiled: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ExecutionResponse {
    /// A response carrying only a state, used to seed a trigger chain
    pub fn from_state(state: Value) -> Self {
        ExecutionResponse {
            state,
            response: None,
            emit: Vec::new(),
            compiled: None,
            warnings: Vec::new(),
        }
    }
}

/// Compiles a logic bundle and runs it
#[async_trait]
pub trait Engine: Send + Sync {
    /// Compile the template and compute the initial contract state
    async fn compile_and_init(
        &self,
        bundle: &LogicBundle,
        contract: &Value,
        params: &Value,
        options: &ExecutionOptions,
    ) -> Result<ExecutionResponse>;

    /// Compile the template and send one request against `state`
    async fn compile_and_trigger(
        &self,
        bundle: &LogicBundle,
        contract: &Value,
        request: &Value,
        state: &Value,
        options: &ExecutionOptions,
    ) -> Result<ExecutionResponse>;

    /// Compile the template and call a single named clause
    async fn compile_and_invoke(
        &self,
        bundle: &LogicBundle,
        clause: &str,
        contract: &Value,
        params: &Value,
        state: &Value,
        options: &ExecutionOptions,
    ) -> Result<ExecutionResponse>;
}

/// Builds a new engine instance per command
pub trait EngineFactory: Send + Sync {
    type Engine: Engine;

    fn create(&self) -> Self::Engine;
}

impl<F, E> EngineFactory for F
where
    F: Fn() -> E + Send + Sync,
    E: Engine,
{
    type Engine = E;

    fn create(&self) -> E {
        self()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_defaults_optional_fields() {
        let response: ExecutionResponse =
            serde_json::from_value(json!({"state": {"count": 1}})).unwrap();
        assert_eq!(response, ExecutionResponse::from_state(json!({"count": 1})));
    }

    #[test]
    fn test_response_requires_state() {
        let parsed = serde_json::from_value::<ExecutionResponse>(json!({"response": {}}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_response_serialization_skips_empty_fields() {
        let value = serde_json::to_value(ExecutionResponse::from_state(json!(null))).unwrap();
        assert_eq!(value, json!({"state": null}));
    }
}
