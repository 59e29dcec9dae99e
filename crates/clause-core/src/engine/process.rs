//! Engine reached through a child process
//!
//! Each engine call spawns the configured program, writes one JSON request
//! to its stdin and reads one [`ExecutionResponse`] from its stdout.
//! A non-zero exit status is an engine failure; stderr becomes the message.

use std::io::ErrorKind;
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use log::{debug, info};
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::{Engine, EngineFactory, ExecutionOptions, ExecutionResponse};
use crate::template::{LogicBundle, SourceFile};
use crate::{Error, Result};

/// Program and arguments used to start the engine
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineCommand {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl EngineCommand {
    pub fn new(program: impl Into<String>) -> Self {
        EngineCommand {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

// ── Wire format ───────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
enum Operation {
    Init,
    Trigger,
    Invoke,
}

#[derive(Serialize)]
struct TemplatePayload<'a> {
    name: Option<&'a str>,
    version: Option<&'a str>,
    fingerprint: String,
    logic: &'a [SourceFile],
    models: &'a [SourceFile],
}

impl<'a> TemplatePayload<'a> {
    fn new(bundle: &'a LogicBundle) -> Self {
        TemplatePayload {
            name: bundle.name.as_deref(),
            version: bundle.version.as_deref(),
            fingerprint: bundle.fingerprint(),
            logic: &bundle.logic,
            models: &bundle.models,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EngineRequest<'a> {
    operation: Operation,
    template: TemplatePayload<'a>,
    contract: &'a Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    clause: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    request: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compiled: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    current_time: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    utc_offset: Option<i32>,
}

impl<'a> EngineRequest<'a> {
    fn new(
        operation: Operation,
        bundle: &'a LogicBundle,
        contract: &'a Value,
        options: &'a ExecutionOptions,
    ) -> Self {
        EngineRequest {
            operation,
            template: TemplatePayload::new(bundle),
            contract,
            clause: None,
            params: None,
            request: None,
            state: None,
            compiled: None,
            current_time: options.current_time.as_deref(),
            utc_offset: options.utc_offset,
        }
    }
}

// ── Engine ────────────────────────────────────────────────

/// Engine instance backed by an external program
#[derive(Debug)]
pub struct ProcessEngine {
    command: EngineCommand,
    /// Compiled form handed back by init, replayed on later calls
    compiled: Mutex<Option<Value>>,
}

impl ProcessEngine {
    pub fn new(command: EngineCommand) -> Self {
        ProcessEngine {
            command,
            compiled: Mutex::new(None),
        }
    }

    fn cached_compiled(&self) -> Option<Value> {
        self.compiled
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember_compiled(&self, response: &ExecutionResponse) {
        if let Some(compiled) = &response.compiled {
            *self.compiled.lock().unwrap_or_else(PoisonError::into_inner) = Some(compiled.clone());
        }
    }

    async fn call(&self, mut request: EngineRequest<'_>) -> Result<ExecutionResponse> {
        let operation = request.operation;
        request.compiled = self.cached_compiled();

        let payload = serde_json::to_vec(&request)
            .map_err(|e| Error::EngineError(format!("cannot encode engine request: {}", e)))?;

        info!(
            "engine {:?}: {} {:?}",
            operation, self.command.program, self.command.args
        );

        let mut child = Command::new(&self.command.program)
            .args(&self.command.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::io(&self.command.program, e))?;

        // feed stdin while stdout and stderr drain
        let stdin = child.stdin.take();
        let feed = async move {
            match stdin {
                // dropped at the end of the block, closing the pipe (EOF)
                Some(mut stdin) => stdin.write_all(&payload).await,
                None => Ok(()),
            }
        };
        let (written, output) = tokio::join!(feed, child.wait_with_output());
        let output = output.map_err(|e| Error::io(&self.command.program, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let code = output
                .status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            let message = if stderr.is_empty() {
                format!("engine exited with status {}", code)
            } else {
                stderr
            };
            return Err(Error::EngineError(message));
        }

        match written {
            // the engine stopped reading early; its answer is still on stdout
            Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                debug!("engine closed stdin before reading the whole request");
            }
            Err(e) => return Err(Error::io(&self.command.program, e)),
            Ok(()) => {}
        }

        let response: ExecutionResponse = serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::EngineError(format!("malformed engine response: {}", e)))?;
        debug!("engine {:?} returned state {}", operation, response.state);
        Ok(response)
    }
}

#[async_trait]
impl Engine for ProcessEngine {
    async fn compile_and_init(
        &self,
        bundle: &LogicBundle,
        contract: &Value,
        params: &Value,
        options: &ExecutionOptions,
    ) -> Result<ExecutionResponse> {
        let mut request = EngineRequest::new(Operation::Init, bundle, contract, options);
        request.params = Some(params);
        let response = self.call(request).await?;
        self.remember_compiled(&response);
        Ok(response)
    }

    async fn compile_and_trigger(
        &self,
        bundle: &LogicBundle,
        contract: &Value,
        request: &Value,
        state: &Value,
        options: &ExecutionOptions,
    ) -> Result<ExecutionResponse> {
        let mut envelope = EngineRequest::new(Operation::Trigger, bundle, contract, options);
        envelope.request = Some(request);
        envelope.state = Some(state);
        self.call(envelope).await
    }

    async fn compile_and_invoke(
        &self,
        bundle: &LogicBundle,
        clause: &str,
        contract: &Value,
        params: &Value,
        state: &Value,
        options: &ExecutionOptions,
    ) -> Result<ExecutionResponse> {
        let mut envelope = EngineRequest::new(Operation::Invoke, bundle, contract, options);
        envelope.clause = Some(clause);
        envelope.params = Some(params);
        envelope.state = Some(state);
        self.call(envelope).await
    }
}

/// Creates a fresh [`ProcessEngine`] for every command
#[derive(Debug, Clone)]
pub struct ProcessEngineFactory {
    command: EngineCommand,
}

impl ProcessEngineFactory {
    pub fn new(command: EngineCommand) -> Self {
        ProcessEngineFactory { command }
    }

    pub fn command(&self) -> &EngineCommand {
        &self.command
    }
}

impl EngineFactory for ProcessEngineFactory {
    type Engine = ProcessEngine;

    fn create(&self) -> ProcessEngine {
        ProcessEngine::new(self.command.clone())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    fn bundle() -> LogicBundle {
        LogicBundle {
            name: Some("hello".into()),
            logic: vec![SourceFile {
                name: "logic/logic.ergo".into(),
                content: "contract Hello {}".into(),
            }],
            ..Default::default()
        }
    }

    fn shell(script: &str) -> ProcessEngine {
        ProcessEngine::new(EngineCommand::new("sh").arg("-c").arg(script))
    }

    #[tokio::test]
    async fn test_init_parses_stdout() {
        let engine = shell(r#"cat >/dev/null; echo '{"state": {"count": 0}, "response": null}'"#);
        let response = engine
            .compile_and_init(&bundle(), &json!({}), &json!({}), &ExecutionOptions::default())
            .await
            .unwrap();
        assert_eq!(response.state, json!({"count": 0}));
    }

    #[tokio::test]
    async fn test_request_envelope_is_echoed() {
        // the engine answers with its own input wrapped as the state
        let engine = shell(r#"printf '{"state": '; cat; printf '}'"#);
        let options = ExecutionOptions {
            current_time: Some("2026-01-01T00:00:00Z".into()),
            utc_offset: Some(60),
        };
        let response = engine
            .compile_and_trigger(
                &bundle(),
                &json!({"seller": "a"}),
                &json!({"$class": "Req"}),
                &json!({"count": 3}),
                &options,
            )
            .await
            .unwrap();
        let sent = response.state;
        assert_eq!(sent["operation"], "trigger");
        assert_eq!(sent["contract"], json!({"seller": "a"}));
        assert_eq!(sent["request"], json!({"$class": "Req"}));
        assert_eq!(sent["state"], json!({"count": 3}));
        assert_eq!(sent["currentTime"], "2026-01-01T00:00:00Z");
        assert_eq!(sent["utcOffset"], 60);
        assert_eq!(sent["template"]["name"], "hello");
        assert_eq!(sent["template"]["logic"][0]["name"], "logic/logic.ergo");
        assert_eq!(sent["template"]["fingerprint"], bundle().fingerprint());
        assert!(sent.get("params").is_none());
        assert!(sent.get("clause").is_none());
    }

    #[tokio::test]
    async fn test_invoke_sends_clause_name() {
        let engine = shell(r#"printf '{"state": '; cat; printf '}'"#);
        let response = engine
            .compile_and_invoke(
                &bundle(),
                "payOut",
                &json!({}),
                &json!({"amount": 5}),
                &json!({}),
                &ExecutionOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(response.state["operation"], "invoke");
        assert_eq!(response.state["clause"], "payOut");
        assert_eq!(response.state["params"], json!({"amount": 5}));
        assert!(response.state.get("currentTime").is_none());
    }

    #[tokio::test]
    async fn test_compiled_form_is_replayed() {
        let init = r#"cat >/dev/null; echo '{"state": {}, "compiled": {"id": 7}}'"#;
        let engine = shell(init);
        engine
            .compile_and_init(&bundle(), &json!({}), &json!({}), &ExecutionOptions::default())
            .await
            .unwrap();
        assert_eq!(engine.cached_compiled(), Some(json!({"id": 7})));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_engine_error() {
        let engine = shell("cat >/dev/null; echo 'clause not found' >&2; exit 4");
        let err = engine
            .compile_and_init(&bundle(), &json!({}), &json!({}), &ExecutionOptions::default())
            .await
            .unwrap_err();
        match err {
            Error::EngineError(msg) => assert_eq!(msg, "clause not found"),
            other => panic!("expected EngineError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_silent_failure_reports_status() {
        let engine = shell("cat >/dev/null; exit 3");
        let err = engine
            .compile_and_init(&bundle(), &json!({}), &json!({}), &ExecutionOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("status 3"), "got: {}", err);
    }

    #[tokio::test]
    async fn test_garbage_stdout_is_engine_error() {
        let engine = shell("cat >/dev/null; echo 'hello'");
        let err = engine
            .compile_and_init(&bundle(), &json!({}), &json!({}), &ExecutionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::EngineError(_)));
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let engine = ProcessEngine::new(EngineCommand::new("/nonexistent/clause-engine"));
        let err = engine
            .compile_and_init(&bundle(), &json!({}), &json!({}), &ExecutionOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::IoError { .. }), "got: {:?}", err);
    }

    /// Bundle whose request is far larger than a pipe buffer
    fn large_bundle() -> LogicBundle {
        let mut bundle = bundle();
        bundle.logic[0].content = "x".repeat(1 << 20);
        bundle
    }

    async fn init_within(
        engine: &ProcessEngine,
        bundle: &LogicBundle,
    ) -> Result<ExecutionResponse> {
        let contract = json!({});
        let params = json!({});
        let options = ExecutionOptions::default();
        let call = engine.compile_and_init(bundle, &contract, &params, &options);
        tokio::time::timeout(std::time::Duration::from_secs(30), call)
            .await
            .expect("engine call stalled")
    }

    #[tokio::test]
    async fn test_large_template_through_streaming_engine() {
        // answers while it is still reading its input
        let engine = shell(r#"printf '{"state": '; cat; printf '}'"#);
        let bundle = large_bundle();
        let response = init_within(&engine, &bundle).await.unwrap();
        let content = response.state["template"]["logic"][0]["content"]
            .as_str()
            .unwrap();
        assert_eq!(content.len(), 1 << 20);
    }

    #[tokio::test]
    async fn test_large_template_engine_failing_early_reports_stderr() {
        let engine = shell("echo 'unknown flag --stdio' >&2; exit 4");
        let err = init_within(&engine, &large_bundle()).await.unwrap_err();
        match err {
            Error::EngineError(msg) => assert_eq!(msg, "unknown flag --stdio"),
            other => panic!("expected EngineError, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_engine_answering_without_reading_input() {
        let engine = shell(r#"echo '{"state": {"ready": true}}'"#);
        let response = init_within(&engine, &large_bundle()).await.unwrap();
        assert_eq!(response.state, json!({"ready": true}));
    }

    #[test]
    fn test_poisoned_cache_keeps_compiled_form() {
        let engine = ProcessEngine::new(EngineCommand::new("true"));
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = engine.compiled.lock().unwrap();
            panic!("poison the cache");
        }));
        assert!(engine.compiled.is_poisoned());

        let response = ExecutionResponse {
            compiled: Some(json!({"id": 9})),
            ..ExecutionResponse::from_state(json!({}))
        };
        engine.remember_compiled(&response);
        assert_eq!(engine.cached_compiled(), Some(json!({"id": 9})));
    }

    #[test]
    fn test_factory_builds_independent_engines() {
        let factory = ProcessEngineFactory::new(EngineCommand::new("true"));
        let a = factory.create();
        if let Ok(mut guard) = a.compiled.lock() {
            *guard = Some(json!(1));
        }
        let b = factory.create();
        assert_eq!(b.cached_compiled(), None);
    }
}
