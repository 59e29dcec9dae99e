//! Command facade — trigger, invoke, initialize and model transcoding
//!
//! Each command loads the template, resolves its JSON inputs, builds a fresh
//! engine and hands everything over. Errors from any step abort the command
//! and reach the caller untouched.
//!
//! # Trigger chaining
//!
//! ```text
//! S0 = init()  or  supplied state
//! S1 = trigger(R1, S0)
//! S2 = trigger(R2, S1)
//! ...
//! ```
//!
//! Requests run strictly one after another: each step consumes the state
//! produced by the step before it.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use serde_json::{json, Value};

use crate::config::Config;
use crate::engine::{Engine, EngineFactory, ExecutionOptions, ExecutionResponse, ProcessEngineFactory};
use crate::input::{resolve_all, JsonInput};
use crate::model::{self, CtoParser, ModelParser};
use crate::template::{load_template, FsLoader, Loader, LogicBundle, TemplateSource};
use crate::Result;

/// Inputs of [`Commands::trigger`]
#[derive(Debug, Clone)]
pub struct TriggerArgs {
    pub template: TemplateSource,
    pub contract: JsonInput,
    /// Starting state; `None` runs the contract's initialization first
    pub state: Option<JsonInput>,
    pub options: ExecutionOptions,
    pub requests: Vec<JsonInput>,
    /// Surface loader and engine warnings in the log
    pub warnings: bool,
}

/// Inputs of [`Commands::invoke`]
#[derive(Debug, Clone)]
pub struct InvokeArgs {
    pub template: TemplateSource,
    pub clause: String,
    pub contract: JsonInput,
    pub state: JsonInput,
    pub options: ExecutionOptions,
    pub params: JsonInput,
    pub warnings: bool,
}

/// Inputs of [`Commands::initialize`]
#[derive(Debug, Clone)]
pub struct InitializeArgs {
    pub template: TemplateSource,
    pub contract: JsonInput,
    pub options: ExecutionOptions,
    pub params: JsonInput,
    pub warnings: bool,
}

/// The command layer, wired to a loader, an engine factory and a model parser
pub struct Commands<L, F, P = CtoParser> {
    loader: L,
    engines: F,
    model_parser: P,
}

impl Commands<FsLoader, ProcessEngineFactory, CtoParser> {
    /// Filesystem loader and process engine as described by `config`
    pub fn from_config(config: &Config) -> Self {
        Commands::new(config.loader(), config.engine_factory())
    }
}

impl<L, F> Commands<L, F, CtoParser>
where
    L: Loader,
    F: EngineFactory,
{
    pub fn new(loader: L, engines: F) -> Self {
        Commands {
            loader,
            engines,
            model_parser: CtoParser,
        }
    }
}

impl<L, F, P> Commands<L, F, P>
where
    L: Loader,
    F: EngineFactory,
    P: ModelParser,
{
    /// Swap the parser used by the model transcoding commands
    pub fn with_model_parser<Q: ModelParser>(self, model_parser: Q) -> Commands<L, F, Q> {
        Commands {
            loader: self.loader,
            engines: self.engines,
            model_parser,
        }
    }

    async fn load(&self, template: &TemplateSource, warnings: bool) -> Result<LogicBundle> {
        let bundle = load_template(&self.loader, template).await?;
        report_warnings(warnings, &bundle.label(), &bundle.warnings);
        Ok(bundle)
    }

    /// Send a sequence of requests to a contract, threading state through
    /// them, and return the result of the last one (or of initialization when
    /// there are no requests).
    pub async fn trigger(&self, args: &TriggerArgs) -> Result<ExecutionResponse> {
        let bundle = self.load(&args.template, args.warnings).await?;
        let contract = args.contract.resolve()?;
        let requests = resolve_all(&args.requests)?;
        let engine = self.engines.create();

        let mut current = match &args.state {
            None => {
                info!("initializing {} before {} request(s)", bundle.label(), requests.len());
                engine
                    .compile_and_init(&bundle, &contract, &json!({}), &args.options)
                    .await?
            }
            Some(state) => {
                debug!("starting from supplied state {}", state.describe());
                ExecutionResponse::from_state(state.resolve()?)
            }
        };
        report_warnings(args.warnings, "init", &current.warnings);

        for (index, request) in requests.iter().enumerate() {
            debug!("request {}/{}", index + 1, requests.len());
            current = engine
                .compile_and_trigger(&bundle, &contract, request, &current.state, &args.options)
                .await?;
            report_warnings(args.warnings, "trigger", &current.warnings);
        }

        Ok(current)
    }

    /// Call one named clause against an existing state
    pub async fn invoke(&self, args: &InvokeArgs) -> Result<ExecutionResponse> {
        let bundle = self.load(&args.template, args.warnings).await?;
        let contract = args.contract.resolve()?;
        let params = args.params.resolve()?;
        let state = args.state.resolve()?;
        let engine = self.engines.create();

        info!("invoking clause {} of {}", args.clause, bundle.label());
        let response = engine
            .compile_and_invoke(&bundle, &args.clause, &contract, &params, &state, &args.options)
            .await?;
        report_warnings(args.warnings, "invoke", &response.warnings);
        Ok(response)
    }

    /// Run only the initialization phase of a contract
    pub async fn initialize(&self, args: &InitializeArgs) -> Result<ExecutionResponse> {
        let bundle = self.load(&args.template, args.warnings).await?;
        let contract = args.contract.resolve()?;
        let params = args.params.resolve()?;
        let engine = self.engines.create();

        info!("initializing {}", bundle.label());
        let response = engine
            .compile_and_init(&bundle, &contract, &params, &args.options)
            .await?;
        report_warnings(args.warnings, "init", &response.warnings);
        Ok(response)
    }

    /// Transcode a model file, returning the path of the `.ctoj` written
    pub fn parse_model_to_file_sync(&self, path: &Path) -> Result<PathBuf> {
        model::transcode_to_file_sync(&self.model_parser, path)
    }

    pub async fn parse_model_to_file(&self, path: &Path) -> Result<PathBuf> {
        model::transcode_to_file(&self.model_parser, path).await
    }
}

fn report_warnings(enabled: bool, source: &str, warnings: &[String]) {
    if !enabled {
        return;
    }
    for warning in warnings {
        warn!("{}: {}", source, warning);
    }
}
