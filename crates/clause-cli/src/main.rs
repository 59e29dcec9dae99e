use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand};
use colored::Colorize;
use log::{debug, LevelFilter};
use std::path::PathBuf;
use std::process;

use clause_core::{
    Config, EngineCommand, Error, ExecutionOptions, ExecutionResponse, InitializeArgs,
    InvokeArgs, JsonInput, TemplateSource, TriggerArgs,
};

/// Clause — run contract templates
///
/// Trigger, invoke and initialize contracts through an external engine,
/// and transcode model files to JSON.
#[derive(Parser)]
#[command(name = "clause", version, about, long_about = None)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Engine program (overrides the configuration file)
    #[arg(long, global = true, env = "CLAUSE_ENGINE")]
    engine: Option<String>,

    /// Argument passed to the engine program (repeatable)
    #[arg(long = "engine-arg", global = true, allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Log progress to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct TemplateArgs {
    /// Template directory (takes precedence over input files)
    #[arg(long)]
    template: Option<PathBuf>,

    /// Logic and model files, used when no template directory is given
    files: Vec<PathBuf>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct ContractArgs {
    /// Contract data file
    #[arg(long)]
    contract: Option<PathBuf>,
    /// Contract data as inline JSON
    #[arg(long)]
    contract_json: Option<String>,
}

#[derive(Args)]
#[group(multiple = false)]
struct StateArgs {
    /// Contract state file
    #[arg(long)]
    state: Option<PathBuf>,
    /// Contract state as inline JSON
    #[arg(long)]
    state_json: Option<String>,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct RequiredStateArgs {
    /// Contract state file
    #[arg(long)]
    state: Option<PathBuf>,
    /// Contract state as inline JSON
    #[arg(long)]
    state_json: Option<String>,
}

#[derive(Args)]
#[group(multiple = false)]
struct ParamsArgs {
    /// Parameters file (defaults to `{}`)
    #[arg(long)]
    params: Option<PathBuf>,
    /// Parameters as inline JSON
    #[arg(long)]
    params_json: Option<String>,
}

#[derive(Args)]
struct TimeArgs {
    /// The definition of 'now' (defaults to the current time)
    #[arg(long)]
    current_time: Option<String>,
    /// UTC offset in minutes (defaults to the local offset)
    #[arg(long, allow_negative_numbers = true)]
    utc_offset: Option<i32>,
}

#[derive(Subcommand)]
enum Commands {
    /// Send requests to a contract, threading state through them
    Trigger {
        #[command(flatten)]
        template: TemplateArgs,
        #[command(flatten)]
        contract: ContractArgs,
        #[command(flatten)]
        state: StateArgs,
        #[command(flatten)]
        time: TimeArgs,
        /// Request file (repeatable, keeps command-line order)
        #[arg(long = "request")]
        requests: Vec<PathBuf>,
        /// Request as inline JSON (repeatable, keeps command-line order)
        #[arg(long = "request-json")]
        request_json: Vec<String>,
        /// Print warnings
        #[arg(long)]
        warnings: bool,
    },

    /// Invoke a single clause of a contract
    Invoke {
        #[command(flatten)]
        template: TemplateArgs,
        /// Name of the clause to invoke
        #[arg(long)]
        clause: String,
        #[command(flatten)]
        contract: ContractArgs,
        #[command(flatten)]
        state: RequiredStateArgs,
        #[command(flatten)]
        params: ParamsArgs,
        #[command(flatten)]
        time: TimeArgs,
        /// Print warnings
        #[arg(long)]
        warnings: bool,
    },

    /// Compute the initial state of a contract
    Initialize {
        #[command(flatten)]
        template: TemplateArgs,
        #[command(flatten)]
        contract: ContractArgs,
        #[command(flatten)]
        params: ParamsArgs,
        #[command(flatten)]
        time: TimeArgs,
        /// Print warnings
        #[arg(long)]
        warnings: bool,
    },

    /// Transcode model files (.cto) to JSON (.ctoj)
    ParseModel {
        /// Model files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Show version information
    Version,
}

impl TemplateArgs {
    fn source(self) -> TemplateSource {
        TemplateSource::from_args(self.template, self.files)
    }
}

impl ContractArgs {
    fn input(self) -> JsonInput {
        // the arg group guarantees one of the two
        JsonInput::from_pair(self.contract, self.contract_json)
            .unwrap_or_else(|| JsonInput::inline("{}"))
    }
}

impl RequiredStateArgs {
    fn input(self) -> JsonInput {
        JsonInput::from_pair(self.state, self.state_json)
            .unwrap_or_else(|| JsonInput::inline("{}"))
    }
}

impl ParamsArgs {
    fn input(self) -> JsonInput {
        JsonInput::from_pair(self.params, self.params_json)
            .unwrap_or_else(|| JsonInput::inline("{}"))
    }
}

impl TimeArgs {
    fn options(self) -> ExecutionOptions {
        ExecutionOptions {
            current_time: self.current_time,
            utc_offset: self.utc_offset,
        }
    }
}

/// Merge `--request` and `--request-json` values back into command-line order
fn ordered_requests(
    matches: Option<&ArgMatches>,
    files: Vec<PathBuf>,
    inline: Vec<String>,
) -> Vec<JsonInput> {
    let positions = |id: &str| -> Vec<usize> {
        matches
            .and_then(|m| m.indices_of(id))
            .map(|indices| indices.collect())
            .unwrap_or_default()
    };
    let file_positions = positions("requests");
    let inline_positions = positions("request_json");

    let mut tagged: Vec<(usize, JsonInput)> = Vec::with_capacity(files.len() + inline.len());
    for (i, path) in files.into_iter().enumerate() {
        let at = file_positions.get(i).copied().unwrap_or(usize::MAX);
        tagged.push((at, JsonInput::File(path)));
    }
    for (i, text) in inline.into_iter().enumerate() {
        let at = inline_positions.get(i).copied().unwrap_or(usize::MAX);
        tagged.push((at, JsonInput::Inline(text)));
    }
    tagged.sort_by_key(|(at, _)| *at);
    tagged.into_iter().map(|(_, input)| input).collect()
}

fn init_logger(verbose: bool) {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp(None)
        .parse_default_env() // RUST_LOG overrides
        .init();
}

fn load_config(cli: &Cli) -> clause_core::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(program) = &cli.engine {
        config.engine = EngineCommand::new(program.clone());
    }
    if !cli.engine_args.is_empty() {
        config.engine.args = cli.engine_args.clone();
    }
    debug!("engine: {} {:?}", config.engine.program, config.engine.args);
    Ok(config)
}

fn print_response(response: &ExecutionResponse, warnings: bool) -> clause_core::Result<()> {
    if warnings {
        for warning in &response.warnings {
            eprintln!("{} {}", "warning:".yellow().bold(), warning);
        }
    }
    let text = serde_json::to_string_pretty(response)
        .map_err(|e| Error::EngineError(format!("cannot encode result: {}", e)))?;
    println!("{}", text);
    Ok(())
}

async fn run(cli: Cli, matches: &ArgMatches) -> clause_core::Result<()> {
    let config = load_config(&cli)?;
    let commands = clause_core::Commands::from_config(&config);

    match cli.command {
        Commands::Trigger {
            template,
            contract,
            state,
            time,
            requests,
            request_json,
            warnings,
        } => {
            let args = TriggerArgs {
                template: template.source(),
                contract: contract.input(),
                state: JsonInput::from_pair(state.state, state.state_json),
                options: time.options(),
                requests: ordered_requests(
                    matches.subcommand_matches("trigger"),
                    requests,
                    request_json,
                ),
                warnings,
            };
            let response = commands.trigger(&args).await?;
            print_response(&response, warnings)
        }
        Commands::Invoke {
            template,
            clause,
            contract,
            state,
            params,
            time,
            warnings,
        } => {
            let args = InvokeArgs {
                template: template.source(),
                clause,
                contract: contract.input(),
                state: state.input(),
                options: time.options(),
                params: params.input(),
                warnings,
            };
            let response = commands.invoke(&args).await?;
            print_response(&response, warnings)
        }
        Commands::Initialize {
            template,
            contract,
            params,
            time,
            warnings,
        } => {
            let args = InitializeArgs {
                template: template.source(),
                contract: contract.input(),
                options: time.options(),
                params: params.input(),
                warnings,
            };
            let response = commands.initialize(&args).await?;
            print_response(&response, warnings)
        }
        Commands::ParseModel { files } => {
            for file in files {
                let out = commands.parse_model_to_file(&file).await?;
                println!("{}", out.display());
            }
            Ok(())
        }
        Commands::Version => {
            println!(
                "clause {} (clause-core {})",
                env!("CARGO_PKG_VERSION"),
                clause_core::VERSION
            );
            Ok(())
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let matches = Cli::command().get_matches();
    let cli = match Cli::from_arg_matches(&matches) {
        Ok(cli) => cli,
        Err(err) => err.exit(),
    };
    init_logger(cli.verbose);

    let exit_code = match run(cli, &matches).await {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            err.exit_code()
        }
    };

    process::exit(exit_code);
}
