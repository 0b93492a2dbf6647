//! uhflux CLI - Command-line interface for Ultrahuman Flux
//!
//! Commands:
//! - extract: Flatten a saved daily metrics payload into the canonical mapping
//! - entities: Project a saved payload into entities and their current states
//! - infer: Show the inferred schema for metric names
//! - fetch: Fetch one day from the API and print its entity states
//! - poll: Refresh on an interval and print entity states after every cycle
//! - validate-token: Check an API token against the API

use chrono::Utc;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

use ultrahuman_flux::config::ClientConfig;
use ultrahuman_flux::coordinator::Coordinator;
use ultrahuman_flux::extractor::{extract, parse_date};
use ultrahuman_flux::pipeline::{process_daily_value, DailySnapshot};
use ultrahuman_flux::types::{CanonicalMapping, EntityState, MetricSchema};
use ultrahuman_flux::{
    infer, ComputeError, DateQuery, FetchError, MetricsSource, UltrahumanClient, FLUX_VERSION,
};

/// uhflux - Ultrahuman ring metrics as typed, named readings
#[derive(Parser)]
#[command(name = "uhflux")]
#[command(author = "Synheart AI Inc")]
#[command(version = FLUX_VERSION)]
#[command(about = "Flatten Ultrahuman daily metrics into entities", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Flatten a saved daily metrics payload into the canonical mapping
    Extract {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Day to extract (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Project a saved payload into entities and their current states
    Entities {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Day to extract (YYYY-MM-DD)
        #[arg(long)]
        date: String,

        /// Identifier used to build entity unique ids
        #[arg(long, default_value = "local")]
        entry_id: String,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Show the inferred schema for metric names
    Infer {
        /// Metric names
        #[arg(required = true)]
        names: Vec<String>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Fetch one day from the API and print its entity states
    Fetch {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Day to fetch (YYYY-MM-DD, defaults to today)
        #[arg(long, conflicts_with_all = ["start_epoch", "end_epoch"])]
        date: Option<String>,

        /// Window start (unix seconds)
        #[arg(long, requires = "end_epoch")]
        start_epoch: Option<i64>,

        /// Window end (unix seconds)
        #[arg(long, requires = "start_epoch")]
        end_epoch: Option<i64>,

        /// Output format
        #[arg(long, default_value = "json-pretty")]
        output_format: OutputFormat,
    },

    /// Refresh on an interval and print entity states after every cycle
    Poll {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Always fetch this day (YYYY-MM-DD) instead of today
        #[arg(long)]
        date: Option<String>,

        /// Output format
        #[arg(long, default_value = "ndjson")]
        output_format: OutputFormat,
    },

    /// Check an API token against the API
    ValidateToken {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
}

#[derive(Args)]
struct ConnectionArgs {
    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Partner API token
    #[arg(long, env = "ULTRAHUMAN_API_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Daily metrics endpoint URL
    #[arg(long)]
    endpoint: Option<String>,

    /// Request timeout in seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Refresh interval in seconds
    #[arg(long)]
    interval: Option<u64>,

    /// Identifier used to build entity unique ids
    #[arg(long)]
    entry_id: Option<String>,
}

impl ConnectionArgs {
    /// Load the config file, if any, then apply flag overrides
    fn resolve(self) -> Result<ClientConfig, FluxCliError> {
        let mut config = match &self.config {
            Some(path) => ClientConfig::from_file(path)?,
            None => ClientConfig::default(),
        };
        if let Some(token) = self.token {
            config.api_token = token;
        }
        if let Some(endpoint) = self.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(timeout) = self.timeout {
            config.timeout_secs = timeout;
        }
        if let Some(interval) = self.interval {
            config.poll_interval_secs = interval;
        }
        if let Some(entry_id) = self.entry_id {
            config.entry_id = Some(entry_id);
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Newline-delimited JSON (one record per line)
    Ndjson,
    /// JSON array of records
    Json,
    /// Pretty-printed JSON
    JsonPretty,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.json_logs);

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!(
                "{}",
                serde_json::to_string(&CliError::from(e))
                    .unwrap_or_else(|_| "Unknown error".to_string())
            );
            ExitCode::FAILURE
        }
    }
}

fn init_logging(json_logs: bool) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("ultrahuman_flux=info,uhflux=info"));

    if json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .compact()
            .with_writer(io::stderr)
            .init();
    }
}

fn run(command: Commands) -> Result<(), FluxCliError> {
    match command {
        Commands::Extract {
            input,
            date,
            output_format,
        } => cmd_extract(&input, &date, output_format),

        Commands::Entities {
            input,
            date,
            entry_id,
            output_format,
        } => cmd_entities(&input, &date, &entry_id, output_format),

        Commands::Infer {
            names,
            output_format,
        } => cmd_infer(&names, output_format),

        Commands::Fetch {
            connection,
            date,
            start_epoch,
            end_epoch,
            output_format,
        } => {
            let query = match (date, start_epoch, end_epoch) {
                (_, Some(start), Some(end)) => DateQuery::EpochRange { start, end },
                (Some(date), _, _) => DateQuery::Date(parse_date(&date)?),
                _ => DateQuery::today(),
            };
            block_on(cmd_fetch(connection.resolve()?, query, output_format))
        }

        Commands::Poll {
            connection,
            date,
            output_format,
        } => {
            let date = date.as_deref().map(parse_date).transpose()?;
            block_on(cmd_poll(connection.resolve()?, date, output_format))
        }

        Commands::ValidateToken { connection } => {
            block_on(cmd_validate_token(connection.resolve()?))
        }
    }
}

/// Drive a command on a single-threaded runtime
fn block_on<F>(future: F) -> Result<(), FluxCliError>
where
    F: std::future::Future<Output = Result<(), FluxCliError>>,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(future)
}

fn cmd_extract(input: &Path, date: &str, output_format: OutputFormat) -> Result<(), FluxCliError> {
    let date = parse_date(date)?;
    let raw: serde_json::Value = serde_json::from_str(&read_input(input)?)?;
    let mapping = extract(&raw, date);

    if mapping.is_empty() {
        info!(date = %date, "No metrics found for date");
    }
    print!("{}", format_output(&[mapping], &output_format)?);
    Ok(())
}

fn cmd_entities(
    input: &Path,
    date: &str,
    entry_id: &str,
    output_format: OutputFormat,
) -> Result<(), FluxCliError> {
    let date = parse_date(date)?;
    let raw: serde_json::Value = serde_json::from_str(&read_input(input)?)?;
    let snapshot: DailySnapshot = process_daily_value(&raw, date, entry_id);

    print!("{}", format_output(&[snapshot], &output_format)?);
    Ok(())
}

fn cmd_infer(names: &[String], output_format: OutputFormat) -> Result<(), FluxCliError> {
    let schemas: Vec<MetricSchema> = names.iter().map(|name| infer(name)).collect();
    print!("{}", format_output(&schemas, &output_format)?);
    Ok(())
}

async fn cmd_fetch(
    mut config: ClientConfig,
    query: DateQuery,
    output_format: OutputFormat,
) -> Result<(), FluxCliError> {
    let entry_id = config.ensure_entry_id().to_string();
    let target = query.target_date().ok_or(FluxCliError::InvalidWindow)?;
    let client = UltrahumanClient::new(config)?;

    let raw = client.fetch(&query).await?.unwrap_or(serde_json::Value::Null);
    let snapshot = process_daily_value(&raw, target, &entry_id);

    print!("{}", format_output(&[snapshot], &output_format)?);
    Ok(())
}

/// One line of `poll` output
#[derive(Serialize)]
struct PollRecord {
    refreshed_at: String,
    ok: bool,
    error: Option<String>,
    metrics: usize,
    states: Vec<EntityState>,
}

async fn cmd_poll(
    mut config: ClientConfig,
    date: Option<chrono::NaiveDate>,
    output_format: OutputFormat,
) -> Result<(), FluxCliError> {
    let entry_id = config.ensure_entry_id().to_string();
    let interval = config.poll_interval();
    let client = UltrahumanClient::new(config)?;

    let mut coordinator = Coordinator::new(client, &entry_id, interval);
    if let Some(date) = date {
        coordinator = coordinator.with_date(date);
    }

    let shutdown = async {
        // Without a signal handler, run until killed
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    let mut write_error: Option<io::Error> = None;
    coordinator
        .run(shutdown, |coordinator, result| {
            let mapping: std::sync::Arc<CanonicalMapping> = coordinator.current_mapping();
            let record = PollRecord {
                refreshed_at: Utc::now().to_rfc3339(),
                ok: result.is_ok(),
                error: result.as_ref().err().map(|e| e.to_string()),
                metrics: mapping.len(),
                states: coordinator.states(),
            };
            let written = format_output(&[record], &output_format)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{e:?}")))
                .and_then(|out| {
                    let mut stdout = io::stdout();
                    write!(stdout, "{}", out)?;
                    stdout.flush()
                });
            if let Err(e) = written {
                write_error.get_or_insert(e);
            }
        })
        .await;

    match write_error {
        Some(e) => Err(FluxCliError::Io(e)),
        None => Ok(()),
    }
}

async fn cmd_validate_token(config: ClientConfig) -> Result<(), FluxCliError> {
    let client = UltrahumanClient::new(config)?;
    match client.validate_token().await {
        Ok(()) => {
            println!("Token is valid");
            Ok(())
        }
        Err(FetchError::Auth) => Err(FluxCliError::InvalidAuth),
        Err(e) => Err(FluxCliError::CannotConnect(e.to_string())),
    }
}

// Helper functions

fn read_input(input: &Path) -> Result<String, FluxCliError> {
    if input.to_string_lossy() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(fs::read_to_string(input)?)
    }
}

fn format_output<T: Serialize>(records: &[T], format: &OutputFormat) -> Result<String, FluxCliError> {
    match format {
        OutputFormat::Ndjson => {
            let mut lines: Vec<String> = Vec::new();
            for record in records {
                lines.push(serde_json::to_string(record)?);
            }
            Ok(lines.join("\n") + "\n")
        }
        OutputFormat::Json => match records {
            [single] => Ok(serde_json::to_string(single)? + "\n"),
            _ => Ok(serde_json::to_string(records)? + "\n"),
        },
        OutputFormat::JsonPretty => match records {
            [single] => Ok(serde_json::to_string_pretty(single)? + "\n"),
            _ => Ok(serde_json::to_string_pretty(records)? + "\n"),
        },
    }
}

// Error types

#[derive(Debug)]
enum FluxCliError {
    Io(io::Error),
    Compute(ComputeError),
    Fetch(FetchError),
    Json(serde_json::Error),
    InvalidWindow,
    InvalidAuth,
    CannotConnect(String),
}

impl From<io::Error> for FluxCliError {
    fn from(e: io::Error) -> Self {
        FluxCliError::Io(e)
    }
}

impl From<ComputeError> for FluxCliError {
    fn from(e: ComputeError) -> Self {
        FluxCliError::Compute(e)
    }
}

impl From<FetchError> for FluxCliError {
    fn from(e: FetchError) -> Self {
        FluxCliError::Fetch(e)
    }
}

impl From<serde_json::Error> for FluxCliError {
    fn from(e: serde_json::Error) -> Self {
        FluxCliError::Json(e)
    }
}

#[derive(Serialize)]
struct CliError {
    code: String,
    message: String,
    hint: Option<String>,
}

impl From<FluxCliError> for CliError {
    fn from(e: FluxCliError) -> Self {
        match e {
            FluxCliError::Io(e) => CliError {
                code: "IO_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check file paths and permissions".to_string()),
            },
            FluxCliError::Compute(ComputeError::ConfigError(msg)) => CliError {
                code: "CONFIG_ERROR".to_string(),
                message: msg,
                hint: Some("Pass --token or set ULTRAHUMAN_API_TOKEN".to_string()),
            },
            FluxCliError::Compute(e) => CliError {
                code: "PARSE_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check dates are YYYY-MM-DD and input is valid JSON".to_string()),
            },
            FluxCliError::Fetch(e) => {
                let hint = if e.is_fatal() {
                    "Check the API token and its scopes"
                } else {
                    "The API may be unavailable; retry later"
                };
                CliError {
                    code: "FETCH_ERROR".to_string(),
                    message: e.to_string(),
                    hint: Some(hint.to_string()),
                }
            }
            FluxCliError::Json(e) => CliError {
                code: "JSON_ERROR".to_string(),
                message: e.to_string(),
                hint: Some("Check JSON syntax".to_string()),
            },
            FluxCliError::InvalidWindow => CliError {
                code: "INVALID_WINDOW".to_string(),
                message: "Epoch window start is out of range".to_string(),
                hint: None,
            },
            FluxCliError::InvalidAuth => CliError {
                code: "INVALID_AUTH".to_string(),
                message: "The API rejected the token".to_string(),
                hint: Some("Generate a new partner API token".to_string()),
            },
            FluxCliError::CannotConnect(msg) => CliError {
                code: "CANNOT_CONNECT".to_string(),
                message: msg,
                hint: Some("Check network access to the Ultrahuman API".to_string()),
            },
        }
    }
}
