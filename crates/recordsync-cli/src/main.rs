// crates/recordsync-cli/src/main.rs
// ============================================================================
// Module: recordsync CLI Entry Point
// Description: Command dispatcher for configuration checks and batch plans.
// Purpose: Wire config, store, audit sink and engine behind a local CLI.
// Dependencies: clap, recordsync-config, recordsync-core, recordsync-store-sqlite, serde
// ============================================================================

//! ## Overview
//! The `recordsync` binary loads `recordsync.toml`, opens the configured
//! store, and runs one engine operation per invocation. Batch operations read
//! a JSON plan file; every result is written to stdout as JSON. Plan files are
//! untrusted input and are read under a hard size limit.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use recordsync_config::RecordSyncConfig;
use recordsync_config::StoreType;
use recordsync_core::AssociationLinker;
use recordsync_core::BranchMarker;
use recordsync_core::DesiredEntity;
use recordsync_core::FieldMap;
use recordsync_core::InMemoryStore;
use recordsync_core::ParentKey;
use recordsync_core::Record;
use recordsync_core::ReconcileEngine;
use recordsync_core::ReconcileReport;
use recordsync_core::StoreGateway;
use recordsync_store_sqlite::SqliteRecordStore;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum plan file size in bytes.
const MAX_PLAN_FILE_SIZE: usize = 16 * 1024 * 1024;
/// Marker field written by `get-or-create` when none is given.
const DEFAULT_MARKER_FIELD: &str = "Description";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "recordsync", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to `RECORDSYNC_CONFIG` or recordsync.toml).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Reconcile a desired batch by natural key.
    Reconcile(PlanCommand),
    /// Reconcile a child batch and link each child to its parent.
    Link(PlanCommand),
    /// Find or create one record, writing a branch marker.
    GetOrCreate(GetOrCreateCommand),
    /// Find one record by natural key.
    Find(FindCommand),
}

/// Configuration subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration file.
    Validate,
}

/// Arguments for commands that run a JSON plan file.
#[derive(Args, Debug)]
struct PlanCommand {
    /// Plan file path.
    #[arg(long, value_name = "FILE")]
    input: PathBuf,
}

/// Arguments for `get-or-create`.
#[derive(Args, Debug)]
struct GetOrCreateCommand {
    /// Declared entity type.
    #[arg(long, value_name = "TYPE")]
    entity_type: String,
    /// Natural key.
    #[arg(long, value_name = "KEY")]
    key: String,
    /// Field receiving the branch marker.
    #[arg(long, value_name = "FIELD", default_value = DEFAULT_MARKER_FIELD)]
    marker_field: String,
}

/// Arguments for `find`.
#[derive(Args, Debug)]
struct FindCommand {
    /// Declared entity type.
    #[arg(long, value_name = "TYPE")]
    entity_type: String,
    /// Natural key.
    #[arg(long, value_name = "KEY")]
    key: String,
}

// ============================================================================
// SECTION: Plan Files
// ============================================================================

/// Input of `reconcile`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReconcilePlan {
    /// Declared entity type of the batch.
    entity_type: String,
    /// Desired entities.
    desired: Vec<DesiredEntity>,
}

/// Input of `link`.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LinkPlan {
    /// Declared child entity type.
    entity_type: String,
    /// Desired children.
    desired: Vec<DesiredEntity>,
    /// Declared parent entity type.
    parent_type: String,
    /// Child field holding the parent natural key.
    parent_key_field: String,
    /// Child field receiving the parent identifier.
    foreign_key_field: String,
    /// Fields written on parents created by the link.
    #[serde(default)]
    parent_defaults: FieldMap,
}

// ============================================================================
// SECTION: Outputs
// ============================================================================

/// Output of `link`.
#[derive(Debug, Serialize)]
struct LinkOutput {
    /// Reconciled children.
    children: ReconcileReport,
    /// Parents created for unmatched parent keys.
    created_parents: Vec<Record>,
    /// Children assigned a parent.
    linked: usize,
    /// Children without a parent key.
    skipped: usize,
}

/// Output of `get-or-create`.
#[derive(Debug, Serialize)]
struct GetOrCreateOutput {
    /// Persisted record.
    record: Record,
    /// Branch taken.
    marker: BranchMarker,
}

/// Output of `config validate`.
#[derive(Debug, Serialize)]
struct ConfigSummary {
    /// Store backend name.
    store: &'static str,
    /// Declared entity types.
    entities: Vec<String>,
    /// Effective batch limit.
    max_batch_size: usize,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper for user-facing messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`].
    const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Errors returned by bounded file reads.
#[derive(Debug, Error)]
enum ReadLimitError {
    /// File I/O failure.
    #[error("{0}")]
    Io(std::io::Error),
    /// File size exceeds the configured limit.
    #[error("file is {size} bytes, limit is {limit}")]
    TooLarge {
        /// Actual size in bytes.
        size: u64,
        /// Allowed limit in bytes.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Commands::Config {
            command: ConfigCommand::Validate,
        } => write_json(&config_summary(&config)),
        Commands::Reconcile(command) => {
            let plan: ReconcilePlan = read_plan(&command.input)?;
            let engine = build_engine(&config)?;
            write_json(&execute_reconcile(&engine, &config, &plan)?)
        }
        Commands::Link(command) => {
            let plan: LinkPlan = read_plan(&command.input)?;
            let engine = build_engine(&config)?;
            write_json(&execute_link(&engine, &config, &plan)?)
        }
        Commands::GetOrCreate(command) => {
            let engine = build_engine(&config)?;
            write_json(&execute_get_or_create(&engine, &config, &command)?)
        }
        Commands::Find(command) => {
            let engine = build_engine(&config)?;
            write_json(&execute_find(&engine, &config, &command)?)
        }
    }
}

// ============================================================================
// SECTION: Wiring
// ============================================================================

/// Loads and validates the configuration.
fn load_config(path: Option<&Path>) -> CliResult<RecordSyncConfig> {
    RecordSyncConfig::load(path)
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Opens the configured store with the configured write rules.
fn open_store(config: &RecordSyncConfig) -> CliResult<Box<dyn StoreGateway>> {
    let rules = config.store_rules();
    match config.store.store_type {
        StoreType::Memory => Ok(Box::new(InMemoryStore::with_rules(rules))),
        StoreType::Sqlite => {
            let settings = config.store.sqlite_config().ok_or_else(|| {
                CliError::new("sqlite store requires store.path".to_string())
            })?;
            let store = SqliteRecordStore::open(settings)
                .map_err(|err| CliError::new(format!("failed to open store: {err}")))?;
            Ok(Box::new(store.with_rules(rules)))
        }
    }
}

/// Builds the engine over the configured store and audit sink.
fn build_engine(config: &RecordSyncConfig) -> CliResult<ReconcileEngine<Box<dyn StoreGateway>>> {
    let store = open_store(config)?;
    let audit = config
        .audit
        .build_sink()
        .map_err(|err| CliError::new(format!("failed to open audit sink: {err}")))?;
    Ok(ReconcileEngine::new(store, config.engine_config()).with_audit(audit))
}

/// Summarizes a validated configuration.
fn config_summary(config: &RecordSyncConfig) -> ConfigSummary {
    ConfigSummary {
        store: match config.store.store_type {
            StoreType::Memory => "memory",
            StoreType::Sqlite => "sqlite",
        },
        entities: config.entities.iter().map(|entity| entity.entity_type.clone()).collect(),
        max_batch_size: config.reconcile.max_batch_size,
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Runs a `reconcile` plan.
fn execute_reconcile<S: StoreGateway>(
    engine: &ReconcileEngine<S>,
    config: &RecordSyncConfig,
    plan: &ReconcilePlan,
) -> CliResult<ReconcileReport> {
    let schema = config.schema(&plan.entity_type).map_err(config_error)?;
    engine.reconcile(&schema, &plan.desired, |_, _, _| {}).map_err(engine_error)
}

/// Runs a `link` plan.
fn execute_link<S: StoreGateway>(
    engine: &ReconcileEngine<S>,
    config: &RecordSyncConfig,
    plan: &LinkPlan,
) -> CliResult<LinkOutput> {
    let child_schema = config.schema(&plan.entity_type).map_err(config_error)?;
    let parent_schema = config.schema(&plan.parent_type).map_err(config_error)?;
    let linker = AssociationLinker::new(
        parent_schema,
        plan.foreign_key_field.as_str(),
        ParentKey::field(plan.parent_key_field.as_str()),
    )
    .with_parent_defaults(plan.parent_defaults.clone());
    let report = engine
        .reconcile_with_parents(&child_schema, &plan.desired, &linker, |_, _, _| {})
        .map_err(engine_error)?;
    Ok(LinkOutput {
        children: report.children,
        created_parents: report.created_parents,
        linked: report.linked,
        skipped: report.skipped,
    })
}

/// Runs `get-or-create`.
fn execute_get_or_create<S: StoreGateway>(
    engine: &ReconcileEngine<S>,
    config: &RecordSyncConfig,
    command: &GetOrCreateCommand,
) -> CliResult<GetOrCreateOutput> {
    let schema = config.schema(&command.entity_type).map_err(config_error)?;
    let outcome =
        engine.get_or_create(&schema, &command.key, &command.marker_field).map_err(engine_error)?;
    Ok(GetOrCreateOutput {
        record: outcome.record,
        marker: outcome.marker,
    })
}

/// Runs `find`.
fn execute_find<S: StoreGateway>(
    engine: &ReconcileEngine<S>,
    config: &RecordSyncConfig,
    command: &FindCommand,
) -> CliResult<Record> {
    let schema = config.schema(&command.entity_type).map_err(config_error)?;
    engine.find_by_key(&schema, &command.key).map_err(engine_error)
}

/// Maps a configuration lookup failure.
fn config_error(err: recordsync_config::ConfigError) -> CliError {
    CliError::new(err.to_string())
}

/// Maps an engine failure.
fn engine_error(err: recordsync_core::ReconcileError) -> CliError {
    CliError::new(format!("operation failed: {err}"))
}

// ============================================================================
// SECTION: Input
// ============================================================================

/// Reads and parses a JSON plan file.
fn read_plan<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, MAX_PLAN_FILE_SIZE).map_err(|err| {
        CliError::new(format!("failed to read plan {}: {err}", path.display()))
    })?;
    serde_json::from_slice(&bytes)
        .map_err(|err| CliError::new(format!("invalid plan {}: {err}", path.display())))
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path).map_err(ReadLimitError::Io)?;
    let size = file.metadata().map_err(ReadLimitError::Io)?.len();
    let limit = u64::try_from(max_bytes).map_err(|_| ReadLimitError::TooLarge {
        size,
        limit: max_bytes,
    })?;
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut limited = file.take(limit.saturating_add(1));
    let mut bytes = Vec::new();
    limited.read_to_end(&mut bytes).map_err(ReadLimitError::Io)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

// ============================================================================
// SECTION: Output
// ============================================================================

/// Writes a value to stdout as pretty JSON.
fn write_json<T: Serialize>(value: &T) -> CliResult<ExitCode> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to encode output: {err}")))?;
    write_stdout_line(&text)
        .map_err(|err| CliError::new(format!("failed to write stdout: {err}")))?;
    Ok(ExitCode::SUCCESS)
}

/// Writes a single line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a single line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
