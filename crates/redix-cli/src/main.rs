// crates/redix-cli/src/main.rs
// ============================================================================
// Module: Redix CLI Entry Point
// Description: Command dispatcher for the Redix MCP gateway.
// Purpose: Run the MCP server and one-shot tool calls from the shell.
// Dependencies: clap, redix-config, redix-mcp, serde_json, thiserror, tokio
// ============================================================================

//! ## Overview
//! The `redix-mcp` binary serves the MCP tool surface over the configured
//! transport, prints the tool catalogue, or runs a single tool call and
//! prints the resulting decision record. Security posture: argument files
//! are untrusted and read with a hard size limit.

// ============================================================================
// SECTION: Modules
// ============================================================================


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
use redix_config::ConfigError;
use redix_config::RedixConfig;
use redix_mcp::McpServer;
use redix_mcp::McpServerError;
use redix_mcp::ToolError;
use redix_mcp::tools::tool_definitions;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum size of a `--args-file` payload.
const MAX_ARGS_FILE_BYTES: usize = 64 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "redix-mcp", version, disable_help_subcommand = true)]
struct Cli {
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the MCP server on the configured transport.
    Serve(ServeCommand),
    /// Print the tool catalogue as JSON.
    Tools,
    /// Run one tool call and print the decision record.
    Call(CallCommand),
}

/// Configuration for the `serve` command.
#[derive(Args, Debug)]
struct ServeCommand {
    /// Optional config file path (defaults to redix-mcp.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Configuration for the `call` command.
#[derive(Args, Debug)]
struct CallCommand {
    /// Tool name, for example `validate_x12`.
    #[arg(value_name = "TOOL")]
    tool: String,
    /// Tool arguments as inline JSON.
    #[arg(long, value_name = "JSON", conflicts_with = "args_file")]
    args: Option<String>,
    /// Tool arguments read from a JSON file.
    #[arg(long, value_name = "PATH")]
    args_file: Option<PathBuf>,
    /// Optional config file path (defaults to redix-mcp.toml or env override).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI failures; each is reported on stderr with exit code 1.
#[derive(Debug, Error)]
enum CliError {
    /// Configuration could not be loaded.
    #[error("failed to load config: {0}")]
    Config(#[from] ConfigError),
    /// Server setup or transport failure.
    #[error("server failed: {0}")]
    Server(#[from] McpServerError),
    /// Tool arguments were not usable.
    #[error("invalid tool arguments: {0}")]
    Arguments(String),
    /// The tool call was rejected before producing a record.
    #[error("tool call rejected: {0}")]
    Tool(#[from] ToolError),
    /// Background task failed to complete.
    #[error("worker failed: {0}")]
    Join(String),
    /// Output could not be written.
    #[error("failed to write {stream}: {error}")]
    Output {
        /// Stream name.
        stream: &'static str,
        /// Underlying I/O error.
        error: std::io::Error,
    },
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Executes the CLI command dispatcher.
async fn run(cli: Cli) -> CliResult<ExitCode> {
    match cli.command {
        Commands::Serve(command) => command_serve(command).await,
        Commands::Tools => command_tools(),
        Commands::Call(command) => command_call(command).await,
    }
}

// ============================================================================
// SECTION: Commands
// ============================================================================

/// Loads configuration and serves until the transport stops.
async fn command_serve(command: ServeCommand) -> CliResult<ExitCode> {
    let config = RedixConfig::load(command.config.as_deref())?;
    let server = tokio::task::spawn_blocking(move || McpServer::from_config(config))
        .await
        .map_err(|err| CliError::Join(format!("init join failed: {err}")))??;
    server.serve().await?;
    Ok(ExitCode::SUCCESS)
}

/// Prints the tool catalogue.
fn command_tools() -> CliResult<ExitCode> {
    let rendered = serde_json::to_string_pretty(&tool_definitions())
        .map_err(|err| CliError::Arguments(err.to_string()))?;
    write_stdout_line(&rendered)?;
    Ok(ExitCode::SUCCESS)
}

/// Runs one tool call and prints the decision record.
async fn command_call(command: CallCommand) -> CliResult<ExitCode> {
    let arguments = resolve_arguments(command.args.as_deref(), command.args_file.as_deref())?;
    let config = RedixConfig::load(command.config.as_deref())?;
    let tool = command.tool;
    let record = tokio::task::spawn_blocking(move || -> CliResult<Value> {
        let server = McpServer::from_config(config)?;
        Ok(server.router().handle_tool_call(&tool, arguments, None)?)
    })
    .await
    .map_err(|err| CliError::Join(format!("call join failed: {err}")))??;
    let rendered =
        serde_json::to_string_pretty(&record).map_err(|err| CliError::Arguments(err.to_string()))?;
    write_stdout_line(&rendered)?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves tool arguments from inline JSON or a file; none means `{}`.
fn resolve_arguments(inline: Option<&str>, file: Option<&Path>) -> CliResult<Value> {
    let text = match (inline, file) {
        (Some(inline), _) => inline.to_string(),
        (None, Some(path)) => {
            let bytes = read_bytes_with_limit(path, MAX_ARGS_FILE_BYTES)?;
            String::from_utf8(bytes).map_err(|_| {
                CliError::Arguments(format!("{} is not valid utf-8", path.display()))
            })?
        }
        (None, None) => return Ok(Value::Object(serde_json::Map::new())),
    };
    let value: Value =
        serde_json::from_str(&text).map_err(|err| CliError::Arguments(err.to_string()))?;
    if !value.is_object() {
        return Err(CliError::Arguments("arguments must be a JSON object".to_string()));
    }
    Ok(value)
}

/// Reads a file from disk while enforcing a hard size limit.
fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> CliResult<Vec<u8>> {
    let read_failed =
        |err: std::io::Error| CliError::Arguments(format!("failed to read {}: {err}", path.display()));
    let file = File::open(path).map_err(read_failed)?;
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes).map_err(read_failed)?;
    if bytes.len() > max_bytes {
        return Err(CliError::Arguments(format!(
            "{} exceeds the {max_bytes} byte limit",
            path.display()
        )));
    }
    Ok(bytes)
}

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> CliResult<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}").map_err(|error| CliError::Output {
        stream: "stdout",
        error,
    })
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let mut stderr = std::io::stderr();
    let _ = writeln!(&mut stderr, "redix-mcp: {message}");
    ExitCode::FAILURE
}
