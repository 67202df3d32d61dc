//! mcp-docs-fetch: download documentation from an MCP server over stdio
//!
//! Spawns the configured MCP server, performs the `initialize` handshake and
//! either saves one document to disk (`fetch`) or prints the available
//! documents (`list`).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use mcp_docs_fetch::config::{self, Config};
use mcp_docs_fetch::error::ClientError;
use mcp_docs_fetch::mcp::client::shutdown_signal;
use mcp_docs_fetch::mcp::{ClientOptions, DocsClient, Sequencer, ToolRequest, Transport};
use mcp_docs_fetch::sink::{FileSink, PayloadSink, StdoutSink};

/// Exit code used when the run is interrupted by a signal.
const EXIT_INTERRUPTED: u8 = 130;

/// Download documentation from a document-serving MCP server.
///
/// Starts the server as a subprocess, talks JSON-RPC to it over stdio and
/// stores the result of a single tool call.
#[derive(Parser, Debug)]
#[command(name = "mcp-docs-fetch")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "CONFIG_FILE", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one document and save it to disk
    Fetch {
        /// Document to fetch (overrides `docs.doc_identifier`)
        #[arg(short, long, value_name = "ID")]
        doc: Option<String>,

        /// Output file (overrides `docs.docs_path`)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,

        /// Tool returning the document (overrides `docs.tool_name`)
        #[arg(long, value_name = "NAME")]
        tool: Option<String>,

        /// Argument key for the document id, e.g. `docName` or `name`
        #[arg(long, value_name = "KEY")]
        argument_key: Option<String>,
    },

    /// List the documents the server offers
    List {
        /// Write the listing to a file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "info" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO, // Default to info for unknown levels
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
///
/// Logs go to stderr; stdout is reserved for `list` output.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Builds the tool request and sink for the chosen command, then runs it.
async fn run(command: Command, cfg: Config) -> Result<(), ClientError> {
    let transport = Transport::spawn(&cfg.server)?;
    let options = ClientOptions::from_config(&cfg.server);
    let send_initialized = cfg.server.send_initialized;

    match command {
        Command::Fetch {
            doc,
            output,
            tool,
            argument_key,
        } => {
            let doc = doc.unwrap_or(cfg.docs.doc_identifier);
            let tool = tool.unwrap_or(cfg.docs.tool_name);
            let key = argument_key.unwrap_or(cfg.docs.argument_key);
            let sink = FileSink::new(output.unwrap_or(cfg.docs.docs_path));

            info!(doc = %doc, "Getting documentation...");
            let request = ToolRequest::document(tool, &key, &doc);
            drive(transport, Sequencer::new(request, send_initialized), sink, options).await
        }
        Command::List { output } => {
            let request = ToolRequest::new(cfg.docs.list_tool_name, serde_json::json!({}));
            let sequencer = Sequencer::new(request, send_initialized);
            match output {
                Some(path) => drive(transport, sequencer, FileSink::new(path), options).await,
                None => drive(transport, sequencer, StdoutSink, options).await,
            }
        }
    }
}

async fn drive<K: PayloadSink>(
    transport: Transport<
        tokio::process::ChildStdin,
        tokio::process::ChildStdout,
        tokio::process::ChildStderr,
    >,
    sequencer: Sequencer,
    sink: K,
    options: ClientOptions,
) -> Result<(), ClientError> {
    DocsClient::new(transport, sequencer, sink, options)
        .run_until(shutdown_signal())
        .await
}

/// Entry point for mcp-docs-fetch.
fn main() -> ExitCode {
    let args = Args::parse();

    // Load configuration
    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            if config_path.is_none() {
                if let Some(default_path) = config::default_config_path() {
                    eprintln!("\nConfig is read from: {}", default_path.display());
                }
            }
            return ExitCode::FAILURE;
        }
    };

    // Initialise logging
    let log_level = get_log_level(args.verbose, args.quiet, &cfg.logging.level);
    init_tracing(log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        server = %cfg.server.command,
        "Starting mcp-docs-fetch"
    );

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "Failed to create Tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(args.command, cfg)) {
        Ok(()) => {
            info!("Done");
            ExitCode::SUCCESS
        }
        Err(ClientError::Interrupted) => ExitCode::from(EXIT_INTERRUPTED),
        Err(e) => {
            error!(error = %e, "Failed");
            ExitCode::FAILURE
        }
    }
}
