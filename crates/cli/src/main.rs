//! Parley CLI entry point.
//!
//! Commands:
//! - `assemble`: Build the prompt for a request without calling inference
//! - `chat`: Answer one user turn through the configured provider
//! - `chunk`: Split a document into chunks, optionally indexing them
//! - `config`: Show the effective or default configuration

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use parley_config::{AppConfig, LoggingConfig};

mod commands;
mod request;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Parley: budget-aware context assembly for LLM chat",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.parley/config.toml)
    #[arg(short, long, global = true, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble the prompt for a request and print it as JSON
    Assemble {
        /// Request file (JSON); `-` reads stdin
        #[arg(short, long)]
        request: PathBuf,
    },

    /// Send one user turn to the configured provider
    Chat {
        /// Request file (JSON); `-` reads stdin
        #[arg(short, long)]
        request: PathBuf,

        /// Condense dropped history right after replying, when requested
        #[arg(long)]
        summarize: bool,
    },

    /// Split a text document into chunks
    Chunk {
        /// Identifier recorded on every chunk
        #[arg(short, long)]
        document_id: String,

        /// Text file to split
        file: PathBuf,

        /// Override the configured chunk size, in estimated tokens
        #[arg(short, long)]
        target: Option<usize>,

        /// Store the chunks in the configured index
        #[arg(long)]
        index: bool,
    },

    /// Show configuration
    Config {
        /// Print the built-in defaults instead of the effective config
        #[arg(long)]
        default: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => AppConfig::load_with_env(path)?,
        None => AppConfig::load()?,
    };

    init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Assemble { request } => commands::assemble::run(&config, &request).await?,
        Commands::Chat { request, summarize } => {
            commands::chat::run(&config, &request, summarize).await?
        }
        Commands::Chunk {
            document_id,
            file,
            target,
            index,
        } => commands::chunk::run(&config, &document_id, &file, target, index).await?,
        Commands::Config { default } => commands::config_cmd::run(&config, default)?,
    }

    Ok(())
}

/// Logs go to stderr; stdout is reserved for command output.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose { "debug" } else { logging.level.as_str() };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}
