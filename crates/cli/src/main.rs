//! LoreWeave CLI: the main entry point.
//!
//! Commands:
//! - `build`   : Build a prompt from a JSON request file
//! - `estimate`: Estimate the token count of some text
//! - `limits`  : Show resolved model limits
//! - `config`  : Show, locate or validate the configuration

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "loreweave",
    about = "LoreWeave: prompt assembly and context budgeting for character chat",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "LOREWEAVE_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a prompt from a JSON request and print the result as JSON
    Build {
        /// Path to the request file
        #[arg(short, long)]
        request: PathBuf,

        /// Model whose limits apply when the request carries none
        #[arg(short, long)]
        model: Option<String>,

        /// Seed for probabilistic lore entries
        #[arg(short, long)]
        seed: Option<u64>,

        /// Print compact JSON
        #[arg(long)]
        compact: bool,
    },

    /// Estimate the token count of text
    Estimate {
        /// Text to estimate (reads stdin when neither TEXT nor --file is given)
        text: Option<String>,

        /// Read the text from a file
        #[arg(short, long, conflicts_with = "text")]
        file: Option<PathBuf>,
    },

    /// Show model limits (all registered models when none is named)
    Limits {
        model: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
    /// Validate the configuration file
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing. Logs go to stderr so stdout stays machine-readable.
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Commands::Build {
            request,
            model,
            seed,
            compact,
        } => commands::build::run(&request, model, seed, compact).await?,
        Commands::Estimate { text, file } => commands::estimate::run(text, file).await?,
        Commands::Limits { model } => commands::limits::run(model).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
        },
    }

    Ok(())
}
