//! Forget CLI - Command-line interface for a Forget server.
//!
//! Provides commands to increment fields, read decayed distributions, and
//! check server health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{config, distribution, health};
use output::OutputFormat;

/// Forget - decaying frequency distributions
#[derive(Parser)]
#[command(
    name = "forget",
    version = "0.1.0",
    about = "Forget - decaying frequency distributions",
    long_about = "CLI tool for incrementing and reading distributions on a Forget server.",
    propagate_version = true
)]
pub struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    output: OutputFormat,

    /// API server URL
    #[arg(long, global = true, env = "FORGET_API_URL")]
    api_url: Option<String>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Increment one or more fields
    Incr(distribution::IncrArgs),

    /// Read decayed counts of specific fields
    Get(distribution::GetArgs),

    /// Read a whole distribution, normalized
    Dist(distribution::DistArgs),

    /// Read the most probable fields
    Top(distribution::TopArgs),

    /// Number of keys on the server
    Size,

    /// Check server health
    Health(health::HealthArgs),

    /// Configuration management
    #[command(subcommand)]
    Config(config::ConfigCommands),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    let settings = config::load_settings();
    let api_url = cli
        .api_url
        .clone()
        .or_else(|| settings.api_url.clone())
        .unwrap_or_else(|| "http://localhost:6666".to_string());

    let client = client::ApiClient::new(&api_url)?;
    let format = cli.output;

    let result = match cli.command {
        Commands::Incr(args) => distribution::incr(args, &client, format).await,
        Commands::Get(args) => distribution::get(args, &settings, &client, format).await,
        Commands::Dist(args) => distribution::dist(args, &settings, &client, format).await,
        Commands::Top(args) => distribution::top(args, &settings, &client, format).await,
        Commands::Size => distribution::size(&client, format).await,
        Commands::Health(args) => health::execute(args, &client, format).await,
        Commands::Config(cmd) => config::execute(cmd, format).await,
    };

    if let Err(e) = result {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }

    Ok(())
}
