//! heimdall: resilience configuration tool
//!
//! Validates and prints the configuration a process would load.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use heimdall::ResilienceConfig;

/// Heimdall configuration tool
#[derive(Parser)]
#[command(name = "heimdall")]
#[command(version)]
#[command(about = "Inspect and validate heimdall resilience configuration")]
struct Args {
    /// Config file (default: ~/.heimdall/config.toml, then /etc/heimdall/config.toml)
    #[arg(short, long, env = "HEIMDALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load and validate the configuration
    Check,

    /// Print the resolved configuration as JSON
    Show,

    /// Print the built-in defaults as TOML
    Defaults,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing (default: warn; override with RUST_LOG).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Command::Check => {
            let config = ResilienceConfig::load(args.config.as_deref())?;
            let breakers: Vec<&str> = config.breakers.keys().map(String::as_str).collect();
            let policies: Vec<&str> = config.retry.keys().map(String::as_str).collect();
            println!(
                "ok: breakers [{}], retry [{}], cache max_size {} ttl {}s",
                breakers.join(", "),
                policies.join(", "),
                config.cache.max_size,
                config.cache.default_ttl_secs
            );
        }

        Command::Show => {
            let config = ResilienceConfig::load(args.config.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
        }

        Command::Defaults => {
            print!("{}", ResilienceConfig::default().to_toml_string()?);
        }
    }

    Ok(())
}
