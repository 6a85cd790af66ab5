//! kybcheck server — KYB verification HTTP API.
//!
//! Resolves free-text UK business names to registry identities, enriches
//! them from the company's website, and serves job state over JSON.

mod serve;

use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::Result;

use kybcheck_shared::{init_config, load_config, load_config_from, validate_api_keys};

/// kybcheck — verify UK businesses against the official registry.
#[derive(Parser)]
#[command(
    name = "kybcheck-server",
    version,
    about = "KYB verification pipeline: resolve, verify, and cross-check UK businesses.",
    long_about = None,
)]
struct Cli {
    /// Port to listen on (overrides the config file).
    #[arg(short, long)]
    port: Option<u16>,

    /// Path to a config file (defaults to ~/.kybcheck/kybcheck.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write a default config file to ~/.kybcheck/ and exit.
    #[arg(long)]
    init_config: bool,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    init_tracing(&cli);

    if cli.init_config {
        let path = init_config()?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    validate_api_keys(&config)?;

    let port = cli.port.unwrap_or(config.server.port);
    serve::start_server(port, config).await
}

fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kybcheck=info",
        1 => "kybcheck=debug",
        _ => "kybcheck=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}
