//! gatesync CLI
//!
//! Reconciles an API gateway with a declarative state file through the
//! gateway's admin API.
//!
//! # Commands
//!
//! - `diff` - Show the changes a sync would make
//! - `sync` - Apply the state file to the gateway
//! - `dump` - Write the gateway's current state as a state file
//! - `version` - Show version information

mod commands;
mod config;
mod error;
mod transport;

use clap::{Parser, Subcommand};
use commands::Gateway;
use config::{AdminConfig, DEFAULT_ADMIN_ADDR};
use gatesync_engine::{RetryConfig, SyncConfig};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Declarative configuration sync for API gateways.
#[derive(Parser)]
#[command(name = "gatesync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Admin API address
    #[arg(global = true, long, default_value = DEFAULT_ADMIN_ADDR)]
    admin_addr: String,

    /// Header added to every admin request, as key:value (repeatable)
    #[arg(global = true, long = "header")]
    headers: Vec<String>,

    /// Skip TLS certificate verification
    #[arg(global = true, long)]
    tls_skip_verify: bool,

    /// Server name for TLS SNI and certificate checks
    #[arg(global = true, long)]
    tls_server_name: Option<String>,

    /// PEM file with an additional trusted CA certificate
    #[arg(global = true, long)]
    ca_cert: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(global = true, long, default_value = "30")]
    timeout: u64,

    /// Maximum number of concurrent admin requests during sync
    #[arg(global = true, long, default_value = "10")]
    parallelism: usize,

    /// Admin calls per change during sync, retries of transient failures included
    #[arg(global = true, long, default_value = "3")]
    retries: u32,

    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the changes a sync would make
    Diff {
        /// State file to compare against
        #[arg(short, long, default_value = "gatesync.json")]
        state: PathBuf,
    },

    /// Apply a state file to the gateway
    Sync {
        /// State file to apply
        #[arg(short, long, default_value = "gatesync.json")]
        state: PathBuf,

        /// Report what would be done without sending changes
        #[arg(long)]
        dry_run: bool,
    },

    /// Write the gateway's current state as a state file
    Dump {
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("gatesync CLI v{}", env!("CARGO_PKG_VERSION"));
        println!("gatesync core v{}", gatesync_core::VERSION);
        return Ok(());
    }

    // Header syntax is checked before any request goes out.
    let admin = AdminConfig::new(cli.admin_addr)
        .with_headers(&cli.headers)?
        .with_tls_skip_verify(cli.tls_skip_verify)
        .with_tls_server_name(cli.tls_server_name)
        .with_ca_cert(cli.ca_cert)
        .with_timeout(Duration::from_secs(cli.timeout));
    let gateway = Gateway::connect(&admin)?;

    match cli.command {
        Commands::Diff { state } => commands::diff::run(&gateway, &state)?,
        Commands::Sync { state, dry_run } => {
            let config = SyncConfig::new(cli.parallelism)
                .with_dry_run(dry_run)
                .with_retry(RetryConfig::new(cli.retries));
            commands::sync::run(&gateway, &state, config)?
        }
        Commands::Dump { output } => commands::dump::run(&gateway, output.as_deref())?,
        Commands::Version => {}
    }

    Ok(())
}
