//! kvtab command-line interface
//!
//! Inserts into and scans a key-value store through the table adapter.
//!
//! # Usage
//!
//! ```bash
//! # Insert one row
//! kvtab -H localhost -p 6379 insert user:1 alice
//!
//! # Print every row as key<TAB>value
//! kvtab --table app.users scan
//!
//! # Check that the store answers
//! kvtab ping
//!
//! # Show the effective configuration
//! kvtab --config kvtab.toml config
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use kvtab_common::AdapterConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;

/// kvtab command-line interface
#[derive(Parser, Debug)]
#[command(
    name = "kvtab",
    author = "kvtab contributors",
    version,
    about = "Read and write a key-value store as a two-column table",
    long_about = "Inserts rows into and scans rows out of a RESP key-value store,\n\
                  going through the same handler, lock and gateway layers a host\n\
                  database would use."
)]
struct Args {
    /// Configuration file path
    #[arg(long, value_name = "FILE", env = "KVTAB_CONFIG")]
    config: Option<PathBuf>,

    /// Store hostname
    #[arg(short = 'H', long, env = "KVTAB_HOST")]
    host: Option<String>,

    /// Store port
    #[arg(short = 'p', long, env = "KVTAB_PORT")]
    port: Option<u16>,

    /// Store password (use KVTAB_PASSWORD env var for security)
    #[arg(short = 'W', long, env = "KVTAB_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Table to open, as `db.table` or `./db/table`
    #[arg(long, default_value = "default.kv")]
    table: String,

    /// Enable verbose output
    #[arg(short = 'v', long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Insert one row
    Insert {
        /// Row key
        key: String,
        /// Row value
        value: String,
    },
    /// Print every row as key<TAB>value
    Scan,
    /// Check that the store answers PING
    Ping,
    /// Print the effective configuration as TOML
    Config,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose);

    let config = load_config(&args)?;
    info!("store target {}", config.store.address());

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match &args.command {
        Command::Insert { key, value } => commands::insert(&config, &args.table, key, value),
        Command::Scan => {
            let rows = commands::scan(&config, &args.table, &mut out)?;
            info!("{} rows", rows);
            Ok(())
        }
        Command::Ping => commands::ping(&config, &mut out),
        Command::Config => commands::print_config(&config, &mut out),
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("kvtab=debug,kvtab_engine=debug,kvtab_client=debug,kvtab_lock=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(args: &Args) -> Result<AdapterConfig> {
    let mut config = match &args.config {
        Some(path) => AdapterConfig::from_file(path)?,
        None => AdapterConfig::default(),
    };

    // Command line overrides the file
    if let Some(host) = &args.host {
        config.store.host = host.clone();
    }
    if let Some(port) = args.port {
        config.store.port = port;
    }
    if let Some(password) = &args.password {
        config.store.password = Some(password.clone());
    }

    config.validate()?;
    Ok(config)
}
