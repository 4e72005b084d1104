//! `apiquery` Server Binary
//!
//! Serves `POST /get` over a SQLite database.
//!
//! ## Usage
//!
//! ```bash
//! # Start server with config.toml / config.local.toml / APIQUERY_* settings
//! cargo run --bin apiquery-server
//!
//! # Explicit config file, address and database
//! cargo run --bin apiquery-server -- --config prod.toml --host 0.0.0.0 --port 9000 --db ./app.db
//! ```
//!
//! ## Logging
//!
//! `[logging]` in the config picks level, format (`text` or `json`) and an
//! optional file. `APIQUERY_LOG` overrides the filter directive and
//! `APIQUERY_LOG_FILE` overrides the file; without a file, logs go to stderr.

use apiquery::config::LoggingConfig;
use apiquery::protocol::rest;
use apiquery::protocol::Handler;
use apiquery::Config;

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;

use clap::Parser;

static TRACE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

#[derive(Debug, Parser)]
#[command(name = "apiquery-server", version, about = "JSON query resolution server")]
struct Args {
    /// Configuration file (defaults to config.toml and config.local.toml)
    #[arg(long)]
    config: Option<String>,

    /// HTTP bind address
    #[arg(long)]
    host: Option<String>,

    /// HTTP port
    #[arg(long)]
    port: Option<u16>,

    /// SQLite database file
    #[arg(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load().unwrap_or_else(|e| {
            eprintln!("Using default configuration: {e}");
            Config::default()
        }),
    };

    if let Some(host) = args.host {
        config.http.host = host;
    }
    if let Some(port) = args.port {
        config.http.port = port;
    }
    if let Some(db) = args.db {
        config.database.path = db;
    }

    init_tracing(&config.logging);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        database = %config.database.path.display(),
        read_only = config.database.read_only,
        "starting apiquery server"
    );

    let handler = Arc::new(Handler::from_config(&config)?);
    rest::start_http_server(handler, &config.http).await
}

fn init_tracing(logging_config: &LoggingConfig) {
    // Environment variables take precedence over config file values
    let level = env::var("APIQUERY_LOG")
        .ok()
        .unwrap_or_else(|| logging_config.level.clone());
    let log_path = env::var("APIQUERY_LOG_FILE")
        .ok()
        .map(PathBuf::from)
        .or_else(|| logging_config.file.clone());
    let json = logging_config.format == "json";

    let writer = match log_path {
        Some(path) => {
            let file = match std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
            {
                Ok(f) => f,
                Err(e) => {
                    eprintln!("ERROR: Unable to open log file '{}': {e}", path.display());
                    return;
                }
            };
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            let _ = TRACE_GUARD.set(guard);
            non_blocking
        }
        None => {
            let (non_blocking, guard) = tracing_appender::non_blocking(std::io::stderr());
            let _ = TRACE_GUARD.set(guard);
            non_blocking
        }
    };

    let filter = || {
        tracing_subscriber::EnvFilter::try_new(&level)
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    if tracing_subscriber::EnvFilter::try_new(&level).is_err() {
        eprintln!("WARNING: invalid log filter '{level}', falling back to info");
    }

    let base = || {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_ansi(false)
            .with_thread_names(true)
            .with_writer(writer.clone())
    };

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = if json {
        Box::new(base().json().finish())
    } else {
        Box::new(base().compact().finish())
    };

    let _ = tracing::subscriber::set_global_default(subscriber);
}
