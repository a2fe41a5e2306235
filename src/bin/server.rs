//! idserver Binary
//!
//! Starts the TCP server for the ID service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use idserver::network::Server;
use idserver::{CommitScheduler, Config, Engine, Pattern};
use tracing_subscriber::{fmt, EnvFilter};

/// idserver
#[derive(Parser, Debug)]
#[command(name = "idserver")]
#[command(about = "Centralized unique ID issuance service")]
#[command(version)]
struct Args {
    /// Listen address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:1970")]
    listen: String,

    /// Run without a journal (IDs issued since the last commit may repeat after a crash)
    #[arg(long)]
    no_journal: bool,

    /// Journal file
    #[arg(long, default_value = "/tmp/idserver.journal")]
    journal: PathBuf,

    /// Milliseconds between commits of changed counters
    #[arg(long, default_value = "1000")]
    commit_interval_ms: u64,

    /// JSON snapshot file
    #[arg(short, long, default_value = "/tmp/idserver.data")]
    data_file: PathBuf,

    /// Default ID template ('#' digit, '%' letter)
    #[arg(short, long)]
    pattern: Option<String>,

    /// Template for one key, as KEY=TEMPLATE (repeatable)
    #[arg(short = 'k', long = "key-pattern", value_parser = parse_key_pattern)]
    key_patterns: Vec<(String, String)>,

    /// Largest batch a single ask may request
    #[arg(long, default_value = "1000")]
    max_batch: usize,

    /// Maximum concurrent connections
    #[arg(short, long, default_value = "1024")]
    max_connections: usize,
}

fn parse_key_pattern(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, template)) if !key.is_empty() => Ok((key.to_string(), template.to_string())),
        _ => Err(format!("expected KEY=TEMPLATE, got '{}'", raw)),
    }
}

fn build_config(args: &Args) -> idserver::Result<Config> {
    let mut builder = Config::builder()
        .listen_addr(&args.listen)
        .max_connections(args.max_connections)
        .journaling(!args.no_journal)
        .journal_path(&args.journal)
        .commit_interval(Duration::from_millis(args.commit_interval_ms))
        .snapshot_path(&args.data_file)
        .max_batch(args.max_batch);

    if let Some(template) = &args.pattern {
        builder = builder.default_pattern(Pattern::parse(template)?);
    }
    for (key, template) in &args.key_patterns {
        builder = builder.key_pattern(key, Pattern::parse(template)?);
    }

    let config = builder.build();
    config.validate()?;
    Ok(config)
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,idserver=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("idserver v{}", idserver::VERSION);

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };

    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Snapshot file: {}", config.snapshot_path.display());
    if config.journaling {
        tracing::info!("Journal file: {}", config.journal_path.display());
    } else {
        tracing::warn!("Journaling disabled");
    }

    // Open engine; this replays a leftover journal
    let engine = match Engine::open(config.clone()) {
        Ok(e) => Arc::new(e),
        Err(e) => {
            tracing::error!("Failed to open engine: {}", e);
            std::process::exit(1);
        }
    };

    tracing::info!("Engine initialized successfully");

    let scheduler = match CommitScheduler::spawn(Arc::clone(&engine), config.commit_interval) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start commit timer: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config, Arc::clone(&engine)) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    // Set up Ctrl+C / SIGTERM handler
    let shutdown = server.shutdown_handle();
    if let Err(e) = ctrlc::set_handler(move || {
        tracing::info!("Received shutdown signal, initiating shutdown...");
        shutdown.shutdown();
    }) {
        tracing::error!("Failed to install signal handler: {}", e);
        std::process::exit(1);
    }

    let result = server.run();

    // Release every engine handle before the final commit
    drop(server);
    scheduler.stop();

    if let Err(e) = Engine::close_shared(engine) {
        tracing::error!("Failed to close engine: {}", e);
    }

    if let Err(e) = result {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
