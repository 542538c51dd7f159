//! CLI command implementations
//!
//! `init` writes a default config and creates the data directory.
//! `start` boots the controller (recovering any interrupted migrations)
//! and serves the HTTP surface until killed. `check` validates a config
//! without booting anything.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::config::KeyspanConfig;
use crate::control::Controller;
use crate::http_server::HttpServer;

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};

/// Parse arguments and dispatch.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    match cli.command {
        Command::Init { config } => init(&config),
        Command::Start { config } => start(&config),
        Command::Check { config } => check(&config),
    }
}

fn init(path: &Path) -> CliResult<()> {
    if path.exists() {
        return Err(CliError::already_initialized(path.display()));
    }
    let config = KeyspanConfig::default();
    fs::create_dir_all(&config.data_dir)?;
    config.save(path)?;
    println!("wrote {}", path.display());
    println!("data directory: {}", config.data_dir.display());
    Ok(())
}

fn check(path: &Path) -> CliResult<()> {
    let config = KeyspanConfig::load(path)?;
    println!(
        "ok: table '{}' keyed on '{}', {} columns, http {}",
        config.table.name,
        config.table.key_column,
        config.table.columns.len(),
        config.http.socket_addr()
    );
    Ok(())
}

fn start(path: &Path) -> CliResult<()> {
    let config = KeyspanConfig::load(path)?;
    fs::create_dir_all(&config.data_dir)?;
    let controller = Arc::new(Controller::bootstrap(&config)?);
    let server = HttpServer::new(config.http.clone(), controller);

    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::boot_failed(format!("tokio runtime: {}", e)))?;
    runtime
        .block_on(server.start())
        .map_err(|e| CliError::boot_failed(format!("http server: {}", e)))
}
