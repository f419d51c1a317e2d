use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use human_panic::setup_panic;
use log::{debug, info};

use crate::helpers::logging;

/// Probe processes are kill_on_drop, what's left after the command returns is mostly output being
/// flushed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runs a binary: installs the panic hook, loads `.env`, parses the CLI, sets up logging and
/// enters a multi-threaded Tokio runtime for the duration of `fn_run`.
pub fn run<CliType: Parser>(
    fn_extract_logging: fn(&CliType) -> &logging::Params,
    fn_run: fn(CliType) -> Result<()>,
) -> Result<()> {
    setup_panic!();
    // loaded before parsing so that it can provide defaults, reported once logging is up
    let env_file = load_env_file()?;

    let cli = CliType::parse();
    let binary = CliType::command().get_name().to_string();
    let logger_handle = logging::configure_from(fn_extract_logging(&cli), &binary)?;
    match env_file {
        Some(path) => debug!("Loaded environment from {:?}", path),
        None => info!("No `.env` file found, using defaults and environment only."),
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .with_context(|| "Failed to start Tokio runtime")?;
    let _guard = runtime.enter();

    let command_result = fn_run(cli);

    debug!("Waiting up to {:?} for remaining tasks to finish", SHUTDOWN_GRACE);
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    // Important with non-direct write mode
    // Handle needs to be kept alive until end of program
    logger_handle.flush();

    command_result
}

/// Searches `.env` in the working directory and its parents. A missing file is fine, a broken
/// one is not.
fn load_env_file() -> Result<Option<PathBuf>> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(env_err) if env_err.not_found() => Ok(None),
        Err(env_err) => Err(env_err).with_context(|| "Failed to load `.env` file"),
    }
}
