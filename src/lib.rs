pub mod cli;
pub mod db;
pub mod desk;
pub mod errors;
pub mod models;
pub mod projector;
pub mod storage;
pub mod store;

use clap::Parser;
use std::path::Path;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;

pub use crate::desk::{Confirm, DeleteOutcome, Desk, DeskView, Submission};
pub use crate::errors::{AppError, AppResult};
pub use crate::models::{Deal, DealDraft, DealFilter, DeskSettings, Stage, StageFilter, Stats, StatsScope, Valuation};
pub use crate::storage::{KeyValueStore, MemoryStore};
pub use crate::store::DealStore;

pub fn run() -> ExitCode {
    let cli = cli::Cli::parse();
    // the guard flushes buffered log lines when dropped at the end of run
    let _log_guard = match init_tracing(&cli.data_dir) {
        Ok(guard) => Some(guard),
        Err(error) => {
            eprintln!("logging disabled: {}", error);
            None
        }
    };

    match cli::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            let message = format!("{:#}", error);
            tracing::error!(error = %message, "command failed");
            eprintln!("{}", to_client_error(message));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(data_dir: &Path) -> Result<WorkerGuard, String> {
    let log_dir = data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).map_err(|error| error.to_string())?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "deal-desk.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| error.to_string())?;
    Ok(guard)
}

fn to_client_error(error: impl std::fmt::Display) -> String {
    error.to_string()
}
