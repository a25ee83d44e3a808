//! # stagehand command-line entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Install logging (guard held until exit)
//!   ├─> Create Tokio runtime
//!   └─> Execute the subcommand
//! ```
//!
//! ```bash
//! stagehand generate_features --config config/run.yml --csv data/raw.csv --save data/features.csv
//! stagehand train_model --config config/run.yml --csv data/features.csv --save models/model.tmo
//! stagehand score_model --config config/run.yml --csv data/new.csv --save data/scores.csv
//! stagehand test --path test/test_config.yml
//! ```
//!
//! Any error exits with status 1, as does a regression suite with failures.

#![warn(clippy::all, rust_2018_idioms)]

mod cli;

use clap::Parser as _;
use stagehand::logging::{self, LoggingConfig};
use std::process::ExitCode;

#[expect(clippy::print_stderr)] // logging is not available yet
fn main() -> ExitCode {
    let cli = cli::Cli::parse();

    let _guard = match logging::init(&LoggingConfig {
        filter: cli.log_level.clone(),
        log_dir: cli.log_dir.clone(),
    }) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Failed to initialize logging: {err}");
            return ExitCode::FAILURE;
        }
    };

    let result = tokio::runtime::Runtime::new()
        .map_err(anyhow::Error::from)
        .and_then(|runtime| runtime.block_on(cli::run_command(cli.command)));

    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
