mod cli;
mod config;
mod controller;
mod error;
mod events;
mod models;
mod options;
mod report;
mod runner;

use std::path::PathBuf;

use clap::Parser;
use clap::error::ErrorKind;

use cli::Cli;
use config::Config;
use error::{HarnessError, exit_codes};
use options::Options;
use report::ReportWriter;
use runner::ProcessEngine;

#[tokio::main]
async fn main() {
    // Diagnostics go to stdout; RUST_LOG overrides the default level.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => exit_codes::SUCCESS,
                _ => exit_codes::USAGE,
            };
            let _ = e.print();
            std::process::exit(code);
        }
    };

    let code = match run(cli).await {
        Ok(()) => exit_codes::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", error_chain(&e));
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<(), HarnessError> {
    let base_dir = executable_dir()?;
    let config = match cli.config.as_deref() {
        Some(path) => Config::load_file(path)?,
        None => Config::load(&base_dir),
    };

    let options = Options::resolve(&cli, &base_dir, |path| {
        ProcessEngine::load(path, &config.engine)
    })?;
    options.log_summary();

    let engine = runner::detect(&options.target, &config.engine)
        .map_err(|e| HarnessError::config_with("invalid engine configuration", e))?;

    let summary = controller::run(&options, engine.as_ref(), || {
        ReportWriter::create(&options.report_path)
    })
    .await?;

    tracing::info!(
        iterations = summary.iterations,
        records = summary.records,
        passed = summary.passed,
        failed = summary.failed,
        skipped = summary.skipped,
        dropped = summary.dropped_events,
        "run finished"
    );
    Ok(())
}

/// Directory holding this executable; relative targets resolve against it.
fn executable_dir() -> Result<PathBuf, HarnessError> {
    let exe = std::env::current_exe()
        .map_err(|e| HarnessError::config_with("unable to locate the running executable", e))?;
    Ok(exe
        .parent()
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".")))
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
