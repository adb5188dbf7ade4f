//! Command implementations for the tuneBfree verification CLI.

pub mod determinism;
pub mod doctor;
pub mod regression;
pub mod report;
pub mod resolve;
pub mod smoke;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use tunebfree_harness::{
    locate_engine, HarnessError, MtsEspProvider, ProcessRunner, RunnerConfig, ScalaResolver,
    Suite, SuiteConfig, TuningSessionManager,
};

/// Exit code when a precondition (provider, engine, fixtures) is not met.
pub const EXIT_PRECONDITION: u8 = 2;

/// Options shared by every command that launches the engine.
#[derive(Debug, Clone, Default)]
pub struct EngineOptions {
    /// Explicit engine path.
    pub engine: Option<PathBuf>,
    /// Timeout per run in seconds; `Some(0)` disables the bound.
    pub timeout_secs: Option<u64>,
    /// Keep scratch directories of failing fixtures.
    pub keep_scratch: bool,
    /// Machine-readable output.
    pub json: bool,
}

impl EngineOptions {
    fn runner_config(&self, engine: PathBuf) -> RunnerConfig {
        let config = RunnerConfig::new(engine);
        match self.timeout_secs {
            Some(0) => config.no_timeout(),
            Some(secs) => config.timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}

/// Builds a suite against the real engine and the host MTS-ESP library.
pub(crate) fn build_suite(options: &EngineOptions, config: SuiteConfig) -> Result<Suite, HarnessError> {
    let repo_root = std::env::current_dir().map_err(|e| HarnessError::io(".", e))?;
    let engine = locate_engine(options.engine.as_deref(), &repo_root)?;
    log::info!("Using engine {}", engine.display());

    Ok(Suite::new(
        TuningSessionManager::new(Box::new(MtsEspProvider::new())),
        Box::new(ProcessRunner::new(options.runner_config(engine))),
        Box::new(ScalaResolver::new()),
        config.keep_scratch(options.keep_scratch),
    ))
}

/// Reports a harness error that ends the command before any fixture result.
pub(crate) fn precondition_failure(err: &HarnessError, json: bool) -> Result<ExitCode> {
    if json {
        let value = serde_json::json!({
            "passed": false,
            "precondition": {
                "code": err.code(),
                "stage": err.stage(),
                "message": err.to_string(),
            }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialize error")?
        );
    } else {
        eprintln!(
            "{} [{}] {}",
            "PRECONDITION FAILED".red().bold(),
            err.code(),
            err
        );
    }
    Ok(ExitCode::from(EXIT_PRECONDITION))
}

/// Reports a name filter that left no fixtures to run.
pub(crate) fn no_match(err: &HarnessError, json: bool) -> Result<ExitCode> {
    if json {
        let value = serde_json::json!({
            "passed": false,
            "total": 0,
            "no_match": {
                "code": err.code(),
                "message": err.to_string(),
            }
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialize error")?
        );
    } else {
        eprintln!("{} [{}] {}", "NO MATCH".yellow().bold(), err.code(), err);
    }
    Ok(ExitCode::from(1))
}

/// Maps a suite-level error to an exit code, keeping preconditions distinct.
pub(crate) fn suite_error(err: HarnessError, json: bool) -> Result<ExitCode> {
    if err.is_precondition() {
        precondition_failure(&err, json)
    } else if matches!(err, HarnessError::NoFixturesMatched { .. }) {
        no_match(&err, json)
    } else {
        Err(err).context("Suite aborted")
    }
}
