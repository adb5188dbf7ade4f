//! Determinism command implementation
//!
//! Runs the engine repeatedly under default tuning, each time in a fresh
//! scratch directory, and checks the oscillator dumps are byte-identical.

use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use tunebfree_harness::SuiteConfig;

use super::{build_suite, suite_error, EngineOptions};

/// Run the determinism command.
pub fn run(runs: usize, options: &EngineOptions) -> Result<ExitCode> {
    let mut suite = match build_suite(options, SuiteConfig::regression()) {
        Ok(suite) => suite,
        Err(err) => return suite_error(err, options.json),
    };

    let results = match suite.verify_determinism(runs) {
        Ok(results) => results,
        Err(err) => return suite_error(err, options.json),
    };
    let deterministic = results.iter().all(|r| r.all_match());

    if options.json {
        let value = serde_json::json!({
            "deterministic": deterministic,
            "runs": results.len() + 1,
            "comparisons": results,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&value).context("Failed to serialize results")?
        );
    } else {
        for (index, result) in results.iter().enumerate() {
            if result.all_match() {
                println!("  {} run {} matches run 0", "ok".green(), index + 1);
            } else {
                println!(
                    "  {} run {} diverged in {}",
                    "FAIL".red().bold(),
                    index + 1,
                    result.diverged().join(", ")
                );
            }
        }
        if deterministic {
            println!("\n{} {} runs identical", "PASSED".green().bold(), results.len() + 1);
        } else {
            println!("\n{} engine output is not deterministic", "FAILED".red().bold());
        }
    }

    if deterministic {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}
