//! Final suite report rendering.

use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use tunebfree_harness::{ArtifactStatus, FixtureOutcome, SuiteReport};

/// Prints the report and returns the command's exit code.
pub fn emit(report: &SuiteReport, json: bool) -> Result<ExitCode> {
    if json {
        let summary = report.summary();
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialize report")?
        );
    } else {
        print_human(report);
    }

    if report.all_passed() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(1))
    }
}

fn print_human(report: &SuiteReport) {
    for outcome in &report.outcomes {
        print_outcome(outcome);
    }

    let total = report.outcomes.len();
    let passed = report.passed_count();
    println!();
    if report.all_passed() {
        println!("{} {}/{} fixtures passed", "PASSED".green().bold(), passed, total);
    } else {
        println!(
            "{} {}/{} fixtures failed",
            "FAILED".red().bold(),
            total - passed,
            total
        );
    }
}

fn print_outcome(outcome: &FixtureOutcome) {
    match &outcome.result {
        Ok(pass) => {
            let detail = if pass.goldens_updated {
                "goldens updated".yellow().to_string()
            } else if pass.comparison.is_some() {
                "snapshots match".dimmed().to_string()
            } else if pass.retuned {
                "retuned run".dimmed().to_string()
            } else {
                "default tuning".dimmed().to_string()
            };
            println!(
                "  {} {} {} ({:.2?})",
                "ok".green(),
                outcome.name,
                detail,
                outcome.duration
            );
        }
        Err(err) => {
            println!(
                "  {} {} [{}] {}",
                "FAIL".red().bold(),
                outcome.name,
                err.code(),
                err.stage()
            );
            for line in err.to_string().lines() {
                println!("       {}", line.dimmed());
            }
            if let Some(comparison) = &outcome.comparison {
                for artifact in &comparison.artifacts {
                    match &artifact.status {
                        ArtifactStatus::Match => {
                            println!("       {} {}", "=".green(), artifact.artifact)
                        }
                        ArtifactStatus::Mismatch(d) => {
                            println!("       {} {}: {}", "x".red(), artifact.artifact, d)
                        }
                        ArtifactStatus::MissingActual { .. } => {
                            println!("       {} {}: not produced", "!".yellow(), artifact.artifact)
                        }
                        ArtifactStatus::MissingGolden { .. } => {
                            println!("       {} {}: no golden", "!".yellow(), artifact.artifact)
                        }
                    }
                }
            }
            if let Some(dir) = &outcome.kept_scratch {
                println!("       scratch kept at {}", dir.display());
            }
        }
    }
}
