//! Resolve command implementation
//!
//! Prints the 128-note frequency table a scale file resolves to.

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;
use tunebfree_harness::{FrequencyTable, ScalaResolver, ScaleResolver};

/// Run the resolve command.
///
/// With no scale the default 12-TET table is printed.
pub fn run(scale: Option<&Path>, json: bool) -> Result<ExitCode> {
    let table = match scale {
        Some(path) => ScalaResolver::new()
            .resolve(path)
            .with_context(|| format!("Failed to resolve {}", path.display()))?,
        None => FrequencyTable::twelve_tet(),
    };

    if json {
        println!(
            "{}",
            serde_json::to_string(table.as_slice()).context("Failed to serialize table")?
        );
        return Ok(ExitCode::SUCCESS);
    }

    let label = scale
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "default tuning".to_string());
    println!("{} {}", "Scale:".cyan().bold(), label);

    let reference = FrequencyTable::twelve_tet();
    for (note, freq) in table.as_slice().iter().enumerate() {
        let cents = 1200.0 * (freq / reference.as_slice()[note]).log2();
        println!("  {:>3}  {:>14.6} Hz  {:>+9.3}c", note, freq, cents);
    }

    Ok(ExitCode::SUCCESS)
}
