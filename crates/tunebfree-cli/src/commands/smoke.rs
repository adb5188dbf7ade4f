//! Smoke command implementation
//!
//! Runs the engine under every N-th scale of a flat scale archive and checks
//! only that it exits cleanly.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use tunebfree_harness::catalog::{self, sample_every, select};
use tunebfree_harness::SuiteConfig;

use super::{build_suite, report, suite_error, EngineOptions};

/// Default sampling stride over the scale archive.
pub const DEFAULT_STRIDE: usize = 20;

/// Run the smoke command.
pub fn run(
    scales: &Path,
    stride: usize,
    filter: Option<&str>,
    options: &EngineOptions,
) -> Result<ExitCode> {
    let fixtures = match catalog::discover_flat(scales) {
        Ok(fixtures) => fixtures,
        Err(err) => return suite_error(err, options.json),
    };
    let available = fixtures.len();
    let fixtures = match select(scales, sample_every(fixtures, stride), filter, |f| {
        f.name.as_str()
    }) {
        Ok(fixtures) => fixtures,
        Err(err) => return suite_error(err, options.json),
    };

    if !options.json {
        println!(
            "{} {} ({} of {} scale(s), stride {})",
            "Scales:".cyan().bold(),
            scales.display(),
            fixtures.len(),
            available,
            stride.max(1)
        );
    }

    let mut suite = match build_suite(options, SuiteConfig::smoke()) {
        Ok(suite) => suite,
        Err(err) => return suite_error(err, options.json),
    };

    match suite.run_fixtures(scales, &fixtures) {
        Ok(report) => report::emit(&report, options.json),
        Err(err) => suite_error(err, options.json),
    }
}
