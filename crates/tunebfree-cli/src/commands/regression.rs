//! Regression command implementation
//!
//! Runs every fixture directory under a root and compares the engine's
//! oscillator dumps with the goldens stored beside each scale.

use std::path::Path;
use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use tunebfree_harness::catalog;
use tunebfree_harness::SuiteConfig;

use super::{build_suite, report, suite_error, EngineOptions};

/// Run the regression command.
///
/// # Returns
/// Exit code: 0 if all fixtures pass, 1 if any fail, 2 on a precondition failure
pub fn run(
    fixtures: &Path,
    filter: Option<&str>,
    update_goldens: bool,
    options: &EngineOptions,
) -> Result<ExitCode> {
    let entries = match catalog::discover(fixtures)
        .and_then(|entries| catalog::select(fixtures, entries, filter, |d| d.name.as_str()))
    {
        Ok(entries) => entries,
        Err(err) => return suite_error(err, options.json),
    };

    if !options.json {
        println!(
            "{} {} ({} fixture(s))",
            "Fixtures:".cyan().bold(),
            fixtures.display(),
            entries.len()
        );
    }

    let mut config = SuiteConfig::regression();
    if update_goldens {
        config = config.update_goldens(true);
    }

    let mut suite = match build_suite(options, config) {
        Ok(suite) => suite,
        Err(err) => return suite_error(err, options.json),
    };

    match suite.run(fixtures, entries) {
        Ok(report) => report::emit(&report, options.json),
        Err(err) => suite_error(err, options.json),
    }
}
