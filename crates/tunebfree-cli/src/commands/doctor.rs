//! Doctor command implementation
//!
//! Checks that the engine, the MTS-ESP library and the fixture trees are
//! where the suites expect them.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Result;
use colored::Colorize;
use tunebfree_harness::provider::mts::{library_path, LIBMTS_ENV};
use tunebfree_harness::runner::ENGINE_ENV;
use tunebfree_harness::{catalog, locate_engine, MtsEspProvider, TuningProvider};

/// Default fixture root, relative to the repository root.
pub const REGRESSION_DATA_DIR: &str = "tests/regression_test_data";
/// Default scale archive, relative to the repository root.
pub const SCALE_ARCHIVE_DIR: &str = "tests/scala_scale_archive/scl";

/// Run the doctor command
///
/// Checks:
/// - Engine executable
/// - MTS-ESP library
/// - Fixture root and scale archive
///
/// # Returns
/// Exit code: 0 if the engine and provider are usable, 1 otherwise
pub fn run(engine: Option<&Path>) -> Result<ExitCode> {
    println!("{}", "tuneBfree Verify Doctor".cyan().bold());
    println!("{}", "=======================".cyan());
    println!();

    let mut all_ok = true;
    let repo_root = env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    println!("{}", "Versions:".bold());
    println!(
        "  {} tunebfree-verify v{}",
        "->".green(),
        env!("CARGO_PKG_VERSION")
    );
    println!();

    println!("{}", "Engine:".bold());
    match locate_engine(engine, &repo_root) {
        Ok(path) => println!("  {} {}", "ok".green(), path.display()),
        Err(err) => {
            println!("  {} {}", "!!".red(), err);
            println!(
                "     {}",
                format!("Build the engine or set {}.", ENGINE_ENV).dimmed()
            );
            all_ok = false;
        }
    }
    println!();

    println!("{}", "Tuning provider:".bold());
    let mut provider = MtsEspProvider::new();
    match provider.check_available() {
        Ok(()) => println!(
            "  {} {} ({})",
            "ok".green(),
            provider.name(),
            provider.path().display()
        ),
        Err(err) => {
            println!("  {} {}", "!!".red(), err);
            println!(
                "     {}",
                format!(
                    "Install MTS-ESP or point {} at the library (default {}).",
                    LIBMTS_ENV,
                    library_path().display()
                )
                .dimmed()
            );
            all_ok = false;
        }
    }
    println!();

    println!("{}", "Fixtures:".bold());
    check_fixture_root(&repo_root.join(REGRESSION_DATA_DIR));
    check_scale_archive(&repo_root.join(SCALE_ARCHIVE_DIR));
    println!();

    if all_ok {
        println!("{}", "All checks passed!".green().bold());
        Ok(ExitCode::SUCCESS)
    } else {
        println!("{}", "Some checks failed.".red().bold());
        Ok(ExitCode::from(1))
    }
}

// Missing fixture trees are warnings; the suites accept other roots.
fn check_fixture_root(root: &Path) {
    match catalog::discover(root) {
        Ok(entries) => {
            let malformed = entries.iter().filter(|e| e.fixture.is_err()).count();
            println!(
                "  {} {} ({} fixture(s))",
                "ok".green(),
                root.display(),
                entries.len()
            );
            if malformed > 0 {
                println!(
                    "  {} {} malformed fixture(s)",
                    "!!".yellow(),
                    malformed
                );
            }
        }
        Err(err) => println!("  {} {}", "!!".yellow(), err),
    }
}

fn check_scale_archive(dir: &Path) {
    match catalog::discover_flat(dir) {
        Ok(scales) => println!(
            "  {} {} ({} scale(s))",
            "ok".green(),
            dir.display(),
            scales.len()
        ),
        Err(err) => println!("  {} {}", "!!".yellow(), err),
    }
}
