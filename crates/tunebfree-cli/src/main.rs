//! tunebfree-verify - regression harness for the tuneBfree organ engine
//!
//! Runs the engine under microtuning fixtures published through MTS-ESP and
//! checks its oscillator dumps against committed goldens.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use tunebfree_cli::commands::{self, EngineOptions};

/// tuneBfree tuning regression harness
#[derive(Parser)]
#[command(name = "tunebfree-verify")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by every command that launches the engine.
#[derive(Args, Debug, Clone, Default)]
struct EngineArgs {
    /// Engine executable (default: TUNEBFREE_BIN, build/tuneBfree, PATH)
    #[arg(long)]
    engine: Option<PathBuf>,

    /// Timeout per engine run in seconds, 0 disables it
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Keep the scratch directory of failing fixtures
    #[arg(long)]
    keep_scratch: bool,

    /// Output machine-readable JSON (no colored output)
    #[arg(long)]
    json: bool,
}

impl From<EngineArgs> for EngineOptions {
    fn from(args: EngineArgs) -> Self {
        Self {
            engine: args.engine,
            timeout_secs: args.timeout_secs,
            keep_scratch: args.keep_scratch,
            json: args.json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run every fixture directory and compare oscillator dumps with goldens
    Regression {
        /// Root holding one directory per fixture
        #[arg(long, default_value = commands::doctor::REGRESSION_DATA_DIR)]
        fixtures: PathBuf,

        /// Only run fixtures whose name contains this text
        #[arg(long)]
        filter: Option<String>,

        /// Replace goldens with this run's output (also TUNEBFREE_UPDATE_GOLDENS=1)
        #[arg(long)]
        update_goldens: bool,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Run a sample of the scale archive and check the engine exits cleanly
    Smoke {
        /// Directory of .scl files
        #[arg(long, default_value = commands::doctor::SCALE_ARCHIVE_DIR)]
        scales: PathBuf,

        /// Take every N-th scale in name order
        #[arg(long, default_value_t = commands::smoke::DEFAULT_STRIDE)]
        stride: usize,

        /// Only run scales whose name contains this text
        #[arg(long)]
        filter: Option<String>,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Run the engine repeatedly under default tuning and compare the dumps
    Determinism {
        /// Number of runs
        #[arg(long, default_value_t = 3)]
        runs: usize,

        #[command(flatten)]
        engine: EngineArgs,
    },

    /// Check the engine, MTS-ESP library and fixture trees
    Doctor {
        /// Engine executable
        #[arg(long)]
        engine: Option<PathBuf>,
    },

    /// Print the frequency table a scale file resolves to
    Resolve {
        /// Scala file (omit for default tuning)
        scale: Option<PathBuf>,

        /// Output the table as a JSON array
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Regression {
            fixtures,
            filter,
            update_goldens,
            engine,
        } => commands::regression::run(
            &fixtures,
            filter.as_deref(),
            update_goldens,
            &engine.into(),
        ),
        Commands::Smoke {
            scales,
            stride,
            filter,
            engine,
        } => commands::smoke::run(&scales, stride, filter.as_deref(), &engine.into()),
        Commands::Determinism { runs, engine } => {
            commands::determinism::run(runs, &engine.into())
        }
        Commands::Doctor { engine } => commands::doctor::run(engine.as_deref()),
        Commands::Resolve { scale, json } => commands::resolve::run(scale.as_deref(), json),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", colored::Colorize::red("error"), e);
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_regression_defaults() {
        let cli = Cli::try_parse_from(["tunebfree-verify", "regression"]).unwrap();
        match cli.command {
            Commands::Regression {
                fixtures,
                filter,
                update_goldens,
                engine,
            } => {
                assert_eq!(fixtures, PathBuf::from("tests/regression_test_data"));
                assert!(filter.is_none());
                assert!(!update_goldens);
                assert!(engine.engine.is_none());
                assert!(!engine.json);
            }
            _ => panic!("expected regression command"),
        }
    }

    #[test]
    fn test_cli_parses_regression_flags() {
        let cli = Cli::try_parse_from([
            "tunebfree-verify",
            "regression",
            "--fixtures",
            "data",
            "--filter",
            "bohlen",
            "--update-goldens",
            "--engine",
            "/opt/tuneBfree",
            "--timeout-secs",
            "0",
            "--keep-scratch",
            "--json",
        ])
        .unwrap();
        match cli.command {
            Commands::Regression {
                fixtures,
                filter,
                update_goldens,
                engine,
            } => {
                assert_eq!(fixtures, PathBuf::from("data"));
                assert_eq!(filter.as_deref(), Some("bohlen"));
                assert!(update_goldens);
                let options = EngineOptions::from(engine);
                assert_eq!(options.engine, Some(PathBuf::from("/opt/tuneBfree")));
                assert_eq!(options.timeout_secs, Some(0));
                assert!(options.keep_scratch);
                assert!(options.json);
            }
            _ => panic!("expected regression command"),
        }
    }

    #[test]
    fn test_cli_parses_smoke_stride() {
        let cli = Cli::try_parse_from(["tunebfree-verify", "smoke"]).unwrap();
        match cli.command {
            Commands::Smoke { stride, scales, .. } => {
                assert_eq!(stride, 20);
                assert_eq!(scales, PathBuf::from("tests/scala_scale_archive/scl"));
            }
            _ => panic!("expected smoke command"),
        }

        let cli = Cli::try_parse_from(["tunebfree-verify", "smoke", "--stride", "5"]).unwrap();
        match cli.command {
            Commands::Smoke { stride, .. } => assert_eq!(stride, 5),
            _ => panic!("expected smoke command"),
        }
    }

    #[test]
    fn test_cli_parses_resolve() {
        let cli = Cli::try_parse_from(["tunebfree-verify", "resolve", "a.scl", "--json"]).unwrap();
        match cli.command {
            Commands::Resolve { scale, json } => {
                assert_eq!(scale, Some(PathBuf::from("a.scl")));
                assert!(json);
            }
            _ => panic!("expected resolve command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_command() {
        assert!(Cli::try_parse_from(["tunebfree-verify", "frobnicate"]).is_err());
    }
}
