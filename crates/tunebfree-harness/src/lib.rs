//! tuneBfree Regression Harness
//!
//! This crate verifies the tuneBfree organ engine under externally supplied
//! (MTS-ESP) tunings. The engine itself is a black box: the harness stands up
//! a tuning session, launches the binary with a controlled environment, and
//! compares the oscillator state it dumps against golden copies.
//!
//! # Pipeline
//!
//! For every fixture:
//!
//! 1. **Catalog** - discover the fixture directory (optional `.scl` + goldens)
//! 2. **Resolve** - turn the scale into a 128-entry [`FrequencyTable`]
//! 3. **Session** - register as MTS-ESP master and publish the table
//! 4. **Run** - launch the engine with `NO_JACK=TRUE` and `DEBUG_TONEGEN_OSC=1`
//! 5. **Compare** - byte-compare `osc.txt`, `osc_cfglists.txt`, `osc_runtime.txt`
//!
//! # Example
//!
//! ```ignore
//! use tunebfree_harness::{
//!     catalog, MtsEspProvider, ProcessRunner, RunnerConfig, ScalaResolver, Suite,
//!     SuiteConfig, TuningSessionManager,
//! };
//!
//! let root = Path::new("tests/regression_test_data");
//! let mut suite = Suite::new(
//!     TuningSessionManager::new(Box::new(MtsEspProvider::new())),
//!     Box::new(ProcessRunner::new(RunnerConfig::new("build/tuneBfree"))),
//!     Box::new(ScalaResolver::new()),
//!     SuiteConfig::regression(),
//! );
//! let report = suite.run(root, catalog::discover(root)?)?;
//! assert!(report.all_passed());
//! ```
//!
//! # Crate Structure
//!
//! - [`catalog`] - Fixture discovery (regression and flat layouts)
//! - [`scala`] - Scale resolution
//! - [`provider`] - Tuning provider trait and the MTS-ESP binding
//! - [`session`] - Scoped, exclusive tuning sessions
//! - [`runner`] - Engine subprocess management
//! - [`snapshot`] - Golden snapshot comparison
//! - [`suite`] - Orchestration and reporting
//! - [`error`] - Error types

pub mod catalog;
pub mod error;
pub mod provider;
pub mod runner;
pub mod scala;
pub mod session;
pub mod snapshot;
pub mod suite;
pub mod table;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use catalog::{discover, discover_flat, Discovered, ScaleFixture};
pub use error::{HarnessError, HarnessResult};
pub use provider::{MtsEspProvider, TuningProvider};
pub use runner::{
    locate_engine, EngineRunner, ProcessRunner, RunEnvironment, RunOutcome, RunnerConfig,
};
pub use scala::{KeyboardMapping, ScalaResolver, ScaleResolver};
pub use session::{TuningSession, TuningSessionManager};
pub use snapshot::{ArtifactComparison, ArtifactStatus, ComparisonResult, SNAPSHOT_ARTIFACTS};
pub use suite::{FixtureOutcome, Suite, SuiteConfig, SuiteReport, SuiteSummary};
pub use table::FrequencyTable;
