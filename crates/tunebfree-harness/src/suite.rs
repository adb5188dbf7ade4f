//! Suite orchestration.
//!
//! Drives fixtures through resolve -> publish -> run -> compare, one at a
//! time, in a fresh scratch directory each. A fixture failure is recorded
//! and the suite moves on; only precondition failures stop the run.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tempfile::TempDir;

use crate::catalog::{Discovered, ScaleFixture};
use crate::error::{HarnessError, HarnessResult};
use crate::runner::{EngineRunner, RunEnvironment, RunOutcome};
use crate::scala::ScaleResolver;
use crate::session::TuningSessionManager;
use crate::snapshot::{self, ComparisonResult};

/// Suite behavior switches.
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// Ask the engine for oscillator dumps.
    pub dump_snapshots: bool,
    /// Compare dumps against goldens (regression mode).
    pub compare: bool,
    /// Overwrite goldens with the actual dumps instead of comparing.
    pub update_goldens: bool,
    /// Keep scratch directories of failing fixtures.
    pub keep_scratch: bool,
    /// Parent for scratch directories; the system temp dir when `None`.
    pub scratch_root: Option<PathBuf>,
    /// Harness variables forwarded to the engine.
    pub pass_through: Vec<String>,
}

impl SuiteConfig {
    /// Golden comparison of every fixture that carries goldens.
    pub fn regression() -> Self {
        Self {
            dump_snapshots: true,
            compare: true,
            update_goldens: snapshot::should_update_goldens(),
            keep_scratch: false,
            scratch_root: None,
            pass_through: Vec::new(),
        }
    }

    /// Engine must merely exit cleanly.
    pub fn smoke() -> Self {
        Self {
            dump_snapshots: false,
            compare: false,
            update_goldens: false,
            keep_scratch: false,
            scratch_root: None,
            pass_through: Vec::new(),
        }
    }

    pub fn keep_scratch(mut self, keep: bool) -> Self {
        self.keep_scratch = keep;
        self
    }

    pub fn update_goldens(mut self, update: bool) -> Self {
        self.update_goldens = update;
        self
    }

    pub fn scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = Some(root.into());
        self
    }

    pub fn pass_through(mut self, name: impl Into<String>) -> Self {
        self.pass_through.push(name.into());
        self
    }
}

/// What a passing fixture did.
#[derive(Debug, Clone)]
pub struct FixturePass {
    pub retuned: bool,
    pub comparison: Option<ComparisonResult>,
    pub goldens_updated: bool,
}

/// Result of one fixture.
#[derive(Debug)]
pub struct FixtureOutcome {
    pub name: String,
    pub dir: PathBuf,
    pub duration: Duration,
    pub result: Result<FixturePass, HarnessError>,
    /// Per-artifact detail, also present when the comparison failed.
    pub comparison: Option<ComparisonResult>,
    /// Scratch directory left on disk for inspection.
    pub kept_scratch: Option<PathBuf>,
}

impl FixtureOutcome {
    pub fn passed(&self) -> bool {
        self.result.is_ok()
    }
}

/// All fixture outcomes of a run, in execution order.
#[derive(Debug, Default)]
pub struct SuiteReport {
    pub outcomes: Vec<FixtureOutcome>,
}

impl SuiteReport {
    /// The suite passes only if every fixture passed.
    pub fn all_passed(&self) -> bool {
        self.outcomes.iter().all(FixtureOutcome::passed)
    }

    pub fn passed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &FixtureOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }

    pub fn get(&self, name: &str) -> Option<&FixtureOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    /// Serializable view of the report.
    pub fn summary(&self) -> SuiteSummary {
        SuiteSummary {
            passed: self.all_passed(),
            total: self.outcomes.len(),
            failed: self.outcomes.len() - self.passed_count(),
            fixtures: self.outcomes.iter().map(FixtureSummary::from).collect(),
        }
    }
}

/// Report summary for machine-readable output.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteSummary {
    pub passed: bool,
    pub total: usize,
    pub failed: usize,
    pub fixtures: Vec<FixtureSummary>,
}

/// One fixture in a [`SuiteSummary`].
#[derive(Debug, Clone, Serialize)]
pub struct FixtureSummary {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u128,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparison: Option<ComparisonResult>,
}

impl From<&FixtureOutcome> for FixtureSummary {
    fn from(outcome: &FixtureOutcome) -> Self {
        let err = outcome.result.as_ref().err();
        Self {
            name: outcome.name.clone(),
            passed: outcome.passed(),
            duration_ms: outcome.duration.as_millis(),
            code: err.map(|e| e.code().to_string()),
            stage: err.map(|e| e.stage().to_string()),
            message: err.map(|e| e.to_string()),
            comparison: outcome.comparison.clone(),
        }
    }
}

/// Runs fixtures against one provider, one runner and one resolver.
pub struct Suite {
    sessions: TuningSessionManager,
    runner: Box<dyn EngineRunner>,
    resolver: Box<dyn ScaleResolver>,
    config: SuiteConfig,
}

impl Suite {
    pub fn new(
        sessions: TuningSessionManager,
        runner: Box<dyn EngineRunner>,
        resolver: Box<dyn ScaleResolver>,
        config: SuiteConfig,
    ) -> Self {
        Self {
            sessions,
            runner,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &SuiteConfig {
        &self.config
    }

    /// Host-level checks that must hold before any fixture runs.
    pub fn preflight(&mut self) -> HarnessResult<()> {
        self.sessions.check_available()?;
        self.sessions.reset()?;
        log::info!("Tuning provider '{}' available", self.sessions.provider_name());
        Ok(())
    }

    /// Runs discovered fixtures; malformed entries are reported as failures.
    pub fn run(&mut self, root: &Path, entries: Vec<Discovered>) -> HarnessResult<SuiteReport> {
        if entries.is_empty() {
            return Err(HarnessError::EmptyCatalog {
                root: root.to_path_buf(),
            });
        }
        self.preflight()?;

        let mut report = SuiteReport::default();
        for entry in entries {
            let outcome = match entry.fixture {
                Ok(fixture) => self.run_fixture(&fixture),
                Err(err) => FixtureOutcome {
                    name: entry.name,
                    dir: entry.dir,
                    duration: Duration::ZERO,
                    result: Err(err),
                    comparison: None,
                    kept_scratch: None,
                },
            };
            log_outcome(&outcome);
            report.outcomes.push(outcome);
        }
        Ok(report)
    }

    /// Runs already-loaded fixtures (flat discovery).
    pub fn run_fixtures(
        &mut self,
        root: &Path,
        fixtures: &[ScaleFixture],
    ) -> HarnessResult<SuiteReport> {
        let entries = fixtures
            .iter()
            .map(|f| Discovered {
                name: f.name.clone(),
                dir: f.dir.clone(),
                fixture: Ok(f.clone()),
            })
            .collect();
        self.run(root, entries)
    }

    /// Runs one fixture in its own scratch directory.
    pub fn run_fixture(&mut self, fixture: &ScaleFixture) -> FixtureOutcome {
        let start = Instant::now();
        let mut comparison = None;
        let mut kept_scratch = None;

        let result = match self.scratch_dir(&fixture.name) {
            Ok(scratch) => {
                let result = self.execute(fixture, scratch.path(), &mut comparison);
                if result.is_err() && self.config.keep_scratch {
                    kept_scratch = Some(scratch.keep());
                }
                result
            }
            Err(err) => Err(err),
        };

        FixtureOutcome {
            name: fixture.name.clone(),
            dir: fixture.dir.clone(),
            duration: start.elapsed(),
            result,
            comparison,
            kept_scratch,
        }
    }

    fn execute(
        &mut self,
        fixture: &ScaleFixture,
        work_dir: &Path,
        comparison: &mut Option<ComparisonResult>,
    ) -> HarnessResult<FixturePass> {
        let env = self.environment(work_dir);
        log::debug!("Fixture '{}' scratch dir {}", fixture.name, work_dir.display());

        match &fixture.scale {
            Some(scale) => {
                let table = self.resolver.resolve(scale)?;
                let runner = &self.runner;
                self.sessions
                    .with_session(&table, &fixture.name, |_session| runner.run(&env))??;
            }
            None => {
                self.runner.run(&env)?;
            }
        }

        let mut pass = FixturePass {
            retuned: fixture.scale.is_some(),
            comparison: None,
            goldens_updated: false,
        };

        if !(self.config.compare && self.config.dump_snapshots && fixture.has_goldens()) {
            return Ok(pass);
        }

        if self.config.update_goldens {
            snapshot::update_goldens(&fixture.dir, work_dir)?;
            pass.goldens_updated = true;
            return Ok(pass);
        }

        let result = snapshot::compare(&fixture.dir, work_dir)?;
        *comparison = Some(result.clone());
        result.to_result(&fixture.dir)?;
        pass.comparison = Some(result);
        Ok(pass)
    }

    /// Runs the engine `runs` times under default tuning and compares every
    /// run's dumps with the first run's.
    ///
    /// The provider is checked and reset first so no stale master retunes
    /// the "default" runs.
    pub fn verify_determinism(&mut self, runs: usize) -> HarnessResult<Vec<ComparisonResult>> {
        self.preflight()?;
        let runs = runs.max(2);
        let reference = self.scratch_dir("determinism-0")?;
        self.default_run(reference.path())?;

        let mut results = Vec::with_capacity(runs - 1);
        for index in 1..runs {
            let scratch = self.scratch_dir(&format!("determinism-{}", index))?;
            self.default_run(scratch.path())?;
            let result = snapshot::compare(reference.path(), scratch.path())?;
            if !result.all_match() {
                log::info!("Run {} diverged: {:?}", index, result.diverged());
            }
            results.push(result);
        }
        Ok(results)
    }

    fn default_run(&self, work_dir: &Path) -> HarnessResult<RunOutcome> {
        let env = self.environment(work_dir).with_snapshots(true);
        self.runner.run(&env)
    }

    fn environment(&self, work_dir: &Path) -> RunEnvironment {
        RunEnvironment::new(work_dir)
            .with_snapshots(self.config.dump_snapshots)
            .pass_through(&self.config.pass_through)
    }

    fn scratch_dir(&self, name: &str) -> HarnessResult<TempDir> {
        let prefix = format!("tunebfree-{}-", sanitize(name));
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        match &self.config.scratch_root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|e| HarnessError::io(root, e))?;
                builder.tempdir_in(root).map_err(|e| HarnessError::io(root, e))
            }
            None => builder
                .tempdir()
                .map_err(|e| HarnessError::io(std::env::temp_dir(), e)),
        }
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == '-' { c } else { '_' })
        .collect()
}

fn log_outcome(outcome: &FixtureOutcome) {
    match &outcome.result {
        Ok(_) => log::info!("{}: ok ({:.2?})", outcome.name, outcome.duration),
        Err(err) => log::info!("{}: FAILED [{}] {}", outcome.name, err.code(), err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::discover;
    use crate::scala::ScalaResolver;
    use crate::session::SESSION_TEST_LOCK;
    use crate::testing::{FakeEngine, InMemoryProvider};
    use std::fs;

    fn lock() -> std::sync::MutexGuard<'static, ()> {
        SESSION_TEST_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn suite(provider: InMemoryProvider, engine: FakeEngine, config: SuiteConfig) -> Suite {
        Suite::new(
            TuningSessionManager::new(Box::new(provider)),
            Box::new(engine),
            Box::new(ScalaResolver::new()),
            config,
        )
    }

    #[test]
    fn test_empty_catalog_is_precondition() {
        let _guard = lock();
        let provider = InMemoryProvider::new();
        let engine = FakeEngine::new(provider.handle());
        let mut suite = suite(provider, engine, SuiteConfig::regression());

        let err = suite.run(Path::new("fixtures"), Vec::new()).unwrap_err();
        assert!(matches!(err, HarnessError::EmptyCatalog { .. }));
        assert!(err.is_precondition());
    }

    #[test]
    fn test_unavailable_provider_stops_before_any_run() {
        let _guard = lock();
        let root = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("a")).unwrap();
        fs::create_dir_all(root.path().join("b")).unwrap();

        let provider = InMemoryProvider::unavailable();
        let engine = FakeEngine::new(provider.handle());
        let mut suite = suite(provider, engine, SuiteConfig::smoke());

        let entries = discover(root.path()).unwrap();
        let err = suite.run(root.path(), entries).unwrap_err();
        assert!(matches!(err, HarnessError::ProviderUnavailable { .. }));
    }

    #[test]
    fn test_update_goldens_then_compare() {
        let _guard = lock();
        let root = tempfile::TempDir::new().unwrap();
        let fixture_dir = root.path().join("default");
        fs::create_dir_all(&fixture_dir).unwrap();
        for artifact in snapshot::SNAPSHOT_ARTIFACTS {
            fs::write(fixture_dir.join(artifact), "stale").unwrap();
        }

        let provider = InMemoryProvider::new();
        let handle = provider.handle();
        let mut suite = suite(
            provider,
            FakeEngine::new(handle.clone()),
            SuiteConfig::regression().update_goldens(true),
        );
        let report = suite.run(root.path(), discover(root.path()).unwrap()).unwrap();
        assert!(report.all_passed());

        let mut suite = self::suite(
            InMemoryProvider::with_handle(handle.clone()),
            FakeEngine::new(handle),
            SuiteConfig::regression().update_goldens(false),
        );
        let report = suite.run(root.path(), discover(root.path()).unwrap()).unwrap();
        assert!(report.all_passed());
        let pass = report.outcomes[0].result.as_ref().unwrap();
        assert!(pass.comparison.as_ref().unwrap().all_match());
    }

    #[test]
    fn test_keep_scratch_on_failure() {
        let _guard = lock();
        let root = tempfile::TempDir::new().unwrap();
        let scratch = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("crashy")).unwrap();

        let provider = InMemoryProvider::new();
        let engine = FakeEngine::new(provider.handle()).exiting(139, "segfault");
        let mut suite = suite(
            provider,
            engine,
            SuiteConfig::smoke()
                .keep_scratch(true)
                .scratch_root(scratch.path()),
        );
        let report = suite.run(root.path(), discover(root.path()).unwrap()).unwrap();
        let outcome = report.get("crashy").unwrap();
        let kept = outcome.kept_scratch.as_ref().unwrap();
        assert!(kept.starts_with(scratch.path()));
        assert!(kept.exists());
    }

    #[test]
    fn test_summary_serializes() {
        let _guard = lock();
        let root = tempfile::TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("a")).unwrap();
        fs::write(root.path().join("a/x.scl"), "x\n1\n2/1\n").unwrap();
        fs::write(root.path().join("a/y.scl"), "y\n1\n2/1\n").unwrap();

        let provider = InMemoryProvider::new();
        let engine = FakeEngine::new(provider.handle());
        let mut suite = suite(provider, engine, SuiteConfig::regression());
        let report = suite.run(root.path(), discover(root.path()).unwrap()).unwrap();

        let json = serde_json::to_value(report.summary()).unwrap();
        assert_eq!(json["passed"], false);
        assert_eq!(json["fixtures"][0]["code"], "HARNESS_001");
        assert_eq!(json["fixtures"][0]["stage"], "fixture");
    }

    #[test]
    fn test_sanitize() {
        assert_eq!(sanitize("12-tet scale/x"), "12-tet_scale_x");
    }
}
