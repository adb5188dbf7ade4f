//! Suite builders and environment gates for the integration tests.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use tunebfree_harness::testing::{FakeEngine, InMemoryProvider, ProviderHandle};
use tunebfree_harness::{ScalaResolver, Suite, SuiteConfig, TuningSessionManager};

/// Set to run the tests that need a built engine and the MTS-ESP library.
pub const RUN_ENGINE_TESTS_ENV: &str = "TUNEBFREE_RUN_ENGINE_TESTS";

/// Check if engine tests should run based on environment variable.
pub fn should_run_engine_tests() -> bool {
    std::env::var(RUN_ENGINE_TESTS_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Repository root (two levels above this crate).
pub fn repo_root() -> PathBuf {
    static PATH: OnceLock<PathBuf> = OnceLock::new();
    PATH.get_or_init(|| {
        let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        let root = manifest_dir.join("..").join("..");
        root.canonicalize().unwrap_or(root)
    })
    .clone()
}

/// Serializes tests that open tuning sessions; only one may exist per process.
pub fn session_lock() -> MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A suite wired to an in-memory provider and a fake engine, with handles
/// for inspecting both afterwards.
pub struct FakeSuite {
    pub suite: Suite,
    pub provider: ProviderHandle,
    pub engine: Arc<FakeEngine>,
}

impl FakeSuite {
    /// Healthy provider and engine.
    pub fn new(config: SuiteConfig) -> Self {
        let provider = InMemoryProvider::new();
        let handle = provider.handle();
        let engine = FakeEngine::new(handle.clone());
        Self::from_parts(provider, engine, config)
    }

    /// Assemble from a configured provider and engine.
    pub fn from_parts(provider: InMemoryProvider, engine: FakeEngine, config: SuiteConfig) -> Self {
        let handle = provider.handle();
        let engine = Arc::new(engine);
        let suite = Suite::new(
            TuningSessionManager::new(Box::new(provider)),
            Box::new(Arc::clone(&engine)),
            Box::new(ScalaResolver::new()),
            config,
        );
        Self {
            suite,
            provider: handle,
            engine,
        }
    }
}
