//! Every fixture run gets its own scratch directory and leaves the fixture
//! tree untouched.

use std::collections::HashSet;
use std::fs;

use tunebfree_harness::catalog::discover;
use tunebfree_harness::session::session_active;
use tunebfree_harness::snapshot::{OSC_TABLE, SNAPSHOT_ARTIFACTS};
use tunebfree_harness::testing::{FakeEngine, InMemoryProvider};
use tunebfree_harness::SuiteConfig;
use tunebfree_tests::fixtures::{FixtureTree, BOHLEN_PIERCE_SCL, TWELVE_TET_SCL};
use tunebfree_tests::harness::{session_lock, FakeSuite};

#[test]
fn each_fixture_runs_in_a_fresh_scratch_dir() {
    let _guard = session_lock();
    let tree = FixtureTree::new();
    tree.add_scale_with_goldens("a", TWELVE_TET_SCL);
    tree.add_scale_with_goldens("b", BOHLEN_PIERCE_SCL);
    tree.add_default_with_goldens("c");

    let mut fake = FakeSuite::new(SuiteConfig::regression().update_goldens(false));
    let report = fake
        .suite
        .run(tree.path(), discover(tree.path()).unwrap())
        .unwrap();
    assert!(report.all_passed(), "{:?}", report.outcomes);

    let dirs = fake.engine.work_dirs();
    assert_eq!(dirs.len(), 3);
    let unique: HashSet<_> = dirs.iter().collect();
    assert_eq!(unique.len(), 3);
    for dir in &dirs {
        assert!(!dir.starts_with(tree.path()), "{} inside fixture tree", dir.display());
        assert!(!dir.exists(), "{} not cleaned up", dir.display());
    }
    assert!(!session_active());
}

#[test]
fn fixture_tree_is_not_modified_by_a_run() {
    let _guard = session_lock();
    let tree = FixtureTree::new();
    let dir = tree.add_scale_with_goldens("bp", BOHLEN_PIERCE_SCL);
    let before: Vec<Vec<u8>> = SNAPSHOT_ARTIFACTS
        .iter()
        .map(|a| fs::read(dir.join(a)).unwrap())
        .collect();

    let mut fake = FakeSuite::new(SuiteConfig::regression().update_goldens(false));
    fake.suite
        .run(tree.path(), discover(tree.path()).unwrap())
        .unwrap();

    let after: Vec<Vec<u8>> = SNAPSHOT_ARTIFACTS
        .iter()
        .map(|a| fs::read(dir.join(a)).unwrap())
        .collect();
    assert_eq!(before, after);
    assert_eq!(fs::read_dir(&dir).unwrap().count(), 4);
}

#[test]
fn failing_fixture_scratch_is_kept_when_requested() {
    let _guard = session_lock();
    let tree = FixtureTree::new();
    tree.add_scale_with_goldens("broken", TWELVE_TET_SCL);
    tree.add_scale_with_goldens("fine", TWELVE_TET_SCL);
    let scratch = tempfile::TempDir::new().unwrap();

    let provider = InMemoryProvider::new();
    let engine = FakeEngine::new(provider.handle()).failing_for("broken");
    let config = SuiteConfig::regression()
        .update_goldens(false)
        .keep_scratch(true)
        .scratch_root(scratch.path());
    let mut fake = FakeSuite::from_parts(provider, engine, config);
    let report = fake
        .suite
        .run(tree.path(), discover(tree.path()).unwrap())
        .unwrap();

    let kept = report.get("broken").unwrap().kept_scratch.clone().unwrap();
    assert!(kept.starts_with(scratch.path()));
    assert!(kept.is_dir());
    assert!(report.get("fine").unwrap().kept_scratch.is_none());

    let remaining: Vec<_> = fs::read_dir(scratch.path()).unwrap().collect();
    assert_eq!(remaining.len(), 1);
}

#[test]
fn update_goldens_writes_into_the_fixture_dir() {
    let _guard = session_lock();
    let tree = FixtureTree::new();
    let dir = tree.add_default_with_goldens("plain");
    fs::write(dir.join(OSC_TABLE), "stale\n").unwrap();

    let mut fake = FakeSuite::new(SuiteConfig::regression().update_goldens(true));
    let report = fake
        .suite
        .run(tree.path(), discover(tree.path()).unwrap())
        .unwrap();
    assert!(report.get("plain").unwrap().result.as_ref().unwrap().goldens_updated);
    assert_ne!(fs::read_to_string(dir.join(OSC_TABLE)).unwrap(), "stale\n");

    let mut fake = FakeSuite::new(SuiteConfig::regression().update_goldens(false));
    let report = fake
        .suite
        .run(tree.path(), discover(tree.path()).unwrap())
        .unwrap();
    assert!(report.all_passed());
}
