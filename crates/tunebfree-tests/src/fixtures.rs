//! Synthetic regression fixture trees.

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tunebfree_harness::testing::FakeEngine;
use tunebfree_harness::{FrequencyTable, ScalaResolver, ScaleResolver};

/// Scala file for 12-tone equal temperament.
pub const TWELVE_TET_SCL: &str = "! 12tet.scl\n\
!\n\
12 tone equal temperament\n \
12\n\
!\n \
100.0\n 200.0\n 300.0\n 400.0\n 500.0\n 600.0\n \
700.0\n 800.0\n 900.0\n 1000.0\n 1100.0\n 2/1\n";

/// Scala file for Bohlen-Pierce (13 equal steps of the tritave).
pub const BOHLEN_PIERCE_SCL: &str = "! bp.scl\n\
!\n\
Bohlen-Pierce equal temperament\n \
13\n\
!\n \
146.30423\n 292.60846\n 438.91269\n 585.21692\n 731.52115\n \
877.82538\n 1024.12961\n 1170.43384\n 1316.73807\n 1463.04230\n \
1609.34653\n 1755.65076\n 3/1\n";

/// A fixture root in a temporary directory, one sub-directory per fixture.
pub struct FixtureTree {
    pub root: TempDir,
}

impl FixtureTree {
    pub fn new() -> Self {
        Self {
            root: TempDir::new().expect("Failed to create fixture root"),
        }
    }

    pub fn path(&self) -> &Path {
        self.root.path()
    }

    /// Adds an empty fixture directory.
    pub fn add_dir(&self, name: &str) -> PathBuf {
        let dir = self.root.path().join(name);
        fs::create_dir_all(&dir).expect("Failed to create fixture dir");
        dir
    }

    /// Adds a fixture with one scale file and no goldens.
    pub fn add_scale(&self, name: &str, scale: &str) -> PathBuf {
        let dir = self.add_dir(name);
        fs::write(dir.join(format!("{}.scl", name)), scale).expect("Failed to write scale");
        dir
    }

    /// Adds a fixture with one scale file and goldens rendered from the
    /// table the scale resolves to.
    pub fn add_scale_with_goldens(&self, name: &str, scale: &str) -> PathBuf {
        let dir = self.add_scale(name, scale);
        let table = ScalaResolver::new()
            .resolve(&dir.join(format!("{}.scl", name)))
            .expect("Fixture scale must resolve");
        write_goldens(&dir, &table);
        dir
    }

    /// Adds a default-tuning fixture with goldens for the 12-TET table.
    pub fn add_default_with_goldens(&self, name: &str) -> PathBuf {
        let dir = self.add_dir(name);
        write_goldens(&dir, &FrequencyTable::twelve_tet());
        dir
    }
}

impl Default for FixtureTree {
    fn default() -> Self {
        Self::new()
    }
}

/// Writes the fake engine's artifacts for `table` into `dir`.
pub fn write_goldens(dir: &Path, table: &FrequencyTable) {
    for (artifact, contents) in FakeEngine::render(table) {
        fs::write(dir.join(artifact), contents).expect("Failed to write golden");
    }
}

/// Directory of scale files shipped with this crate.
pub fn scale_data_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join("scales")
}
