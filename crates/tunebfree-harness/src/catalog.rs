//! Fixture discovery.
//!
//! Two layouts are supported side by side:
//!
//! - **Regression** (`discover`): one subdirectory per fixture, holding at
//!   most one `.scl` file plus golden oscillator snapshots.
//! - **Flat** (`discover_flat`): a single directory of `.scl` files, one
//!   smoke fixture per file, no goldens.
//!
//! Ordering is lexicographic by file name so failures reproduce across runs.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{HarnessError, HarnessResult};
use crate::scala::SCALE_EXTENSION;
use crate::snapshot::SNAPSHOT_ARTIFACTS;

/// A single harness input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleFixture {
    /// Fixture name (directory name, or scale file stem in flat mode).
    pub name: String,
    /// Directory holding the goldens (and the scale file for regression fixtures).
    pub dir: PathBuf,
    /// Scale to publish; `None` runs under default tuning.
    pub scale: Option<PathBuf>,
    /// Golden snapshot artifacts present in `dir`.
    pub goldens: Vec<String>,
}

impl ScaleFixture {
    /// Loads a regression fixture from its directory.
    pub fn from_dir(dir: &Path) -> HarnessResult<Self> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| dir.display().to_string());

        let mut scales = list_scale_files(dir)?;
        if scales.len() > 1 {
            let names: Vec<String> = scales
                .iter()
                .filter_map(|p| p.file_name())
                .map(|n| n.to_string_lossy().into_owned())
                .collect();
            return Err(HarnessError::malformed(
                dir,
                format!("{} scale files ({})", scales.len(), names.join(", ")),
            ));
        }

        let goldens = SNAPSHOT_ARTIFACTS
            .iter()
            .filter(|artifact| dir.join(artifact).is_file())
            .map(|artifact| artifact.to_string())
            .collect();

        Ok(Self {
            name,
            dir: dir.to_path_buf(),
            scale: scales.pop(),
            goldens,
        })
    }

    /// Smoke fixture for a lone scale file.
    pub fn from_scale_file(path: &Path) -> Self {
        let name = path
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            name,
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            scale: Some(path.to_path_buf()),
            goldens: Vec::new(),
        }
    }

    /// Whether the fixture runs under the engine's default tuning.
    pub fn is_default_tuning(&self) -> bool {
        self.scale.is_none()
    }

    /// Whether the fixture carries goldens to compare against.
    pub fn has_goldens(&self) -> bool {
        !self.goldens.is_empty()
    }
}

/// One discovered fixture directory, usable or not.
#[derive(Debug)]
pub struct Discovered {
    pub name: String,
    pub dir: PathBuf,
    pub fixture: HarnessResult<ScaleFixture>,
}

/// Lists the fixture directories under `root`.
///
/// A malformed directory does not fail discovery; its entry carries the
/// error so the suite can report it alongside the others.
pub fn discover(root: &Path) -> HarnessResult<Vec<Discovered>> {
    ensure_dir(root)?;

    let mut found = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| walk_error(root, e))?;
        if !entry.file_type().is_dir() {
            continue;
        }
        let dir = entry.into_path();
        let fixture = ScaleFixture::from_dir(&dir);
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        found.push(Discovered { name, dir, fixture });
    }

    log::debug!("Discovered {} fixture(s) under {}", found.len(), root.display());
    Ok(found)
}

/// Lists the `.scl` files directly inside `dir` as smoke fixtures.
pub fn discover_flat(dir: &Path) -> HarnessResult<Vec<ScaleFixture>> {
    ensure_dir(dir)?;
    let fixtures: Vec<ScaleFixture> = list_scale_files(dir)?
        .iter()
        .map(|path| ScaleFixture::from_scale_file(path))
        .collect();
    log::debug!("Discovered {} scale file(s) in {}", fixtures.len(), dir.display());
    Ok(fixtures)
}

/// Keeps every `stride`-th item, starting with the first.
pub fn sample_every<T>(items: Vec<T>, stride: usize) -> Vec<T> {
    let stride = stride.max(1);
    items.into_iter().step_by(stride).collect()
}

/// Applies an optional name filter to a discovered catalog.
///
/// An empty catalog is `EmptyCatalog`. A filter that leaves nothing is
/// `NoFixturesMatched`, which is not a precondition failure.
pub fn select<T>(
    root: &Path,
    items: Vec<T>,
    pattern: Option<&str>,
    name: impl Fn(&T) -> &str,
) -> HarnessResult<Vec<T>> {
    if items.is_empty() {
        return Err(HarnessError::EmptyCatalog {
            root: root.to_path_buf(),
        });
    }
    let Some(pattern) = pattern else {
        return Ok(items);
    };
    let kept: Vec<T> = items
        .into_iter()
        .filter(|item| name(item).contains(pattern))
        .collect();
    if kept.is_empty() {
        return Err(HarnessError::NoFixturesMatched {
            root: root.to_path_buf(),
            filter: pattern.to_string(),
        });
    }
    Ok(kept)
}

fn ensure_dir(root: &Path) -> HarnessResult<()> {
    if root.is_dir() {
        Ok(())
    } else {
        Err(HarnessError::FixtureRootMissing {
            root: root.to_path_buf(),
        })
    }
}

fn list_scale_files(dir: &Path) -> HarnessResult<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| walk_error(dir, e))?;
        let is_scale = entry
            .path()
            .extension()
            .map(|e| e == SCALE_EXTENSION)
            .unwrap_or(false);
        if entry.file_type().is_file() && is_scale {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn walk_error(root: &Path, err: walkdir::Error) -> HarnessError {
    let path = err.path().unwrap_or(root).to_path_buf();
    let source = err
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    HarnessError::io(path, source)
}
