//! Oscillator snapshot comparison.
//!
//! With `DEBUG_TONEGEN_OSC` set the engine writes three text dumps into its
//! working directory. They are compared byte-for-byte with the goldens; no
//! line-ending or whitespace normalization is applied.

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{HarnessError, HarnessResult};

/// Oscillator frequency/configuration table.
pub const OSC_TABLE: &str = "osc.txt";
/// Oscillator configuration-list dump.
pub const OSC_CFGLISTS: &str = "osc_cfglists.txt";
/// Oscillator runtime-state dump.
pub const OSC_RUNTIME: &str = "osc_runtime.txt";

/// The artifacts every snapshot consists of, in reporting order.
pub const SNAPSHOT_ARTIFACTS: [&str; 3] = [OSC_TABLE, OSC_CFGLISTS, OSC_RUNTIME];

/// Where two artifacts first diverge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Divergence {
    /// Byte offset of the first difference (or of the shorter length).
    pub offset: usize,
    /// 1-based line of that offset in the golden file.
    pub line: usize,
    pub golden_len: usize,
    pub actual_len: usize,
    /// BLAKE3 of the golden bytes.
    pub golden_hash: String,
    /// BLAKE3 of the actual bytes.
    pub actual_hash: String,
}

impl fmt::Display for Divergence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "first difference at byte {} (line {}); golden {} bytes, actual {} bytes",
            self.offset, self.line, self.golden_len, self.actual_len
        )
    }
}

/// Outcome for one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ArtifactStatus {
    Match,
    Mismatch(Divergence),
    /// The engine did not write the artifact.
    MissingActual { path: PathBuf },
    /// The fixture has no golden copy of the artifact.
    MissingGolden { path: PathBuf },
}

/// Comparison of one named artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactComparison {
    pub artifact: String,
    #[serde(flatten)]
    pub status: ArtifactStatus,
}

impl ArtifactComparison {
    pub fn matches(&self) -> bool {
        self.status == ArtifactStatus::Match
    }
}

/// Per-artifact results for one fixture.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ComparisonResult {
    pub artifacts: Vec<ArtifactComparison>,
}

impl ComparisonResult {
    /// Whether every artifact matched.
    pub fn all_match(&self) -> bool {
        self.artifacts.iter().all(ArtifactComparison::matches)
    }

    /// Looks up one artifact's result.
    pub fn get(&self, artifact: &str) -> Option<&ArtifactComparison> {
        self.artifacts.iter().find(|a| a.artifact == artifact)
    }

    /// Names of the artifacts that exist on both sides but differ.
    pub fn diverged(&self) -> Vec<String> {
        self.artifacts
            .iter()
            .filter(|a| matches!(a.status, ArtifactStatus::Mismatch(_)))
            .map(|a| a.artifact.clone())
            .collect()
    }

    /// Collapses the result into the harness error taxonomy.
    ///
    /// Missing artifacts take precedence over mismatches: a run that did not
    /// dump its state says nothing about whether the state is right.
    pub fn to_result(&self, golden_dir: &Path) -> HarnessResult<()> {
        for entry in &self.artifacts {
            match &entry.status {
                ArtifactStatus::MissingActual { path } => {
                    return Err(HarnessError::SnapshotMissing {
                        artifact: entry.artifact.clone(),
                        path: path.clone(),
                    })
                }
                ArtifactStatus::MissingGolden { .. } => {
                    return Err(HarnessError::malformed(
                        golden_dir,
                        format!("golden {} missing", entry.artifact),
                    ))
                }
                _ => {}
            }
        }

        let diverged = self.diverged();
        if diverged.is_empty() {
            Ok(())
        } else {
            Err(HarnessError::SnapshotMismatch {
                artifacts: diverged,
            })
        }
    }
}

/// Compares the snapshot artifacts in `actual_dir` against `golden_dir`.
///
/// Only IO errors other than "not found" abort the comparison.
pub fn compare(golden_dir: &Path, actual_dir: &Path) -> HarnessResult<ComparisonResult> {
    let mut artifacts = Vec::with_capacity(SNAPSHOT_ARTIFACTS.len());
    for artifact in SNAPSHOT_ARTIFACTS {
        let golden_path = golden_dir.join(artifact);
        let actual_path = actual_dir.join(artifact);

        let status = match (read_optional(&golden_path)?, read_optional(&actual_path)?) {
            (_, None) => ArtifactStatus::MissingActual { path: actual_path },
            (None, Some(_)) => ArtifactStatus::MissingGolden { path: golden_path },
            (Some(golden), Some(actual)) => match find_divergence(&golden, &actual) {
                None => ArtifactStatus::Match,
                Some(d) => ArtifactStatus::Mismatch(d),
            },
        };
        artifacts.push(ArtifactComparison {
            artifact: artifact.to_string(),
            status,
        });
    }
    Ok(ComparisonResult { artifacts })
}

/// Copies the actual artifacts over the goldens.
pub fn update_goldens(golden_dir: &Path, actual_dir: &Path) -> HarnessResult<()> {
    for artifact in SNAPSHOT_ARTIFACTS {
        let from = actual_dir.join(artifact);
        if !from.is_file() {
            return Err(HarnessError::SnapshotMissing {
                artifact: artifact.to_string(),
                path: from,
            });
        }
        let to = golden_dir.join(artifact);
        fs::copy(&from, &to).map_err(|e| HarnessError::io(&to, e))?;
    }
    log::warn!("Refreshed golden snapshots in {}", golden_dir.display());
    Ok(())
}

/// Whether golden refresh was requested through `TUNEBFREE_UPDATE_GOLDENS`.
pub fn should_update_goldens() -> bool {
    std::env::var("TUNEBFREE_UPDATE_GOLDENS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

fn read_optional(path: &Path) -> HarnessResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(HarnessError::io(path, e)),
    }
}

fn find_divergence(golden: &[u8], actual: &[u8]) -> Option<Divergence> {
    if golden == actual {
        return None;
    }
    let offset = golden
        .iter()
        .zip(actual.iter())
        .position(|(g, a)| g != a)
        .unwrap_or_else(|| golden.len().min(actual.len()));
    let line = golden[..offset.min(golden.len())]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1;
    Some(Divergence {
        offset,
        line,
        golden_len: golden.len(),
        actual_len: actual.len(),
        golden_hash: blake3::hash(golden).to_hex().to_string(),
        actual_hash: blake3::hash(actual).to_hex().to_string(),
    })
}
