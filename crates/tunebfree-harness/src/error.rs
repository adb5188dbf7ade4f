//! Error types for the tuneBfree regression harness.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while driving the engine through the fixture matrix.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// Fixture directory is ambiguous or otherwise unusable.
    #[error("Malformed fixture {dir}: {reason}")]
    MalformedFixture { dir: PathBuf, reason: String },

    /// Discovery found nothing to run.
    #[error("No fixtures found under {root}")]
    EmptyCatalog { root: PathBuf },

    /// Fixtures exist, but none passed the name filter.
    #[error("No fixtures under {root} match '{filter}'")]
    NoFixturesMatched { root: PathBuf, filter: String },

    /// The fixture root does not exist or is not a directory.
    #[error("Fixture root not found: {root}")]
    FixtureRootMissing { root: PathBuf },

    /// A scale file could not be turned into a frequency table.
    #[error("Failed to resolve scale {path}: {message}")]
    ScaleResolution { path: PathBuf, message: String },

    /// A frequency table violated its shape or value constraints.
    #[error("Invalid frequency table: {message}")]
    InvalidFrequencyTable { message: String },

    /// The tuning provider runtime is not installed on this host.
    #[error("Tuning provider '{provider}' unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    /// The provider was reachable but refused the connection or table.
    #[error("Tuning provider '{provider}' rejected the request: {message}")]
    ProviderRejected { provider: String, message: String },

    /// A tuning session is already open somewhere in this process.
    #[error("A tuning session is already open; only one may be active at a time")]
    SessionBusy,

    /// Engine executable not found.
    #[error("Engine executable not found. Build tuneBfree into build/, or set TUNEBFREE_BIN (searched: {searched})")]
    EngineNotFound { searched: String },

    /// Failed to spawn the engine process.
    #[error("Failed to spawn engine process: {0}")]
    SpawnFailed(#[source] std::io::Error),

    /// Engine exited unsuccessfully.
    #[error("Engine failed ({status})\nstdout: {stdout}\nstderr: {stderr}")]
    EngineFailed {
        status: String,
        stdout: String,
        stderr: String,
    },

    /// Engine did not exit within the configured bound.
    #[error("Engine process timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The engine did not write an expected artifact.
    #[error("Snapshot artifact '{artifact}' missing at {path} (was DEBUG_TONEGEN_OSC set?)")]
    SnapshotMissing { artifact: String, path: PathBuf },

    /// Artifacts exist on both sides but differ.
    #[error("Snapshot mismatch in {}", artifacts.join(", "))]
    SnapshotMismatch { artifacts: Vec<String> },

    /// IO error during file operations.
    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HarnessError {
    /// Creates a new malformed fixture error.
    pub fn malformed(dir: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::MalformedFixture {
            dir: dir.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new scale resolution error.
    pub fn scale(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ScaleResolution {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new provider unavailable error.
    pub fn provider_unavailable(provider: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ProviderUnavailable {
            provider: provider.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new provider rejected error.
    pub fn provider_rejected(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ProviderRejected {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Wraps an IO error with the path it happened on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Stable error code for reporting.
    pub fn code(&self) -> &'static str {
        match self {
            HarnessError::MalformedFixture { .. } => "HARNESS_001",
            HarnessError::EmptyCatalog { .. } => "HARNESS_002",
            HarnessError::FixtureRootMissing { .. } => "HARNESS_003",
            HarnessError::ScaleResolution { .. } => "HARNESS_004",
            HarnessError::InvalidFrequencyTable { .. } => "HARNESS_005",
            HarnessError::ProviderUnavailable { .. } => "HARNESS_006",
            HarnessError::ProviderRejected { .. } => "HARNESS_007",
            HarnessError::SessionBusy => "HARNESS_008",
            HarnessError::EngineNotFound { .. } => "HARNESS_009",
            HarnessError::SpawnFailed(_) => "HARNESS_010",
            HarnessError::EngineFailed { .. } => "HARNESS_011",
            HarnessError::Timeout { .. } => "HARNESS_012",
            HarnessError::SnapshotMissing { .. } => "HARNESS_013",
            HarnessError::SnapshotMismatch { .. } => "HARNESS_014",
            HarnessError::Io { .. } => "HARNESS_015",
            HarnessError::NoFixturesMatched { .. } => "HARNESS_016",
        }
    }

    /// Pipeline stage the error belongs to.
    pub fn stage(&self) -> &'static str {
        match self {
            HarnessError::MalformedFixture { .. }
            | HarnessError::EmptyCatalog { .. }
            | HarnessError::NoFixturesMatched { .. }
            | HarnessError::FixtureRootMissing { .. } => "fixture",
            HarnessError::ScaleResolution { .. } | HarnessError::InvalidFrequencyTable { .. } => {
                "scale"
            }
            HarnessError::ProviderUnavailable { .. } | HarnessError::ProviderRejected { .. } => {
                "provider"
            }
            HarnessError::SessionBusy => "session",
            HarnessError::EngineNotFound { .. }
            | HarnessError::SpawnFailed(_)
            | HarnessError::EngineFailed { .. }
            | HarnessError::Timeout { .. } => "engine",
            HarnessError::SnapshotMissing { .. } | HarnessError::SnapshotMismatch { .. } => {
                "snapshot"
            }
            HarnessError::Io { .. } => "io",
        }
    }

    /// Whether this error invalidates the whole run rather than one fixture.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            HarnessError::ProviderUnavailable { .. }
                | HarnessError::EmptyCatalog { .. }
                | HarnessError::FixtureRootMissing { .. }
                | HarnessError::EngineNotFound { .. }
        )
    }
}
