//! In-process stand-ins for the tuning provider and the engine.
//!
//! [`InMemoryProvider`] keeps the published table in shared state that a
//! [`FakeEngine`] reads back, the way tuneBfree queries MTS-ESP at startup.
//! Together they exercise the whole pipeline without the real binary or the
//! host library.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};
use crate::provider::TuningProvider;
use crate::runner::{EngineRunner, RunEnvironment, RunOutcome, NO_JACK_ENV};
use crate::snapshot::{OSC_CFGLISTS, OSC_RUNTIME, OSC_TABLE};
use crate::table::FrequencyTable;

#[derive(Debug, Default)]
struct ProviderState {
    connected: bool,
    active: Option<FrequencyTable>,
    labels: Vec<String>,
    connects: usize,
    resets: usize,
}

/// Observer side of an [`InMemoryProvider`].
#[derive(Debug, Clone, Default)]
pub struct ProviderHandle(Arc<Mutex<ProviderState>>);

impl ProviderHandle {
    fn state(&self) -> MutexGuard<'_, ProviderState> {
        self.0.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Table a client would see right now; `None` means default tuning.
    pub fn active_table(&self) -> Option<FrequencyTable> {
        self.state().active.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    /// Labels of every table published so far.
    pub fn published_labels(&self) -> Vec<String> {
        self.state().labels.clone()
    }

    pub fn connect_count(&self) -> usize {
        self.state().connects
    }

    pub fn reset_count(&self) -> usize {
        self.state().resets
    }

    /// Leaves `table` published as if a crashed master never deregistered.
    pub fn leave_stale_master(&self, table: FrequencyTable) {
        let mut state = self.state();
        state.connected = true;
        state.active = Some(table);
    }
}

/// Provider that lives entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    handle: ProviderHandle,
    unavailable: bool,
    reject_publish: Option<String>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider whose host runtime is "not installed".
    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Provider that connects but refuses every table.
    pub fn reject_publish(mut self, message: impl Into<String>) -> Self {
        self.reject_publish = Some(message.into());
        self
    }

    /// Shares this provider's state.
    pub fn handle(&self) -> ProviderHandle {
        self.handle.clone()
    }

    /// Provider that publishes into an existing handle.
    pub fn with_handle(handle: ProviderHandle) -> Self {
        Self {
            handle,
            ..Self::default()
        }
    }
}

impl TuningProvider for InMemoryProvider {
    fn name(&self) -> &str {
        "in-memory"
    }

    fn check_available(&mut self) -> HarnessResult<()> {
        if self.unavailable {
            Err(HarnessError::provider_unavailable(
                self.name(),
                "runtime not installed",
            ))
        } else {
            Ok(())
        }
    }

    fn reset(&mut self) -> HarnessResult<()> {
        self.check_available()?;
        let mut state = self.handle.state();
        state.connected = false;
        state.active = None;
        state.resets += 1;
        Ok(())
    }

    fn connect(&mut self) -> HarnessResult<()> {
        self.check_available()?;
        let mut state = self.handle.state();
        state.connected = true;
        state.connects += 1;
        Ok(())
    }

    fn publish(&mut self, table: &FrequencyTable, label: &str) -> HarnessResult<()> {
        if let Some(message) = &self.reject_publish {
            return Err(HarnessError::provider_rejected("in-memory", message.clone()));
        }
        let mut state = self.handle.state();
        state.active = Some(table.clone());
        state.labels.push(label.to_string());
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut state = self.handle.state();
        state.connected = false;
        state.active = None;
    }
}

#[derive(Debug, Clone)]
enum Behavior {
    Healthy,
    Exit { code: i32, stderr: String },
    TimeOut,
}

/// Engine double that writes snapshot artifacts derived from the tuning it sees.
#[derive(Debug)]
pub struct FakeEngine {
    tuning: ProviderHandle,
    behavior: Behavior,
    fail_for: Option<String>,
    runs: Mutex<Vec<PathBuf>>,
}

impl FakeEngine {
    /// Engine reading its tuning from `tuning`.
    pub fn new(tuning: ProviderHandle) -> Self {
        Self {
            tuning,
            behavior: Behavior::Healthy,
            fail_for: None,
            runs: Mutex::new(Vec::new()),
        }
    }

    /// Every run exits with `code`.
    pub fn exiting(mut self, code: i32, stderr: impl Into<String>) -> Self {
        self.behavior = Behavior::Exit {
            code,
            stderr: stderr.into(),
        };
        self
    }

    /// Every run exceeds the runner's time bound.
    pub fn timing_out(mut self) -> Self {
        self.behavior = Behavior::TimeOut;
        self
    }

    /// Runs whose working directory name contains `marker` exit with status 1.
    pub fn failing_for(mut self, marker: impl Into<String>) -> Self {
        self.fail_for = Some(marker.into());
        self
    }

    /// Working directories of every run so far.
    pub fn work_dirs(&self) -> Vec<PathBuf> {
        self.runs.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Snapshot bytes the engine would write under `table`.
    pub fn render(table: &FrequencyTable) -> [(&'static str, String); 3] {
        let mut osc = String::new();
        let mut cfg = String::new();
        let mut runtime = String::new();
        for (note, freq) in table.as_slice().iter().enumerate() {
            let _ = writeln!(osc, "{:3} {:.6}", note, freq);
            let _ = writeln!(cfg, "{:3} wheel={} drawbars=888000000", note, note % 91);
            let _ = writeln!(runtime, "{:3} increment={:.9}", note, freq / 48000.0);
        }
        [(OSC_TABLE, osc), (OSC_CFGLISTS, cfg), (OSC_RUNTIME, runtime)]
    }
}

impl EngineRunner for FakeEngine {
    fn run(&self, env: &RunEnvironment) -> HarnessResult<RunOutcome> {
        self.runs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(env.work_dir().to_path_buf());

        if env.get(NO_JACK_ENV) != Some("TRUE") {
            return Err(HarnessError::EngineFailed {
                status: "exit code 1".to_string(),
                stdout: String::new(),
                stderr: "cannot connect to JACK server".to_string(),
            });
        }

        let dir_name = env.work_dir().to_string_lossy().into_owned();
        if let Some(marker) = &self.fail_for {
            if dir_name.contains(marker.as_str()) {
                return Err(HarnessError::EngineFailed {
                    status: "exit code 1".to_string(),
                    stdout: String::new(),
                    stderr: format!("scripted failure for {}", marker),
                });
            }
        }

        match &self.behavior {
            Behavior::Healthy => {}
            Behavior::Exit { code, stderr } => {
                return Err(HarnessError::EngineFailed {
                    status: format!("exit code {}", code),
                    stdout: String::new(),
                    stderr: stderr.clone(),
                })
            }
            Behavior::TimeOut => {
                return Err(HarnessError::Timeout {
                    timeout: Duration::ZERO,
                })
            }
        }

        if env.snapshots_enabled() {
            let table = self
                .tuning
                .active_table()
                .unwrap_or_else(FrequencyTable::twelve_tet);
            for (artifact, contents) in Self::render(&table) {
                let path = env.work_dir().join(artifact);
                fs::write(&path, contents).map_err(|e| HarnessError::io(&path, e))?;
            }
        }

        Ok(RunOutcome {
            exit_code: 0,
            stdout: "tuneBfree fake: ok\n".to_string(),
            stderr: String::new(),
            duration: Duration::from_millis(1),
        })
    }
}
