//! Engine subprocess runner.
//!
//! This module handles launching tuneBfree with a controlled environment and
//! working directory, waiting for it (with an optional bound), and turning
//! anything but a clean exit into an `EngineFailed` carrying its output.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::time::{Duration, Instant};

use crate::error::{HarnessError, HarnessResult};

/// Disables the JACK auto-connection; required on hosts without an audio server.
pub const NO_JACK_ENV: &str = "NO_JACK";

/// Makes the engine dump its oscillator tables into the working directory.
pub const DEBUG_OSC_ENV: &str = "DEBUG_TONEGEN_OSC";

/// Environment variable overriding the engine location.
pub const ENGINE_ENV: &str = "TUNEBFREE_BIN";

/// Engine binary name without the platform suffix.
pub const ENGINE_NAME: &str = "tuneBfree";

/// Default bound on a single engine run (5 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Working directory and variables for one engine invocation.
///
/// Nothing is inherited from the harness process unless it is listed here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunEnvironment {
    work_dir: PathBuf,
    vars: BTreeMap<String, String>,
}

impl RunEnvironment {
    /// Environment with the audio backend disabled.
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let mut vars = BTreeMap::new();
        vars.insert(NO_JACK_ENV.to_string(), "TRUE".to_string());
        Self {
            work_dir: work_dir.into(),
            vars,
        }
    }

    /// Toggles the oscillator snapshot dump.
    pub fn with_snapshots(mut self, enabled: bool) -> Self {
        if enabled {
            self.vars.insert(DEBUG_OSC_ENV.to_string(), "1".to_string());
        } else {
            self.vars.remove(DEBUG_OSC_ENV);
        }
        self
    }

    /// Sets a variable.
    pub fn var(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }

    /// Copies the named variables from the harness process, when set.
    pub fn pass_through<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        for name in names {
            if let Ok(value) = std::env::var(name.as_ref()) {
                self.vars.insert(name.as_ref().to_string(), value);
            }
        }
        self
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn vars(&self) -> &BTreeMap<String, String> {
        &self.vars
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Whether the snapshot dump is requested.
    pub fn snapshots_enabled(&self) -> bool {
        self.get(DEBUG_OSC_ENV).is_some_and(|v| !v.is_empty())
    }
}

/// Result of a successful engine run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

/// Something that can run the engine once.
///
/// The harness depends on this seam rather than on a process so tests can
/// substitute a runner that fabricates artifacts.
pub trait EngineRunner {
    fn run(&self, env: &RunEnvironment) -> HarnessResult<RunOutcome>;
}

impl<R: EngineRunner + ?Sized> EngineRunner for std::sync::Arc<R> {
    fn run(&self, env: &RunEnvironment) -> HarnessResult<RunOutcome> {
        (**self).run(env)
    }
}

/// Configuration for the process runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Path to the engine executable.
    pub executable: PathBuf,
    /// Extra command-line arguments.
    pub args: Vec<String>,
    /// Bound on a single run; `None` waits forever.
    pub timeout: Option<Duration>,
}

impl RunnerConfig {
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            args: Vec::new(),
            timeout: Some(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        }
    }

    /// Appends a command-line argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Sets the timeout duration.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the timeout in seconds.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout = Some(Duration::from_secs(secs));
        self
    }

    /// Waits without bound.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }
}

/// Runs the real engine as a child process.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    config: RunnerConfig,
}

impl ProcessRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }
}

impl EngineRunner for ProcessRunner {
    fn run(&self, env: &RunEnvironment) -> HarnessResult<RunOutcome> {
        let mut cmd = Command::new(&self.config.executable);
        cmd.args(&self.config.args)
            .env_clear()
            .envs(env.vars())
            .current_dir(env.work_dir())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        #[cfg(unix)]
        {
            // Own process group; a timeout kills everything the engine spawned.
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        log::debug!(
            "Running {} in {} with {:?}",
            self.config.executable.display(),
            env.work_dir().display(),
            env.vars().keys().collect::<Vec<_>>()
        );

        let start = Instant::now();
        let child = cmd.spawn().map_err(HarnessError::SpawnFailed)?;
        let (status, stdout, stderr) = wait_with_timeout(child, self.config.timeout)?;
        let duration = start.elapsed();

        if !status.success() {
            return Err(HarnessError::EngineFailed {
                status: describe_status(status),
                stdout,
                stderr,
            });
        }

        Ok(RunOutcome {
            exit_code: status.code().unwrap_or(0),
            stdout,
            stderr,
            duration,
        })
    }
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>, stream: Stream, tx: Sender<(Stream, String)>) {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        let _ = tx.send((stream, String::from_utf8_lossy(&buf).into_owned()));
    });
}

fn wait_with_timeout(
    mut child: Child,
    timeout: Option<Duration>,
) -> HarnessResult<(ExitStatus, String, String)> {
    // Drain both pipes concurrently; a full pipe would stall the engine.
    let (tx, rx) = mpsc::channel();
    drain(child.stdout.take(), Stream::Stdout, tx.clone());
    drain(child.stderr.take(), Stream::Stderr, tx);
    let deadline = timeout.map(|limit| (limit, Instant::now() + limit));

    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if let Some((limit, end)) = deadline {
                    if Instant::now() >= end {
                        return Err(expire(&mut child, limit));
                    }
                }
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => return Err(HarnessError::SpawnFailed(e)),
        }
    };

    // Descendants can inherit the pipes and keep them open after the engine
    // exits, so collection shares the same deadline.
    let mut stdout = String::new();
    let mut stderr = String::new();
    for _ in 0..2 {
        let received = match deadline {
            Some((limit, end)) => {
                match rx.recv_timeout(end.saturating_duration_since(Instant::now())) {
                    Ok(received) => received,
                    Err(RecvTimeoutError::Timeout) => return Err(expire(&mut child, limit)),
                    Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            None => match rx.recv() {
                Ok(received) => received,
                Err(_) => break,
            },
        };
        match received {
            (Stream::Stdout, text) => stdout = text,
            (Stream::Stderr, text) => stderr = text,
        }
    }
    Ok((status, stdout, stderr))
}

fn expire(child: &mut Child, limit: Duration) -> HarnessError {
    log::warn!("Engine exceeded {:?}; killing process group {}", limit, child.id());
    kill_process_group(child);
    let _ = child.kill();
    let _ = child.wait();
    HarnessError::Timeout { timeout: limit }
}

#[cfg(unix)]
fn kill_process_group(child: &Child) {
    use rustix::process::{kill_process_group, Pid, Signal};

    if let Some(pgid) = i32::try_from(child.id()).ok().and_then(Pid::from_raw) {
        let _ = kill_process_group(pgid, Signal::Kill);
    }
}

#[cfg(not(unix))]
fn kill_process_group(_child: &Child) {}

fn describe_status(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("signal {}", signal);
        }
    }
    "abnormal termination".to_string()
}

/// Finds the engine executable.
///
/// Order: explicit path, `TUNEBFREE_BIN`, `<repo_root>/build/tuneBfree`, PATH.
pub fn locate_engine(explicit: Option<&Path>, repo_root: &Path) -> HarnessResult<PathBuf> {
    let mut searched = Vec::new();

    if let Some(path) = explicit {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }
        searched.push(path.display().to_string());
    }

    if let Some(path) = std::env::var_os(ENGINE_ENV).map(PathBuf::from) {
        if path.is_file() {
            return Ok(path);
        }
        searched.push(format!("{}={}", ENGINE_ENV, path.display()));
    }

    let built = repo_root
        .join("build")
        .join(format!("{}{}", ENGINE_NAME, std::env::consts::EXE_SUFFIX));
    if built.is_file() {
        return Ok(built);
    }
    searched.push(built.display().to_string());

    if let Ok(path) = which::which(ENGINE_NAME) {
        return Ok(path);
    }
    searched.push("PATH".to_string());

    Err(HarnessError::EngineNotFound {
        searched: searched.join(", "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_environment_defaults() {
        let env = RunEnvironment::new("/tmp/x");
        assert_eq!(env.get(NO_JACK_ENV), Some("TRUE"));
        assert!(!env.snapshots_enabled());

        let env = env.with_snapshots(true).var("LANG", "C");
        assert!(env.snapshots_enabled());
        assert_eq!(env.get("LANG"), Some("C"));
        assert!(!env.with_snapshots(false).snapshots_enabled());
    }

    #[test]
    fn test_config_builder() {
        let config = RunnerConfig::new("/usr/bin/tuneBfree")
            .arg("-c")
            .arg("organ.cfg")
            .timeout_secs(60);
        assert_eq!(config.args, vec!["-c".to_string(), "organ.cfg".to_string()]);
        assert_eq!(config.timeout, Some(Duration::from_secs(60)));
        assert_eq!(config.no_timeout().timeout, None);
    }

    #[cfg(unix)]
    fn sh(script: &str) -> ProcessRunner {
        ProcessRunner::new(RunnerConfig::new("/bin/sh").arg("-c").arg(script).timeout_secs(10))
    }

    #[cfg(unix)]
    #[test]
    fn test_runs_with_controlled_environment() {
        let dir = TempDir::new().unwrap();
        let env = RunEnvironment::new(dir.path()).with_snapshots(true);
        let outcome = sh("echo \"jack=$NO_JACK osc=$DEBUG_OSC home=$HOME\"; echo warn 1>&2; echo made > osc.txt")
            .run(&env.var("DEBUG_OSC", "set"))
            .unwrap();

        assert_eq!(outcome.exit_code, 0);
        assert!(outcome.stdout.contains("jack=TRUE osc=set home="));
        assert!(!outcome.stdout.contains("home=/"));
        assert!(outcome.stderr.contains("warn"));
        assert!(dir.path().join("osc.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_zero_exit_carries_output() {
        let dir = TempDir::new().unwrap();
        let err = sh("echo partial; echo 'no MIDI' 1>&2; exit 3")
            .run(&RunEnvironment::new(dir.path()))
            .unwrap_err();
        match err {
            HarnessError::EngineFailed {
                status,
                stdout,
                stderr,
            } => {
                assert_eq!(status, "exit code 3");
                assert!(stdout.contains("partial"));
                assert!(stderr.contains("no MIDI"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_signal_death_is_engine_failure() {
        let dir = TempDir::new().unwrap();
        let err = sh("kill -9 $$").run(&RunEnvironment::new(dir.path())).unwrap_err();
        assert!(err.to_string().contains("signal 9"), "{}", err);
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_kills_engine() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new(
            RunnerConfig::new("/bin/sh")
                .arg("-c")
                .arg("while :; do :; done")
                .timeout(Duration::from_millis(200)),
        );
        let start = Instant::now();
        let err = runner.run(&RunEnvironment::new(dir.path())).unwrap_err();
        assert!(matches!(err, HarnessError::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[test]
    fn test_timeout_covers_descendants_holding_output() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new(
            RunnerConfig::new("/bin/sh")
                .arg("-c")
                .arg("sleep 6 & echo started")
                .timeout(Duration::from_secs(1)),
        );
        let start = Instant::now();
        let err = runner.run(&RunEnvironment::new(dir.path())).unwrap_err();
        assert!(matches!(err, HarnessError::Timeout { .. }), "{}", err);
        assert!(start.elapsed() < Duration::from_secs(4));
    }

    #[cfg(unix)]
    #[test]
    fn test_detached_descendant_does_not_hold_the_run() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new(
            RunnerConfig::new("/bin/sh")
                .arg("-c")
                .arg("sleep 6 >/dev/null 2>&1 & echo started")
                .timeout(Duration::from_secs(3)),
        );
        let start = Instant::now();
        let outcome = runner.run(&RunEnvironment::new(dir.path())).unwrap();
        assert!(outcome.stdout.contains("started"));
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[test]
    fn test_spawn_failure() {
        let dir = TempDir::new().unwrap();
        let runner = ProcessRunner::new(RunnerConfig::new(dir.path().join("missing-engine")));
        let err = runner.run(&RunEnvironment::new(dir.path())).unwrap_err();
        assert!(matches!(err, HarnessError::SpawnFailed(_)));
    }

    #[test]
    fn test_locate_engine_prefers_explicit_then_build_dir() {
        let repo = TempDir::new().unwrap();
        let explicit = repo.path().join("custom-engine");
        std::fs::write(&explicit, "").unwrap();
        assert_eq!(locate_engine(Some(&explicit), repo.path()).unwrap(), explicit);

        if std::env::var_os(ENGINE_ENV).is_some() {
            eprintln!("{} is set; skipping build dir lookup", ENGINE_ENV);
            return;
        }

        let built = repo
            .path()
            .join("build")
            .join(format!("{}{}", ENGINE_NAME, std::env::consts::EXE_SUFFIX));
        std::fs::create_dir_all(built.parent().unwrap()).unwrap();
        std::fs::write(&built, "").unwrap();
        let missing = repo.path().join("not-there");
        assert_eq!(locate_engine(Some(&missing), repo.path()).unwrap(), built);
    }
}
