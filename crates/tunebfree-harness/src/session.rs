//! Scoped ownership of the tuning-provider connection.
//!
//! Only one master may be registered with the provider at a time. The
//! manager enforces this two ways: [`TuningSessionManager::open`] borrows the
//! manager mutably for the session's lifetime, and a process-wide flag makes
//! a second open from any other manager fail with `SessionBusy`.
//!
//! Dropping a [`TuningSession`] always disconnects, so early returns, errors
//! and panics inside a session all revert the provider to default tuning.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{HarnessError, HarnessResult};
use crate::provider::TuningProvider;
use crate::table::FrequencyTable;

static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

/// Serializes unit tests that open sessions; the flag above is process-wide.
#[cfg(test)]
pub(crate) static SESSION_TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Owns a tuning provider and hands out scoped sessions on it.
pub struct TuningSessionManager {
    provider: Box<dyn TuningProvider>,
}

impl TuningSessionManager {
    pub fn new(provider: Box<dyn TuningProvider>) -> Self {
        Self { provider }
    }

    /// Name of the managed provider.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Host-level availability check, run once before any fixture.
    pub fn check_available(&mut self) -> HarnessResult<()> {
        self.provider.check_available()
    }

    /// Clears stale provider state left by earlier masters.
    pub fn reset(&mut self) -> HarnessResult<()> {
        self.provider.reset()
    }

    /// Connects and publishes `table`.
    ///
    /// The returned session disconnects when dropped.
    pub fn open(&mut self, table: &FrequencyTable, label: &str) -> HarnessResult<TuningSession<'_>> {
        if SESSION_ACTIVE
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(HarnessError::SessionBusy);
        }

        // From here on the guard owns the flag; dropping it on the error
        // paths below releases it (and disconnects if needed).
        let mut session = TuningSession {
            provider: self.provider.as_mut(),
            connected: false,
            label: label.to_string(),
        };

        session.provider.connect()?;
        session.connected = true;
        session.provider.publish(table, label)?;
        log::debug!(
            "Opened {} session '{}' (A4 = {:.4} Hz)",
            session.provider.name(),
            label,
            table.get(69).unwrap_or_default()
        );
        Ok(session)
    }

    /// Runs `body` with `table` published, disconnecting on every exit path.
    pub fn with_session<T>(
        &mut self,
        table: &FrequencyTable,
        label: &str,
        body: impl FnOnce(&TuningSession<'_>) -> T,
    ) -> HarnessResult<T> {
        let session = self.open(table, label)?;
        Ok(body(&session))
    }
}

/// Exclusive, scoped connection to the provider.
pub struct TuningSession<'a> {
    provider: &'a mut dyn TuningProvider,
    connected: bool,
    label: String,
}

impl TuningSession<'_> {
    /// Label the table was published under.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Provider this session is connected to.
    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }
}

impl Drop for TuningSession<'_> {
    fn drop(&mut self) {
        if self.connected {
            self.provider.disconnect();
            log::debug!("Closed {} session '{}'", self.provider.name(), self.label);
        }
        SESSION_ACTIVE.store(false, Ordering::Release);
    }
}

/// Whether any session is currently open in this process.
pub fn session_active() -> bool {
    SESSION_ACTIVE.load(Ordering::Acquire)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::InMemoryProvider;

    fn lock() -> std::sync::MutexGuard<'static, ()> {
        SESSION_TEST_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn table(a4: f64) -> FrequencyTable {
        FrequencyTable::from_fn(|n| a4 * 2.0_f64.powf((n as f64 - 69.0) / 12.0)).unwrap()
    }

    #[test]
    fn test_session_publishes_and_reverts() {
        let _guard = lock();
        let provider = InMemoryProvider::new();
        let state = provider.handle();
        let mut manager = TuningSessionManager::new(Box::new(provider));

        let seen = manager
            .with_session(&table(432.0), "432", |session| {
                assert_eq!(session.label(), "432");
                state.active_table().map(|t| t.get(69))
            })
            .unwrap();

        assert_eq!(seen, Some(Some(432.0)));
        assert!(state.active_table().is_none());
        assert!(!state.is_connected());
        assert!(!session_active());
    }

    #[test]
    fn test_second_session_fails_fast() {
        let _guard = lock();
        let first = InMemoryProvider::new();
        let first_state = first.handle();
        let mut a = TuningSessionManager::new(Box::new(first));
        let mut b = TuningSessionManager::new(Box::new(InMemoryProvider::new()));

        let session = a.open(&table(440.0), "first").unwrap();
        let err = b.open(&table(415.0), "second").err().unwrap();
        assert!(matches!(err, HarnessError::SessionBusy));
        assert_eq!(first_state.active_table().and_then(|t| t.get(69)), Some(440.0));

        drop(session);
        assert!(b.open(&table(415.0), "second").is_ok());
    }

    #[test]
    fn test_rejected_publish_releases_session() {
        let _guard = lock();
        let provider = InMemoryProvider::new().reject_publish("table refused");
        let state = provider.handle();
        let mut manager = TuningSessionManager::new(Box::new(provider));

        let err = manager.open(&table(440.0), "x").err().unwrap();
        assert!(matches!(err, HarnessError::ProviderRejected { .. }));
        assert!(!state.is_connected());
        assert!(!session_active());
    }

    #[test]
    fn test_panic_inside_session_disconnects() {
        let _guard = lock();
        let provider = InMemoryProvider::new();
        let state = provider.handle();
        let mut manager = TuningSessionManager::new(Box::new(provider));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            manager
                .with_session(&table(440.0), "boom", |_| panic!("engine exploded"))
                .ok();
        }));

        assert!(result.is_err());
        assert!(!state.is_connected());
        assert!(!session_active());
    }

    #[test]
    fn test_unavailable_provider() {
        let _guard = lock();
        let mut manager = TuningSessionManager::new(Box::new(InMemoryProvider::unavailable()));
        assert!(manager.check_available().unwrap_err().is_precondition());
        assert!(manager.open(&table(440.0), "x").is_err());
        assert!(!session_active());
    }
}
