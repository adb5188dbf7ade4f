//! Tuning providers.
//!
//! A provider is the host-level service the engine queries for per-note
//! frequencies. The harness acts as the provider's master: it connects,
//! publishes a table, and disconnects so the provider falls back to its
//! default tuning.

pub mod mts;

use crate::error::HarnessResult;
use crate::table::FrequencyTable;

pub use mts::MtsEspProvider;

/// Master-side access to a tuning provider.
///
/// Implementations do not guard against concurrent sessions themselves;
/// [`crate::session::TuningSessionManager`] owns that invariant.
pub trait TuningProvider: Send {
    /// Short human-readable provider name.
    fn name(&self) -> &str;

    /// Checks that the provider runtime is installed on this host.
    fn check_available(&mut self) -> HarnessResult<()>;

    /// Clears state left behind by earlier masters. Called once before a run.
    fn reset(&mut self) -> HarnessResult<()> {
        Ok(())
    }

    /// Registers as the active master.
    fn connect(&mut self) -> HarnessResult<()>;

    /// Publishes one frequency per MIDI note.
    fn publish(&mut self, table: &FrequencyTable, label: &str) -> HarnessResult<()>;

    /// Deregisters; the provider must revert to its default tuning.
    fn disconnect(&mut self);
}
