//! Per-note frequency tables.

use std::fmt;

use crate::error::{HarnessError, HarnessResult};

/// Number of MIDI notes covered by a table.
pub const NOTE_COUNT: usize = 128;

/// MIDI note of A4.
pub const A4_NOTE: u8 = 69;

/// Concert pitch of A4 in Hz.
pub const A4_FREQUENCY: f64 = 440.0;

/// One frequency in Hz for every MIDI note 0-127.
///
/// Construction validates that every entry is a strictly positive finite
/// number, so a table that exists is always publishable.
#[derive(Clone, PartialEq)]
pub struct FrequencyTable {
    freqs: [f64; NOTE_COUNT],
}

impl FrequencyTable {
    /// Builds a table by evaluating `f` for every note.
    pub fn from_fn(f: impl Fn(u8) -> f64) -> HarnessResult<Self> {
        let mut freqs = [0.0; NOTE_COUNT];
        for (note, slot) in freqs.iter_mut().enumerate() {
            *slot = f(note as u8);
        }
        Self::from_array(freqs)
    }

    /// Validates an array of frequencies.
    pub fn from_array(freqs: [f64; NOTE_COUNT]) -> HarnessResult<Self> {
        if let Some((note, freq)) = freqs
            .iter()
            .enumerate()
            .find(|(_, f)| !(f.is_finite() && **f > 0.0))
        {
            return Err(HarnessError::InvalidFrequencyTable {
                message: format!("note {} has frequency {}", note, freq),
            });
        }
        Ok(Self { freqs })
    }

    /// 12-tone equal temperament with A4 = 440 Hz, the engine's built-in tuning.
    pub fn twelve_tet() -> Self {
        let mut freqs = [0.0; NOTE_COUNT];
        for (note, slot) in freqs.iter_mut().enumerate() {
            *slot = A4_FREQUENCY * 2.0_f64.powf((note as f64 - A4_NOTE as f64) / 12.0);
        }
        Self { freqs }
    }

    /// Frequency of a note, or `None` above 127.
    pub fn get(&self, note: u8) -> Option<f64> {
        self.freqs.get(note as usize).copied()
    }

    /// All 128 frequencies in note order.
    pub fn as_slice(&self) -> &[f64] {
        &self.freqs
    }

    /// Raw array view, laid out the way C APIs expect it.
    pub fn as_array(&self) -> &[f64; NOTE_COUNT] {
        &self.freqs
    }
}

impl TryFrom<Vec<f64>> for FrequencyTable {
    type Error = HarnessError;

    fn try_from(freqs: Vec<f64>) -> HarnessResult<Self> {
        let len = freqs.len();
        let freqs: [f64; NOTE_COUNT] =
            freqs
                .try_into()
                .map_err(|_| HarnessError::InvalidFrequencyTable {
                    message: format!("expected {} entries, got {}", NOTE_COUNT, len),
                })?;
        Self::from_array(freqs)
    }
}

impl fmt::Debug for FrequencyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrequencyTable")
            .field("note_0", &self.freqs[0])
            .field("a4", &self.freqs[A4_NOTE as usize])
            .field("note_127", &self.freqs[NOTE_COUNT - 1])
            .finish()
    }
}
