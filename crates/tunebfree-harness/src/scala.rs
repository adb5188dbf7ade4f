//! Scale resolution: `.scl` files to per-note frequency tables.
//!
//! The harness only needs a [`ScaleResolver`]; [`ScalaResolver`] is the
//! implementation used against the Scala scale archive. It applies the
//! standard linear keyboard mapping: note 60 carries the scale root at
//! middle C (12-TET, A4 = 440 Hz), each following key takes the next scale
//! degree, and the last degree of the file is the period.

use std::fs;
use std::path::Path;

use crate::error::{HarnessError, HarnessResult};
use crate::table::FrequencyTable;

/// File extension of Scala scale definitions.
pub const SCALE_EXTENSION: &str = "scl";

/// Converts a scale-definition file into a frequency table.
pub trait ScaleResolver {
    /// Resolves the file at `path` into 128 per-note frequencies.
    fn resolve(&self, path: &Path) -> HarnessResult<FrequencyTable>;
}

/// Keyboard mapping applied to a scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyboardMapping {
    /// MIDI note that plays scale degree 0.
    pub root_note: u8,
    /// Frequency of the root note in Hz.
    pub root_frequency: f64,
}

impl Default for KeyboardMapping {
    fn default() -> Self {
        Self {
            root_note: 60,
            root_frequency: 261.6255653005986,
        }
    }
}

/// A parsed Scala scale: degrees in cents above the root, period last.
#[derive(Debug, Clone, PartialEq)]
pub struct Scale {
    pub description: String,
    pub cents: Vec<f64>,
}

impl Scale {
    /// Parses Scala text.
    pub fn parse(text: &str) -> Result<Self, String> {
        let mut lines = text
            .lines()
            .map(|l| l.trim_end_matches('\r'))
            .filter(|l| !l.starts_with('!'));

        let description = lines
            .next()
            .ok_or_else(|| "missing description line".to_string())?
            .trim()
            .to_string();

        let count_line = lines
            .next()
            .ok_or_else(|| "missing degree count".to_string())?;
        let count: usize = first_token(count_line)
            .parse()
            .map_err(|_| format!("invalid degree count '{}'", count_line.trim()))?;
        if count == 0 {
            return Err("scale has no degrees".to_string());
        }

        let mut cents = Vec::with_capacity(count);
        for line in lines {
            if cents.len() == count {
                break;
            }
            let token = first_token(line);
            if token.is_empty() {
                continue;
            }
            cents.push(parse_degree(token)?);
        }

        if cents.len() < count {
            return Err(format!(
                "expected {} degrees, found {}",
                count,
                cents.len()
            ));
        }

        Ok(Self { description, cents })
    }

    /// Size of the period in cents (the last degree).
    pub fn period_cents(&self) -> f64 {
        self.cents[self.cents.len() - 1]
    }

    /// Cents above the root for a key offset from the root note.
    pub fn cents_for_offset(&self, offset: i32) -> f64 {
        let len = self.cents.len() as i32;
        let periods = offset.div_euclid(len);
        let degree = offset.rem_euclid(len);
        let within = if degree == 0 {
            0.0
        } else {
            self.cents[(degree - 1) as usize]
        };
        periods as f64 * self.period_cents() + within
    }

    /// Frequencies for all notes under a keyboard mapping.
    pub fn frequencies(&self, mapping: KeyboardMapping) -> HarnessResult<FrequencyTable> {
        FrequencyTable::from_fn(|note| {
            let offset = note as i32 - mapping.root_note as i32;
            mapping.root_frequency * 2.0_f64.powf(self.cents_for_offset(offset) / 1200.0)
        })
    }
}

fn first_token(line: &str) -> &str {
    line.split_whitespace().next().unwrap_or("")
}

fn parse_degree(token: &str) -> Result<f64, String> {
    if token.contains('.') {
        return token
            .parse::<f64>()
            .map_err(|_| format!("invalid cents value '{}'", token));
    }

    let (num, den) = match token.split_once('/') {
        Some((n, d)) => (n, d),
        None => (token, "1"),
    };
    let num: f64 = num
        .parse::<u64>()
        .map_err(|_| format!("invalid ratio '{}'", token))? as f64;
    let den: f64 = den
        .parse::<u64>()
        .map_err(|_| format!("invalid ratio '{}'", token))? as f64;
    if num == 0.0 || den == 0.0 {
        return Err(format!("ratio '{}' must be positive", token));
    }
    Ok(1200.0 * (num / den).log2())
}

/// Resolves `.scl` files with a fixed keyboard mapping.
#[derive(Debug, Clone, Default)]
pub struct ScalaResolver {
    mapping: KeyboardMapping,
}

impl ScalaResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping(mapping: KeyboardMapping) -> Self {
        Self { mapping }
    }
}

impl ScaleResolver for ScalaResolver {
    fn resolve(&self, path: &Path) -> HarnessResult<FrequencyTable> {
        let bytes = fs::read(path).map_err(|e| HarnessError::io(path, e))?;
        // The archive contains Latin-1 descriptions; only the numbers matter.
        let text = String::from_utf8_lossy(&bytes);
        let scale = Scale::parse(&text).map_err(|msg| HarnessError::scale(path, msg))?;
        log::debug!(
            "Resolved {} ({} degrees, period {:.3} cents)",
            path.display(),
            scale.cents.len(),
            scale.period_cents()
        );
        scale.frequencies(self.mapping).map_err(|e| match e {
            HarnessError::InvalidFrequencyTable { message } => HarnessError::scale(path, message),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TWELVE_TET: &str = "! 12tet.scl\n!\n12 tone equal temperament\n 12\n!\n 100.0\n 200.\n 300.\n 400.\n 500.\n 600.\n 700.\n 800.\n 900.\n 1000.\n 1100.\n 2/1\n";

    #[test]
    fn test_parse_twelve_tet() {
        let scale = Scale::parse(TWELVE_TET).unwrap();
        assert_eq!(scale.description, "12 tone equal temperament");
        assert_eq!(scale.cents.len(), 12);
        assert!((scale.period_cents() - 1200.0).abs() < 1e-9);
    }

    #[test]
    fn test_twelve_tet_matches_reference() {
        let scale = Scale::parse(TWELVE_TET).unwrap();
        let table = scale.frequencies(KeyboardMapping::default()).unwrap();
        let reference = FrequencyTable::twelve_tet();
        for note in 0..128u8 {
            let (a, b) = (table.get(note).unwrap(), reference.get(note).unwrap());
            assert!((a - b).abs() / b < 1e-12, "note {}: {} vs {}", note, a, b);
        }
    }

    #[test]
    fn test_ratios_and_trailing_text() {
        let text = "Pythagorean pentatonic\n5\n9/8 whole tone\n81/64\n3/2\n27/16\n2\n";
        let scale = Scale::parse(text).unwrap();
        assert!((scale.cents[2] - 701.955).abs() < 1e-3);
        assert!((scale.period_cents() - 1200.0).abs() < 1e-9);

        let table = scale.frequencies(KeyboardMapping::default()).unwrap();
        let root = table.get(60).unwrap();
        assert!((table.get(62).unwrap() / root - 81.0 / 64.0).abs() < 1e-12);
        assert!((table.get(65).unwrap() / root - 2.0).abs() < 1e-12);
        assert!((table.get(55).unwrap() / root - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_non_octave_period_below_root() {
        // Bohlen-Pierce style tritave, 13 steps
        let mut text = String::from("BP\n13\n");
        for step in 1..=13 {
            text.push_str(&format!("{:.5}\n", step as f64 * 1901.955 / 13.0));
        }
        let scale = Scale::parse(&text).unwrap();
        assert!((scale.cents_for_offset(-13) + 1901.955).abs() < 1e-4);
        assert!((scale.cents_for_offset(-1) + 1901.955 / 13.0).abs() < 1e-4);
    }

    #[test]
    fn test_parse_errors() {
        assert!(Scale::parse("").is_err());
        assert!(Scale::parse("desc\n0\n").unwrap_err().contains("no degrees"));
        assert!(Scale::parse("desc\n3\n100.0\n200.0\n")
            .unwrap_err()
            .contains("expected 3 degrees, found 2"));
        assert!(Scale::parse("desc\n1\n0/1\n").unwrap_err().contains("positive"));
        assert!(Scale::parse("desc\n1\nabc\n").is_err());
    }

    #[test]
    fn test_resolver_is_deterministic() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("12tet.scl");
        std::fs::write(&path, TWELVE_TET).unwrap();

        let resolver = ScalaResolver::new();
        let first = resolver.resolve(&path).unwrap();
        let second = resolver.resolve(&path).unwrap();
        assert_eq!(first, second);
        assert!((first.get(69).unwrap() - 440.0).abs() < 1e-9);
    }

    #[test]
    fn test_resolver_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.scl");
        std::fs::write(&path, "broken\nnot-a-number\n").unwrap();

        let err = ScalaResolver::new().resolve(&path).unwrap_err();
        assert_eq!(err.code(), "HARNESS_004");
        assert!(err.to_string().contains("broken.scl"));
    }
}
