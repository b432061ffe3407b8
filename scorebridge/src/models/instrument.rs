//! Instrument voice selection for audio synthesis

use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument voice used when synthesizing audio from MIDI.
///
/// Each variant maps to a General MIDI program number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Instrument {
    /// Acoustic Grand Piano
    #[default]
    Piano,
    Trombone,
    Trumpet,
}

impl Instrument {
    /// Parse an instrument name, case-insensitively.
    ///
    /// Unrecognized names fall back to piano with a warning rather than
    /// failing the job.
    pub fn parse(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "piano" => Instrument::Piano,
            "trombone" => Instrument::Trombone,
            "trumpet" => Instrument::Trumpet,
            other => {
                tracing::warn!(instrument = other, "unknown instrument, defaulting to piano");
                Instrument::Piano
            }
        }
    }

    /// General MIDI program number
    pub fn program(self) -> u8 {
        match self {
            Instrument::Piano => 0,
            Instrument::Trombone => 57,
            Instrument::Trumpet => 56,
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Piano => write!(f, "piano"),
            Instrument::Trombone => write!(f, "trombone"),
            Instrument::Trumpet => write!(f, "trumpet"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(Instrument::parse("Trumpet"), Instrument::Trumpet);
        assert_eq!(Instrument::parse("TROMBONE"), Instrument::Trombone);
        assert_eq!(Instrument::parse("piano"), Instrument::Piano);
    }

    #[test]
    fn unknown_names_fall_back_to_piano() {
        assert_eq!(Instrument::parse("kazoo"), Instrument::Piano);
        assert_eq!(Instrument::parse(""), Instrument::Piano);
    }

    #[test]
    fn general_midi_program_numbers() {
        assert_eq!(Instrument::Piano.program(), 0);
        assert_eq!(Instrument::Trumpet.program(), 56);
        assert_eq!(Instrument::Trombone.program(), 57);
    }
}
