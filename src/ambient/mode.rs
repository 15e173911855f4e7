//! Liturgical modes
//!
//! The eight Gregorian modes. Authentic and plagal pairs share a final and
//! a scale; they differ in their reciting tone (tenor).

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiturgicalMode {
    /// Mode I: final D, tenor A
    #[default]
    Dorian,
    /// Mode II: final D, tenor F
    Hypodorian,
    /// Mode III: final E, tenor C
    Phrygian,
    /// Mode IV: final E, tenor A
    Hypophrygian,
    /// Mode V: final F, tenor C
    Lydian,
    /// Mode VI: final F, tenor A
    Hypolydian,
    /// Mode VII: final G, tenor D
    Mixolydian,
    /// Mode VIII: final G, tenor C
    Hypomixolydian,
}

impl LiturgicalMode {
    pub const ALL: [LiturgicalMode; 8] = [
        LiturgicalMode::Dorian,
        LiturgicalMode::Hypodorian,
        LiturgicalMode::Phrygian,
        LiturgicalMode::Hypophrygian,
        LiturgicalMode::Lydian,
        LiturgicalMode::Hypolydian,
        LiturgicalMode::Mixolydian,
        LiturgicalMode::Hypomixolydian,
    ];

    /// Roman-numeral mode number, 1 to 8
    pub fn number(self) -> u8 {
        match self {
            LiturgicalMode::Dorian => 1,
            LiturgicalMode::Hypodorian => 2,
            LiturgicalMode::Phrygian => 3,
            LiturgicalMode::Hypophrygian => 4,
            LiturgicalMode::Lydian => 5,
            LiturgicalMode::Hypolydian => 6,
            LiturgicalMode::Mixolydian => 7,
            LiturgicalMode::Hypomixolydian => 8,
        }
    }

    /// Pitch class of the final (0 = C)
    pub fn final_pitch_class(self) -> u8 {
        match self {
            LiturgicalMode::Dorian | LiturgicalMode::Hypodorian => 2,
            LiturgicalMode::Phrygian | LiturgicalMode::Hypophrygian => 4,
            LiturgicalMode::Lydian | LiturgicalMode::Hypolydian => 5,
            LiturgicalMode::Mixolydian | LiturgicalMode::Hypomixolydian => 7,
        }
    }

    /// Semitones from the final up to the reciting tone
    pub fn tenor_offset(self) -> u8 {
        match self {
            LiturgicalMode::Dorian => 7,
            LiturgicalMode::Hypodorian => 3,
            LiturgicalMode::Phrygian => 8,
            LiturgicalMode::Hypophrygian => 5,
            LiturgicalMode::Lydian => 7,
            LiturgicalMode::Hypolydian => 4,
            LiturgicalMode::Mixolydian => 7,
            LiturgicalMode::Hypomixolydian => 5,
        }
    }

    /// Semitone intervals of the seven scale degrees above the final
    pub fn intervals(self) -> [u8; 7] {
        match self {
            LiturgicalMode::Dorian | LiturgicalMode::Hypodorian => [0, 2, 3, 5, 7, 9, 10],
            LiturgicalMode::Phrygian | LiturgicalMode::Hypophrygian => [0, 1, 3, 5, 7, 8, 10],
            LiturgicalMode::Lydian | LiturgicalMode::Hypolydian => [0, 2, 4, 6, 7, 9, 11],
            LiturgicalMode::Mixolydian | LiturgicalMode::Hypomixolydian => [0, 2, 4, 5, 7, 9, 10],
        }
    }

    /// MIDI note of the final in `octave` (octave 3 puts D at 50)
    pub fn final_midi(self, octave: u8) -> u8 {
        12 * (octave + 1) + self.final_pitch_class()
    }

    /// MIDI note of scale degree `degree` (0-based, may exceed 6) above the final
    pub fn degree_midi(self, octave: u8, degree: usize) -> u8 {
        let intervals = self.intervals();
        let octaves = (degree / 7) as u8;
        self.final_midi(octave) + 12 * octaves + intervals[degree % 7]
    }
}

impl fmt::Display for LiturgicalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LiturgicalMode::Dorian => "dorian",
            LiturgicalMode::Hypodorian => "hypodorian",
            LiturgicalMode::Phrygian => "phrygian",
            LiturgicalMode::Hypophrygian => "hypophrygian",
            LiturgicalMode::Lydian => "lydian",
            LiturgicalMode::Hypolydian => "hypolydian",
            LiturgicalMode::Mixolydian => "mixolydian",
            LiturgicalMode::Hypomixolydian => "hypomixolydian",
        };
        write!(f, "{} (mode {})", name, self.number())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finals_and_tenors() {
        let dorian = LiturgicalMode::Dorian;
        assert_eq!(dorian.final_midi(3), 50);
        assert_eq!(dorian.final_midi(3) + dorian.tenor_offset(), 57); // A3

        let hypo = LiturgicalMode::Hypomixolydian;
        assert_eq!((hypo.final_pitch_class() + hypo.tenor_offset()) % 12, 0); // C
    }

    #[test]
    fn test_tenor_is_in_scale() {
        for mode in LiturgicalMode::ALL {
            assert!(mode.intervals().contains(&mode.tenor_offset()), "{mode}");
        }
    }

    #[test]
    fn test_degree_wraps_octave() {
        let mode = LiturgicalMode::Dorian;
        assert_eq!(mode.degree_midi(3, 7), mode.final_midi(3) + 12);
        assert_eq!(mode.degree_midi(3, 9), mode.final_midi(3) + 12 + 3);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&LiturgicalMode::Hypophrygian).unwrap();
        assert_eq!(json, "\"hypophrygian\"");
        let parsed: LiturgicalMode = serde_json::from_str("\"lydian\"").unwrap();
        assert_eq!(parsed, LiturgicalMode::Lydian);
    }
}
