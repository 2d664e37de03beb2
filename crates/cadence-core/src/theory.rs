//! Music theory tables and pitch arithmetic (scales, chords, transposition)

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};

// ============================================================================
// Pitch
// ============================================================================

const PITCH_NAMES: [&str; 12] = ["C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B"];

/// Highest representable semitone index (G9)
pub const MAX_PITCH: i32 = 127;

/// An octave-qualified note backed by its MIDI note number (C4 = 60).
///
/// Parsing accepts sharps and flats (`"Eb3"`, `"F#2"`); rendering always uses
/// sharps, so a rendered name parses back to the same index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Pitch(u8);

impl Pitch {
    pub const MIDDLE_C: Self = Self(60);

    /// Build a pitch from a semitone index, failing outside 0..=127
    pub fn from_index(index: i32) -> Result<Self> {
        if (0..=MAX_PITCH).contains(&index) {
            Ok(Self(index as u8))
        } else {
            Err(CadenceError::PitchOutOfRange(index))
        }
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Pitch class, 0 = C
    pub fn pitch_class(self) -> u8 {
        self.0 % 12
    }

    pub fn octave(self) -> i32 {
        self.0 as i32 / 12 - 1
    }

    pub fn transpose(self, semitones: i32) -> Result<Self> {
        Self::from_index((self.0 as i32).saturating_add(semitones))
    }
}

impl fmt::Display for Pitch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", PITCH_NAMES[self.pitch_class() as usize], self.octave())
    }
}

impl FromStr for Pitch {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CadenceError::InvalidPitch(s.to_string());
        let trimmed = s.trim();
        let letter = trimmed.chars().next().ok_or_else(invalid)?;
        let base = match letter.to_ascii_uppercase() {
            'C' => 0,
            'D' => 2,
            'E' => 4,
            'F' => 5,
            'G' => 7,
            'A' => 9,
            'B' => 11,
            _ => return Err(invalid()),
        };

        let rest = &trimmed[letter.len_utf8()..];
        let split = rest.find(|c: char| c != '#' && c != 'b').unwrap_or(rest.len());
        let (accidentals, octave) = rest.split_at(split);
        let shift: i32 = accidentals.chars().map(|c| if c == '#' { 1 } else { -1 }).sum();
        let octave: i32 = octave.parse().map_err(|_| invalid())?;

        let index = octave
            .checked_add(1)
            .and_then(|o| o.checked_mul(12))
            .and_then(|i| i.checked_add(base + shift))
            .ok_or_else(invalid)?;
        Self::from_index(index)
    }
}

impl TryFrom<String> for Pitch {
    type Error = CadenceError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Pitch> for String {
    fn from(pitch: Pitch) -> Self {
        pitch.to_string()
    }
}

// ============================================================================
// Scale and Chord Types
// ============================================================================

/// Scale/mode types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScaleMode {
    Major,
    #[default]
    Minor,
    Dorian,
    Phrygian,
    Lydian,
    Mixolydian,
    Locrian,
    HarmonicMinor,
    MelodicMinor,
    MajorPentatonic,
    MinorPentatonic,
    Blues,
    WholeTone,
    Chromatic,
}

impl ScaleMode {
    /// Get scale intervals (semitones from root, one octave)
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 2, 4, 5, 7, 9, 11],
            Self::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Self::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Self::Phrygian => &[0, 1, 3, 5, 7, 8, 10],
            Self::Lydian => &[0, 2, 4, 6, 7, 9, 11],
            Self::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Self::Locrian => &[0, 1, 3, 5, 6, 8, 10],
            Self::HarmonicMinor => &[0, 2, 3, 5, 7, 8, 11],
            Self::MelodicMinor => &[0, 2, 3, 5, 7, 9, 11],
            Self::MajorPentatonic => &[0, 2, 4, 7, 9],
            Self::MinorPentatonic => &[0, 3, 5, 7, 10],
            Self::Blues => &[0, 3, 5, 6, 7, 10],
            Self::WholeTone => &[0, 2, 4, 6, 8, 10],
            Self::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
        }
    }

    /// Identifier accepted by `FromStr`
    pub fn name(&self) -> &'static str {
        match self {
            Self::Major => "major",
            Self::Minor => "minor",
            Self::Dorian => "dorian",
            Self::Phrygian => "phrygian",
            Self::Lydian => "lydian",
            Self::Mixolydian => "mixolydian",
            Self::Locrian => "locrian",
            Self::HarmonicMinor => "harmonic minor",
            Self::MelodicMinor => "melodic minor",
            Self::MajorPentatonic => "major pentatonic",
            Self::MinorPentatonic => "minor pentatonic",
            Self::Blues => "blues",
            Self::WholeTone => "whole tone",
            Self::Chromatic => "chromatic",
        }
    }
}

impl fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ScaleMode {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s
            .trim()
            .to_ascii_lowercase()
            .replace(['_', '-'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");

        let mode = match normalized.as_str() {
            "major" | "ionian" => Self::Major,
            "minor" | "aeolian" | "natural minor" => Self::Minor,
            "dorian" => Self::Dorian,
            "phrygian" => Self::Phrygian,
            "lydian" => Self::Lydian,
            "mixolydian" => Self::Mixolydian,
            "locrian" => Self::Locrian,
            "harmonic minor" => Self::HarmonicMinor,
            "melodic minor" => Self::MelodicMinor,
            "pentatonic" | "major pentatonic" => Self::MajorPentatonic,
            "minor pentatonic" => Self::MinorPentatonic,
            "blues" | "minor blues" => Self::Blues,
            "whole tone" => Self::WholeTone,
            "chromatic" => Self::Chromatic,
            _ => return Err(CadenceError::UnknownScaleType(s.to_string())),
        };
        Ok(mode)
    }
}

impl TryFrom<String> for ScaleMode {
    type Error = CadenceError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<ScaleMode> for String {
    fn from(mode: ScaleMode) -> Self {
        mode.name().to_string()
    }
}

/// Chord quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChordQuality {
    #[default]
    Major,
    Minor,
    Diminished,
    Augmented,
    Sus2,
    Sus4,
    Major7,
    Minor7,
    Dominant7,
}

impl ChordQuality {
    /// Get chord intervals from root
    pub fn intervals(&self) -> &'static [u8] {
        match self {
            Self::Major => &[0, 4, 7],
            Self::Minor => &[0, 3, 7],
            Self::Diminished => &[0, 3, 6],
            Self::Augmented => &[0, 4, 8],
            Self::Sus2 => &[0, 2, 7],
            Self::Sus4 => &[0, 5, 7],
            Self::Major7 => &[0, 4, 7, 11],
            Self::Minor7 => &[0, 3, 7, 10],
            Self::Dominant7 => &[0, 4, 7, 10],
        }
    }
}

// ============================================================================
// Scale / Chord Functions
// ============================================================================

/// Resolve the pitches of `mode` starting at `root`, one octave
pub fn scale(root: Pitch, mode: ScaleMode) -> Result<Vec<Pitch>> {
    mode.intervals()
        .iter()
        .map(|&interval| root.transpose(interval as i32))
        .collect()
}

/// Expand 1-based scale degrees of the major scale on `key` into major triads,
/// concatenated in degree order
pub fn chord_progression(key: Pitch, degrees: &[i32]) -> Result<Vec<Pitch>> {
    chord_progression_with(key, degrees, ChordQuality::Major)
}

/// Like [`chord_progression`] with an explicit chord quality for every degree.
///
/// Degrees wrap modulo the scale length (8 is the tonic again, 0 the seventh).
/// Notes are not deduplicated.
pub fn chord_progression_with(key: Pitch, degrees: &[i32], quality: ChordQuality) -> Result<Vec<Pitch>> {
    let major = scale(key, ScaleMode::Major)?;
    let mut notes = Vec::with_capacity(degrees.len() * quality.intervals().len());

    for &degree in degrees {
        let idx = (i64::from(degree) - 1).rem_euclid(major.len() as i64) as usize;
        let chord_root = major[idx];
        for &interval in quality.intervals() {
            notes.push(chord_root.transpose(interval as i32)?);
        }
    }

    Ok(notes)
}

/// Pick chord tones by index, wrapping around the chord
pub fn arpeggio(chord: &[Pitch], pattern: &[usize]) -> Vec<Pitch> {
    if chord.is_empty() {
        return Vec::new();
    }
    pattern.iter().map(|&idx| chord[idx % chord.len()]).collect()
}

/// Shift every pitch by `semitones`
pub fn transpose(pitches: &[Pitch], semitones: i32) -> Result<Vec<Pitch>> {
    pitches.iter().map(|p| p.transpose(semitones)).collect()
}

/// Signed semitone distance from `a` to `b`
pub fn interval_between(a: Pitch, b: Pitch) -> i32 {
    b.index() as i32 - a.index() as i32
}
