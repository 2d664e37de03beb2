//! Named step patterns and the store that owns them

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};
use crate::generator::{euclidean_rhythm, NoteEvent, Step, DEFAULT_PROBABILITY, DEFAULT_VELOCITY};
use crate::theory::{arpeggio, chord_progression_with, interval_between, ChordQuality, Pitch};
use crate::transport::Duration;

/// Chord progression used as the note source of a pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordSpec {
    pub key: Pitch,
    /// 1-based degrees of the major scale on `key`
    pub degrees: Vec<i32>,
    #[serde(default)]
    pub quality: ChordQuality,
    /// Chord-tone order played for each chord; whole chords when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arpeggio: Option<Vec<usize>>,
}

impl ChordSpec {
    /// Expanded notes, chord after chord
    pub fn notes(&self) -> Result<Vec<Pitch>> {
        let notes = chord_progression_with(self.key, &self.degrees, self.quality)?;
        let Some(order) = &self.arpeggio else {
            return Ok(notes);
        };
        Ok(notes
            .chunks(self.quality.intervals().len())
            .flat_map(|chord| arpeggio(chord, order))
            .collect())
    }
}

/// Description of a pattern as written in the editor or config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatternSpec {
    #[serde(default)]
    pub notes: Vec<Pitch>,
    /// Take the notes from a chord progression instead of `notes`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chords: Option<ChordSpec>,
    #[serde(default)]
    pub durations: Vec<Duration>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probability: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub euclidean_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub euclidean_fills: Option<usize>,
}

impl PatternSpec {
    /// Expand into steps.
    ///
    /// Uses the Euclidean generator when both `euclidean_length` and
    /// `euclidean_fills` are set and non-zero; otherwise every note becomes one
    /// step with `durations[i % durations.len()]`.
    pub fn build(&self) -> Result<Vec<Step>> {
        let notes = self.resolve_notes()?;
        match (self.euclidean_length, self.euclidean_fills) {
            (Some(length), Some(fills)) if length > 0 && fills > 0 => {
                euclidean_rhythm(&notes, length, fills)
            }
            _ => self.zip_steps(&notes),
        }
    }

    fn resolve_notes(&self) -> Result<Vec<Pitch>> {
        match &self.chords {
            None => Ok(self.notes.clone()),
            Some(_) if !self.notes.is_empty() => Err(CadenceError::InvalidSpec(
                "give either notes or chords, not both".to_string(),
            )),
            Some(chords) => chords.notes(),
        }
    }

    fn zip_steps(&self, notes: &[Pitch]) -> Result<Vec<Step>> {
        if !notes.is_empty() && self.durations.is_empty() {
            return Err(CadenceError::InvalidSpec("notes given without durations".to_string()));
        }

        let velocity = self.velocity.unwrap_or(DEFAULT_VELOCITY);
        let probability = self.probability.unwrap_or(DEFAULT_PROBABILITY);

        Ok(notes
            .iter()
            .enumerate()
            .map(|(i, &pitch)| {
                let duration = self.durations[i % self.durations.len()];
                Step::Note(NoteEvent::new(pitch, duration, velocity, probability))
            })
            .collect())
    }
}

/// A named, fixed-length step sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    name: String,
    steps: Vec<Step>,
}

impl Pattern {
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self { name: name.into(), steps }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step at a playback cursor, wrapping at the pattern end
    pub fn step_at(&self, cursor: usize) -> Option<&Step> {
        if self.steps.is_empty() {
            return None;
        }
        self.steps.get(cursor % self.steps.len())
    }

    pub fn onsets(&self) -> usize {
        self.steps.iter().filter(|s| !s.is_rest()).count()
    }
}

/// Owns every pattern of a session by name.
///
/// Callers only ever get shared references; mutation goes through `add_pattern`,
/// `insert` and `retranspose_all`, each of which swaps whole step vectors.
#[derive(Debug, Clone, Default)]
pub struct PatternStore {
    patterns: BTreeMap<String, Pattern>,
}

impl PatternStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build `spec` and store it under `name`, replacing any previous pattern
    pub fn add_pattern(&mut self, name: impl Into<String>, spec: &PatternSpec) -> Result<()> {
        let steps = spec.build()?;
        self.insert(name, steps);
        Ok(())
    }

    /// Store pre-built steps under `name`, replacing any previous pattern
    pub fn insert(&mut self, name: impl Into<String>, steps: Vec<Step>) {
        let name = name.into();
        tracing::debug!(pattern = %name, steps = steps.len(), "storing pattern");
        self.patterns.insert(name.clone(), Pattern::new(name, steps));
    }

    pub fn get(&self, name: &str) -> Option<&Pattern> {
        self.patterns.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.patterns.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Pattern> {
        self.patterns.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.patterns.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pattern> {
        self.patterns.values()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn clear(&mut self) {
        self.patterns.clear();
    }

    /// Shift every stored note by the interval from `old_key` to `new_key`.
    ///
    /// The shift is chromatic: notes are not re-mapped onto the degrees of a new
    /// scale. Rests are untouched. Either every pattern is shifted or, when a
    /// note would leave the pitch range, none is.
    pub fn retranspose_all(&mut self, old_key: Pitch, new_key: Pitch) -> Result<()> {
        let semitones = interval_between(old_key, new_key);
        if semitones == 0 {
            return Ok(());
        }

        let mut shifted = Vec::with_capacity(self.patterns.len());
        for (name, pattern) in &self.patterns {
            let steps = pattern
                .steps
                .iter()
                .map(|step| -> Result<Step> {
                    match step {
                        Step::Rest => Ok(Step::Rest),
                        Step::Note(event) => Ok(Step::Note(event.with_pitch(event.pitch().transpose(semitones)?))),
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            shifted.push((name.clone(), steps));
        }

        for (name, steps) in shifted {
            if let Some(pattern) = self.patterns.get_mut(&name) {
                pattern.steps = steps;
            }
        }

        tracing::debug!(%old_key, %new_key, semitones, patterns = self.patterns.len(), "retransposed patterns");
        Ok(())
    }
}
