//! Algorithmic step generation (Euclidean-style rhythms, constrained melodies)

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};
use crate::random::RandomSource;
use crate::theory::Pitch;
use crate::transport::{Duration, Subdivision};

pub const DEFAULT_VELOCITY: f32 = 0.8;
pub const DEFAULT_PROBABILITY: f32 = 1.0;

fn unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) }
}

// ============================================================================
// Steps
// ============================================================================

/// A note trigger descriptor; velocity and probability always lie in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteEvent {
    pitch: Pitch,
    duration: Duration,
    velocity: f32,
    probability: f32,
}

impl NoteEvent {
    pub fn new(pitch: Pitch, duration: Duration, velocity: f32, probability: f32) -> Self {
        Self {
            pitch,
            duration,
            velocity: unit(velocity),
            probability: unit(probability),
        }
    }

    pub fn pitch(&self) -> Pitch {
        self.pitch
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn probability(&self) -> f32 {
        self.probability
    }

    pub fn with_pitch(self, pitch: Pitch) -> Self {
        Self { pitch, ..self }
    }
}

/// One slot of a pattern
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum Step {
    Rest,
    Note(NoteEvent),
}

impl Step {
    pub fn note(&self) -> Option<&NoteEvent> {
        match self {
            Self::Rest => None,
            Self::Note(event) => Some(event),
        }
    }

    pub fn is_rest(&self) -> bool {
        matches!(self, Self::Rest)
    }
}

// ============================================================================
// Euclidean Rhythm Generator
// ============================================================================

/// Spread `fills` onsets over `length` slots with a running accumulator.
///
/// Each slot adds `fills` to the bucket; when the bucket reaches `length` it
/// is emptied by `length` and the slot sounds `notes[slot % notes.len()]` as a
/// sixteenth note (velocity 0.8, probability 1). This is an even-spread
/// approximation, not Bjorklund's algorithm: `(8, 3)` gives onsets at slots
/// 2, 5 and 7. With `fills > length` every slot sounds.
///
/// # Example
/// ```
/// use cadence_core::{euclidean_rhythm, Pitch};
/// let notes: Vec<Pitch> = vec!["C2".parse().unwrap()];
/// let steps = euclidean_rhythm(&notes, 8, 3).unwrap();
/// let onsets: Vec<usize> = (0..8).filter(|&i| !steps[i].is_rest()).collect();
/// assert_eq!(onsets, vec![2, 5, 7]);
/// ```
pub fn euclidean_rhythm(notes: &[Pitch], length: usize, fills: usize) -> Result<Vec<Step>> {
    if notes.is_empty() && fills > 0 && length > 0 {
        return Err(CadenceError::InvalidSpec(
            "euclidean rhythm needs at least one note".to_string(),
        ));
    }

    // Every slot sounds once fills reach length
    let fills = fills.min(length);
    let mut steps = Vec::with_capacity(length);
    let mut total = 0usize;

    for slot in 0..length {
        total += fills;
        if total >= length {
            total -= length;
            steps.push(Step::Note(NoteEvent::new(
                notes[slot % notes.len()],
                Subdivision::SIXTEENTH.into(),
                DEFAULT_VELOCITY,
                DEFAULT_PROBABILITY,
            )));
        } else {
            steps.push(Step::Rest);
        }
    }

    Ok(steps)
}

// ============================================================================
// Constrained Melody Generator
// ============================================================================

const MELODY_MOVES: [i32; 5] = [-2, -1, 0, 1, 2];
const MELODY_DURATIONS: [f64; 3] = [0.25, 0.5, 1.0];
const DEFAULT_MAX_INTERVAL: u32 = 3;

/// Optional rules for [`constrained_melody`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MelodyRules {
    /// Accepted for compatibility; the walk always moves at most two degrees
    #[serde(default)]
    pub max_interval: Option<u32>,
    /// Durations cycled per step; random durations when absent or empty
    #[serde(default)]
    pub rhythm_pattern: Option<Vec<Duration>>,
}

impl MelodyRules {
    pub fn max_jump(&self) -> u32 {
        self.max_interval.unwrap_or(DEFAULT_MAX_INTERVAL)
    }
}

/// Random walk over scale degrees starting on the first degree.
///
/// Each step picks uniformly among the moves `-2..=2` that stay inside the
/// scale, then takes its duration from the rhythm pattern or uniformly from
/// 0.25, 0.5 and 1 seconds. Random draws happen in that order (move, then
/// duration), so a scripted source reproduces the same melody.
pub fn constrained_melody<R: RandomSource>(
    scale: &[Pitch],
    length: usize,
    rules: &MelodyRules,
    rng: &mut R,
) -> Result<Vec<NoteEvent>> {
    if scale.is_empty() && length > 0 {
        return Err(CadenceError::InvalidSpec("melody needs a non-empty scale".to_string()));
    }

    let rhythm = rules.rhythm_pattern.as_deref().filter(|r| !r.is_empty());
    tracing::trace!(max_jump = rules.max_jump(), length, "generating melody");

    let mut melody = Vec::with_capacity(length);
    let mut current = 0i32;

    for step in 0..length {
        let moves: Vec<i32> = MELODY_MOVES
            .iter()
            .copied()
            .filter(|m| (0..scale.len() as i32).contains(&(current + m)))
            .collect();
        current += moves[rng.pick_index(moves.len())];

        let duration = match rhythm {
            Some(pattern) => pattern[step % pattern.len()],
            None => Duration::Seconds(MELODY_DURATIONS[rng.pick_index(MELODY_DURATIONS.len())]),
        };

        melody.push(NoteEvent::new(
            scale[current as usize],
            duration,
            DEFAULT_VELOCITY,
            DEFAULT_PROBABILITY,
        ));
    }

    Ok(melody)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::testing::Scripted;
    use crate::theory::{scale, ScaleMode};

    fn p(name: &str) -> Pitch {
        name.parse().unwrap()
    }

    fn onsets(steps: &[Step]) -> Vec<usize> {
        steps.iter().enumerate().filter(|(_, s)| !s.is_rest()).map(|(i, _)| i).collect()
    }

    #[test]
    fn test_note_event_clamps() {
        let event = NoteEvent::new(p("C4"), Duration::Seconds(0.5), 1.7, -0.2);
        assert_eq!(event.velocity(), 1.0);
        assert_eq!(event.probability(), 0.0);
        assert_eq!(NoteEvent::new(p("C4"), Duration::Seconds(0.5), f32::NAN, 0.5).velocity(), 0.0);
    }

    #[test]
    fn test_euclidean_trace() {
        let notes = [p("A3"), p("B3"), p("C4")];
        let steps = euclidean_rhythm(&notes, 8, 3).unwrap();
        assert_eq!(onsets(&steps), vec![2, 5, 7]);

        let pitches: Vec<Pitch> = steps.iter().filter_map(|s| s.note()).map(|e| e.pitch()).collect();
        assert_eq!(pitches, vec![p("C4"), p("C4"), p("B3")]);

        let event = steps[2].note().unwrap();
        assert_eq!(event.duration(), Duration::Subdivision(Subdivision::SIXTEENTH));
        assert_eq!(event.velocity(), 0.8);
        assert_eq!(event.probability(), 1.0);
    }

    #[test]
    fn test_euclidean_fill_counts() {
        let notes = [p("C2")];
        for length in 0..=16 {
            for fills in 0..=length {
                let steps = euclidean_rhythm(&notes, length, fills).unwrap();
                assert_eq!(steps.len(), length);
                assert_eq!(onsets(&steps).len(), fills, "length={length} fills={fills}");
            }
        }
    }

    #[test]
    fn test_euclidean_overfilled_sounds_every_slot() {
        let notes = [p("C2"), p("G2")];
        for (length, fills) in [(4, 5), (8, 9), (3, 12), (6, usize::MAX)] {
            let steps = euclidean_rhythm(&notes, length, fills).unwrap();
            assert!(steps.iter().all(|s| !s.is_rest()));
        }
    }

    #[test]
    fn test_euclidean_requires_notes() {
        assert!(matches!(euclidean_rhythm(&[], 8, 3), Err(CadenceError::InvalidSpec(_))));
        assert_eq!(euclidean_rhythm(&[], 4, 0).unwrap(), vec![Step::Rest; 4]);
    }

    #[test]
    fn test_melody_scripted_trace() {
        let minor = scale(p("C4"), ScaleMode::Minor).unwrap();
        let mut rng = Scripted::new(&[0.9, 0.1, 0.5]);
        let melody = constrained_melody(&minor, 4, &MelodyRules::default(), &mut rng).unwrap();

        let pitches: Vec<Pitch> = melody.iter().map(|e| e.pitch()).collect();
        assert_eq!(pitches, vec![p("D#4"), p("D#4"), p("C4"), p("D#4")]);

        let durations: Vec<Duration> = melody.iter().map(|e| e.duration()).collect();
        assert_eq!(
            durations,
            vec![
                Duration::Seconds(0.25),
                Duration::Seconds(1.0),
                Duration::Seconds(0.5),
                Duration::Seconds(0.25)
            ]
        );
    }

    #[test]
    fn test_melody_reproducible_with_seed() {
        let dorian = scale(p("D3"), ScaleMode::Dorian).unwrap();
        let rules = MelodyRules::default();
        let first = constrained_melody(&dorian, 32, &rules, &mut fastrand::Rng::with_seed(42)).unwrap();
        let second = constrained_melody(&dorian, 32, &rules, &mut fastrand::Rng::with_seed(42)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_melody_stays_in_scale_with_small_steps() {
        let minor = scale(p("A2"), ScaleMode::MinorPentatonic).unwrap();
        let mut rng = fastrand::Rng::with_seed(3);
        let melody = constrained_melody(&minor, 200, &MelodyRules::default(), &mut rng).unwrap();

        let degrees: Vec<i32> = melody
            .iter()
            .map(|e| minor.iter().position(|&n| n == e.pitch()).unwrap() as i32)
            .collect();
        assert!(degrees[0] <= 2);
        assert!(degrees.windows(2).all(|w| (w[1] - w[0]).abs() <= 2));
    }

    #[test]
    fn test_melody_max_interval_does_not_change_walk() {
        let major = scale(p("C4"), ScaleMode::Major).unwrap();
        let wide = MelodyRules { max_interval: Some(7), ..Default::default() };
        let a = constrained_melody(&major, 16, &wide, &mut fastrand::Rng::with_seed(9)).unwrap();
        let b = constrained_melody(&major, 16, &MelodyRules::default(), &mut fastrand::Rng::with_seed(9)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_melody_rhythm_pattern() {
        let major = scale(p("C4"), ScaleMode::Major).unwrap();
        let rules = MelodyRules {
            max_interval: None,
            rhythm_pattern: Some(vec![Duration::Seconds(0.5), Subdivision::EIGHTH.into()]),
        };
        let mut rng = Scripted::new(&[0.0]);
        let melody = constrained_melody(&major, 3, &rules, &mut rng).unwrap();
        let durations: Vec<Duration> = melody.iter().map(|e| e.duration()).collect();
        assert_eq!(
            durations,
            vec![Duration::Seconds(0.5), Subdivision::EIGHTH.into(), Duration::Seconds(0.5)]
        );
        // Lowest move every time: stays on the tonic
        assert!(melody.iter().all(|e| e.pitch() == p("C4")));
    }

    #[test]
    fn test_melody_empty_scale() {
        let mut rng = Scripted::new(&[0.5]);
        assert!(matches!(
            constrained_melody(&[], 4, &MelodyRules::default(), &mut rng),
            Err(CadenceError::InvalidSpec(_))
        ));
        assert!(constrained_melody(&[], 0, &MelodyRules::default(), &mut rng).unwrap().is_empty());
    }
}
