//! cadence-core: Generative pattern sequencing (theory, generators, patterns, sequencer)

mod error;
pub mod generator;
pub mod pattern;
pub mod random;
pub mod sequencer;
pub mod theory;
pub mod transport;

pub use error::{CadenceError, Result};
pub use generator::{constrained_melody, euclidean_rhythm, MelodyRules, NoteEvent, Step};
pub use pattern::{ChordSpec, Pattern, PatternSpec, PatternStore};
pub use random::RandomSource;
pub use sequencer::{
    InstanceState, InstrumentSink, NoteTrigger, RunningInstance, Sequencer, SequencerConfig, SequencerState,
};
pub use theory::{
    arpeggio, chord_progression, chord_progression_with, interval_between, scale, transpose,
    ChordQuality, Pitch, ScaleMode,
};
pub use transport::{
    Clock, ClockTick, Duration, ScheduleHandle, Subdivision, TransportClock, TransportState,
};
