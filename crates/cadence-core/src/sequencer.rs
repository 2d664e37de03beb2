//! Clock-driven playback of stored patterns with probability gating

use std::collections::BTreeMap;

use tracing::{debug, trace, warn};

use crate::error::{CadenceError, Result};
use crate::generator::{constrained_melody, MelodyRules, Step};
use crate::pattern::{Pattern, PatternSpec, PatternStore};
use crate::random::RandomSource;
use crate::theory::{scale, Pitch, ScaleMode};
use crate::transport::{Clock, ClockTick, Duration, ScheduleHandle, Subdivision};

// ============================================================================
// Instrument boundary
// ============================================================================

/// A note handed to the instrument
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteTrigger {
    pub pitch: Pitch,
    pub duration: Duration,
    /// Transport time in seconds
    pub time: f64,
    pub velocity: f32,
}

/// Receives note triggers from the sequencer.
///
/// Implementations must not block. A trigger that cannot be delivered is
/// dropped; the sequencer never hears about it.
pub trait InstrumentSink {
    fn trigger(&mut self, note: NoteTrigger);
}

impl InstrumentSink for Vec<NoteTrigger> {
    fn trigger(&mut self, note: NoteTrigger) {
        self.push(note);
    }
}

// ============================================================================
// State
// ============================================================================

/// Playback state of one pattern name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InstanceState {
    #[default]
    Stopped,
    Running,
}

/// A pattern bound to a live schedule on the clock
#[derive(Debug, Clone, PartialEq)]
pub struct RunningInstance {
    handle: ScheduleHandle,
    interval: Subdivision,
    cursor: usize,
}

impl RunningInstance {
    pub fn handle(&self) -> ScheduleHandle {
        self.handle
    }

    pub fn interval(&self) -> Subdivision {
        self.interval
    }

    /// Index of the step the next tick will play (before wrapping)
    pub fn cursor(&self) -> usize {
        self.cursor
    }
}

/// Initial key, scale and default step interval of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SequencerConfig {
    pub key: Pitch,
    pub mode: ScaleMode,
    pub interval: Subdivision,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            key: Pitch::MIDDLE_C,
            mode: ScaleMode::Minor,
            interval: Subdivision::EIGHTH,
        }
    }
}

/// Everything a session knows: key, scale, patterns and running instances
#[derive(Debug, Clone)]
pub struct SequencerState {
    key: Pitch,
    mode: ScaleMode,
    scale: Vec<Pitch>,
    patterns: PatternStore,
    instances: BTreeMap<String, RunningInstance>,
}

impl SequencerState {
    fn new(key: Pitch, mode: ScaleMode) -> Result<Self> {
        Ok(Self {
            key,
            mode,
            scale: scale(key, mode)?,
            patterns: PatternStore::new(),
            instances: BTreeMap::new(),
        })
    }

    pub fn key(&self) -> Pitch {
        self.key
    }

    pub fn mode(&self) -> ScaleMode {
        self.mode
    }

    pub fn scale(&self) -> &[Pitch] {
        &self.scale
    }

    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    pub fn instance(&self, name: &str) -> Option<&RunningInstance> {
        self.instances.get(name)
    }

    pub fn instance_state(&self, name: &str) -> InstanceState {
        if self.instances.contains_key(name) {
            InstanceState::Running
        } else {
            InstanceState::Stopped
        }
    }
}

// ============================================================================
// Sequencer
// ============================================================================

/// Binds stored patterns to a clock and triggers their notes on an instrument.
///
/// Steps are looked up in the store when a tick fires, so `set_key` and
/// `add_pattern` affect running patterns from their next step on.
/// Starting a running pattern replaces its schedule and rewinds it.
pub struct Sequencer<C, S, R> {
    state: SequencerState,
    default_interval: Subdivision,
    clock: C,
    sink: S,
    rng: R,
    disposed: bool,
}

impl<C: Clock, S: InstrumentSink, R: RandomSource> Sequencer<C, S, R> {
    pub fn new(config: SequencerConfig, clock: C, sink: S, rng: R) -> Result<Self> {
        Ok(Self {
            state: SequencerState::new(config.key, config.mode)?,
            default_interval: config.interval,
            clock,
            sink,
            rng,
            disposed: false,
        })
    }

    pub fn state(&self) -> &SequencerState {
        &self.state
    }

    pub fn key(&self) -> Pitch {
        self.state.key
    }

    pub fn scale(&self) -> &[Pitch] {
        &self.state.scale
    }

    pub fn patterns(&self) -> &PatternStore {
        &self.state.patterns
    }

    pub fn pattern(&self, name: &str) -> Option<&Pattern> {
        self.state.patterns.get(name)
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.state.instance_state(name) == InstanceState::Running
    }

    /// Names of running patterns
    pub fn running(&self) -> impl Iterator<Item = &str> {
        self.state.instances.keys().map(String::as_str)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn ensure_live(&self) -> Result<()> {
        if self.disposed {
            return Err(CadenceError::Disposed);
        }
        Ok(())
    }

    /// Build and store a pattern, replacing one of the same name
    pub fn add_pattern(&mut self, name: &str, spec: &PatternSpec) -> Result<()> {
        self.ensure_live()?;
        self.state.patterns.add_pattern(name, spec)
    }

    /// Generate a random-walk melody over the current scale and store it as a pattern
    pub fn add_melody(&mut self, name: &str, length: usize, rules: &MelodyRules) -> Result<()> {
        self.ensure_live()?;
        let melody = constrained_melody(&self.state.scale, length, rules, &mut self.rng)?;
        self.state
            .patterns
            .insert(name, melody.into_iter().map(Step::Note).collect());
        Ok(())
    }

    /// Stop (if running) and delete a pattern
    pub fn remove_pattern(&mut self, name: &str) -> Result<Pattern> {
        self.ensure_live()?;
        self.stop_pattern(name);
        self.state
            .patterns
            .remove(name)
            .ok_or_else(|| CadenceError::UnknownPattern(name.to_string()))
    }

    /// Start looping `name` every `interval` (the configured default when `None`).
    ///
    /// Unknown names are ignored. Returns whether an instance is now running.
    pub fn start_pattern(&mut self, name: &str, interval: Option<Subdivision>) -> bool {
        if self.disposed {
            warn!(pattern = name, "start ignored: sequencer disposed");
            return false;
        }
        if !self.state.patterns.contains(name) {
            debug!(pattern = name, "start ignored: unknown pattern");
            return false;
        }

        if let Some(previous) = self.state.instances.remove(name) {
            self.clock.cancel(previous.handle);
            debug!(pattern = name, handle = %previous.handle, "replacing running instance");
        }

        let interval = interval.unwrap_or(self.default_interval);
        let handle = self.clock.schedule(interval);
        self.state
            .instances
            .insert(name.to_string(), RunningInstance { handle, interval, cursor: 0 });
        debug!(pattern = name, %handle, %interval, "pattern started");
        true
    }

    /// Stop `name` if it is running. Returns whether anything was stopped.
    pub fn stop_pattern(&mut self, name: &str) -> bool {
        let Some(instance) = self.state.instances.remove(name) else {
            return false;
        };
        self.clock.cancel(instance.handle);
        debug!(pattern = name, handle = %instance.handle, "pattern stopped");
        true
    }

    /// Play the next step of the instance owning `tick.handle`.
    ///
    /// Ticks for handles that are no longer live are dropped.
    pub fn on_tick(&mut self, tick: ClockTick) {
        if self.disposed {
            return;
        }

        let Some((name, instance)) = self
            .state
            .instances
            .iter_mut()
            .find(|(_, instance)| instance.handle == tick.handle)
        else {
            trace!(handle = %tick.handle, "dropping tick for stale handle");
            return;
        };

        let Some(pattern) = self.state.patterns.get(name) else {
            return;
        };
        let Some(step) = pattern.step_at(instance.cursor).copied() else {
            return;
        };
        instance.cursor = (instance.cursor + 1) % pattern.len();

        let Step::Note(event) = step else {
            return;
        };

        let draw = self.rng.next_f64();
        if draw < event.probability() as f64 {
            trace!(pattern = %name, pitch = %event.pitch(), time = tick.time, "trigger");
            self.sink.trigger(NoteTrigger {
                pitch: event.pitch(),
                duration: event.duration(),
                time: tick.time,
                velocity: event.velocity(),
            });
        } else {
            trace!(pattern = %name, pitch = %event.pitch(), draw, "skipped by probability");
        }
    }

    /// Feed a batch of clock ticks, in order
    pub fn dispatch(&mut self, ticks: impl IntoIterator<Item = ClockTick>) {
        for tick in ticks {
            self.on_tick(tick);
        }
    }

    /// Change the key, shifting every stored note by the root interval.
    ///
    /// The scale mode is kept. Nothing changes if any note would leave the
    /// pitch range.
    pub fn set_key(&mut self, new_key: Pitch) -> Result<()> {
        self.ensure_live()?;
        let new_scale = scale(new_key, self.state.mode)?;
        let old_key = self.state.key;
        self.state.patterns.retranspose_all(old_key, new_key)?;
        self.state.key = new_key;
        self.state.scale = new_scale;
        debug!(%old_key, %new_key, "key changed");
        Ok(())
    }

    /// Change the scale mode of the current key; stored patterns are untouched
    pub fn set_scale_mode(&mut self, mode: ScaleMode) -> Result<()> {
        self.ensure_live()?;
        self.state.scale = scale(self.state.key, mode)?;
        self.state.mode = mode;
        debug!(%mode, "scale mode changed");
        Ok(())
    }

    /// Stop every instance and drop all patterns. The sequencer cannot be reused.
    pub fn dispose(&mut self) {
        if self.disposed {
            return;
        }
        for (name, instance) in std::mem::take(&mut self.state.instances) {
            self.clock.cancel(instance.handle);
            debug!(pattern = %name, "pattern stopped on dispose");
        }
        self.state.patterns.clear();
        self.disposed = true;
        debug!("sequencer disposed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::NoteEvent;
    use crate::pattern::ChordSpec;
    use crate::theory::ChordQuality;
    use crate::random::testing::Scripted;
    use crate::transport::TransportClock;

    type TestSequencer = Sequencer<TransportClock, Vec<NoteTrigger>, Scripted>;

    fn p(name: &str) -> Pitch {
        name.parse().unwrap()
    }

    fn sequencer(draws: &[f64]) -> TestSequencer {
        let mut clock = TransportClock::new(120.0);
        clock.play();
        Sequencer::new(SequencerConfig::default(), clock, Vec::new(), Scripted::new(draws)).unwrap()
    }

    fn bass_spec() -> PatternSpec {
        PatternSpec {
            notes: vec![p("C2"), p("A1"), p("F2"), p("G2")],
            euclidean_length: Some(8),
            euclidean_fills: Some(3),
            ..Default::default()
        }
    }

    fn run(seq: &mut TestSequencer, secs: f64) {
        let ticks = seq.clock_mut().advance(secs);
        seq.dispatch(ticks);
    }

    fn played(seq: &TestSequencer) -> Vec<(Pitch, f64)> {
        seq.sink().iter().map(|n| (n.pitch, n.time)).collect()
    }

    #[test]
    fn test_defaults() {
        let seq = sequencer(&[0.0]);
        assert_eq!(seq.key(), p("C4"));
        assert_eq!(seq.state().mode(), ScaleMode::Minor);
        assert_eq!(seq.scale().len(), 7);
    }

    #[test]
    fn test_bass_plays_euclidean_onsets() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        assert!(seq.start_pattern("bass", None));

        // Eighth notes at 120 BPM: one step every 0.25s
        run(&mut seq, 2.0);
        assert_eq!(played(&seq), vec![(p("F2"), 0.5), (p("A1"), 1.25), (p("G2"), 1.75)]);

        let first = seq.sink()[0];
        assert_eq!(first.duration, Duration::Subdivision(Subdivision::SIXTEENTH));
        assert_eq!(first.velocity, 0.8);
    }

    #[test]
    fn test_chord_progression_plays() {
        let spec = PatternSpec {
            chords: Some(ChordSpec {
                key: p("C4"),
                degrees: vec![1, 6, 4, 5],
                quality: ChordQuality::Major,
                arpeggio: None,
            }),
            durations: vec![Duration::Seconds(2.0)],
            velocity: Some(0.6),
            ..Default::default()
        };
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("chords", &spec).unwrap();
        seq.start_pattern("chords", Some(Subdivision::WHOLE));

        // Whole notes at 120 BPM: one step every 2s, 12 steps per cycle
        run(&mut seq, 24.5);
        let pitches: Vec<String> = seq.sink().iter().map(|n| n.pitch.to_string()).collect();
        assert_eq!(
            pitches,
            ["C4", "E4", "G4", "A4", "C#5", "E5", "F4", "A4", "C5", "G4", "B4", "D5", "C4"]
        );
        assert_eq!(seq.sink()[12].time, 24.0);
        assert!(seq.sink().iter().all(|n| n.velocity == 0.6 && n.duration == Duration::Seconds(2.0)));
    }

    #[test]
    fn test_playback_is_cyclic() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        seq.start_pattern("bass", None);
        run(&mut seq, 4.0);

        let pitches: Vec<Pitch> = seq.sink().iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![p("F2"), p("A1"), p("G2"), p("F2"), p("A1"), p("G2")]);
        assert_eq!(seq.sink()[3].time, 2.5);
    }

    #[test]
    fn test_start_then_stop_before_tick_plays_nothing() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        seq.start_pattern("bass", None);
        assert!(seq.stop_pattern("bass"));

        run(&mut seq, 4.0);
        assert!(seq.sink().is_empty());
        assert_eq!(seq.state().instance_state("bass"), InstanceState::Stopped);
    }

    #[test]
    fn test_unknown_pattern_is_ignored() {
        let mut seq = sequencer(&[0.0]);
        assert!(!seq.start_pattern("ghost", None));
        assert!(!seq.stop_pattern("ghost"));
        assert_eq!(seq.running().count(), 0);
        assert_eq!(seq.clock().active_schedules(), 0);

        run(&mut seq, 2.0);
        assert!(seq.sink().is_empty());
    }

    #[test]
    fn test_restart_replaces_instance() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        seq.start_pattern("bass", None);
        run(&mut seq, 0.6);
        assert_eq!(seq.state().instance("bass").unwrap().cursor(), 3);

        for _ in 0..3 {
            assert!(seq.start_pattern("bass", Some(Subdivision::QUARTER)));
        }
        assert_eq!(seq.running().collect::<Vec<_>>(), vec!["bass"]);
        assert_eq!(seq.clock().active_schedules(), 1);

        let instance = seq.state().instance("bass").unwrap();
        assert_eq!(instance.cursor(), 0);
        assert_eq!(instance.interval(), Subdivision::QUARTER);
    }

    #[test]
    fn test_queued_ticks_dropped_after_stop() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        seq.start_pattern("bass", None);

        let queued = seq.clock_mut().advance(2.0);
        assert_eq!(queued.len(), 8);
        seq.stop_pattern("bass");
        seq.dispatch(queued);
        assert!(seq.sink().is_empty());
    }

    #[test]
    fn test_stale_handle_after_restart() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        seq.start_pattern("bass", None);
        let queued = seq.clock_mut().advance(2.0);

        seq.start_pattern("bass", None);
        seq.dispatch(queued);
        assert!(seq.sink().is_empty());
        assert_eq!(seq.state().instance("bass").unwrap().cursor(), 0);
    }

    #[test]
    fn test_probability_gating() {
        let spec = PatternSpec {
            notes: vec![p("C4"), p("D4"), p("E4"), p("F4")],
            durations: vec![Duration::Seconds(0.1)],
            probability: Some(0.5),
            ..Default::default()
        };
        let mut seq = sequencer(&[0.2, 0.7]);
        seq.add_pattern("lead", &spec).unwrap();
        seq.start_pattern("lead", None);
        run(&mut seq, 1.0);

        assert_eq!(played(&seq), vec![(p("C4"), 0.0), (p("E4"), 0.5)]);
    }

    #[test]
    fn test_rests_do_not_consume_draws() {
        let half = NoteEvent::new(p("C2"), Duration::Seconds(0.1), 0.8, 0.5);
        let steps = vec![Step::Rest, Step::Note(half), Step::Rest, Step::Note(half), Step::Note(half)];
        let mut seq = sequencer(&[0.1, 0.99]);
        seq.state.patterns.insert("half", steps);
        seq.start_pattern("half", None);
        run(&mut seq, 1.25);

        // Onsets at 0.25 (0.1 passes), 0.75 (0.99 fails), 1.0 (0.1 passes)
        assert_eq!(played(&seq), vec![(p("C2"), 0.25), (p("C2"), 1.0)]);
    }

    #[test]
    fn test_set_key_affects_future_steps() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        seq.start_pattern("bass", None);

        run(&mut seq, 1.0);
        seq.set_key(p("D4")).unwrap();
        run(&mut seq, 1.0);

        assert_eq!(played(&seq), vec![(p("F2"), 0.5), (p("B1"), 1.25), (p("A2"), 1.75)]);
        assert_eq!(seq.key(), p("D4"));
        assert_eq!(seq.scale()[0], p("D4"));
        assert_eq!(seq.state().instance("bass").unwrap().cursor(), 0);
    }

    #[test]
    fn test_set_same_key_twice_is_idempotent() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        seq.set_key(p("E4")).unwrap();
        let once = seq.pattern("bass").cloned();
        seq.set_key(p("E4")).unwrap();
        assert_eq!(seq.pattern("bass").cloned(), once);
    }

    #[test]
    fn test_set_key_out_of_range_keeps_state() {
        let mut seq = sequencer(&[0.0]);
        let spec = PatternSpec {
            notes: vec![p("G9")],
            durations: vec![Duration::Seconds(0.5)],
            ..Default::default()
        };
        seq.add_pattern("top", &spec).unwrap();

        assert_eq!(seq.set_key(p("D4")), Err(CadenceError::PitchOutOfRange(129)));
        assert_eq!(seq.key(), p("C4"));
        assert_eq!(seq.pattern("top").unwrap().steps()[0].note().unwrap().pitch(), p("G9"));
    }

    #[test]
    fn test_set_scale_mode() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        let before = seq.pattern("bass").cloned();
        seq.set_scale_mode(ScaleMode::Major).unwrap();

        assert_eq!(seq.scale()[2], p("E4"));
        assert_eq!(seq.pattern("bass").cloned(), before);
    }

    #[test]
    fn test_add_melody_uses_current_scale() {
        let mut seq = sequencer(&[0.9, 0.1, 0.5]);
        seq.add_melody("lead", 4, &MelodyRules::default()).unwrap();

        let pitches: Vec<Pitch> = seq
            .pattern("lead")
            .unwrap()
            .steps()
            .iter()
            .map(|s| s.note().unwrap().pitch())
            .collect();
        assert_eq!(pitches, vec![p("D#4"), p("D#4"), p("C4"), p("D#4")]);
    }

    #[test]
    fn test_remove_pattern() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        seq.start_pattern("bass", None);

        assert!(seq.remove_pattern("bass").is_ok());
        assert!(!seq.is_running("bass"));
        assert_eq!(seq.clock().active_schedules(), 0);
        assert_eq!(seq.remove_pattern("bass"), Err(CadenceError::UnknownPattern("bass".to_string())));
    }

    #[test]
    fn test_dispose_is_terminal() {
        let mut seq = sequencer(&[0.0]);
        seq.add_pattern("bass", &bass_spec()).unwrap();
        seq.start_pattern("bass", None);
        let queued = seq.clock_mut().advance(1.0);

        seq.dispose();
        assert!(seq.is_disposed());
        assert!(seq.patterns().is_empty());
        assert_eq!(seq.clock().active_schedules(), 0);

        seq.dispatch(queued);
        assert!(seq.sink().is_empty());
        assert!(!seq.stop_pattern("bass"));
        assert!(!seq.start_pattern("bass", None));
        assert_eq!(seq.add_pattern("bass", &bass_spec()), Err(CadenceError::Disposed));
        assert_eq!(seq.set_key(p("D4")), Err(CadenceError::Disposed));
        seq.dispose();
    }
}
