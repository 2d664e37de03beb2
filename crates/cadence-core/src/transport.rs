//! Transport state, musical time values and the clock that drives the sequencer

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CadenceError, Result};

// ============================================================================
// Subdivision / Duration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum SubdivisionKind {
    Note,
    Triplet,
    Dotted,
    Measure,
}

/// A musical note value in transport notation (`"8n"`, `"16n"`, `"8t"`, `"4n."`, `"1m"`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subdivision {
    kind: SubdivisionKind,
    value: u16,
}

impl Subdivision {
    pub const WHOLE: Self = Self { kind: SubdivisionKind::Note, value: 1 };
    pub const HALF: Self = Self { kind: SubdivisionKind::Note, value: 2 };
    pub const QUARTER: Self = Self { kind: SubdivisionKind::Note, value: 4 };
    pub const EIGHTH: Self = Self { kind: SubdivisionKind::Note, value: 8 };
    pub const SIXTEENTH: Self = Self { kind: SubdivisionKind::Note, value: 16 };
    pub const THIRTY_SECOND: Self = Self { kind: SubdivisionKind::Note, value: 32 };

    /// Straight note value `1/value` of a whole note; `value` must be a power of two up to 128
    pub fn note(value: u16) -> Result<Self> {
        Self::checked(SubdivisionKind::Note, value)
    }

    pub fn triplet(value: u16) -> Result<Self> {
        Self::checked(SubdivisionKind::Triplet, value)
    }

    pub fn dotted(value: u16) -> Result<Self> {
        Self::checked(SubdivisionKind::Dotted, value)
    }

    /// Whole 4/4 measures
    pub fn measures(count: u16) -> Result<Self> {
        if count == 0 {
            return Err(CadenceError::InvalidSubdivision(format!("{count}m")));
        }
        Ok(Self { kind: SubdivisionKind::Measure, value: count })
    }

    fn checked(kind: SubdivisionKind, value: u16) -> Result<Self> {
        let sub = Self { kind, value };
        if value == 0 || value > 128 || !value.is_power_of_two() {
            return Err(CadenceError::InvalidSubdivision(sub.to_string()));
        }
        Ok(sub)
    }

    /// Length in quarter-note beats
    pub fn beats(&self) -> f64 {
        let straight = 4.0 / self.value as f64;
        match self.kind {
            SubdivisionKind::Note => straight,
            SubdivisionKind::Triplet => straight * 2.0 / 3.0,
            SubdivisionKind::Dotted => straight * 1.5,
            SubdivisionKind::Measure => 4.0 * self.value as f64,
        }
    }

    /// Length in seconds at `bpm`
    pub fn seconds(&self, bpm: f64) -> f64 {
        self.beats() * 60.0 / bpm
    }
}

impl fmt::Display for Subdivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SubdivisionKind::Note => write!(f, "{}n", self.value),
            SubdivisionKind::Triplet => write!(f, "{}t", self.value),
            SubdivisionKind::Dotted => write!(f, "{}n.", self.value),
            SubdivisionKind::Measure => write!(f, "{}m", self.value),
        }
    }
}

impl FromStr for Subdivision {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || CadenceError::InvalidSubdivision(s.to_string());
        let s = s.trim();
        let number = |digits: &str| digits.parse::<u16>().map_err(|_| invalid());

        if let Some(digits) = s.strip_suffix("n.") {
            Self::dotted(number(digits)?)
        } else if let Some(digits) = s.strip_suffix('n') {
            Self::note(number(digits)?)
        } else if let Some(digits) = s.strip_suffix('t') {
            Self::triplet(number(digits)?)
        } else if let Some(digits) = s.strip_suffix('m') {
            Self::measures(number(digits)?)
        } else {
            Err(invalid())
        }
    }
}

impl TryFrom<String> for Subdivision {
    type Error = CadenceError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Subdivision> for String {
    fn from(sub: Subdivision) -> Self {
        sub.to_string()
    }
}

/// How long a triggered note sounds: a note value, or a plain number of seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Duration {
    Seconds(f64),
    Subdivision(Subdivision),
}

impl Duration {
    pub fn to_seconds(&self, bpm: f64) -> f64 {
        match self {
            Self::Seconds(secs) => *secs,
            Self::Subdivision(sub) => sub.seconds(bpm),
        }
    }
}

impl From<Subdivision> for Duration {
    fn from(sub: Subdivision) -> Self {
        Self::Subdivision(sub)
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Seconds(secs) => write!(f, "{secs}"),
            Self::Subdivision(sub) => write!(f, "{sub}"),
        }
    }
}

// ============================================================================
// Clock
// ============================================================================

/// Identifies one repeating schedule on a [`Clock`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScheduleHandle(pub u64);

impl fmt::Display for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One firing of a schedule at transport time `time` (seconds)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockTick {
    pub handle: ScheduleHandle,
    pub time: f64,
}

/// Musical clock capable of repeating quantized callbacks.
///
/// Firings are reported back as [`ClockTick`]s. A clock may already have handed
/// out ticks for a handle before it is cancelled; receivers must check that the
/// handle is still live.
pub trait Clock {
    fn schedule(&mut self, interval: Subdivision) -> ScheduleHandle;
    fn cancel(&mut self, handle: ScheduleHandle);
    /// Current transport time in seconds
    fn now(&self) -> f64;
}

// ============================================================================
// Transport
// ============================================================================

/// Transport playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Paused,
}

#[derive(Debug, Clone)]
struct Schedule {
    handle: ScheduleHandle,
    interval: Subdivision,
    next_time: f64,
}

/// Transport-time clock advanced explicitly by the host (audio callback, timer or test)
#[derive(Debug, Clone)]
pub struct TransportClock {
    pub state: TransportState,
    /// Tempo in BPM
    bpm: f64,
    /// Current position in seconds
    position: f64,
    schedules: Vec<Schedule>,
    next_handle: u64,
}

impl Default for TransportClock {
    fn default() -> Self {
        Self {
            state: TransportState::Stopped,
            bpm: 120.0,
            position: 0.0,
            schedules: Vec::new(),
            next_handle: 1,
        }
    }
}

impl TransportClock {
    pub const MIN_BPM: f64 = 20.0;
    pub const MAX_BPM: f64 = 999.0;

    pub fn new(bpm: f64) -> Self {
        let mut clock = Self::default();
        clock.set_bpm(bpm);
        clock
    }

    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Change tempo; takes effect from each schedule's next firing
    pub fn set_bpm(&mut self, bpm: f64) {
        if bpm.is_finite() {
            self.bpm = bpm.clamp(Self::MIN_BPM, Self::MAX_BPM);
        }
    }

    pub fn play(&mut self) {
        self.state = TransportState::Playing;
    }

    pub fn pause(&mut self) {
        self.state = TransportState::Paused;
    }

    /// Stop and rewind; every schedule re-quantizes to the start
    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.position = 0.0;
        for schedule in &mut self.schedules {
            schedule.next_time = 0.0;
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    /// Position in seconds
    pub fn position_secs(&self) -> f64 {
        self.position
    }

    /// Current beat number (0-indexed)
    pub fn current_beat(&self) -> f64 {
        self.position * self.bpm / 60.0
    }

    /// Format position as MM:SS.ss
    pub fn format_time(&self) -> String {
        let mins = (self.position / 60.0) as u32;
        let secs_rem = self.position % 60.0;
        format!("{:02}:{:05.2}", mins, secs_rem)
    }

    pub fn active_schedules(&self) -> usize {
        self.schedules.len()
    }

    /// Advance the transport and collect every firing inside `[position, position + secs)`,
    /// ordered by time then handle
    pub fn advance(&mut self, secs: f64) -> Vec<ClockTick> {
        if !self.is_playing() || secs <= 0.0 {
            return Vec::new();
        }

        let end = self.position + secs;
        let mut ticks = Vec::new();

        for schedule in &mut self.schedules {
            let step = schedule.interval.seconds(self.bpm);
            while schedule.next_time < end {
                ticks.push(ClockTick { handle: schedule.handle, time: schedule.next_time });
                schedule.next_time += step;
            }
        }

        ticks.sort_by(|a, b| a.time.total_cmp(&b.time).then(a.handle.cmp(&b.handle)));
        self.position = end;
        ticks
    }

    /// First grid point of `interval` at or after the current position
    fn quantize(&self, interval: Subdivision) -> f64 {
        let step = interval.seconds(self.bpm);
        let slots = (self.position / step - 1e-9).ceil().max(0.0);
        slots * step
    }
}

impl Clock for TransportClock {
    fn schedule(&mut self, interval: Subdivision) -> ScheduleHandle {
        let handle = ScheduleHandle(self.next_handle);
        self.next_handle += 1;
        let next_time = self.quantize(interval);
        self.schedules.push(Schedule { handle, interval, next_time });
        handle
    }

    fn cancel(&mut self, handle: ScheduleHandle) {
        self.schedules.retain(|s| s.handle != handle);
    }

    fn now(&self) -> f64 {
        self.position
    }
}
