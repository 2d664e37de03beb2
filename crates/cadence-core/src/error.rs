//! Error types for cadence

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CadenceError {
    #[error("Unknown scale type: {0}")]
    UnknownScaleType(String),
    #[error("Invalid pitch: {0}")]
    InvalidPitch(String),
    /// Carries the semitone index that fell outside 0..=127
    #[error("Pitch out of range: {0}")]
    PitchOutOfRange(i32),
    #[error("Unknown pattern: {0}")]
    UnknownPattern(String),
    #[error("Invalid pattern spec: {0}")]
    InvalidSpec(String),
    #[error("Invalid subdivision: {0}")]
    InvalidSubdivision(String),
    #[error("Sequencer has been disposed")]
    Disposed,
}

pub type Result<T> = std::result::Result<T, CadenceError>;
