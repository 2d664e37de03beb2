//! Session configuration (`config.toml`)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use cadence_core::{PatternSpec, Pitch, ScaleMode, SequencerConfig, Subdivision};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Could not write config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// A pattern started when the session opens: a bare name uses the default
/// interval, a table may give its own
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AutostartEntry {
    Name(String),
    WithInterval { name: String, interval: Subdivision },
}

impl AutostartEntry {
    pub fn name(&self) -> &str {
        match self {
            Self::Name(name) | Self::WithInterval { name, .. } => name,
        }
    }

    pub fn interval(&self) -> Option<Subdivision> {
        match self {
            Self::Name(_) => None,
            Self::WithInterval { interval, .. } => Some(*interval),
        }
    }
}

impl From<&str> for AutostartEntry {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Tempo, key and patterns a session starts with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub bpm: f64,
    pub key: Pitch,
    pub scale: ScaleMode,
    /// Default step interval for started patterns
    pub interval: Subdivision,
    /// Seed for melody generation and probability draws; random when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Patterns started as soon as the session opens
    pub autostart: Vec<AutostartEntry>,
    pub patterns: BTreeMap<String, PatternSpec>,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            bpm: 120.0,
            key: Pitch::MIDDLE_C,
            scale: ScaleMode::Minor,
            interval: Subdivision::EIGHTH,
            seed: None,
            autostart: Vec::new(),
            patterns: BTreeMap::new(),
        }
    }
}

impl StudioConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn sequencer_config(&self) -> SequencerConfig {
        SequencerConfig {
            key: self.key,
            mode: self.scale,
            interval: self.interval,
        }
    }
}

pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("cadence")
        .join("config.toml")
}

pub fn load_config(path: &Path) -> Result<StudioConfig, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    StudioConfig::from_toml_str(&text)
}

/// Load the default config file, falling back to defaults when missing or invalid
pub fn load_or_default() -> StudioConfig {
    let path = config_path();
    if !path.exists() {
        return StudioConfig::default();
    }
    load_config(&path).unwrap_or_else(|e| {
        warn!("Ignoring config at {}: {}", path.display(), e);
        StudioConfig::default()
    })
}
