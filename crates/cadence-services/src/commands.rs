//! JSON command protocol spoken by the code editor

use cadence_core::{CadenceError, MelodyRules, PatternSpec, Pitch, ScaleMode, Subdivision};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Invalid command on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Engine(#[from] CadenceError),
}

/// One editor instruction, tagged by `"cmd"`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum SessionCommand {
    AddPattern {
        name: String,
        spec: PatternSpec,
    },
    AddMelody {
        name: String,
        length: usize,
        #[serde(default)]
        rules: MelodyRules,
    },
    RemovePattern {
        name: String,
    },
    StartPattern {
        name: String,
        #[serde(default)]
        interval: Option<Subdivision>,
    },
    StopPattern {
        name: String,
    },
    SetKey {
        key: Pitch,
    },
    SetScale {
        scale: ScaleMode,
    },
    SetBpm {
        bpm: f64,
    },
    Play,
    Pause,
    Stop,
}

/// Parse either a JSON array of commands or one JSON object per line
pub fn parse_commands(input: &str) -> Result<Vec<SessionCommand>, CommandError> {
    let trimmed = input.trim_start();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed).map_err(|source| CommandError::Parse {
            line: source.line(),
            source,
        });
    }

    input
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|source| CommandError::Parse { line: idx + 1, source })
        })
        .collect()
}
