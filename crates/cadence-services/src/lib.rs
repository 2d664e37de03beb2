//! cadence-services: Session runtime, editor commands, config and the synth-facing sink

pub mod channel_sink;
pub mod commands;
pub mod config;
pub mod session;

pub use channel_sink::ChannelSink;
pub use commands::{parse_commands, CommandError, SessionCommand};
pub use config::{config_path, load_config, load_or_default, AutostartEntry, ConfigError, StudioConfig};
pub use session::{Session, StudioSequencer};
