//! A live session: sequencer, transport clock and the trigger queue to the synth

use cadence_core::{NoteTrigger, Result, Sequencer, TransportClock};
use crossbeam_channel::Receiver;
use tracing::{info, warn};

use crate::channel_sink::{ChannelSink, DEFAULT_CAPACITY};
use crate::commands::{CommandError, SessionCommand};
use crate::config::StudioConfig;

pub type StudioSequencer = Sequencer<TransportClock, ChannelSink, fastrand::Rng>;

pub struct Session {
    sequencer: StudioSequencer,
    triggers: Receiver<NoteTrigger>,
}

impl Session {
    /// Build a session from config: register patterns, start the autostart list
    /// and set the transport playing
    pub fn from_config(config: &StudioConfig) -> Result<Self> {
        let (sink, triggers) = ChannelSink::bounded(DEFAULT_CAPACITY);
        let rng = match config.seed {
            Some(seed) => fastrand::Rng::with_seed(seed),
            None => fastrand::Rng::new(),
        };
        let clock = TransportClock::new(config.bpm);
        let mut sequencer = Sequencer::new(config.sequencer_config(), clock, sink, rng)?;

        for (name, spec) in &config.patterns {
            sequencer.add_pattern(name, spec)?;
        }
        for entry in &config.autostart {
            if !sequencer.start_pattern(entry.name(), entry.interval()) {
                warn!("Autostart pattern not found: {}", entry.name());
            }
        }
        sequencer.clock_mut().play();

        info!(
            "Session opened: {} pattern(s), key {} {}, {} BPM",
            sequencer.patterns().len(),
            sequencer.key(),
            sequencer.state().mode(),
            sequencer.clock().bpm()
        );
        Ok(Self { sequencer, triggers })
    }

    pub fn sequencer(&self) -> &StudioSequencer {
        &self.sequencer
    }

    pub fn sequencer_mut(&mut self) -> &mut StudioSequencer {
        &mut self.sequencer
    }

    /// Execute one editor command
    pub fn apply(&mut self, command: SessionCommand) -> std::result::Result<(), CommandError> {
        let seq = &mut self.sequencer;
        match command {
            SessionCommand::AddPattern { name, spec } => seq.add_pattern(&name, &spec)?,
            SessionCommand::AddMelody { name, length, rules } => seq.add_melody(&name, length, &rules)?,
            SessionCommand::RemovePattern { name } => {
                seq.remove_pattern(&name)?;
            }
            SessionCommand::StartPattern { name, interval } => {
                seq.start_pattern(&name, interval);
            }
            SessionCommand::StopPattern { name } => {
                seq.stop_pattern(&name);
            }
            SessionCommand::SetKey { key } => seq.set_key(key)?,
            SessionCommand::SetScale { scale } => seq.set_scale_mode(scale)?,
            SessionCommand::SetBpm { bpm } => seq.clock_mut().set_bpm(bpm),
            SessionCommand::Play => seq.clock_mut().play(),
            SessionCommand::Pause => seq.clock_mut().pause(),
            SessionCommand::Stop => seq.clock_mut().stop(),
        }
        Ok(())
    }

    /// Move the transport forward, fire due steps and collect the resulting triggers.
    ///
    /// The queue is drained after every tick, so a long block never fills it.
    pub fn advance(&mut self, secs: f64) -> Vec<NoteTrigger> {
        let ticks = self.sequencer.clock_mut().advance(secs);
        let mut notes = Vec::new();
        for tick in ticks {
            self.sequencer.on_tick(tick);
            notes.extend(self.triggers.try_iter());
        }
        notes
    }

    /// Advance in `resolution`-second blocks until `seconds` of transport time have passed
    pub fn render(&mut self, seconds: f64, resolution: f64) -> Vec<NoteTrigger> {
        let resolution = if resolution > 0.0 { resolution } else { seconds };
        let mut notes = Vec::new();
        let mut elapsed = 0.0;
        while elapsed < seconds {
            let block = resolution.min(seconds - elapsed);
            notes.extend(self.advance(block));
            elapsed += block;
        }
        notes
    }

    pub fn dropped_notes(&self) -> u64 {
        self.sequencer.sink().dropped()
    }

    pub fn dispose(&mut self) {
        self.sequencer.dispose();
        info!("Session closed");
    }
}
