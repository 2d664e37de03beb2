//! Instrument sink that hands triggers to the synthesis thread over a channel

use cadence_core::{InstrumentSink, NoteTrigger};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::trace;

/// Default queue depth between the sequencer and the synth
pub const DEFAULT_CAPACITY: usize = 1024;

/// Non-blocking sink: a full or disconnected channel drops the note
pub struct ChannelSink {
    tx: Sender<NoteTrigger>,
    dropped: u64,
}

impl ChannelSink {
    pub fn bounded(capacity: usize) -> (Self, Receiver<NoteTrigger>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        (Self { tx, dropped: 0 }, rx)
    }

    /// Notes dropped because the receiver was full or gone
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl InstrumentSink for ChannelSink {
    fn trigger(&mut self, note: NoteTrigger) {
        match self.tx.try_send(note) {
            Ok(()) => {}
            Err(TrySendError::Full(note)) => {
                self.dropped += 1;
                trace!(pitch = %note.pitch, "trigger queue full, note dropped");
            }
            Err(TrySendError::Disconnected(note)) => {
                self.dropped += 1;
                trace!(pitch = %note.pitch, "instrument gone, note dropped");
            }
        }
    }
}
