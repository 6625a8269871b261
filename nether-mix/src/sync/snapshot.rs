//! Snapshot entries carried by the sync queues

use super::Timestamped;
use crate::MAX_CHANNELS;

/// Replayer position and tempo at a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternState {
    pub pattern: u16,
    pub global_volume: u8,
    /// Index into the song's order list
    pub song_position: u16,
    pub tick: u8,
    pub speed: u8,
    pub row: u16,
    pub bpm: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PatternSnapshot {
    pub state: PatternState,
    pub timestamp: u64,
}

impl Timestamped for PatternSnapshot {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// What one channel looks like at a tick.
///
/// `note`, `instrument`, `volume` and `pan` come from the replayer; the
/// remaining fields are filled from the channel's voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelSyncState {
    pub active: bool,
    /// A note started on this channel during the tick
    pub triggered: bool,
    pub sample_id: u32,
    pub note: u8,
    pub instrument: u8,
    pub volume: u8,
    pub pan: u8,
    /// 32.32 playback step
    pub delta: u64,
    /// Frame position at the start of the tick
    pub position: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSnapshot {
    pub channels: [ChannelSyncState; MAX_CHANNELS],
    /// Channels in use by the song
    pub num_channels: u8,
    pub timestamp: u64,
}

impl ChannelSnapshot {
    /// The channels in use
    pub fn active_channels(&self) -> &[ChannelSyncState] {
        let count = (self.num_channels as usize).min(MAX_CHANNELS);
        &self.channels[..count]
    }
}

impl Default for ChannelSnapshot {
    fn default() -> Self {
        Self {
            channels: [ChannelSyncState::default(); MAX_CHANNELS],
            num_channels: 0,
            timestamp: 0,
        }
    }
}

impl Timestamped for ChannelSnapshot {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}
