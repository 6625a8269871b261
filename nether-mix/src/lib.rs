//! Real-time sample mixing core for tracker-style replayers
//!
//! Nether Mix turns tracker playback commands into audio and keeps a UI in
//! step with what is actually audible:
//!
//! - **Voices**: fixed-point (32.32) resampling with none, linear, quadratic,
//!   cubic or windowed-sinc interpolation, one-shot/forward/ping-pong loops
//!   and click-free volume ramps
//! - **Tick scheduler**: BPM to samples-per-tick with an exact fractional
//!   carry, so ticks never drift
//! - **Sync queues**: lock-free SPSC ring buffers carrying timestamped
//!   pattern and channel snapshots from the audio thread to the UI
//! - **Engine**: the device callback that interleaves replayer ticks with
//!   voice mixing and converts to the output format
//!
//! # Architecture
//!
//! ```text
//! UI thread                          Audio thread
//! ---------                          ------------
//! CriticalSection::with_lock  --->   MixerEngine::audio_callback
//!   trigger / volume / tempo           Replayer::tick (per tick)
//!                                      VoiceBank -> MixBuffer -> output
//! SyncConsumer::pop_due       <---   SyncProducer::push (per tick)
//! ```
//!
//! Everything the audio thread touches is allocated up front; the callback
//! never allocates and only takes the engine's critical section.

pub mod accumulator;
pub mod config;
pub mod engine;
pub mod error;
pub mod kernels;
pub mod lock;
#[cfg(feature = "device")]
pub mod output;
pub mod sample;
pub mod scheduler;
pub mod sync;
pub mod voice;

pub use accumulator::{MixBuffer, OutputBuffer, OutputStage};
pub use config::{AudioSettings, MixerConfig, OutputFormat, SyncSettings};
pub use engine::{
    ChannelInfo, MixerEngine, MixerMetrics, Replayer, SharedEngine, SyncReceivers, TickContext,
};
pub use error::{MixerError, Result};
pub use kernels::Kernels;
pub use lock::CriticalSection;
#[cfg(feature = "device")]
pub use output::AudioOutput;
pub use sample::{BitDepth, LoopMode, Sample};
pub use scheduler::{TempoState, TickLength, TickScheduler};
pub use sync::{
    ChannelSnapshot, ChannelSyncState, PatternSnapshot, PatternState, SyncClock, SyncConsumer,
    SyncProducer, SyncQueue, Timestamped,
};
pub use voice::{Interpolation, MixRoutine, Voice, VoiceBank, VoiceTrigger, pan_gains};

// =============================================================================
// Fixed-point position format
// =============================================================================

/// Fraction bits of a voice position and delta
pub const MIXER_FRAC_BITS: u32 = 32;
/// One whole sample in fixed point
pub const MIXER_FRAC_SCALE: u64 = 1 << MIXER_FRAC_BITS;
/// Mask for the fractional part
pub const MIXER_FRAC_MASK: u64 = MIXER_FRAC_SCALE - 1;

// =============================================================================
// Interpolation reach
// =============================================================================

/// Widest kernel (16-tap sinc)
pub const MAX_TAPS: usize = 16;
/// Taps left of the read position for the widest kernel
pub const MAX_LEFT_TAPS: usize = MAX_TAPS / 2 - 1;
/// Taps right of the read position for the widest kernel
pub const MAX_RIGHT_TAPS: usize = MAX_TAPS / 2;

// =============================================================================
// Channels and voices
// =============================================================================

/// Playback channels addressable by a replayer
pub const MAX_CHANNELS: usize = 32;
/// Voice slots: one per channel plus one fade-out shadow per channel
pub const VOICE_SLOTS: usize = MAX_CHANNELS * 2;

/// Length of the retrigger/stop fade, in milliseconds
pub const QUICK_RAMP_MS: u32 = 5;

// =============================================================================
// Tempo and output
// =============================================================================

/// Slowest tempo (BPM)
pub const MIN_BPM: u16 = 32;
/// Fastest tempo (BPM)
pub const MAX_BPM: u16 = 255;
/// Default tempo (BPM)
pub const DEFAULT_BPM: u16 = 125;
/// Default ticks per row
pub const DEFAULT_SPEED: u8 = 6;
/// Slowest speed accepted by the scheduler
pub const MAX_SPEED: u8 = 31;

/// Lowest supported output frequency (Hz)
pub const MIN_AUDIO_FREQ: u32 = 44_100;
/// Highest supported output frequency (Hz)
pub const MAX_AUDIO_FREQ: u32 = 96_000;

/// Quick-ramp length in samples for an output frequency
pub fn quick_ramp_samples(frequency: u32) -> u32 {
    (frequency as f64 / (1000.0 / QUICK_RAMP_MS as f64)).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tap_reach() {
        assert_eq!(MAX_LEFT_TAPS, 7);
        assert_eq!(MAX_RIGHT_TAPS, 8);
        assert_eq!(MAX_LEFT_TAPS + 1 + MAX_RIGHT_TAPS, MAX_TAPS);
    }

    #[test]
    fn test_quick_ramp_samples() {
        assert_eq!(quick_ramp_samples(48_000), 240);
        assert_eq!(quick_ramp_samples(44_100), 221); // 220.5 rounds up
        assert_eq!(quick_ramp_samples(96_000), 480);
    }
}
