//! The mixing engine: voices, tick scheduler and snapshot producers
//!
//! [`MixerEngine`] owns everything the audio thread touches. It is shared
//! with the UI thread through a [`CriticalSection`](crate::CriticalSection)
//! ([`SharedEngine`]); the UI side reads display state from the
//! [`SyncReceivers`] returned by [`MixerEngine::new`] without locking.
//!
//! Per tick the engine calls the [`Replayer`] with a [`TickContext`], which
//! is the only way a replayer touches voices and tempo.

mod callback;
mod metrics;


use std::time::Duration;

use tracing::{debug, info};

pub use metrics::MixerMetrics;

use crate::accumulator::{MixBuffer, OutputStage};
use crate::config::MixerConfig;
use crate::error::{MixerError, Result};
use crate::kernels::Kernels;
use crate::lock::CriticalSection;
use crate::scheduler::{TickScheduler, samples_per_tick};
use crate::sync::{
    ChannelSnapshot, PatternSnapshot, PatternState, SyncClock, SyncConsumer, SyncProducer,
    SyncQueue,
};
use crate::voice::{Interpolation, Voice, VoiceBank, VoiceTrigger};
use crate::{MAX_AUDIO_FREQ, MAX_CHANNELS, MIN_BPM, quick_ramp_samples};

/// Engine shared between the audio and UI threads
pub type SharedEngine = CriticalSection<MixerEngine>;

/// Musical state of a channel, as shown in channel snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelInfo {
    pub note: u8,
    pub instrument: u8,
    pub volume: u8,
    pub pan: u8,
}

/// A tracker replayer driven once per tick from the audio thread.
///
/// `tick` must follow the same rules as the audio callback: no allocation,
/// no blocking. The returned state, if any, is published as a pattern
/// snapshot for the tick.
pub trait Replayer: Send {
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Option<PatternState>;
}

impl<F> Replayer for F
where
    F: FnMut(&mut TickContext<'_>) -> Option<PatternState> + Send,
{
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Option<PatternState> {
        self(ctx)
    }
}

/// Voice and tempo commands, borrowed from the engine.
pub struct TickContext<'a> {
    voices: &'a mut VoiceBank,
    scheduler: &'a mut TickScheduler,
    channels: &'a mut [ChannelInfo; MAX_CHANNELS],
    num_channels: &'a mut u8,
}

impl TickContext<'_> {
    /// Start a note. See [`VoiceBank::trigger`].
    pub fn trigger_voice(&mut self, channel: usize, trigger: VoiceTrigger) -> Result<()> {
        self.voices.trigger(channel, trigger)
    }

    /// Ramp a channel's gain over `ramp_samples`.
    pub fn set_voice_volume(
        &mut self,
        channel: usize,
        gain_l: f32,
        gain_r: f32,
        ramp_samples: u32,
    ) -> Result<()> {
        self.voices.set_volume(channel, gain_l, gain_r, ramp_samples)
    }

    pub fn set_frequency(&mut self, channel: usize, frequency_ratio: f64) -> Result<()> {
        self.voices.set_frequency(channel, frequency_ratio)
    }

    pub fn stop_voice(&mut self, channel: usize) -> Result<()> {
        self.voices.stop(channel)
    }

    /// `0` pauses; a change applies from the next tick.
    pub fn set_tempo(&mut self, bpm: u16) -> Result<()> {
        self.scheduler.set_bpm(bpm)
    }

    pub fn set_speed(&mut self, speed: u8) -> Result<()> {
        self.scheduler.set_speed(speed)
    }

    /// Set the display fields of a channel.
    pub fn set_channel_info(&mut self, channel: usize, info: ChannelInfo) -> Result<()> {
        let slot = self.channels.get_mut(channel).ok_or(MixerError::ChannelOutOfRange {
            channel,
            max: MAX_CHANNELS,
        })?;
        *slot = info;
        Ok(())
    }

    /// Channels reported in snapshots (clamped to `MAX_CHANNELS`)
    pub fn set_num_channels(&mut self, channels: u8) {
        *self.num_channels = channels.min(MAX_CHANNELS as u8);
    }

    pub fn bpm(&self) -> Option<u16> {
        self.scheduler.bpm()
    }

    pub fn speed(&self) -> u8 {
        self.scheduler.speed()
    }

    pub fn output_frequency(&self) -> u32 {
        self.scheduler.frequency()
    }

    /// Whole samples in one tick at the current tempo
    pub fn tick_samples(&self) -> Option<u64> {
        self.scheduler.tick_length().map(|len| len.whole)
    }

    /// Length of the click-free fade in samples
    pub fn quick_ramp(&self) -> u32 {
        self.voices.quick_ramp()
    }

    pub fn voice(&self, channel: usize) -> Option<&Voice> {
        self.voices.channel(channel)
    }
}

/// UI-thread ends of the snapshot queues.
pub struct SyncReceivers {
    pub pattern: SyncConsumer<PatternSnapshot>,
    pub channels: SyncConsumer<ChannelSnapshot>,
    clock: SyncClock,
}

impl SyncReceivers {
    /// The clock snapshot timestamps are measured on
    pub fn clock(&self) -> SyncClock {
        self.clock
    }

    pub fn now_ns(&self) -> u64 {
        self.clock.now_ns()
    }
}

pub struct MixerEngine {
    kernels: Kernels,
    voices: VoiceBank,
    buffer: MixBuffer,
    stage: OutputStage,
    scheduler: TickScheduler,
    pattern_tx: SyncProducer<PatternSnapshot>,
    channel_tx: SyncProducer<ChannelSnapshot>,
    clock: SyncClock,
    latency_ns: u64,
    buffer_frames: u32,
    channels: [ChannelInfo; MAX_CHANNELS],
    num_channels: u8,
    replayer: Option<Box<dyn Replayer>>,
    metrics: MixerMetrics,
}

impl MixerEngine {
    /// Build the engine and the matching snapshot receivers.
    ///
    /// All tables and buffers are allocated here; nothing on the audio path
    /// allocates afterwards.
    pub fn new(config: &MixerConfig) -> Result<(Self, SyncReceivers)> {
        config.validate()?;
        let audio = &config.audio;

        let kernels = Kernels::new()?;
        let scheduler = TickScheduler::new(audio.frequency)?;
        // Longest tick: slowest tempo at the highest frequency
        let max_tick = samples_per_tick(MIN_BPM, MAX_AUDIO_FREQ).whole as usize + 1;
        let buffer = MixBuffer::new(max_tick)?;
        let stage = OutputStage::new(audio.amplification, audio.master_volume, audio.dither)?;
        let voices = VoiceBank::new(
            audio.interpolation,
            audio.volume_ramping,
            quick_ramp_samples(audio.frequency),
        );

        let (pattern_tx, pattern) = SyncQueue::new(config.sync.queue_capacity)?.split();
        let (channel_tx, channels) = SyncQueue::new(config.sync.queue_capacity)?.split();
        let clock = SyncClock::new();

        info!(
            "Mixer ready: {} Hz, {:?} interpolation, ramping {}",
            audio.frequency, audio.interpolation, audio.volume_ramping
        );

        let engine = Self {
            kernels,
            voices,
            buffer,
            stage,
            scheduler,
            pattern_tx,
            channel_tx,
            clock,
            latency_ns: latency_ns(audio.buffer_frames, audio.frequency),
            buffer_frames: audio.buffer_frames,
            channels: [ChannelInfo::default(); MAX_CHANNELS],
            num_channels: MAX_CHANNELS as u8,
            replayer: None,
            metrics: MixerMetrics::new(),
        };
        let receivers = SyncReceivers {
            pattern,
            channels,
            clock,
        };
        Ok((engine, receivers))
    }

    /// Install the replayer ticked from the audio callback.
    pub fn set_replayer(&mut self, replayer: impl Replayer + 'static) {
        self.replayer = Some(Box::new(replayer));
    }

    pub fn clear_replayer(&mut self) {
        self.replayer = None;
    }

    /// Command access outside of a tick (UI thread, under the lock).
    pub fn context(&mut self) -> TickContext<'_> {
        TickContext {
            voices: &mut self.voices,
            scheduler: &mut self.scheduler,
            channels: &mut self.channels,
            num_channels: &mut self.num_channels,
        }
    }

    pub fn trigger_voice(&mut self, channel: usize, trigger: VoiceTrigger) -> Result<()> {
        self.voices.trigger(channel, trigger)
    }

    pub fn set_voice_volume(
        &mut self,
        channel: usize,
        gain_l: f32,
        gain_r: f32,
        ramp_samples: u32,
    ) -> Result<()> {
        self.voices.set_volume(channel, gain_l, gain_r, ramp_samples)
    }

    pub fn stop_voice(&mut self, channel: usize) -> Result<()> {
        self.voices.stop(channel)
    }

    pub fn set_tempo(&mut self, bpm: u16) -> Result<()> {
        self.scheduler.set_bpm(bpm)
    }

    pub fn set_speed(&mut self, speed: u8) -> Result<()> {
        self.scheduler.set_speed(speed)
    }

    /// Stop or seek: silence every voice, return the scheduler to idle and
    /// have the UI drop queued snapshots.
    pub fn reset(&mut self) {
        self.voices.stop_all();
        self.scheduler.reset();
        self.channels = [ChannelInfo::default(); MAX_CHANNELS];
        self.pattern_tx.request_clear();
        self.channel_tx.request_clear();
        debug!("Mixer reset");
    }

    /// Switch output frequency: tick tables and ramp lengths are rebuilt
    /// and all voices stop.
    pub fn set_output_frequency(&mut self, frequency: u32) -> Result<()> {
        self.scheduler.set_frequency(frequency)?;
        self.voices.stop_all();
        self.voices.set_quick_ramp(quick_ramp_samples(frequency));
        self.latency_ns = latency_ns(self.buffer_frames, frequency);
        self.scheduler.request_resync();
        info!("Mixer output frequency set to {} Hz", frequency);
        Ok(())
    }

    /// Time between rendering a frame and hearing it, from the device buffer size.
    pub fn set_buffer_frames(&mut self, frames: u32) {
        self.buffer_frames = frames.max(1);
        self.latency_ns = latency_ns(self.buffer_frames, self.scheduler.frequency());
        self.scheduler.request_resync();
    }

    /// Follow the frames per callback the device really uses. A change
    /// updates the latency and restarts the timestamp timeline.
    pub fn track_device_buffer(&mut self, frames: usize) {
        let frames = frames.min(u32::MAX as usize) as u32;
        if frames != 0 && frames != self.buffer_frames {
            self.set_buffer_frames(frames);
        }
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.voices.set_interpolation(interpolation);
    }

    pub fn set_volume_ramping(&mut self, ramping: bool) {
        self.voices.set_ramping(ramping);
    }

    pub fn set_amplification(&mut self, amplification: u8) -> Result<()> {
        self.stage.set_amplification(amplification)
    }

    pub fn set_master_volume(&mut self, master_volume: u16) -> Result<()> {
        self.stage.set_master_volume(master_volume)
    }

    pub fn set_dither(&mut self, dither: bool) {
        self.stage.set_dither(dither);
    }

    pub fn output_frequency(&self) -> u32 {
        self.scheduler.frequency()
    }

    pub fn output_latency(&self) -> Duration {
        Duration::from_nanos(self.latency_ns)
    }

    /// Longest tick in frames; a buffer this size always fits [`render_tick`](Self::render_tick)
    pub fn max_tick_frames(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn voices(&self) -> &VoiceBank {
        &self.voices
    }

    pub fn scheduler(&self) -> &TickScheduler {
        &self.scheduler
    }

    pub fn output_stage(&self) -> &OutputStage {
        &self.stage
    }

    pub fn metrics(&self) -> &MixerMetrics {
        &self.metrics
    }

    pub fn clock(&self) -> SyncClock {
        self.clock
    }
}

fn latency_ns(buffer_frames: u32, frequency: u32) -> u64 {
    buffer_frames as u64 * 1_000_000_000 / frequency as u64
}
