//! Device callback: ticks, mixing and output conversion

use std::time::Instant;

use tracing::trace;

use super::{MixerEngine, TickContext};
use crate::accumulator::OutputBuffer;
use crate::sync::{ChannelSnapshot, ChannelSyncState, PatternSnapshot};

impl MixerEngine {
    /// Fill an interleaved device buffer of `channels` channels.
    ///
    /// Ticks the replayer at every tick boundary inside the buffer and mixes
    /// the voices in between. While the scheduler is idle or paused the
    /// buffer is silence and no voice moves.
    pub fn audio_callback(&mut self, mut out: OutputBuffer<'_>, channels: usize) {
        if channels == 0 {
            return;
        }
        let started = Instant::now();
        let frames = out.len() / channels;

        let mut offset = 0;
        while offset < frames {
            if !self.scheduler.is_running() {
                out.fill_silence(offset, frames - offset, channels);
                break;
            }
            offset += self.render_chunk(&mut out, offset, frames - offset, channels);
        }

        self.metrics.record_callback(frames, started.elapsed(), offset == 0);
        self.metrics.maybe_log();
    }

    /// Render the rest of the current tick, starting a new tick if one is
    /// due, and return the frames written.
    ///
    /// Returns 0 while idle or paused. Frames that do not fit in `out` stay
    /// pending for the next call.
    pub fn render_tick(&mut self, mut out: OutputBuffer<'_>, channels: usize) -> usize {
        if channels == 0 || !self.scheduler.is_running() {
            return 0;
        }
        let frames = out.len() / channels;
        let mut written = 0;
        let mut ticked = self.scheduler.samples_until_next_tick() > 0;
        while written < frames && self.scheduler.is_running() {
            if self.scheduler.samples_until_next_tick() == 0 {
                if ticked {
                    break;
                }
                ticked = true;
            }
            written += self.render_chunk(&mut out, written, frames - written, channels);
        }
        written
    }

    /// Tick if due, then mix up to `max_frames` frames of the current tick.
    fn render_chunk(
        &mut self,
        out: &mut OutputBuffer<'_>,
        offset: usize,
        max_frames: usize,
        channels: usize,
    ) -> usize {
        if self.scheduler.samples_until_next_tick() == 0 {
            self.run_tick();
            if !self.scheduler.is_running() {
                // Paused from inside the tick
                return 0;
            }
        }

        let frames = max_frames.min(self.scheduler.samples_until_next_tick() as usize);
        self.buffer.reset(frames);
        self.buffer.mix_bank(&mut self.voices, &self.kernels);
        self.buffer.finalize(out, offset, channels, &mut self.stage);
        self.scheduler.consume(frames as u32);
        frames
    }

    /// Run the replayer for one tick, publish snapshots and start the tick.
    fn run_tick(&mut self) {
        let pattern = match self.replayer.as_mut() {
            Some(replayer) => replayer.tick(&mut TickContext {
                voices: &mut self.voices,
                scheduler: &mut self.scheduler,
                channels: &mut self.channels,
                num_channels: &mut self.num_channels,
            }),
            None => None,
        };
        if !self.scheduler.is_running() {
            return;
        }

        let timestamp = self.scheduler.tick_timestamp(self.clock.now_ns(), self.latency_ns);
        if let Some(state) = pattern {
            if !self.pattern_tx.push(PatternSnapshot { state, timestamp }) {
                self.metrics.pattern_snapshots_dropped += 1;
                trace!("Pattern snapshot dropped at {}", timestamp);
            }
        }

        let snapshot = self.channel_snapshot(timestamp);
        if !self.channel_tx.push(snapshot) {
            self.metrics.channel_snapshots_dropped += 1;
            trace!("Channel snapshot dropped at {}", timestamp);
        }

        self.scheduler.begin_tick();
        self.metrics.ticks += 1;
    }

    fn channel_snapshot(&mut self, timestamp: u64) -> ChannelSnapshot {
        let triggered = self.voices.take_triggered();
        let mut snapshot = ChannelSnapshot {
            num_channels: self.num_channels,
            timestamp,
            ..Default::default()
        };
        for (index, (entry, info)) in snapshot.channels.iter_mut().zip(&self.channels).enumerate() {
            let Some(voice) = self.voices.channel(index) else {
                continue;
            };
            *entry = ChannelSyncState {
                active: voice.is_active(),
                triggered: (triggered & (1 << index)) != 0,
                sample_id: voice.sample().map_or(0, |s| s.id()),
                note: info.note,
                instrument: info.instrument,
                volume: info.volume,
                pan: info.pan,
                delta: voice.delta(),
                position: voice.position(),
            };
        }
        snapshot
    }
}
