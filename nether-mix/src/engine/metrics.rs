//! Audio callback health monitoring

use std::time::{Duration, Instant};

use tracing::debug;

/// Counters updated by the audio callback and reported once per second.
#[derive(Debug, Clone)]
pub struct MixerMetrics {
    /// Callbacks this interval
    pub callbacks: u64,
    /// Frames written this interval
    pub frames_rendered: u64,
    /// Replayer ticks this interval
    pub ticks: u64,
    /// Callbacks this interval that produced silence (idle or paused)
    pub silent_callbacks: u64,
    /// Slowest callback this interval
    pub slowest_callback: Duration,
    /// Pattern snapshots rejected by a full queue (lifetime)
    pub pattern_snapshots_dropped: u64,
    /// Channel snapshots rejected by a full queue (lifetime)
    pub channel_snapshots_dropped: u64,
    last_log_time: Instant,
}

impl MixerMetrics {
    pub fn new() -> Self {
        Self {
            callbacks: 0,
            frames_rendered: 0,
            ticks: 0,
            silent_callbacks: 0,
            slowest_callback: Duration::ZERO,
            pattern_snapshots_dropped: 0,
            channel_snapshots_dropped: 0,
            last_log_time: Instant::now(),
        }
    }

    pub(crate) fn record_callback(&mut self, frames: usize, elapsed: Duration, silent: bool) {
        self.callbacks += 1;
        self.frames_rendered += frames as u64;
        if silent {
            self.silent_callbacks += 1;
        }
        self.slowest_callback = self.slowest_callback.max(elapsed);
    }

    /// Log metrics if enough time has passed (every 1 second)
    pub fn maybe_log(&mut self) {
        if self.last_log_time.elapsed().as_secs() < 1 {
            return;
        }
        debug!(
            "MIXER METRICS: callbacks={} (silent={}), frames={}, ticks={}, slowest={}us, \
             dropped pattern={} channel={}",
            self.callbacks,
            self.silent_callbacks,
            self.frames_rendered,
            self.ticks,
            self.slowest_callback.as_micros(),
            self.pattern_snapshots_dropped,
            self.channel_snapshots_dropped,
        );

        // Reset counters for next interval (show per-second rates)
        self.callbacks = 0;
        self.frames_rendered = 0;
        self.ticks = 0;
        self.silent_callbacks = 0;
        self.slowest_callback = Duration::ZERO;
        self.last_log_time = Instant::now();
    }
}

impl Default for MixerMetrics {
    fn default() -> Self {
        Self::new()
    }
}
