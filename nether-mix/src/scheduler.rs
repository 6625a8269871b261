//! BPM-driven tick scheduler
//!
//! Tracker timing: one tick lasts `frequency * 2.5 / bpm` samples. That is
//! rarely a whole number, so every BPM gets an integer part plus a 32-bit
//! fraction, and the fraction is carried from tick to tick. Summed over any
//! number of ticks the error stays below one sample.
//!
//! The same carry runs on a nanosecond timeline so sync snapshots get
//! timestamps that advance by exactly one tick duration.

use crate::error::{MixerError, Result};
use crate::{
    DEFAULT_SPEED, MAX_AUDIO_FREQ, MAX_BPM, MAX_SPEED, MIN_AUDIO_FREQ, MIN_BPM, MIXER_FRAC_BITS,
    MIXER_FRAC_MASK,
};

const BPM_COUNT: usize = (MAX_BPM - MIN_BPM + 1) as usize;

/// Nanoseconds of 2.5 seconds (one tick at 1 BPM)
const TICK_NS_AT_ONE_BPM: u64 = 2_500_000_000;

/// A duration as whole units plus a 32-bit fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickLength {
    pub whole: u64,
    pub frac: u64,
}

impl TickLength {
    /// `numerator / denominator` in 32.32, truncated.
    fn ratio(numerator: u64, denominator: u64) -> Self {
        let fixed = ((numerator as u128) << MIXER_FRAC_BITS) / denominator as u128;
        Self {
            whole: (fixed >> MIXER_FRAC_BITS) as u64,
            frac: fixed as u64 & MIXER_FRAC_MASK,
        }
    }

    /// Add to a fraction accumulator, returning the whole units to emit.
    #[inline]
    fn carry(self, acc: &mut u64) -> u64 {
        *acc += self.frac;
        let whole = self.whole + (*acc >> MIXER_FRAC_BITS);
        *acc &= MIXER_FRAC_MASK;
        whole
    }
}

/// Samples per tick at `bpm` for an output frequency (no range checks).
pub fn samples_per_tick(bpm: u16, frequency: u32) -> TickLength {
    TickLength::ratio(frequency as u64 * 5, bpm as u64 * 2)
}

/// Scheduler state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TempoState {
    /// No tempo set since creation or the last reset
    #[default]
    Idle,
    Running { bpm: u16 },
    /// Tempo 0: output is silent and no ticks fire
    Paused,
}

/// Nanosecond timeline for tick timestamps.
#[derive(Debug, Clone, Copy, Default)]
struct Timeline {
    next_ns: u64,
    acc: u64,
    resync: bool,
}

pub struct TickScheduler {
    frequency: u32,
    samples: [TickLength; BPM_COUNT],
    nanos: [TickLength; BPM_COUNT],
    state: TempoState,
    speed: u8,
    /// Samples left before the next tick fires
    remaining: u32,
    /// Length of the tick in progress
    tick_len: u32,
    sample_acc: u64,
    ticks: u64,
    timeline: Timeline,
}

impl TickScheduler {
    pub fn new(frequency: u32) -> Result<Self> {
        let mut nanos = [TickLength::default(); BPM_COUNT];
        for (i, entry) in nanos.iter_mut().enumerate() {
            *entry = TickLength::ratio(TICK_NS_AT_ONE_BPM, MIN_BPM as u64 + i as u64);
        }
        let mut scheduler = Self {
            frequency: 0,
            samples: [TickLength::default(); BPM_COUNT],
            nanos,
            state: TempoState::Idle,
            speed: DEFAULT_SPEED,
            remaining: 0,
            tick_len: 0,
            sample_acc: 0,
            ticks: 0,
            timeline: Timeline {
                resync: true,
                ..Default::default()
            },
        };
        scheduler.set_frequency(frequency)?;
        Ok(scheduler)
    }

    /// Rebuild the samples-per-tick table. The tick in progress keeps its length.
    pub fn set_frequency(&mut self, frequency: u32) -> Result<()> {
        if !(MIN_AUDIO_FREQ..=MAX_AUDIO_FREQ).contains(&frequency) {
            return Err(MixerError::FrequencyOutOfRange(frequency));
        }
        self.frequency = frequency;
        for (i, entry) in self.samples.iter_mut().enumerate() {
            *entry = samples_per_tick(MIN_BPM + i as u16, frequency);
        }
        self.sample_acc = 0;
        Ok(())
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    /// Set the tempo. `0` pauses; otherwise `MIN_BPM..=MAX_BPM`.
    ///
    /// A change takes effect at the next tick boundary. Starting from idle
    /// or resuming from a pause restarts the timestamp timeline.
    pub fn set_bpm(&mut self, bpm: u16) -> Result<()> {
        let state = match bpm {
            0 => TempoState::Paused,
            MIN_BPM..=MAX_BPM => TempoState::Running { bpm },
            _ => return Err(MixerError::BpmOutOfRange(bpm)),
        };
        if !self.is_running() && matches!(state, TempoState::Running { .. }) {
            self.timeline.resync = true;
        }
        self.state = state;
        Ok(())
    }

    pub fn state(&self) -> TempoState {
        self.state
    }

    /// Current tempo while running
    pub fn bpm(&self) -> Option<u16> {
        match self.state {
            TempoState::Running { bpm } => Some(bpm),
            _ => None,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, TempoState::Running { .. })
    }

    /// Ticks per row, `1..=MAX_SPEED`.
    pub fn set_speed(&mut self, speed: u8) -> Result<()> {
        if !(1..=MAX_SPEED).contains(&speed) {
            return Err(MixerError::SpeedOutOfRange(speed));
        }
        self.speed = speed;
        Ok(())
    }

    pub fn speed(&self) -> u8 {
        self.speed
    }

    /// Exact length of one tick at the current tempo
    pub fn tick_length(&self) -> Option<TickLength> {
        self.bpm().map(|bpm| self.samples[(bpm - MIN_BPM) as usize])
    }

    /// Whole samples per row at the current tempo and speed
    pub fn samples_per_row(&self) -> Option<u64> {
        self.tick_length().map(|len| {
            let fixed = ((len.whole << MIXER_FRAC_BITS) | len.frac) * self.speed as u64;
            fixed >> MIXER_FRAC_BITS
        })
    }

    /// Samples left in the current tick; `0` means a tick is due.
    pub fn samples_until_next_tick(&self) -> u32 {
        self.remaining
    }

    /// Start the next tick and return its length in samples.
    ///
    /// The fractional part of the tick length is carried into the
    /// accumulator, so the returned lengths never drift. Returns `0` when
    /// not running.
    pub fn begin_tick(&mut self) -> u32 {
        let Some(len) = self.tick_length() else {
            return 0;
        };
        let samples = len.carry(&mut self.sample_acc) as u32;
        self.remaining = samples;
        self.tick_len = samples;
        self.ticks += 1;
        samples
    }

    /// Account for `samples` rendered in the current tick.
    pub fn consume(&mut self, samples: u32) {
        self.remaining = self.remaining.saturating_sub(samples);
    }

    /// Length of the tick in progress
    pub fn current_tick_len(&self) -> u32 {
        self.tick_len
    }

    /// Ticks started since the last reset
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Timestamp for the tick about to start, advancing the timeline.
    ///
    /// After a resync the timeline restarts at `now_ns + latency_ns`.
    pub fn tick_timestamp(&mut self, now_ns: u64, latency_ns: u64) -> u64 {
        let timeline = &mut self.timeline;
        if timeline.resync {
            timeline.next_ns = now_ns + latency_ns;
            timeline.acc = 0;
            timeline.resync = false;
        }
        let stamp = timeline.next_ns;
        if let TempoState::Running { bpm } = self.state {
            let step = self.nanos[(bpm - MIN_BPM) as usize];
            timeline.next_ns += step.carry(&mut timeline.acc);
        }
        stamp
    }

    /// Restart the timestamp timeline at the next tick.
    pub fn request_resync(&mut self) {
        self.timeline.resync = true;
    }

    /// Back to `Idle`: counters cleared, speed restored, timeline resynced.
    pub fn reset(&mut self) {
        self.state = TempoState::Idle;
        self.speed = DEFAULT_SPEED;
        self.remaining = 0;
        self.tick_len = 0;
        self.sample_acc = 0;
        self.ticks = 0;
        self.timeline.resync = true;
    }
}

impl std::fmt::Debug for TickScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickScheduler")
            .field("frequency", &self.frequency)
            .field("state", &self.state)
            .field("speed", &self.speed)
            .field("remaining", &self.remaining)
            .field("ticks", &self.ticks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running(frequency: u32, bpm: u16) -> TickScheduler {
        let mut scheduler = TickScheduler::new(frequency).unwrap();
        scheduler.set_bpm(bpm).unwrap();
        scheduler
    }

    #[test]
    fn test_samples_per_tick() {
        // 44100 * 2.5 / 125 = 882 exactly
        assert_eq!(samples_per_tick(125, 44100), TickLength { whole: 882, frac: 0 });
        assert_eq!(samples_per_tick(125, 48000).whole, 960);

        // 48000 * 2.5 / 32 = 3750
        assert_eq!(samples_per_tick(32, 48000).whole, 3750);

        // 44100 * 2.5 / 130 = 848.0769...
        let len = samples_per_tick(130, 44100);
        assert_eq!(len.whole, 848);
        let frac = len.frac as f64 / (1u64 << 32) as f64;
        assert!((frac - 0.076_923).abs() < 1e-5);
    }

    #[test]
    fn test_no_drift_over_many_ticks() {
        for frequency in [44_100, 48_000, 96_000] {
            for bpm in [32, 99, 125, 130, 177, 255] {
                let mut scheduler = running(frequency, bpm);
                let total: u64 = (0..10_000).map(|_| scheduler.begin_tick() as u64).sum();
                let exact = (10_000.0 * frequency as f64 * 2.5 / bpm as f64).round() as i64;
                assert!(
                    (total as i64 - exact).abs() <= 1,
                    "{} Hz, {} BPM: {} vs {}",
                    frequency,
                    bpm,
                    total,
                    exact
                );
            }
        }
    }

    #[test]
    fn test_one_second_at_125_bpm() {
        let mut scheduler = running(48_000, 125);
        let mut rendered = 0u32;
        let mut ticks = 0;
        while rendered < 48_000 {
            assert_eq!(scheduler.samples_until_next_tick(), 0);
            let len = scheduler.begin_tick();
            // Render in uneven chunks the way device callbacks would
            while scheduler.samples_until_next_tick() > 0 {
                let chunk = scheduler.samples_until_next_tick().min(333);
                scheduler.consume(chunk);
                rendered += chunk;
            }
            assert_eq!(len, 960);
            ticks += 1;
        }
        assert_eq!(ticks, 50);
        assert_eq!(rendered, 48_000 * ticks / 50);
        assert_eq!(scheduler.ticks(), 50);
    }

    #[test]
    fn test_fractional_lengths_alternate() {
        // 44100 * 2.5 / 150 = 735, 44100 * 2.5 / 100 = 1102.5
        let mut scheduler = running(44_100, 100);
        let lengths: Vec<u32> = (0..4).map(|_| scheduler.begin_tick()).collect();
        assert_eq!(lengths, vec![1102, 1103, 1102, 1103]);
    }

    #[test]
    fn test_zero_bpm_pauses() {
        let mut scheduler = running(48_000, 125);
        scheduler.begin_tick();
        scheduler.consume(100);

        scheduler.set_bpm(0).unwrap();
        assert_eq!(scheduler.state(), TempoState::Paused);
        assert_eq!(scheduler.bpm(), None);
        assert_eq!(scheduler.tick_length(), None);
        assert_eq!(scheduler.begin_tick(), 0);

        scheduler.set_bpm(125).unwrap();
        assert_eq!(scheduler.samples_until_next_tick(), 860);
    }

    #[test]
    fn test_invalid_bpm_rejected() {
        let mut scheduler = running(48_000, 125);
        for bpm in [1, 31, 256, 1000] {
            assert!(matches!(
                scheduler.set_bpm(bpm),
                Err(MixerError::BpmOutOfRange(b)) if b == bpm
            ));
        }
        assert_eq!(scheduler.bpm(), Some(125));
        assert!(scheduler.set_bpm(MIN_BPM).is_ok());
        assert!(scheduler.set_bpm(MAX_BPM).is_ok());
    }

    #[test]
    fn test_idle_until_tempo_set() {
        let mut scheduler = TickScheduler::new(48_000).unwrap();
        assert_eq!(scheduler.state(), TempoState::Idle);
        assert_eq!(scheduler.begin_tick(), 0);
        assert!(!scheduler.is_running());
    }

    #[test]
    fn test_speed() {
        let mut scheduler = running(48_000, 125);
        assert_eq!(scheduler.speed(), DEFAULT_SPEED);
        assert_eq!(scheduler.samples_per_row(), Some(960 * 6));

        scheduler.set_speed(3).unwrap();
        assert_eq!(scheduler.samples_per_row(), Some(960 * 3));
        assert!(matches!(scheduler.set_speed(0), Err(MixerError::SpeedOutOfRange(0))));
        assert!(scheduler.set_speed(32).is_err());
        assert!(scheduler.set_speed(MAX_SPEED).is_ok());
    }

    #[test]
    fn test_frequency_range() {
        assert!(matches!(
            TickScheduler::new(22_050),
            Err(MixerError::FrequencyOutOfRange(22_050))
        ));
        let mut scheduler = running(44_100, 125);
        scheduler.set_frequency(96_000).unwrap();
        assert_eq!(scheduler.begin_tick(), 1920);
        assert!(scheduler.set_frequency(192_000).is_err());
        assert_eq!(scheduler.frequency(), 96_000);
    }

    #[test]
    fn test_timestamps_advance_by_tick_duration() {
        let mut scheduler = running(48_000, 125);
        let first = scheduler.tick_timestamp(1_000, 50_000_000);
        assert_eq!(first, 50_001_000);

        // 2.5 / 125 s = 20 ms per tick; `now` is ignored until a resync
        let second = scheduler.tick_timestamp(999_999_999, 50_000_000);
        assert_eq!(second - first, 20_000_000);

        scheduler.request_resync();
        assert_eq!(scheduler.tick_timestamp(5_000, 0), 5_000);
    }

    #[test]
    fn test_timestamps_carry_fraction() {
        // 2.5e9 / 99 = 25252525.25... ns
        let mut scheduler = running(48_000, 99);
        let start = scheduler.tick_timestamp(0, 0);
        let mut last = start;
        for _ in 0..10_000 {
            last = scheduler.tick_timestamp(0, 0);
        }
        let exact = 10_000.0 * 2.5e9 / 99.0;
        assert!(((last - start) as f64 - exact).abs() <= 1.0);
    }

    #[test]
    fn test_resume_restarts_timeline() {
        let mut scheduler = running(48_000, 125);
        assert_eq!(scheduler.tick_timestamp(1_000, 0), 1_000);
        assert_eq!(scheduler.tick_timestamp(2_000, 0), 20_001_000);

        scheduler.set_bpm(0).unwrap();
        scheduler.set_bpm(125).unwrap();
        assert_eq!(scheduler.tick_timestamp(900_000_000, 10), 900_000_010);

        // Tempo changes while running keep the timeline
        scheduler.set_bpm(250).unwrap();
        assert_eq!(scheduler.tick_timestamp(999_999_999_999, 0), 920_000_010);
    }

    #[test]
    fn test_reset() {
        let mut scheduler = running(48_000, 125);
        scheduler.set_speed(3).unwrap();
        scheduler.begin_tick();
        scheduler.tick_timestamp(0, 0);

        scheduler.reset();
        assert_eq!(scheduler.state(), TempoState::Idle);
        assert_eq!(scheduler.samples_until_next_tick(), 0);
        assert_eq!(scheduler.ticks(), 0);
        assert_eq!(scheduler.speed(), DEFAULT_SPEED);
        assert_eq!(scheduler.tick_timestamp(777, 0), 777);
    }
}
