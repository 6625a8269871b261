//! Built-in demo song
//!
//! Three synthesized instruments (a ping-pong triangle bass, a forward-looped
//! square lead and a one-shot noise burst for drums) arranged in 16-row
//! patterns. Every tick goes through [`TickContext`], the same way a module
//! replayer would drive the mixer.

use std::sync::Arc;

use nether_mix::{
    ChannelInfo, DEFAULT_SPEED, LoopMode, PatternState, Replayer, Result, Sample, TickContext,
    VoiceTrigger, pan_gains,
};

/// Playback rate of every demo sample at note C-4
const BASE_RATE: f64 = 16_000.0;
/// Note number of C-4 (1 = C-0)
const BASE_NOTE: u8 = 49;

const ROWS: u16 = 16;
const CHANNELS: u8 = 4;
/// Pattern play order
const ORDER: [u16; 4] = [0, 1, 0, 2];
/// Chord root of each pattern, in semitones
const ROOTS: [u8; 3] = [0, 5, 7];
/// Lead arpeggio steps
const ARPEGGIO: [u8; 4] = [0, 4, 7, 12];

const BASS: usize = 0;
const LEAD: usize = 1;
const DRUM: usize = 2;
const HAT: usize = 3;

/// Source frames per output sample for `note`.
pub fn note_ratio(note: u8, output_frequency: u32) -> f64 {
    BASE_RATE * 2f64.powf((note as f64 - BASE_NOTE as f64) / 12.0) / output_frequency as f64
}

/// Tracker-style note name ("C-4", "F#3")
pub fn note_name(note: u8) -> String {
    const NAMES: [&str; 12] = [
        "C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-",
    ];
    if note == 0 {
        return "...".to_string();
    }
    let index = (note - 1) as usize;
    format!("{}{}", NAMES[index % 12], index / 12)
}

/// Demo instruments
struct Instruments {
    bass: Arc<Sample>,
    lead: Arc<Sample>,
    noise: Arc<Sample>,
}

impl Instruments {
    fn new() -> Result<Self> {
        // Rising ramp; the ping-pong loop turns it into a triangle
        let ramp: Vec<i16> = (0..64).map(|i| (i * 600 - 19_000) as i16).collect();
        let bass = Sample::from_pcm16(1, &ramp, LoopMode::PingPong, 0, 64)?;

        let square: Vec<i8> = (0..64).map(|i| if i % 32 < 16 { 90 } else { -90 }).collect();
        let lead = Sample::from_pcm8(2, &square, LoopMode::Forward, 0, 64)?;

        let mut seed: u32 = 0x1234_5678;
        let noise: Vec<i8> = (0..4000)
            .map(|i| {
                seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                let decay = 1.0 - i as f32 / 4000.0;
                ((seed >> 24) as i8 as f32 * decay * decay) as i8
            })
            .collect();
        let noise = Sample::from_pcm8(3, &noise, LoopMode::None, 0, 0)?;

        Ok(Self {
            bass: Arc::new(bass),
            lead: Arc::new(lead),
            noise: Arc::new(noise),
        })
    }
}

/// The demo song as a [`Replayer`].
pub struct DemoSong {
    instruments: Instruments,
    song_position: u16,
    row: u16,
    tick: u8,
    started: bool,
    /// Commands the mixer rejected
    errors: u32,
}

impl DemoSong {
    pub fn new() -> Result<Self> {
        Ok(Self {
            instruments: Instruments::new()?,
            song_position: 0,
            row: 0,
            tick: 0,
            started: false,
            errors: 0,
        })
    }

    pub fn errors(&self) -> u32 {
        self.errors
    }

    fn check(&mut self, result: Result<()>) {
        if result.is_err() {
            self.errors += 1;
        }
    }

    fn pattern(&self) -> u16 {
        ORDER[self.song_position as usize % ORDER.len()]
    }

    fn root(&self) -> u8 {
        ROOTS[self.pattern() as usize % ROOTS.len()]
    }

    /// Start a note and record it for the channel display.
    fn play(
        &mut self,
        ctx: &mut TickContext<'_>,
        channel: usize,
        sample: Arc<Sample>,
        note: u8,
        volume: u8,
        pan: u8,
    ) {
        let instrument = sample.id() as u8;
        let (gain_l, gain_r) = pan_gains(volume as f32 / 64.0, pan);
        let trigger = VoiceTrigger {
            sample,
            start: 0,
            frequency_ratio: note_ratio(note, ctx.output_frequency()),
            gain_l,
            gain_r,
        };
        let result = ctx.trigger_voice(channel, trigger);
        self.check(result);
        let info = ChannelInfo {
            note,
            instrument,
            volume,
            pan,
        };
        let result = ctx.set_channel_info(channel, info);
        self.check(result);
    }

    fn play_row(&mut self, ctx: &mut TickContext<'_>) {
        let row = self.row;
        let root = self.root();

        if row % 8 == 0 {
            let bass = Arc::clone(&self.instruments.bass);
            self.play(ctx, BASS, bass, BASE_NOTE - 12 + root, 48, 128);
        }
        if row % 2 == 0 {
            let step = ARPEGGIO[(row as usize / 2) % ARPEGGIO.len()];
            let lead = Arc::clone(&self.instruments.lead);
            self.play(ctx, LEAD, lead, BASE_NOTE + root + step, 40, 96);
        }
        if row % 4 == 0 {
            // Kick on the beat, snare on the backbeat
            let note = if row % 8 == 0 { BASE_NOTE - 24 } else { BASE_NOTE - 5 };
            let noise = Arc::clone(&self.instruments.noise);
            self.play(ctx, DRUM, noise, note, 64, 128);
        }
        if row % 2 == 1 {
            let noise = Arc::clone(&self.instruments.noise);
            self.play(ctx, HAT, noise, BASE_NOTE + 24, 24, 200);
        }
    }

    fn play_effects(&mut self, ctx: &mut TickContext<'_>) {
        let ramp = ctx.quick_ramp().max(1) * 4;
        match self.tick {
            // Lead decays after its attack
            2 => {
                let (gain_l, gain_r) = pan_gains(20.0 / 64.0, 96);
                let result = ctx.set_voice_volume(LEAD, gain_l, gain_r, ramp);
                self.check(result);
            }
            // Hats are cut short
            1 if self.row % 2 == 1 => {
                let result = ctx.stop_voice(HAT);
                self.check(result);
            }
            _ => {}
        }
    }

    fn advance(&mut self, speed: u8) {
        self.tick += 1;
        if self.tick < speed {
            return;
        }
        self.tick = 0;
        self.row += 1;
        if self.row == ROWS {
            self.row = 0;
            self.song_position = (self.song_position + 1) % ORDER.len() as u16;
        }
    }
}

impl Replayer for DemoSong {
    fn tick(&mut self, ctx: &mut TickContext<'_>) -> Option<PatternState> {
        if !self.started {
            ctx.set_num_channels(CHANNELS);
            let result = ctx.set_speed(DEFAULT_SPEED);
            self.check(result);
            self.started = true;
        }

        if self.tick == 0 {
            self.play_row(ctx);
        } else {
            self.play_effects(ctx);
        }

        let state = PatternState {
            pattern: self.pattern(),
            global_volume: 64,
            song_position: self.song_position,
            tick: self.tick,
            speed: ctx.speed(),
            row: self.row,
            bpm: ctx.bpm().unwrap_or(0),
        };
        self.advance(ctx.speed());
        Some(state)
    }
}
