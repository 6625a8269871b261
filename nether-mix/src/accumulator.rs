//! Tick accumulation buffer and output conversion
//!
//! Voices are summed into a pair of `f32` buffers sized for the longest
//! possible tick. A float accumulator cannot wrap: every active slot at full
//! gain sums to well inside `f32` range, and clipping happens once in
//! [`MixBuffer::finalize`].

use crate::error::{MixerError, Result, try_alloc};
use crate::kernels::Kernels;
use crate::voice::{Voice, VoiceBank};

/// Device buffer to write into, interleaved.
pub enum OutputBuffer<'a> {
    I16(&'a mut [i16]),
    F32(&'a mut [f32]),
}

impl OutputBuffer<'_> {
    /// Samples (not frames) in the buffer
    pub fn len(&self) -> usize {
        match self {
            OutputBuffer::I16(buf) => buf.len(),
            OutputBuffer::F32(buf) => buf.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero `frames` frames starting at frame `offset`.
    pub fn fill_silence(&mut self, offset: usize, frames: usize, channels: usize) {
        let range = offset * channels..(offset + frames) * channels;
        match self {
            OutputBuffer::I16(buf) => buf[range].fill(0),
            OutputBuffer::F32(buf) => buf[range].fill(0.0),
        }
    }
}

/// Master volume, amplification and dither applied on the way out.
#[derive(Debug, Clone)]
pub struct OutputStage {
    amplification: u8,
    master_volume: u16,
    gain: f32,
    dither: bool,
    seed: u32,
    last_noise: [i32; 2],
}

/// Initial dither generator state
const DITHER_SEED: u32 = 0x1234_5000;

impl OutputStage {
    /// `amplification` 1..=32, `master_volume` 0..=256.
    pub fn new(amplification: u8, master_volume: u16, dither: bool) -> Result<Self> {
        let mut stage = Self {
            amplification: 1,
            master_volume: 0,
            gain: 0.0,
            dither,
            seed: DITHER_SEED,
            last_noise: [0; 2],
        };
        stage.set_amplification(amplification)?;
        stage.set_master_volume(master_volume)?;
        Ok(stage)
    }

    pub fn set_amplification(&mut self, amplification: u8) -> Result<()> {
        if !(1..=32).contains(&amplification) {
            return Err(MixerError::AmplificationOutOfRange(amplification));
        }
        self.amplification = amplification;
        self.update_gain();
        Ok(())
    }

    pub fn set_master_volume(&mut self, master_volume: u16) -> Result<()> {
        if master_volume > 256 {
            return Err(MixerError::MasterVolumeOutOfRange(master_volume));
        }
        self.master_volume = master_volume;
        self.update_gain();
        Ok(())
    }

    pub fn set_dither(&mut self, dither: bool) {
        self.dither = dither;
    }

    fn update_gain(&mut self) {
        self.gain = (self.master_volume as f32 / 256.0) * (self.amplification as f32 / 32.0);
    }

    /// Linear gain applied to the accumulated mix
    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn amplification(&self) -> u8 {
        self.amplification
    }

    pub fn master_volume(&self) -> u16 {
        self.master_volume
    }

    pub fn dither(&self) -> bool {
        self.dither
    }

    /// Triangular noise within one LSB, from successive LCG outputs.
    #[inline]
    fn noise(&mut self, channel: usize) -> f32 {
        self.seed = self.seed.wrapping_mul(134_775_813).wrapping_add(1);
        let current = self.seed as i32;
        let previous = std::mem::replace(&mut self.last_noise[channel], current);
        (current as f64 - previous as f64) as f32 * (1.0 / 4_294_967_296.0)
    }

    #[inline]
    fn to_i16(&mut self, sample: f32, channel: usize) -> i16 {
        let mut scaled = sample * self.gain * 32768.0;
        if self.dither {
            scaled += self.noise(channel);
        }
        scaled.round().clamp(-32768.0, 32767.0) as i16
    }

    #[inline]
    fn to_f32(&self, sample: f32) -> f32 {
        (sample * self.gain).clamp(-1.0, 1.0)
    }
}

/// One tick's worth of stereo accumulation.
pub struct MixBuffer {
    left: Vec<f32>,
    right: Vec<f32>,
    len: usize,
}

impl MixBuffer {
    /// Allocate room for `capacity` frames.
    pub fn new(capacity: usize) -> Result<Self> {
        Ok(Self {
            left: try_alloc("mix buffer", capacity, 0.0)?,
            right: try_alloc("mix buffer", capacity, 0.0)?,
            len: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.left.len()
    }

    /// Frames covered by the current mix
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Zero the first `frames` frames (clamped to capacity) and make them current.
    pub fn reset(&mut self, frames: usize) {
        self.len = frames.min(self.capacity());
        self.left[..self.len].fill(0.0);
        self.right[..self.len].fill(0.0);
    }

    /// Add one voice over the current frames.
    pub fn mix_voice(&mut self, voice: &mut Voice, kernels: &Kernels) {
        voice.mix(kernels, &mut self.left[..self.len], &mut self.right[..self.len]);
    }

    /// Add every active voice of `bank`.
    pub fn mix_bank(&mut self, bank: &mut VoiceBank, kernels: &Kernels) {
        bank.mix_into(kernels, &mut self.left[..self.len], &mut self.right[..self.len]);
    }

    pub fn left(&self) -> &[f32] {
        &self.left[..self.len]
    }

    pub fn right(&self) -> &[f32] {
        &self.right[..self.len]
    }

    /// Convert the current frames into `out`, starting at frame `offset`.
    ///
    /// Stereo goes to the first two channels; further channels are silent and
    /// a mono device gets the average of both sides.
    pub fn finalize(
        &self,
        out: &mut OutputBuffer<'_>,
        offset: usize,
        channels: usize,
        stage: &mut OutputStage,
    ) {
        let frames = self.len;
        if channels == 0 || frames == 0 {
            return;
        }
        let range = offset * channels..(offset + frames) * channels;
        let pairs = self.left[..frames].iter().zip(&self.right[..frames]);

        match out {
            OutputBuffer::I16(buf) => {
                for (frame, (&l, &r)) in buf[range].chunks_exact_mut(channels).zip(pairs) {
                    if channels == 1 {
                        frame[0] = stage.to_i16((l + r) * 0.5, 0);
                        continue;
                    }
                    frame[0] = stage.to_i16(l, 0);
                    frame[1] = stage.to_i16(r, 1);
                    frame[2..].fill(0);
                }
            }
            OutputBuffer::F32(buf) => {
                for (frame, (&l, &r)) in buf[range].chunks_exact_mut(channels).zip(pairs) {
                    if channels == 1 {
                        frame[0] = stage.to_f32((l + r) * 0.5);
                        continue;
                    }
                    frame[0] = stage.to_f32(l);
                    frame[1] = stage.to_f32(r);
                    frame[2..].fill(0.0);
                }
            }
        }
    }
}
