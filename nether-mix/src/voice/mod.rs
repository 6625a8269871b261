//! Voices: per-channel resampling state
//!
//! A [`Voice`] is a fixed slot in the [`VoiceBank`] arena. Triggering a note
//! resets its position and selects a [`MixRoutine`]; the routine is resolved
//! once into a monomorphized mixing function so the per-sample loop never
//! branches on bit depth, loop mode, interpolation, ramping or panning.
//!
//! # Position model
//!
//! Positions are an integer frame index plus a 32-bit fraction. Ping-pong
//! voices keep an "unfolded" forward position and a direction flag; the
//! read cursor mirrors it while playing backwards. After every call an
//! active voice satisfies `0 <= position < sample_end`, and once it has
//! looped, `loop_start <= position`.

mod bank;
mod dispatch;
mod render;
mod silence;


use std::sync::Arc;

pub use bank::{VoiceBank, VoiceTrigger, delta_from_ratio, pan_gains};
pub use dispatch::{Interpolation, MixRoutine};

use crate::kernels::Kernels;
use crate::sample::{LoopMode, Sample};

/// A resolved mixing routine
pub(crate) type MixFn = fn(&mut Voice, &Kernels, &mut [f32], &mut [f32]);

/// Mutable playback state of one voice.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct VoiceState {
    pub active: bool,
    /// Integer frame position (unfolded for ping-pong)
    pub position: i32,
    /// Fraction of a frame, always below `MIXER_FRAC_SCALE`
    pub frac: u64,
    /// 32.32 step per output sample
    pub delta: u64,
    /// Ping-pong direction
    pub backwards: bool,
    /// At least one loop cycle completed
    pub has_looped: bool,
    pub loop_mode: LoopMode,
    pub loop_start: i32,
    pub loop_length: i32,
    pub sample_end: i32,
    pub sinc_kernel: usize,

    pub gain_l: f32,
    pub gain_r: f32,
    pub target_l: f32,
    pub target_r: f32,
    pub step_l: f32,
    pub step_r: f32,
    /// Samples left in the current ramp
    pub ramp_remaining: u32,
    /// Shadow voice that dies when its ramp ends
    pub fade_out: bool,
}

impl VoiceState {
    /// Fold an unfolded position back into the playable range.
    ///
    /// One-shot voices past the end deactivate. Looped voices wrap by whole
    /// loop lengths, and ping-pong voices flip direction once per wrap.
    /// Returns whether the voice is still active.
    pub(crate) fn settle(&mut self, position: i64) -> bool {
        let end = self.sample_end as i64;
        if position < end {
            self.position = position as i32;
            return true;
        }

        if self.loop_mode == LoopMode::None || self.loop_length <= 0 {
            self.active = false;
            self.position = self.sample_end - 1;
            self.frac = 0;
            return false;
        }

        let length = self.loop_length as i64;
        let overflow = position - end;
        let wraps = overflow / length + 1;
        self.position = (self.loop_start as i64 + overflow % length) as i32;
        if self.loop_mode == LoopMode::PingPong && wraps % 2 == 1 {
            self.backwards = !self.backwards;
        }
        self.has_looped = true;
        true
    }

    pub(crate) fn is_ramping(&self) -> bool {
        self.ramp_remaining > 0 || self.fade_out
    }
}

/// One voice slot.
#[derive(Clone, Default)]
pub struct Voice {
    sample: Option<Arc<Sample>>,
    state: VoiceState,
    routine: MixRoutine,
    mix_fn: Option<MixFn>,
}

impl Voice {
    pub fn is_active(&self) -> bool {
        self.state.active
    }

    /// Integer frame position
    pub fn position(&self) -> i32 {
        self.state.position
    }

    /// Fractional frame position (32-bit)
    pub fn position_frac(&self) -> u32 {
        self.state.frac as u32
    }

    /// 32.32 step per output sample
    pub fn delta(&self) -> u64 {
        self.state.delta
    }

    /// Playing a ping-pong loop backwards
    pub fn is_backwards(&self) -> bool {
        self.state.backwards
    }

    pub fn has_looped(&self) -> bool {
        self.state.has_looped
    }

    /// Current (left, right) gain
    pub fn gains(&self) -> (f32, f32) {
        (self.state.gain_l, self.state.gain_r)
    }

    /// Gain the current ramp is heading for
    pub fn target_gains(&self) -> (f32, f32) {
        (self.state.target_l, self.state.target_r)
    }

    pub fn ramp_remaining(&self) -> u32 {
        self.state.ramp_remaining
    }

    /// Shadow voice fading out a replaced note
    pub fn is_fade_out(&self) -> bool {
        self.state.fade_out
    }

    /// End of the playable region of the current sample
    pub fn sample_end(&self) -> i32 {
        self.state.sample_end
    }

    pub fn sample(&self) -> Option<&Arc<Sample>> {
        self.sample.as_ref()
    }

    /// Routine selected for the current attributes
    pub fn routine(&self) -> MixRoutine {
        self.routine
    }

    /// Mix `left.len()` samples into the accumulation buffers.
    pub(crate) fn mix(&mut self, kernels: &Kernels, left: &mut [f32], right: &mut [f32]) {
        if !self.state.active {
            return;
        }
        if let Some(mix_fn) = self.mix_fn {
            mix_fn(self, kernels, left, right);
        }
        if !self.state.active {
            self.routine = MixRoutine::Idle;
            self.mix_fn = None;
        }
    }

    /// Re-resolve the mixing routine after any attribute change.
    pub(crate) fn reselect(&mut self, interpolation: Interpolation) {
        self.routine = match &self.sample {
            Some(sample) => MixRoutine::select(sample, &self.state, interpolation),
            None => MixRoutine::Idle,
        };
        self.mix_fn = self.routine.resolve();
    }

    pub(crate) fn deactivate(&mut self) {
        self.state.active = false;
        self.state.ramp_remaining = 0;
        self.state.fade_out = false;
        self.routine = MixRoutine::Idle;
        self.mix_fn = None;
    }
}

impl std::fmt::Debug for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Voice")
            .field("sample", &self.sample.as_ref().map(|s| s.id()))
            .field("routine", &self.routine)
            .field("state", &self.state)
            .finish()
    }
}
