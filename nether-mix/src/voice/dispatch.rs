//! Mixing routine selection
//!
//! [`MixRoutine`] names one point of the variant space
//! (bit depth x loop mode x interpolation x ramp x mono). [`MixRoutine::resolve`]
//! walks it once, a type parameter per axis, down to a single monomorphized
//! [`render::mix_voice`] instance.

use serde::{Deserialize, Serialize};

use super::render::{
    Cubic, ForwardLoop, Interpolator, Linear, LoopKind, Nearest, OneShot, PingPongLoop, Quadratic,
    Sinc8, Sinc16, mix_voice,
};
use super::{MixFn, VoiceState, silence};
use crate::sample::{BitDepth, LoopMode, Sample, SampleWord};

/// Resampling filter quality
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    /// Nearest frame (sample-and-hold)
    None,
    /// 2-point linear
    Linear,
    /// 3-point quadratic spline
    Quadratic,
    /// 4-point cubic spline
    Cubic,
    /// 8-tap windowed sinc
    #[default]
    Sinc8,
    /// 16-tap windowed sinc
    Sinc16,
}

/// The routine a voice is mixed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MixRoutine {
    /// Inactive voice, nothing to do
    #[default]
    Idle,
    /// Zero gain: advance position without rendering
    Silence,
    /// Full rendering path
    Render {
        depth: BitDepth,
        looping: LoopMode,
        interpolation: Interpolation,
        /// Gain changes every sample
        ramp: bool,
        /// Left and right gain are identical
        mono: bool,
    },
}

impl MixRoutine {
    pub(crate) fn select(
        sample: &Sample,
        state: &VoiceState,
        interpolation: Interpolation,
    ) -> Self {
        if !state.active {
            return MixRoutine::Idle;
        }
        let ramp = state.is_ramping();
        if !ramp && state.gain_l == 0.0 && state.gain_r == 0.0 {
            return MixRoutine::Silence;
        }
        MixRoutine::Render {
            depth: sample.bit_depth(),
            looping: sample.loop_mode(),
            interpolation,
            ramp,
            mono: state.gain_l == state.gain_r && state.target_l == state.target_r,
        }
    }

    pub(crate) fn resolve(self) -> Option<MixFn> {
        match self {
            MixRoutine::Idle => None,
            MixRoutine::Silence => Some(silence::mix_silence),
            MixRoutine::Render {
                depth,
                looping,
                interpolation,
                ramp,
                mono,
            } => Some(match depth {
                BitDepth::Bit8 => by_loop::<i8>(looping, interpolation, ramp, mono),
                BitDepth::Bit16 => by_loop::<i16>(looping, interpolation, ramp, mono),
            }),
        }
    }
}

fn by_loop<T: SampleWord>(
    looping: LoopMode,
    interpolation: Interpolation,
    ramp: bool,
    mono: bool,
) -> MixFn {
    match looping {
        LoopMode::None => by_interpolation::<T, OneShot>(interpolation, ramp, mono),
        LoopMode::Forward => by_interpolation::<T, ForwardLoop>(interpolation, ramp, mono),
        LoopMode::PingPong => by_interpolation::<T, PingPongLoop>(interpolation, ramp, mono),
    }
}

fn by_interpolation<T: SampleWord, L: LoopKind>(
    interpolation: Interpolation,
    ramp: bool,
    mono: bool,
) -> MixFn {
    match interpolation {
        Interpolation::None => by_flags::<T, L, Nearest>(ramp, mono),
        Interpolation::Linear => by_flags::<T, L, Linear>(ramp, mono),
        Interpolation::Quadratic => by_flags::<T, L, Quadratic>(ramp, mono),
        Interpolation::Cubic => by_flags::<T, L, Cubic>(ramp, mono),
        Interpolation::Sinc8 => by_flags::<T, L, Sinc8>(ramp, mono),
        Interpolation::Sinc16 => by_flags::<T, L, Sinc16>(ramp, mono),
    }
}

fn by_flags<T: SampleWord, L: LoopKind, I: Interpolator>(ramp: bool, mono: bool) -> MixFn {
    match (ramp, mono) {
        (false, false) => mix_voice::<T, L, I, false, false>,
        (false, true) => mix_voice::<T, L, I, false, true>,
        (true, false) => mix_voice::<T, L, I, true, false>,
        (true, true) => mix_voice::<T, L, I, true, true>,
    }
}
