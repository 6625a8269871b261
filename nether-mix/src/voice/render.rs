//! Generic mixing loops
//!
//! [`mix_voice`] splits a request into runs that end exactly where the
//! voice crosses its sample end (or its ramp ends), so the inner loop only
//! steps, reads taps, interpolates and accumulates. Loop handling, ramp
//! bookkeeping and the ping-pong mirror all happen between runs.

use super::{Voice, VoiceState};
use crate::kernels::{
    CUBIC_SPLINE_WIDTH, Kernels, QUADRATIC_SPLINE_WIDTH, SINC_PHASES_BITS, SPLINE_PHASES_BITS,
    phase_index,
};
use crate::sample::{LoopMode, SampleFrames, SampleWord};
use crate::{MAX_LEFT_TAPS, MIXER_FRAC_BITS, MIXER_FRAC_MASK, MIXER_FRAC_SCALE};

// =============================================================================
// Interpolators
// =============================================================================

/// A resampling filter reading `WIDTH` taps, `LEFT` of them before the
/// read position.
pub(crate) trait Interpolator {
    const LEFT: usize;
    const WIDTH: usize;

    fn table(kernels: &Kernels, sinc_kernel: usize) -> &[f32];

    fn interpolate<T: SampleWord>(taps: &[T], frac: u64, table: &[f32]) -> f32;
}

#[inline(always)]
fn dot<T: SampleWord>(taps: &[T], coeffs: &[f32]) -> f32 {
    taps.iter().zip(coeffs).map(|(s, c)| s.to_f32() * c).sum()
}

pub(crate) struct Nearest;
pub(crate) struct Linear;
pub(crate) struct Quadratic;
pub(crate) struct Cubic;
pub(crate) struct Sinc8;
pub(crate) struct Sinc16;

impl Interpolator for Nearest {
    const LEFT: usize = 0;
    const WIDTH: usize = 1;

    fn table(_: &Kernels, _: usize) -> &[f32] {
        &[]
    }

    #[inline(always)]
    fn interpolate<T: SampleWord>(taps: &[T], _: u64, _: &[f32]) -> f32 {
        taps[0].to_f32()
    }
}

impl Interpolator for Linear {
    const LEFT: usize = 0;
    const WIDTH: usize = 2;

    fn table(_: &Kernels, _: usize) -> &[f32] {
        &[]
    }

    #[inline(always)]
    fn interpolate<T: SampleWord>(taps: &[T], frac: u64, _: &[f32]) -> f32 {
        let s0 = taps[0].to_f32();
        let s1 = taps[1].to_f32();
        s0 + (s1 - s0) * (frac as f32 * (1.0 / MIXER_FRAC_SCALE as f32))
    }
}

impl Interpolator for Quadratic {
    const LEFT: usize = 0;
    const WIDTH: usize = QUADRATIC_SPLINE_WIDTH;

    fn table(kernels: &Kernels, _: usize) -> &[f32] {
        kernels.quadratic()
    }

    #[inline(always)]
    fn interpolate<T: SampleWord>(taps: &[T], frac: u64, table: &[f32]) -> f32 {
        let base = phase_index(frac, SPLINE_PHASES_BITS) * Self::WIDTH;
        dot(taps, &table[base..base + Self::WIDTH])
    }
}

impl Interpolator for Cubic {
    const LEFT: usize = 1;
    const WIDTH: usize = CUBIC_SPLINE_WIDTH;

    fn table(kernels: &Kernels, _: usize) -> &[f32] {
        kernels.cubic()
    }

    #[inline(always)]
    fn interpolate<T: SampleWord>(taps: &[T], frac: u64, table: &[f32]) -> f32 {
        let base = phase_index(frac, SPLINE_PHASES_BITS) * Self::WIDTH;
        dot(taps, &table[base..base + Self::WIDTH])
    }
}

impl Interpolator for Sinc8 {
    const LEFT: usize = 3;
    const WIDTH: usize = 8;

    fn table(kernels: &Kernels, sinc_kernel: usize) -> &[f32] {
        kernels.sinc8(sinc_kernel)
    }

    #[inline(always)]
    fn interpolate<T: SampleWord>(taps: &[T], frac: u64, table: &[f32]) -> f32 {
        let base = phase_index(frac, SINC_PHASES_BITS) * Self::WIDTH;
        dot(taps, &table[base..base + Self::WIDTH])
    }
}

impl Interpolator for Sinc16 {
    const LEFT: usize = 7;
    const WIDTH: usize = 16;

    fn table(kernels: &Kernels, sinc_kernel: usize) -> &[f32] {
        kernels.sinc16(sinc_kernel)
    }

    #[inline(always)]
    fn interpolate<T: SampleWord>(taps: &[T], frac: u64, table: &[f32]) -> f32 {
        let base = phase_index(frac, SINC_PHASES_BITS) * Self::WIDTH;
        dot(taps, &table[base..base + Self::WIDTH])
    }
}

// =============================================================================
// Loop kinds
// =============================================================================

pub(crate) trait LoopKind {
    const MODE: LoopMode;
}

pub(crate) struct OneShot;
pub(crate) struct ForwardLoop;
pub(crate) struct PingPongLoop;

impl LoopKind for OneShot {
    const MODE: LoopMode = LoopMode::None;
}

impl LoopKind for ForwardLoop {
    const MODE: LoopMode = LoopMode::Forward;
}

impl LoopKind for PingPongLoop {
    const MODE: LoopMode = LoopMode::PingPong;
}

// =============================================================================
// Read cursor
// =============================================================================

/// Where the taps are read from during one run.
///
/// Backwards ping-pong playback reads the mirror of the unfolded position,
/// `loop_start + sample_end - 1 - position`, with the fraction inverted and
/// a negated step, so one loop body serves both directions.
struct Cursor {
    index: isize,
    frac: u64,
    step_whole: isize,
    step_frac: u64,
    mirrored: bool,
}

impl Cursor {
    #[inline(always)]
    fn begin<L: LoopKind>(state: &VoiceState) -> Self {
        if L::MODE == LoopMode::PingPong && state.backwards {
            let step = state.delta.wrapping_neg();
            Self {
                index: Self::mirror_base(state) - state.position as isize,
                frac: state.frac ^ MIXER_FRAC_MASK,
                step_whole: ((step as i64) >> MIXER_FRAC_BITS) as isize,
                step_frac: step & MIXER_FRAC_MASK,
                mirrored: true,
            }
        } else {
            Self {
                index: state.position as isize,
                frac: state.frac,
                step_whole: (state.delta >> MIXER_FRAC_BITS) as isize,
                step_frac: state.delta & MIXER_FRAC_MASK,
                mirrored: false,
            }
        }
    }

    #[inline(always)]
    fn mirror_base(state: &VoiceState) -> isize {
        state.loop_start as isize + state.sample_end as isize - 1
    }

    #[inline(always)]
    fn advance(&mut self) {
        self.frac += self.step_frac;
        self.index += (self.frac >> MIXER_FRAC_BITS) as isize + self.step_whole;
        self.frac &= MIXER_FRAC_MASK;
    }

    /// Store the fraction and return the unfolded position.
    #[inline(always)]
    fn finish(self, state: &mut VoiceState) -> i64 {
        if self.mirrored {
            state.frac = self.frac ^ MIXER_FRAC_MASK;
            (Self::mirror_base(state) - self.index) as i64
        } else {
            state.frac = self.frac;
            self.index as i64
        }
    }
}

/// Output samples until the position reaches `sample_end`.
///
/// The last of them is the final sample read before the end; the step after
/// it lands at or past the end.
#[inline]
pub(crate) fn samples_to_boundary(state: &VoiceState) -> u64 {
    if state.delta == 0 {
        return u64::MAX;
    }
    let whole = (state.sample_end - 1 - state.position) as u64;
    (((whole << MIXER_FRAC_BITS) | (state.frac ^ MIXER_FRAC_MASK)) / state.delta) + 1
}

// =============================================================================
// Mixing
// =============================================================================

#[derive(Clone, Copy)]
struct Gains {
    left: f32,
    right: f32,
    step_left: f32,
    step_right: f32,
}

#[inline(always)]
fn render_run<T, I, const RAMP: bool, const MONO: bool, const EDGE: bool>(
    frames: &SampleFrames<T>,
    table: &[f32],
    loop_start: isize,
    cursor: &mut Cursor,
    gains: &mut Gains,
    out_left: &mut [f32],
    out_right: &mut [f32],
) where
    T: SampleWord,
    I: Interpolator,
{
    let edge_limit = loop_start + MAX_LEFT_TAPS as isize;
    for (left, right) in out_left.iter_mut().zip(out_right.iter_mut()) {
        let taps = if EDGE && cursor.index <= edge_limit {
            frames.edge_taps((cursor.index - loop_start) as usize, I::LEFT, I::WIDTH)
        } else {
            frames.taps(cursor.index, I::LEFT, I::WIDTH)
        };
        let sample = I::interpolate(taps, cursor.frac, table) * T::SCALE;

        if MONO {
            let value = sample * gains.left;
            *left += value;
            *right += value;
        } else {
            *left += sample * gains.left;
            *right += sample * gains.right;
        }

        if RAMP {
            gains.left += gains.step_left;
            gains.right += gains.step_right;
        }

        cursor.advance();
    }
}

/// Mix one voice into `left`/`right` (equal lengths).
pub(crate) fn mix_voice<T, L, I, const RAMP: bool, const MONO: bool>(
    voice: &mut Voice,
    kernels: &Kernels,
    left: &mut [f32],
    right: &mut [f32],
) where
    T: SampleWord,
    L: LoopKind,
    I: Interpolator,
{
    let Voice { sample, state, .. } = voice;
    let Some(frames) = sample.as_deref().and_then(T::frames) else {
        state.active = false;
        return;
    };
    let table = I::table(kernels, state.sinc_kernel);
    let len = left.len().min(right.len());

    let mut gains = Gains {
        left: state.gain_l,
        right: state.gain_r,
        step_left: state.step_l,
        step_right: state.step_r,
    };

    let mut done = 0;
    while done < len {
        let mut count = samples_to_boundary(state).min((len - done) as u64) as usize;

        if RAMP {
            if state.ramp_remaining == 0 {
                if state.fade_out {
                    state.active = false;
                    break;
                }
                gains.step_left = 0.0;
                gains.step_right = 0.0;
            } else {
                count = count.min(state.ramp_remaining as usize);
                state.ramp_remaining -= count as u32;
            }
        }

        let mut cursor = Cursor::begin::<L>(state);
        let out_left = &mut left[done..done + count];
        let out_right = &mut right[done..done + count];
        let loop_start = state.loop_start as isize;

        if I::LEFT > 0 && L::MODE != LoopMode::None && state.has_looped {
            render_run::<T, I, RAMP, MONO, true>(
                frames,
                table,
                loop_start,
                &mut cursor,
                &mut gains,
                out_left,
                out_right,
            );
        } else {
            render_run::<T, I, RAMP, MONO, false>(
                frames,
                table,
                loop_start,
                &mut cursor,
                &mut gains,
                out_left,
                out_right,
            );
        }
        done += count;

        if RAMP && state.ramp_remaining == 0 {
            // Land exactly on target regardless of float accumulation
            gains.left = state.target_l;
            gains.right = state.target_r;
            gains.step_left = 0.0;
            gains.step_right = 0.0;
        }

        let position = cursor.finish(state);
        if !state.settle(position) {
            break;
        }
    }

    state.gain_l = gains.left;
    state.gain_r = gains.right;
    state.step_l = gains.step_left;
    state.step_r = gains.step_right;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(position: i32, frac: u64, delta: u64, end: i32) -> VoiceState {
        VoiceState {
            active: true,
            position,
            frac,
            delta,
            sample_end: end,
            ..Default::default()
        }
    }

    #[test]
    fn test_samples_to_boundary_unit_delta() {
        assert_eq!(samples_to_boundary(&state(0, 0, MIXER_FRAC_SCALE, 100)), 100);
        assert_eq!(samples_to_boundary(&state(99, 0, MIXER_FRAC_SCALE, 100)), 1);
    }

    #[test]
    fn test_samples_to_boundary_fractional() {
        // 0.5 per sample from 0: frames 0..10 take 20 samples
        assert_eq!(samples_to_boundary(&state(0, 0, MIXER_FRAC_SCALE / 2, 10)), 20);
        // Starting halfway into the last frame leaves one sample
        let half = MIXER_FRAC_SCALE / 2;
        assert_eq!(samples_to_boundary(&state(9, half, half, 10)), 1);
        // 1.5 per sample: 0, 1.5, 3, ... 9 is sample 7, 10.5 is past the end
        assert_eq!(samples_to_boundary(&state(0, 0, MIXER_FRAC_SCALE * 3 / 2, 10)), 7);
    }

    #[test]
    fn test_samples_to_boundary_zero_delta() {
        assert_eq!(samples_to_boundary(&state(5, 0, 0, 10)), u64::MAX);
    }

    #[test]
    fn test_cursor_mirror_round_trip() {
        let mut st = VoiceState {
            backwards: true,
            loop_mode: LoopMode::PingPong,
            loop_start: 10,
            loop_length: 20,
            ..state(17, 12345, MIXER_FRAC_SCALE, 30)
        };
        let cursor = Cursor::begin::<PingPongLoop>(&st);
        assert_eq!(cursor.index, 10 + 30 - 1 - 17);
        let position = cursor.finish(&mut st);
        assert_eq!(position, 17);
        assert_eq!(st.frac, 12345);
    }

    #[test]
    fn test_backwards_cursor_steps_down() {
        let st = VoiceState {
            backwards: true,
            loop_mode: LoopMode::PingPong,
            loop_start: 0,
            loop_length: 100,
            ..state(10, 0, MIXER_FRAC_SCALE * 3 / 2, 100)
        };
        let mut cursor = Cursor::begin::<PingPongLoop>(&st);
        let start = cursor.index;
        cursor.advance();
        cursor.advance();
        // Two steps of 1.5 move the read position back by 3 frames
        assert_eq!(cursor.index, start - 3);
    }
}
