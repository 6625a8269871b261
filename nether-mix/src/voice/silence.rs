//! Zero-gain fast path
//!
//! A muted voice still has to move: when it is unmuted it must be exactly
//! where an audible voice would be. Instead of rendering zeros, the position
//! is advanced by `samples * delta` in one step and folded back into the
//! loop with the same rules the rendering routines use.

use super::{Voice, VoiceState};
use crate::MIXER_FRAC_BITS;
use crate::MIXER_FRAC_MASK;
use crate::kernels::Kernels;

pub(crate) fn mix_silence(voice: &mut Voice, _: &Kernels, left: &mut [f32], right: &mut [f32]) {
    let samples = left.len().min(right.len()) as u64;
    advance(&mut voice.state, samples);
}

/// Advance `state` by `samples` output samples without reading any data.
pub(crate) fn advance(state: &mut VoiceState, samples: u64) {
    let total = state.frac as u128 + state.delta as u128 * samples as u128;
    state.frac = (total as u64) & MIXER_FRAC_MASK;
    let whole = (total >> MIXER_FRAC_BITS) as i64;
    state.settle(state.position as i64 + whole);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MIXER_FRAC_SCALE;
    use crate::sample::LoopMode;

    fn looped(mode: LoopMode) -> VoiceState {
        VoiceState {
            active: true,
            delta: MIXER_FRAC_SCALE,
            loop_mode: mode,
            loop_start: 50,
            loop_length: 100,
            sample_end: 150,
            ..Default::default()
        }
    }

    #[test]
    fn test_forward_wraps_by_modulo() {
        let mut state = looped(LoopMode::Forward);
        advance(&mut state, 1000);
        assert!(state.active);
        assert!(state.has_looped);
        assert_eq!(state.position, 100);
    }

    #[test]
    fn test_pingpong_direction_parity() {
        // 150 reaches the end once: one flip
        let mut state = looped(LoopMode::PingPong);
        advance(&mut state, 150);
        assert_eq!(state.position, 50);
        assert!(state.backwards);

        // Another full loop length: second flip
        advance(&mut state, 100);
        assert_eq!(state.position, 50);
        assert!(!state.backwards);
    }

    #[test]
    fn test_one_shot_ends() {
        let mut state = VoiceState {
            active: true,
            delta: MIXER_FRAC_SCALE,
            sample_end: 10,
            ..Default::default()
        };
        advance(&mut state, 9);
        assert!(state.active);
        assert_eq!(state.position, 9);
        advance(&mut state, 1);
        assert!(!state.active);
        assert_eq!(state.position, 9);
    }

    #[test]
    fn test_fraction_carries() {
        let mut state = VoiceState {
            active: true,
            delta: MIXER_FRAC_SCALE / 4,
            frac: MIXER_FRAC_SCALE / 2,
            sample_end: 100,
            ..Default::default()
        };
        advance(&mut state, 3);
        assert_eq!(state.position, 1);
        assert_eq!(state.frac, MIXER_FRAC_SCALE / 4);
    }
}
