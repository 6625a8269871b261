//! Voice arena and the replayer-facing voice commands

use std::sync::Arc;

use super::{Interpolation, Voice, VoiceState};
use crate::error::{MixerError, Result};
use crate::kernels::{Kernels, sinc_kernel_for_delta};
use crate::sample::Sample;
use crate::{MAX_CHANNELS, MIXER_FRAC_SCALE, VOICE_SLOTS};

/// Largest playback-to-output frequency ratio a voice accepts
pub const MAX_FREQUENCY_RATIO: f64 = 65_536.0;

/// Convert a frequency ratio (source rate / output rate) to a 32.32 delta.
pub fn delta_from_ratio(ratio: f64) -> Result<u64> {
    if !ratio.is_finite() || !(0.0..MAX_FREQUENCY_RATIO).contains(&ratio) {
        return Err(MixerError::FrequencyRatioOutOfRange(ratio));
    }
    Ok((ratio * MIXER_FRAC_SCALE as f64).round() as u64)
}

/// Square-root pan law.
///
/// `volume` scales both sides; `pan` runs from 0 (left) through 128 (centre)
/// to 255 (right). Returns `(gain_l, gain_r)`.
pub fn pan_gains(volume: f32, pan: u8) -> (f32, f32) {
    let right = (pan as f32 / 256.0).sqrt();
    let left = ((256 - pan as u32) as f32 / 256.0).sqrt();
    (volume * left, volume * right)
}

/// Everything needed to start a note on a channel.
#[derive(Debug, Clone)]
pub struct VoiceTrigger {
    /// Prepared sample (carries bit depth and loop geometry)
    pub sample: Arc<Sample>,
    /// Start offset in frames
    pub start: u32,
    /// Source frames per output sample
    pub frequency_ratio: f64,
    pub gain_l: f32,
    pub gain_r: f32,
}

/// Fixed arena of voices: channel `n` lives in slot `n`, its fade-out
/// shadow in slot `MAX_CHANNELS + n`.
pub struct VoiceBank {
    voices: Vec<Voice>,
    interpolation: Interpolation,
    ramping: bool,
    quick_ramp: u32,
    /// Channels triggered since the last `take_triggered`
    triggered: u64,
}

impl VoiceBank {
    pub fn new(interpolation: Interpolation, ramping: bool, quick_ramp: u32) -> Self {
        Self {
            voices: vec![Voice::default(); VOICE_SLOTS],
            interpolation,
            ramping,
            quick_ramp,
            triggered: 0,
        }
    }

    fn check_channel(channel: usize) -> Result<()> {
        if channel >= MAX_CHANNELS {
            return Err(MixerError::ChannelOutOfRange {
                channel,
                max: MAX_CHANNELS,
            });
        }
        Ok(())
    }

    /// Start a note on `channel`.
    ///
    /// With ramping enabled a still-sounding voice is handed to the channel's
    /// fade-out shadow and the new note fades in over the quick ramp. A start
    /// offset past the sample end silences the channel and is reported.
    pub fn trigger(&mut self, channel: usize, trigger: VoiceTrigger) -> Result<()> {
        Self::check_channel(channel)?;
        let delta = delta_from_ratio(trigger.frequency_ratio)?;

        let sample = trigger.sample;
        let end = sample.end();
        if trigger.start >= end {
            self.stop(channel)?;
            return Err(MixerError::StartPastEnd {
                start: trigger.start,
                end,
            });
        }

        if self.ramping {
            self.fade_out(channel);
        }

        let fade_in = self.ramping && self.quick_ramp > 0;
        let mut state = VoiceState {
            active: true,
            position: trigger.start as i32,
            frac: 0,
            delta,
            backwards: false,
            has_looped: false,
            loop_mode: sample.loop_mode(),
            loop_start: sample.loop_start() as i32,
            loop_length: sample.loop_length() as i32,
            sample_end: end as i32,
            sinc_kernel: sinc_kernel_for_delta(delta),
            target_l: trigger.gain_l,
            target_r: trigger.gain_r,
            ..Default::default()
        };
        if fade_in {
            state.ramp_remaining = self.quick_ramp;
            state.step_l = trigger.gain_l / self.quick_ramp as f32;
            state.step_r = trigger.gain_r / self.quick_ramp as f32;
        } else {
            state.gain_l = trigger.gain_l;
            state.gain_r = trigger.gain_r;
        }

        let voice = &mut self.voices[channel];
        voice.sample = Some(sample);
        voice.state = state;
        voice.reselect(self.interpolation);
        self.triggered |= 1 << channel;
        Ok(())
    }

    /// Copy a sounding voice into the shadow slot, ramping down to silence.
    fn fade_out(&mut self, channel: usize) {
        let source = &self.voices[channel];
        let audible = source.state.gain_l != 0.0 || source.state.gain_r != 0.0;
        if !source.state.active || !audible || self.quick_ramp == 0 {
            return;
        }

        let mut shadow = source.clone();
        let ramp = self.quick_ramp;
        let st = &mut shadow.state;
        st.fade_out = true;
        st.target_l = 0.0;
        st.target_r = 0.0;
        st.step_l = -st.gain_l / ramp as f32;
        st.step_r = -st.gain_r / ramp as f32;
        st.ramp_remaining = ramp;
        shadow.reselect(self.interpolation);
        self.voices[MAX_CHANNELS + channel] = shadow;
    }

    /// Move a channel's gain towards `(gain_l, gain_r)` over `ramp_samples`.
    ///
    /// With ramping disabled, or a zero length, the change is immediate.
    pub fn set_volume(
        &mut self,
        channel: usize,
        gain_l: f32,
        gain_r: f32,
        ramp_samples: u32,
    ) -> Result<()> {
        Self::check_channel(channel)?;
        let ramp = if self.ramping { ramp_samples } else { 0 };
        let voice = &mut self.voices[channel];
        let st = &mut voice.state;
        st.target_l = gain_l;
        st.target_r = gain_r;
        if ramp == 0 {
            st.gain_l = gain_l;
            st.gain_r = gain_r;
            st.step_l = 0.0;
            st.step_r = 0.0;
            st.ramp_remaining = 0;
        } else {
            st.step_l = (gain_l - st.gain_l) / ramp as f32;
            st.step_r = (gain_r - st.gain_r) / ramp as f32;
            st.ramp_remaining = ramp;
        }
        if st.active {
            voice.reselect(self.interpolation);
        }
        Ok(())
    }

    /// Change a channel's playback rate (vibrato, portamento).
    pub fn set_frequency(&mut self, channel: usize, frequency_ratio: f64) -> Result<()> {
        Self::check_channel(channel)?;
        let delta = delta_from_ratio(frequency_ratio)?;
        let st = &mut self.voices[channel].state;
        st.delta = delta;
        st.sinc_kernel = sinc_kernel_for_delta(delta);
        Ok(())
    }

    /// Silence a channel immediately.
    ///
    /// With ramping enabled the sound fades through the shadow slot instead
    /// of cutting off.
    pub fn stop(&mut self, channel: usize) -> Result<()> {
        Self::check_channel(channel)?;
        if self.ramping {
            self.fade_out(channel);
        }
        self.voices[channel].deactivate();
        Ok(())
    }

    /// Deactivate every slot, shadows included, with no fade.
    pub fn stop_all(&mut self) {
        for voice in &mut self.voices {
            voice.deactivate();
        }
        self.triggered = 0;
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn set_interpolation(&mut self, interpolation: Interpolation) {
        self.interpolation = interpolation;
        self.reselect_all();
    }

    pub fn ramping(&self) -> bool {
        self.ramping
    }

    /// Enable or disable volume ramps. Disabling lands running ramps on
    /// their targets and drops fade-out shadows.
    pub fn set_ramping(&mut self, ramping: bool) {
        self.ramping = ramping;
        if !ramping {
            for voice in &mut self.voices {
                if voice.state.fade_out {
                    voice.deactivate();
                    continue;
                }
                let st = &mut voice.state;
                st.gain_l = st.target_l;
                st.gain_r = st.target_r;
                st.step_l = 0.0;
                st.step_r = 0.0;
                st.ramp_remaining = 0;
            }
        }
        self.reselect_all();
    }

    pub fn quick_ramp(&self) -> u32 {
        self.quick_ramp
    }

    pub fn set_quick_ramp(&mut self, samples: u32) {
        self.quick_ramp = samples;
    }

    fn reselect_all(&mut self) {
        let interpolation = self.interpolation;
        for voice in self.voices.iter_mut().filter(|v| v.state.active) {
            voice.reselect(interpolation);
        }
    }

    /// Voice for a channel
    pub fn channel(&self, channel: usize) -> Option<&Voice> {
        self.voices.get(..MAX_CHANNELS)?.get(channel)
    }

    /// Any slot, shadows included
    pub fn slot(&self, slot: usize) -> Option<&Voice> {
        self.voices.get(slot)
    }

    pub fn active_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Mix every active slot into the buffers.
    pub(crate) fn mix_into(&mut self, kernels: &Kernels, left: &mut [f32], right: &mut [f32]) {
        let interpolation = self.interpolation;
        for voice in &mut self.voices {
            voice.mix(kernels, left, right);
            // Finished ramps drop back to the steady-gain routines
            if voice.state.active
                && !voice.state.is_ramping()
                && matches!(voice.routine, super::MixRoutine::Render { ramp: true, .. })
            {
                voice.reselect(interpolation);
            }
        }
    }

    pub(crate) fn take_triggered(&mut self) -> u64 {
        std::mem::take(&mut self.triggered)
    }
}
