//! Audio output using cpal
//!
//! The device callback renders straight into the device buffer through
//! [`MixerEngine::audio_callback`](crate::MixerEngine::audio_callback) under
//! the shared engine lock. Underruns and stream failures are reported by cpal
//! and logged here. Latency follows the buffer size the device actually
//! delivers, which may differ from the configured one.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use tracing::{debug, error, info, warn};

use crate::accumulator::OutputBuffer;
use crate::config::{MixerConfig, OutputFormat};
use crate::engine::SharedEngine;
use crate::error::{MixerError, Result};
use crate::{MAX_AUDIO_FREQ, MIN_AUDIO_FREQ};

/// A running output stream feeding from a [`SharedEngine`].
pub struct AudioOutput {
    /// The cpal stream (kept alive for the duration)
    _stream: cpal::Stream,
    sample_rate: u32,
    channels: usize,
    format: OutputFormat,
}

impl AudioOutput {
    /// Open the default output device and start playing.
    ///
    /// Prefers the configured format and frequency; when the device cannot do
    /// that, falls back to its default configuration and retunes the engine.
    pub fn open(engine: SharedEngine, config: &MixerConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| MixerError::Device("no audio output device available".into()))?;

        let supported = find_config(&device, config)?;
        let sample_rate = supported.sample_rate().0;
        if !(MIN_AUDIO_FREQ..=MAX_AUDIO_FREQ).contains(&sample_rate) {
            return Err(MixerError::Device(format!(
                "device rate {} Hz outside {}-{} Hz",
                sample_rate, MIN_AUDIO_FREQ, MAX_AUDIO_FREQ
            )));
        }
        let format = match supported.sample_format() {
            cpal::SampleFormat::F32 => OutputFormat::Float,
            cpal::SampleFormat::I16 => OutputFormat::Int16,
            other => {
                return Err(MixerError::Device(format!("unsupported sample format: {:?}", other)));
            }
        };
        let channels = supported.channels() as usize;

        let wanted_frames = config.audio.buffer_frames;
        let buffer_size = match *supported.buffer_size() {
            cpal::SupportedBufferSize::Range { min, max }
                if (min..=max).contains(&wanted_frames) =>
            {
                cpal::BufferSize::Fixed(wanted_frames)
            }
            _ => {
                debug!(
                    "Device cannot use {} frames per buffer, latency follows the device",
                    wanted_frames
                );
                cpal::BufferSize::Default
            }
        };

        engine.with_lock(|mixer| -> Result<()> {
            if mixer.output_frequency() != sample_rate {
                mixer.set_output_frequency(sample_rate)?;
            }
            mixer.set_buffer_frames(wanted_frames);
            Ok(())
        })?;

        let mut stream_config: cpal::StreamConfig = supported.into();
        stream_config.buffer_size = buffer_size;
        let stream = match format {
            OutputFormat::Float => device.build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    engine.with_lock(|mixer| {
                        mixer.track_device_buffer(data.len() / channels.max(1));
                        mixer.audio_callback(OutputBuffer::F32(data), channels);
                    });
                },
                |err| error!("Audio stream error: {}", err),
                None,
            ),
            OutputFormat::Int16 => device.build_output_stream(
                &stream_config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    engine.with_lock(|mixer| {
                        mixer.track_device_buffer(data.len() / channels.max(1));
                        mixer.audio_callback(OutputBuffer::I16(data), channels);
                    });
                },
                |err| error!("Audio stream error: {}", err),
                None,
            ),
        }
        .map_err(|e| MixerError::Device(format!("failed to build audio stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| MixerError::Device(format!("failed to play audio stream: {}", e)))?;

        debug!("Audio stream started");
        info!("Audio output: {} Hz, {} channels, {:?}", sample_rate, channels, format);

        Ok(Self {
            _stream: stream,
            sample_rate,
            channels,
            format,
        })
    }

    /// Get the output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }
}

/// The configured format and rate if the device supports them, otherwise
/// the device default.
fn find_config(device: &cpal::Device, config: &MixerConfig) -> Result<cpal::SupportedStreamConfig> {
    let wanted_format = match config.audio.output_format {
        OutputFormat::Float => cpal::SampleFormat::F32,
        OutputFormat::Int16 => cpal::SampleFormat::I16,
    };
    let wanted_rate = cpal::SampleRate(config.audio.frequency);

    if let Ok(mut configs) = device.supported_output_configs() {
        let matching = configs.find(|range| {
            range.sample_format() == wanted_format
                && range.channels() >= 2
                && range.min_sample_rate() <= wanted_rate
                && wanted_rate <= range.max_sample_rate()
        });
        if let Some(range) = matching {
            return Ok(range.with_sample_rate(wanted_rate));
        }
    }

    warn!(
        "Device does not support {:?} at {} Hz, using its default configuration",
        config.audio.output_format, config.audio.frequency
    );
    device
        .default_output_config()
        .map_err(|e| MixerError::Device(format!("failed to get default output config: {}", e)))
}
