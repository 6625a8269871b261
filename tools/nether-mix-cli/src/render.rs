//! Render command: mix the demo song offline into a WAV file

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use hound::{SampleFormat, WavSpec, WavWriter};
use nether_mix::{DEFAULT_BPM, MixerEngine, OutputBuffer, OutputFormat, SyncReceivers};
use tracing::{debug, info};

use crate::config::MixerOptions;
use crate::demo::{DemoSong, note_name};

/// Rendered files are always stereo
const CHANNELS: usize = 2;

/// Arguments for the render command
#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file
    pub output: PathBuf,

    /// Length to render, in seconds
    #[arg(long, default_value_t = 8.0)]
    pub seconds: f64,

    #[command(flatten)]
    pub mixer: MixerOptions,
}

/// Execute the render command
pub fn execute(args: RenderArgs) -> Result<()> {
    if args.seconds.is_nan() || args.seconds <= 0.0 {
        bail!("--seconds must be positive");
    }
    let config = args.mixer.resolve()?;
    let (mut engine, mut rx) = MixerEngine::new(&config).context("Failed to create mixer")?;
    engine.set_replayer(DemoSong::new().context("Failed to build demo samples")?);
    engine.set_tempo(DEFAULT_BPM)?;

    let frequency = engine.output_frequency();
    let total = (args.seconds * frequency as f64).round() as usize;
    let (bits_per_sample, sample_format) = match config.audio.output_format {
        OutputFormat::Int16 => (16, SampleFormat::Int),
        OutputFormat::Float => (32, SampleFormat::Float),
    };
    let spec = WavSpec {
        channels: CHANNELS as u16,
        sample_rate: frequency,
        bits_per_sample,
        sample_format,
    };
    let mut writer = WavWriter::create(&args.output, spec)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    info!(
        "Rendering {:.1}s at {} Hz ({:?}, {:?})",
        args.seconds, frequency, config.audio.output_format, config.audio.interpolation
    );

    let rendered = match config.audio.output_format {
        OutputFormat::Int16 => {
            render_frames(&mut engine, &mut rx, &mut writer, total, |buf| OutputBuffer::I16(buf))?
        }
        OutputFormat::Float => {
            render_frames(&mut engine, &mut rx, &mut writer, total, |buf| OutputBuffer::F32(buf))?
        }
    };
    writer.finalize().context("Failed to finalize WAV file")?;

    let metrics = engine.metrics();
    info!(
        "Wrote {} frames to {} ({} ticks, {} snapshots dropped)",
        rendered,
        args.output.display(),
        engine.scheduler().ticks(),
        metrics.pattern_snapshots_dropped + metrics.channel_snapshots_dropped
    );
    Ok(())
}

/// Render tick by tick until `total` frames are written.
fn render_frames<S, W, F>(
    engine: &mut MixerEngine,
    rx: &mut SyncReceivers,
    writer: &mut WavWriter<W>,
    total: usize,
    wrap: F,
) -> Result<usize>
where
    S: hound::Sample + Copy + Default,
    W: std::io::Write + std::io::Seek,
    F: Fn(&mut [S]) -> OutputBuffer<'_>,
{
    let mut buffer = vec![S::default(); engine.max_tick_frames() * CHANNELS];
    let frequency = engine.output_frequency() as usize;
    let mut rendered = 0;
    let mut next_report = frequency;

    while rendered < total {
        let frames = engine.render_tick(wrap(&mut buffer[..]), CHANNELS);
        if frames == 0 {
            // Song paused itself
            break;
        }
        let frames = frames.min(total - rendered);
        for &sample in &buffer[..frames * CHANNELS] {
            writer.write_sample(sample).context("Failed to write sample")?;
        }
        rendered += frames;
        drain_snapshots(rx);

        if rendered >= next_report {
            info!("{:.0}s rendered", rendered as f64 / frequency as f64);
            next_report += frequency;
        }
    }
    Ok(rendered)
}

/// Offline rendering has no listener to stay in step with; log rows as they
/// come and keep both queues empty.
fn drain_snapshots(rx: &mut SyncReceivers) {
    while let Some(snapshot) = rx.pattern.pop() {
        let state = snapshot.state;
        if state.tick == 0 {
            debug!(
                "{:02}:{:02} pattern {} bpm {}",
                state.song_position, state.row, state.pattern, state.bpm
            );
        }
    }
    while let Some(snapshot) = rx.channels.pop() {
        for (index, channel) in snapshot.active_channels().iter().enumerate() {
            if channel.triggered {
                debug!("  ch{} {} ins {:02}", index, note_name(channel.note), channel.instrument);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FormatArg;

    fn options(dir: &std::path::Path, format: FormatArg) -> MixerOptions {
        let path = dir.join("mixer.toml");
        std::fs::write(&path, "").unwrap();
        MixerOptions {
            config: Some(path),
            format: Some(format),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_int16() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("demo.wav");
        execute(RenderArgs {
            output: output.clone(),
            seconds: 0.5,
            mixer: options(dir.path(), FormatArg::Int16),
        })
        .unwrap();

        let reader = hound::WavReader::open(&output).unwrap();
        let spec = reader.spec();
        assert_eq!(spec.channels, 2);
        assert_eq!(spec.sample_rate, 48_000);
        assert_eq!(spec.bits_per_sample, 16);
        assert_eq!(reader.len(), 24_000 * 2);
    }

    #[test]
    fn test_render_float_is_audible() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("demo.wav");
        execute(RenderArgs {
            output: output.clone(),
            seconds: 0.25,
            mixer: options(dir.path(), FormatArg::Float),
        })
        .unwrap();

        let mut reader = hound::WavReader::open(&output).unwrap();
        assert_eq!(reader.spec().sample_format, SampleFormat::Float);
        let samples: Vec<f32> = reader.samples::<f32>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 12_000 * 2);
        assert!(samples.iter().any(|s| s.abs() > 0.01));
        assert!(samples.iter().all(|s| s.abs() <= 1.0));
    }

    #[test]
    fn test_render_rejects_zero_length() {
        let dir = tempfile::tempdir().unwrap();
        let result = execute(RenderArgs {
            output: dir.path().join("demo.wav"),
            seconds: 0.0,
            mixer: options(dir.path(), FormatArg::Int16),
        });
        assert!(result.is_err());
    }
}
