//! Play command: live playback with a row display kept in step with the audio

use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Args;
use nether_mix::{AudioOutput, ChannelSnapshot, CriticalSection, DEFAULT_BPM, MixerEngine};
use tracing::info;

use crate::config::MixerOptions;
use crate::demo::{DemoSong, note_name};

/// Display refresh interval (~60 Hz)
const FRAME_TIME: Duration = Duration::from_micros(16_667);

/// Arguments for the play command
#[derive(Args)]
pub struct PlayArgs {
    /// How long to play, in seconds
    #[arg(long, default_value_t = 30)]
    pub seconds: u64,

    #[command(flatten)]
    pub mixer: MixerOptions,
}

/// Execute the play command
pub fn execute(args: PlayArgs) -> Result<()> {
    let config = args.mixer.resolve()?;
    let (mut engine, mut rx) = MixerEngine::new(&config).context("Failed to create mixer")?;
    engine.set_replayer(DemoSong::new().context("Failed to build demo samples")?);

    let shared = CriticalSection::new(engine);
    let output = AudioOutput::open(shared.clone(), &config).context("Failed to open audio output")?;
    shared.with_lock(|engine| engine.set_tempo(DEFAULT_BPM))?;

    let latency = shared.with_lock(|engine| engine.output_latency());
    info!(
        "Playing demo for {}s ({} Hz, {:.1} ms latency)",
        args.seconds,
        output.sample_rate(),
        latency.as_secs_f64() * 1000.0
    );

    let deadline = Instant::now() + Duration::from_secs(args.seconds);
    let mut channels = ChannelSnapshot::default();
    let mut last_row = None;

    while Instant::now() < deadline {
        let now = rx.now_ns();
        if let Some(snapshot) = rx.channels.pop_due(now) {
            channels = snapshot;
        }
        if let Some(snapshot) = rx.pattern.pop_due(now) {
            let state = snapshot.state;
            let row = (state.song_position, state.row);
            if last_row != Some(row) {
                last_row = Some(row);
                println!(
                    "{:02}:{:02} {:>3} bpm | {}",
                    state.song_position,
                    state.row,
                    state.bpm,
                    format_channels(&channels)
                );
            }
        }
        thread::sleep(FRAME_TIME);
    }

    let (ticks, dropped) = shared.with_lock(|engine| {
        let metrics = engine.metrics();
        let dropped = metrics.pattern_snapshots_dropped + metrics.channel_snapshots_dropped;
        let ticks = engine.scheduler().ticks();
        engine.reset();
        (ticks, dropped)
    });
    drop(output);

    info!("Stopped after {} ticks ({} snapshots dropped)", ticks, dropped);
    Ok(())
}

/// One column per channel: note and volume, or dots when silent
fn format_channels(snapshot: &ChannelSnapshot) -> String {
    snapshot
        .active_channels()
        .iter()
        .map(|channel| {
            if channel.active {
                format!("{} {:02}", note_name(channel.note), channel.volume)
            } else {
                "... ..".to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}
