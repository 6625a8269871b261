//! End-to-end playback scenarios through the public engine API

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use nether_mix::{
    Interpolation, LoopMode, MixerConfig, MixerEngine, OutputBuffer, PatternState, Sample,
    TempoState, TickContext, VoiceTrigger,
};

fn engine(interpolation: Interpolation, ramping: bool) -> MixerEngine {
    let mut config = MixerConfig::default();
    config.audio.frequency = 48_000;
    config.audio.interpolation = interpolation;
    config.audio.volume_ramping = ramping;
    MixerEngine::new(&config).unwrap().0
}

fn trigger(sample: &Arc<Sample>, ratio: f64) -> VoiceTrigger {
    VoiceTrigger {
        sample: Arc::clone(sample),
        start: 0,
        frequency_ratio: ratio,
        gain_l: 0.7,
        gain_r: 0.3,
    }
}

fn render(engine: &mut MixerEngine, frames: usize) -> Vec<f32> {
    let mut out = vec![0.0; frames * 2];
    engine.audio_callback(OutputBuffer::F32(&mut out), 2);
    out
}

#[test]
fn test_forward_loop_for_1000_samples() {
    let pcm: Vec<i8> = (0..500).map(|i| (i % 120) as i8 - 60).collect();
    let sample = Arc::new(Sample::from_pcm8(1, &pcm, LoopMode::Forward, 50, 100).unwrap());
    let mut engine = engine(Interpolation::Linear, false);
    engine.trigger_voice(0, trigger(&sample, 1.0)).unwrap();
    engine.set_tempo(125).unwrap();

    render(&mut engine, 1000);
    let voice = engine.voices().channel(0).unwrap();
    assert!(voice.is_active());
    assert!(voice.has_looped());
    // 50 frames to reach the loop, then 950 more: 9 full cycles plus 50
    assert_eq!(voice.position(), 100);
    assert!((50..150).contains(&voice.position()));
}

#[test]
fn test_one_second_of_ticks_at_125_bpm() {
    let mut engine = engine(Interpolation::Linear, true);
    let mut ticks = 0u32;
    engine.set_replayer(move |_: &mut TickContext<'_>| -> Option<PatternState> {
        ticks += 1;
        Some(PatternState {
            tick: (ticks % 6) as u8,
            ..Default::default()
        })
    });
    engine.set_tempo(125).unwrap();

    let mut out = vec![0.0f32; engine.max_tick_frames() * 2];
    let mut total = 0;
    let mut count = 0;
    while total < 48_000 {
        total += engine.render_tick(OutputBuffer::F32(&mut out), 2);
        count += 1;
    }
    assert_eq!(count, 50);
    assert_eq!(total, 48_000 * count / 50);
}

#[test]
fn test_tick_lengths_do_not_drift() {
    let mut engine = engine(Interpolation::None, false);
    engine.set_output_frequency(44_100).unwrap();
    engine.set_tempo(99).unwrap();

    let mut out = vec![0i16; engine.max_tick_frames() * 2];
    let total: usize = (0..10_000)
        .map(|_| engine.render_tick(OutputBuffer::I16(&mut out), 2))
        .sum();
    let exact = (10_000.0 * 44_100.0 * 2.5 / 99.0_f64).round() as i64;
    assert!((total as i64 - exact).abs() <= 1, "{} vs {}", total, exact);
}

#[test]
fn test_paused_tempo_outputs_silence() {
    let pcm = [12_000; 256];
    let sample = Arc::new(Sample::from_pcm16(1, &pcm, LoopMode::Forward, 0, 256).unwrap());
    let mut engine = engine(Interpolation::Sinc8, true);
    engine.trigger_voice(0, trigger(&sample, 1.0)).unwrap();
    engine.set_tempo(0).unwrap();
    assert_eq!(engine.scheduler().state(), TempoState::Paused);

    let mut out = vec![1i16; 4096];
    engine.audio_callback(OutputBuffer::I16(&mut out), 2);
    assert!(out.iter().all(|&s| s == 0));
}

#[test]
fn test_every_routine_stays_in_bounds() {
    let interpolations = [
        Interpolation::None,
        Interpolation::Linear,
        Interpolation::Quadratic,
        Interpolation::Cubic,
        Interpolation::Sinc8,
        Interpolation::Sinc16,
    ];
    let modes = [LoopMode::None, LoopMode::Forward, LoopMode::PingPong];
    let mut rng = StdRng::seed_from_u64(0x6d69_78);

    for interpolation in interpolations {
        let mut engine = engine(interpolation, true);
        engine.set_tempo(255).unwrap();

        let mut samples = Vec::new();
        for (i, mode) in modes.into_iter().enumerate() {
            let pcm8: Vec<i8> = (0..64).map(|_| rng.random_range(-128..=127)).collect();
            let pcm16: Vec<i16> = (0..64).map(|_| rng.random_range(-32768..=32767)).collect();
            samples.push(Arc::new(Sample::from_pcm8(i as u32, &pcm8, mode, 5, 40).unwrap()));
            samples.push(Arc::new(Sample::from_pcm16(i as u32 + 10, &pcm16, mode, 3, 1).unwrap()));
        }

        for (channel, sample) in samples.iter().enumerate() {
            let ratio = rng.random_range(0.1..4.0);
            engine.trigger_voice(channel, trigger(sample, ratio)).unwrap();
        }

        for _ in 0..20 {
            let frames = rng.random_range(1..700);
            let out = render(&mut engine, frames);
            assert!(out.iter().all(|s| s.is_finite() && s.abs() <= 1.0));

            for channel in 0..samples.len() {
                let voice = engine.voices().channel(channel).unwrap();
                if !voice.is_active() {
                    continue;
                }
                let sample = voice.sample().unwrap();
                assert!(
                    (0..voice.sample_end()).contains(&voice.position()),
                    "{:?} channel {}: {:?}",
                    interpolation,
                    channel,
                    voice
                );
                if voice.has_looped() {
                    assert!(voice.position() >= sample.loop_start() as i32);
                }
            }

            // Retrigger a random channel mid-flight
            let channel = rng.random_range(0..samples.len());
            engine.trigger_voice(channel, trigger(&samples[channel], 1.0)).unwrap();
        }
    }
}
