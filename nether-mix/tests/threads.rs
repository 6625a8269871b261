//! Audio thread and UI thread running concurrently

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use nether_mix::{
    CriticalSection, LoopMode, MixerConfig, MixerEngine, OutputBuffer, PatternState, Sample,
    TickContext, VoiceTrigger,
};

#[test]
fn test_snapshots_arrive_in_order_across_threads() {
    let mut config = MixerConfig::default();
    config.sync.queue_capacity = 15;
    let (mut engine, mut rx) = MixerEngine::new(&config).unwrap();

    let mut row = 0u16;
    engine.set_replayer(move |_: &mut TickContext<'_>| -> Option<PatternState> {
        row += 1;
        Some(PatternState {
            row,
            bpm: 125,
            ..Default::default()
        })
    });
    engine.set_tempo(125).unwrap();

    let shared = CriticalSection::new(engine);
    let done = Arc::new(AtomicBool::new(false));

    let audio = {
        let shared = shared.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut out = vec![0.0f32; 256 * 2];
            for _ in 0..2000 {
                shared.with_lock(|engine| engine.audio_callback(OutputBuffer::F32(&mut out), 2));
                thread::yield_now();
            }
            done.store(true, Ordering::Release);
        })
    };

    let sample = Arc::new(Sample::from_pcm8(3, &[40; 128], LoopMode::PingPong, 16, 64).unwrap());
    let mut last_row = 0;
    let mut last_timestamp = 0;
    let mut received = 0usize;
    loop {
        let finished = done.load(Ordering::Acquire);
        while let Some(snapshot) = rx.pattern.pop() {
            assert!(snapshot.state.row > last_row);
            assert!(snapshot.timestamp > last_timestamp);
            last_row = snapshot.state.row;
            last_timestamp = snapshot.timestamp;
            received += 1;
        }
        while rx.channels.pop().is_some() {}

        // UI-side commands go through the same critical section
        shared.with_lock(|engine| {
            engine
                .trigger_voice(
                    received % 4,
                    VoiceTrigger {
                        sample: Arc::clone(&sample),
                        start: 0,
                        frequency_ratio: 0.75,
                        gain_l: 0.5,
                        gain_r: 0.5,
                    },
                )
                .unwrap();
        });

        if finished {
            break;
        }
        thread::yield_now();
    }
    audio.join().unwrap();

    let (ticks, dropped) = shared.with_lock(|engine| {
        // 2000 * 256 frames at 960 frames per tick (48 kHz, 125 BPM)
        (
            engine.scheduler().ticks(),
            engine.metrics().pattern_snapshots_dropped,
        )
    });
    assert_eq!(ticks, 534);
    assert_eq!(received as u64 + dropped, ticks);
}
