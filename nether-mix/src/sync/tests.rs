//! Sync queue tests

use super::*;

fn pattern(timestamp: u64) -> PatternSnapshot {
    PatternSnapshot {
        state: PatternState {
            row: timestamp as u16,
            ..Default::default()
        },
        timestamp,
    }
}

fn queue(capacity: usize) -> (SyncProducer<PatternSnapshot>, SyncConsumer<PatternSnapshot>) {
    SyncQueue::new(capacity).unwrap().split()
}

#[test]
fn test_capacity_must_be_power_of_two_minus_one() {
    for bad in [0, 2, 6, 8, 100, usize::MAX] {
        let result = SyncQueue::<PatternSnapshot>::new(bad);
        assert!(
            matches!(result, Err(MixerError::InvalidQueueCapacity(c)) if c == bad),
            "capacity {} accepted",
            bad
        );
    }
    for good in [1, 3, 7, 255] {
        assert_eq!(SyncQueue::<PatternSnapshot>::new(good).unwrap().capacity(), good);
    }
}

#[test]
fn test_fifo_order() {
    let (mut tx, mut rx) = queue(15);
    for ts in 1..=10 {
        assert!(tx.push(pattern(ts)));
    }
    assert_eq!(rx.len(), 10);

    let mut last = 0;
    while let Some(entry) = rx.pop() {
        assert!(entry.timestamp > last);
        assert_eq!(entry.state.row as u64, entry.timestamp);
        last = entry.timestamp;
    }
    assert_eq!(last, 10);
    assert!(rx.is_empty());
}

#[test]
fn test_excess_pushes_rejected() {
    let (mut tx, mut rx) = queue(7);
    let accepted = (0..12).filter(|&ts| tx.push(pattern(ts))).count();
    assert_eq!(accepted, 7);
    assert_eq!(tx.len(), 7);

    // Rejected entries are the newest ones; the queued ones are intact
    let timestamps: Vec<u64> = std::iter::from_fn(|| rx.pop()).map(|e| e.timestamp).collect();
    assert_eq!(timestamps, (0..7).collect::<Vec<_>>());
}

#[test]
fn test_drain_then_resume() {
    let (mut tx, mut rx) = queue(3);
    for round in 0..100u64 {
        for i in 0..3 {
            assert!(tx.push(pattern(round * 10 + i)));
        }
        assert!(!tx.push(pattern(round * 10 + 9)));
        for i in 0..3 {
            assert_eq!(rx.pop().map(|e| e.timestamp), Some(round * 10 + i));
        }
        assert_eq!(rx.pop(), None);
    }
}

#[test]
fn test_peek_does_not_consume() {
    let (mut tx, mut rx) = queue(7);
    assert_eq!(rx.peek(), None);
    assert_eq!(rx.peek_timestamp(), None);

    tx.push(pattern(42));
    tx.push(pattern(43));
    assert_eq!(rx.peek_timestamp(), Some(42));
    assert_eq!(rx.peek_timestamp(), Some(42));
    assert_eq!(rx.pop().map(|e| e.timestamp), Some(42));
    assert_eq!(rx.peek_timestamp(), Some(43));
}

#[test]
fn test_clear_requested_by_producer() {
    let (mut tx, mut rx) = queue(7);
    for ts in 0..5 {
        tx.push(pattern(ts));
    }
    tx.request_clear();
    assert!(rx.is_clearing());

    // Producer skips writes until the consumer has drained
    assert!(!tx.push(pattern(100)));
    assert_eq!(rx.pop(), None);
    assert!(!rx.is_clearing());
    assert!(rx.is_empty());

    assert!(tx.push(pattern(200)));
    assert_eq!(rx.pop().map(|e| e.timestamp), Some(200));
}

#[test]
fn test_consumer_clear() {
    let (mut tx, mut rx) = queue(7);
    for ts in 0..7 {
        tx.push(pattern(ts));
    }
    rx.clear();
    assert!(rx.is_empty());
    assert!(tx.push(pattern(8)));
    assert_eq!(rx.len(), 1);
}

#[test]
fn test_pop_due_returns_newest_due() {
    let (mut tx, mut rx) = queue(15);
    for ts in [100, 200, 300, 400] {
        tx.push(pattern(ts));
    }
    assert_eq!(rx.pop_due(50), None);
    assert_eq!(rx.len(), 4);

    assert_eq!(rx.pop_due(250).map(|e| e.timestamp), Some(200));
    assert_eq!(rx.peek_timestamp(), Some(300));
    assert_eq!(rx.pop_due(1_000).map(|e| e.timestamp), Some(400));
    assert!(rx.is_empty());
}

#[test]
fn test_counters_wrap_around_ring() {
    let (mut tx, mut rx) = queue(3);
    for ts in 0..10_000 {
        assert!(tx.push(pattern(ts)));
        assert_eq!(rx.pop().map(|e| e.timestamp), Some(ts));
    }
}

#[test]
fn test_channel_snapshot_entries() {
    let (mut tx, mut rx) = SyncQueue::<ChannelSnapshot>::new(7).unwrap().split();
    let mut snapshot = ChannelSnapshot {
        num_channels: 4,
        timestamp: 9,
        ..Default::default()
    };
    snapshot.channels[2] = ChannelSyncState {
        active: true,
        triggered: true,
        note: 49,
        volume: 64,
        ..Default::default()
    };
    assert!(tx.push(snapshot));

    let received = rx.pop().unwrap();
    assert_eq!(received.active_channels().len(), 4);
    assert_eq!(received.active_channels()[2].note, 49);
    assert_eq!(received, snapshot);
}

#[test]
fn test_cross_thread_order() {
    let (mut tx, mut rx) = queue(31);
    const COUNT: u64 = 50_000;

    let producer = std::thread::spawn(move || {
        let mut ts = 1;
        while ts <= COUNT {
            if tx.push(pattern(ts)) {
                ts += 1;
            } else {
                std::thread::yield_now();
            }
        }
    });

    let mut expected = 1;
    while expected <= COUNT {
        match rx.pop() {
            Some(entry) => {
                assert_eq!(entry.timestamp, expected);
                assert_eq!(entry.state.row, expected as u16);
                expected += 1;
            }
            None => std::thread::yield_now(),
        }
    }
    producer.join().unwrap();
    assert!(rx.is_empty());
}

#[test]
fn test_sync_clock_is_monotonic() {
    let clock = SyncClock::new();
    let a = clock.now_ns();
    let b = clock.now_ns();
    assert!(b >= a);
}
