use pretty_assertions::assert_eq;
use proptest::prelude::*;

use sensorgraph_primitives::{DeviceModel, Reading, Selector, StreamId};

use crate::{BufferKind, Error, SeekTarget, SensorLog};

fn enable_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Trace)
        .format_timestamp(None)
        .is_test(true)
        .try_init();
}

fn small_log(storage: usize, streaming: usize) -> SensorLog {
    SensorLog::open(&DeviceModel {
        max_storage_buffer: storage,
        max_streaming_buffer: streaming,
        ..DeviceModel::default()
    })
}

fn stream(text: &str) -> StreamId {
    text.parse().unwrap()
}

fn selector(text: &str) -> Selector {
    text.parse().unwrap()
}

fn push(log: &SensorLog, stream_text: &str, raw_time: u32, value: u32) {
    let target = stream(stream_text);
    log.push(target, Reading::new(target, raw_time, value)).unwrap();
}

#[test]
fn rollover_walker_sees_surviving_readings() {
    enable_logging();
    let log = small_log(8, 4);
    let walker = log.create_walker(selector("0x5001"), false);

    for (tick, value) in [10, 20, 30, 40, 50].into_iter().enumerate() {
        push(&log, "0x5001", tick as u32 + 1, value);
    }

    assert_eq!(log.count(), (0, 4));
    let values: Vec<u32> = std::iter::from_fn(|| walker.pop().ok()).map(|r| r.value).collect();
    assert_eq!(values, vec![20, 30, 40, 50]);
    assert_eq!(walker.pop(), Err(Error::StreamEmpty));
    assert_eq!(walker.count(), 0);
}

#[test]
fn push_pop_round_trips() {
    let log = small_log(8, 8);
    let target = stream("buffered 7");
    let walker = log.create_walker(Selector::Exact(target), false);

    log.push(target, Reading::new(target, 42, 1234)).unwrap();
    let popped = walker.pop().unwrap();
    assert_eq!((popped.stream, popped.raw_time, popped.value), (target, 42, 1234));
    assert_eq!(popped.reading_id, 1);
}

#[test]
fn fill_stop_rejects_and_preserves_contents() {
    let log = small_log(2, 8);
    log.set_rollover(BufferKind::Storage, false);

    push(&log, "0x100A", 1, 100);
    push(&log, "0x100A", 2, 200);

    let before: Vec<Reading> = collect(&log, BufferKind::Storage);
    let target = stream("0x100A");
    assert_eq!(
        log.push(target, Reading::new(target, 3, 300)),
        Err(Error::StorageFull {
            buffer: BufferKind::Storage
        })
    );
    assert_eq!(collect(&log, BufferKind::Storage), before);
    assert_eq!(log.count().0, 2);
}

fn collect(log: &SensorLog, kind: BufferKind) -> Vec<Reading> {
    let mut readings = Vec::new();
    log.scan(kind, |_, r| readings.push(*r));
    readings
}

#[test]
fn important_pushes_duplicate_into_associated_output() {
    let log = small_log(8, 8);
    push(&log, "0x100B", 5, 3);

    let (storage, streaming) = log.count();
    assert_eq!((storage, streaming), (1, 1));
    let original = log.inspect_last(stream("0x100B"), false).unwrap();
    let copy = log.inspect_last(stream("0x500B"), false).unwrap();
    assert_eq!((original.value, original.raw_time), (3, 5));
    assert_eq!((copy.value, copy.raw_time), (3, 5));
    assert_ne!(original.reading_id, copy.reading_id);
}

#[test]
fn walker_counts_track_matching_pushes() {
    let log = small_log(8, 8);
    let exact = log.create_walker(selector("buffered 1"), false);
    let all = log.create_walker(selector("all buffered"), false);

    push(&log, "buffered 1", 0, 1);
    push(&log, "buffered 2", 0, 2);
    assert_eq!(exact.count(), 1);
    assert_eq!(all.count(), 2);

    exact.pop().unwrap();
    assert_eq!(exact.count(), 0);
    assert_eq!(all.count(), 2);
}

#[test]
fn skip_all_walker_only_sees_future_readings() {
    let log = small_log(8, 8);
    push(&log, "buffered 1", 0, 1);

    let walker = log.create_walker(selector("buffered 1"), true);
    assert_eq!(walker.count(), 0);
    assert_eq!(walker.pop(), Err(Error::StreamEmpty));

    push(&log, "buffered 1", 0, 2);
    assert_eq!(walker.count(), 1);
    assert_eq!(walker.pop().unwrap().value, 2);
}

#[test]
fn constant_walkers_never_drain() {
    let log = small_log(4, 4);
    let walker = log.create_walker(selector("constant 1"), false);

    // Fresh constant walkers read as 0 until a constant is assigned.
    let initial = walker.pop().unwrap();
    assert_eq!((initial.value, initial.raw_time), (0, 0xFFFF_FFFF));

    push(&log, "constant 1", 0, 77);
    for _ in 0..10 {
        assert_eq!(walker.pop().unwrap().value, 77);
    }
    assert_eq!(walker.count(), u32::MAX);
    assert_eq!(log.count(), (0, 0));
}

#[test]
fn virtual_streams_retain_only_the_last_value() {
    let log = small_log(4, 4);
    let walker = log.create_walker(selector("unbuffered 5"), false);

    push(&log, "unbuffered 5", 1, 10);
    push(&log, "unbuffered 5", 2, 20);

    assert_eq!(walker.count(), 1);
    assert_eq!(walker.pop().unwrap().value, 20);
    assert_eq!(walker.pop(), Err(Error::StreamEmpty));
    assert_eq!(log.inspect_last(stream("unbuffered 5"), false).unwrap().value, 20);
    assert_eq!(log.count(), (0, 0));
}

#[test]
fn unknown_virtual_stream_is_unresolved() {
    let log = small_log(4, 4);
    let unknown = stream("unbuffered 9");
    assert_eq!(
        log.inspect_last(unknown, false),
        Err(Error::UnresolvedStream { stream: unknown })
    );
}

#[test]
fn clear_keeps_allocating_ids_monotonically() {
    let log = small_log(8, 8);
    for _ in 0..5 {
        push(&log, "buffered 1", 0, 0);
    }
    let walker = log.create_walker(selector("buffered 1"), false);
    assert_eq!(walker.count(), 5);

    log.clear();
    assert_eq!(log.count(), (0, 0));
    assert_eq!(walker.count(), 0);
    assert_eq!(walker.pop(), Err(Error::StreamEmpty));
    assert_eq!(log.next_reading_id(), 6);

    push(&log, "buffered 1", 0, 9);
    assert_eq!(walker.pop().unwrap().reading_id, 6);
}

#[test]
fn seek_by_id_reports_exactness() {
    let log = small_log(8, 8);
    push(&log, "buffered 1", 0, 10); // id 1
    push(&log, "buffered 2", 0, 20); // id 2
    push(&log, "buffered 1", 0, 30); // id 3

    let walker = log.create_walker(selector("buffered 1"), false);
    assert_eq!(walker.seek(1, SeekTarget::Id), Ok(true));
    assert_eq!(walker.count(), 2);
    assert_eq!(walker.pop().unwrap().value, 10);

    // Id 2 exists but belongs to another stream.
    assert_eq!(walker.seek(2, SeekTarget::Id), Ok(false));
    assert_eq!(walker.pop().unwrap().value, 30);

    assert_eq!(
        walker.seek(4, SeekTarget::Id),
        Err(Error::UnresolvedReadingId { target: 4 })
    );
}

#[test]
fn snapshot_restore_round_trips() {
    let log = small_log(8, 8);
    push(&log, "buffered 1", 1, 10);
    push(&log, "unbuffered 2", 2, 20);
    push(&log, "constant 3", 0, 30);

    let snapshot = log.snapshot();

    let restored = small_log(8, 8);
    restored.restore(snapshot).unwrap();
    assert_eq!(restored.count(), log.count());
    assert_eq!(restored.next_reading_id(), log.next_reading_id());
    assert_eq!(restored.inspect_last(stream("unbuffered 2"), false).unwrap().value, 20);
    assert_eq!(restored.inspect_last(stream("constant 3"), false).unwrap().value, 30);

    let walker = restored.create_walker(selector("buffered 1"), false);
    assert_eq!(walker.pop().unwrap().value, 10);
}

proptest! {
    // For any push sequence into a rollover buffer of capacity C:
    // count <= C and the oldest live seq is max(0, pushed - C).
    #[test]
    fn rollover_buffer_bounds(values in proptest::collection::vec(any::<u32>(), 0..64), capacity in 1usize..16) {
        let log = small_log(4, capacity);
        let target = stream("buffered 1");
        for (tick, value) in values.iter().enumerate() {
            log.push(target, Reading::new(target, tick as u32, *value)).unwrap();
        }

        let (_, streaming) = log.count();
        prop_assert!(streaming <= capacity);
        prop_assert_eq!(streaming, values.len().min(capacity));

        let mut oldest_seq = None;
        log.scan(BufferKind::Streaming, |seq, _| {
            oldest_seq.get_or_insert(seq);
        });
        if let Some(seq) = oldest_seq {
            prop_assert_eq!(seq, values.len().saturating_sub(capacity) as u64);
        }
    }

    // A walker's count tracks matching pushes exactly, also across
    // rollovers that drop matching readings.
    #[test]
    fn walker_count_invariant(matches in proptest::collection::vec(any::<bool>(), 1..48), capacity in 1usize..8) {
        let log = small_log(4, capacity);
        let walker = log.create_walker(selector("buffered 1"), false);
        let mut live_matches = std::collections::VecDeque::new();

        for (tick, matching) in matches.iter().enumerate() {
            let target = if *matching { stream("buffered 1") } else { stream("buffered 2") };
            log.push(target, Reading::new(target, tick as u32, 0)).unwrap();
            live_matches.push_back(*matching);
            if live_matches.len() > capacity {
                live_matches.pop_front();
            }
            let expected = live_matches.iter().filter(|m| **m).count() as u32;
            prop_assert_eq!(walker.count(), expected);
        }
    }

    // A full fill-stop buffer rejects every further push and its contents
    // stay bit-identical.
    #[test]
    fn fill_stop_is_stable(extra in proptest::collection::vec(any::<u32>(), 1..16)) {
        let log = small_log(3, 4);
        log.set_rollover(BufferKind::Storage, false);
        let target = stream("input 1");
        for value in 0..3 {
            log.push(target, Reading::new(target, 0, value)).unwrap();
        }

        let before = collect(&log, BufferKind::Storage);
        for value in extra {
            prop_assert_eq!(
                log.push(target, Reading::new(target, 0, value)),
                Err(Error::StorageFull { buffer: BufferKind::Storage })
            );
        }
        prop_assert_eq!(collect(&log, BufferKind::Storage), before);
    }
}
