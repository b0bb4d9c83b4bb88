use pretty_assertions::assert_eq;

use sensorgraph::config::{config_ids, ConfigValue};
use sensorgraph::{ProcessorRegistry, SensorGraph, Slot};
use sensorgraph_controller::{pack_error, PackedError, RawSensorLog, ResetConfig, SensorLogError, Subsystem};
use sensorgraph_log::SensorLog;
use sensorgraph_primitives::{DeviceModel, StreamId};

fn small_log(storage: usize, streaming: usize) -> SensorLog {
    SensorLog::open(&DeviceModel {
        max_storage_buffer: storage,
        max_streaming_buffer: streaming,
        ..DeviceModel::default()
    })
}

fn rsl_error(code: SensorLogError) -> PackedError {
    pack_error(Subsystem::SensorLog, code)
}

#[test]
fn fill_stop_storage_reports_ring_buffer_full() {
    let mut rsl = RawSensorLog::new(small_log(2, 16));
    rsl.clear_to_reset(ResetConfig {
        storage_fillstop: true,
        streaming_fillstop: false,
    });

    assert_eq!(rsl.push_reading(1, 0x100A), PackedError::NO_ERROR);
    assert_eq!(rsl.push_reading(2, 0x100A), PackedError::NO_ERROR);
    let err = rsl.push_reading(3, 0x100A);
    assert_eq!(err, rsl_error(SensorLogError::RingBufferFull));
    assert_eq!(err.word(), 0x0600_0001);

    let (err, storage, streaming) = rsl.count_readings();
    assert!(err.is_ok());
    // Each stored important reading also left a copy on its output stream.
    assert_eq!((storage, streaming), (2, 2));
}

#[test]
fn push_many_reports_the_partial_count() {
    let mut rsl = RawSensorLog::new(small_log(2, 16));
    rsl.clear_to_reset(ResetConfig {
        storage_fillstop: true,
        streaming_fillstop: false,
    });

    let (err, stored) = rsl.push_many_readings(9, 5, 0x100A);
    assert_eq!(err, rsl_error(SensorLogError::RingBufferFull));
    assert_eq!(stored, 2);
}

#[test]
fn clear_pushes_the_data_cleared_marker() {
    let mut rsl = RawSensorLog::new(small_log(16, 16));
    let (err, count) = rsl.push_many_readings(0, 5, 0x5001);
    assert!(err.is_ok());
    assert_eq!(count, 5);

    rsl.set_uptime(500);
    assert!(rsl.clear_readings().is_ok());

    // The marker keeps the id high-water mark: five data ids then the marker.
    let (err, highest) = rsl.highest_reading_id();
    assert!(err.is_ok());
    assert_eq!(highest, 6);
    assert_eq!(rsl.subsystem().log().next_reading_id(), 7);

    let (_, storage, streaming) = rsl.count_readings();
    assert_eq!((storage, streaming), (0, 1));
}

#[test]
fn pushed_readings_carry_the_controller_uptime() {
    let mut rsl = RawSensorLog::new(small_log(16, 16));
    rsl.set_uptime(77);
    assert!(rsl.push_reading(5, 0x5001).is_ok());

    let stream: StreamId = "0x5001".parse().unwrap();
    let reading = rsl.subsystem().log().inspect_last(stream, false).unwrap();
    assert_eq!((reading.raw_time, reading.value), (77, 5));
}

#[test]
fn invalid_stream_ids_are_rejected_with_a_code() {
    let mut rsl = RawSensorLog::new(small_log(4, 4));
    assert_eq!(rsl.push_reading(1, 0x0001), rsl_error(SensorLogError::InvalidStreamId));
    let (err, _, _, _) = rsl.dump_stream_begin(0x7001);
    assert_eq!(err, rsl_error(SensorLogError::InvalidStreamId));
}

#[test]
fn inspect_virtual_stream_behaviors() {
    let mut rsl = RawSensorLog::new(small_log(4, 4));

    // Buffered streams have no virtual slot.
    assert_eq!(
        rsl.inspect_virtual_stream(0x5001),
        (rsl_error(SensorLogError::VirtualStreamNotFound), 0)
    );
    // Unknown virtual stream.
    assert_eq!(
        rsl.inspect_virtual_stream(0x2005),
        (rsl_error(SensorLogError::VirtualStreamNotFound), 0)
    );

    assert!(rsl.push_reading(42, 0x2005).is_ok());
    assert_eq!(rsl.inspect_virtual_stream(0x2005), (PackedError::NO_ERROR, 42));
}

#[test]
fn dump_stream_walks_seek_and_drain() {
    let mut rsl = RawSensorLog::new(small_log(16, 16));
    assert!(rsl.push_reading(10, 0x5001).is_ok()); // id 1
    assert!(rsl.push_reading(20, 0x5002).is_ok()); // id 2
    assert!(rsl.push_reading(30, 0x5001).is_ok()); // id 3

    // No dump begun yet.
    let (err, _, _) = rsl.dump_stream_seek(1);
    assert_eq!(err, rsl_error(SensorLogError::StreamWalkerNotInitialized));
    let (err, ..) = rsl.dump_stream_next(1);
    assert_eq!(err, rsl_error(SensorLogError::StreamWalkerNotInitialized));

    let (err, err2, count, _uptime) = rsl.dump_stream_begin(0x5001);
    assert!(err.is_ok() && err2.is_ok());
    assert_eq!(count, 2);

    // Id 2 exists but belongs to stream 0x5002.
    let (err, err2, remaining) = rsl.dump_stream_seek(2);
    assert_eq!(err, rsl_error(SensorLogError::IdFoundForAnotherStream));
    assert!(err2.is_ok());
    assert_eq!(remaining, 1);

    // Seeking past everything stored.
    let (err, _, remaining) = rsl.dump_stream_seek(100);
    assert_eq!(err, rsl_error(SensorLogError::NoMoreReadings));
    assert_eq!(remaining, 0);

    // Back to the exact first reading, then drain.
    let (err, _, remaining) = rsl.dump_stream_seek(1);
    assert!(err.is_ok());
    assert_eq!(remaining, 2);

    let (err, raw_time, value, reading_id, stream_id, reserved) = rsl.dump_stream_next(1);
    assert!(err.is_ok());
    assert_eq!((raw_time, value, reading_id, stream_id, reserved), (0, 10, 1, 0x5001, 0));
    let (err, _, value, reading_id, stream_id, _) = rsl.dump_stream_next(1);
    assert!(err.is_ok());
    assert_eq!((value, reading_id, stream_id), (30, 3, 0x5001));

    let (err, ..) = rsl.dump_stream_next(1);
    assert_eq!(err, rsl_error(SensorLogError::NoMoreReadings));
}

#[test]
fn dump_next_requires_the_extended_format() {
    let mut rsl = RawSensorLog::new(small_log(4, 4));
    rsl.dump_stream_begin(0x5001);
    let (err, ..) = rsl.dump_stream_next(0);
    assert_eq!(err, rsl_error(SensorLogError::UnsupportedOutputFormat));
}

#[test]
fn reset_config_reads_controller_config_variables() {
    let log = small_log(4, 4);
    let mut graph = SensorGraph::new(log, ProcessorRegistry::default());
    assert_eq!(ResetConfig::from_graph(&graph), ResetConfig::default());

    graph.add_config(Slot::Controller, config_ids::STORAGE_FILLSTOP, ConfigValue::U8(1));
    assert_eq!(
        ResetConfig::from_graph(&graph),
        ResetConfig {
            storage_fillstop: true,
            streaming_fillstop: false,
        }
    );
}
