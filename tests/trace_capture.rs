//! Integration tests for waveform capture across whole transactions.

use kvsim::trace::write_vcd;
use kvsim::{
    ClockedModel, ContextConfig, ModelInstance, ModelVariant, SimContext, SimError,
    TraceDestination, TraceRecorder, TransactionDriver,
};

fn vcd_timestamps(vcd: &str) -> Vec<u64> {
    vcd.lines()
        .filter_map(|l| l.strip_prefix('#'))
        .map(|t| t.trim().parse().unwrap())
        .collect()
}

#[test]
fn test_trace_covers_every_cycle() {
    for variant in [ModelVariant::HashMap, ModelVariant::Kvs] {
        let ctx = SimContext::new(ContextConfig::new().with_trace(true));
        let mut model = ModelInstance::with_capacity(&ctx, variant, Some(64));
        let recorder = TraceRecorder::attach(&mut model, TraceDestination::Memory).unwrap();

        let mut driver = TransactionDriver::new(model);
        for key in 0..10 {
            driver.insert(key, key + 100).unwrap();
        }
        for key in 0..10 {
            assert_eq!(driver.lookup(key).unwrap(), Some(key + 100));
        }
        driver.delete(3).unwrap();
        driver.idle(4).unwrap();

        let snapshots = recorder.snapshots();
        assert_eq!(snapshots.len() as u64, driver.model().cycles());
        assert!(snapshots.windows(2).all(|w| w[0].time < w[1].time));
        assert_eq!(snapshots.last().unwrap().time, driver.model().now());

        // One snapshot per edge means no gaps at the clock period.
        let period = driver.model().clock_period();
        assert!(snapshots.windows(2).all(|w| w[1].time - w[0].time == period));

        let summary = recorder.close().unwrap();
        assert_eq!(summary.snapshots, snapshots.len());
        assert_eq!(summary.destination, TraceDestination::Memory);
    }
}

#[test]
fn test_trace_shows_handshake() {
    let ctx = SimContext::new(ContextConfig::new().with_trace(true));
    let mut model = ModelInstance::create(&ctx, ModelVariant::HashMap);
    let recorder = TraceRecorder::attach(&mut model, TraceDestination::Memory).unwrap();

    let mut driver = TransactionDriver::new(model);
    driver.insert(9, 90).unwrap();
    let value = driver.lookup(9).unwrap();
    assert_eq!(value, Some(90));

    let snapshots = recorder.snapshots();
    let first = snapshots[0].state;
    assert!(first.inputs.insert);
    assert_eq!(first.inputs.ins_key, 9);
    assert!(first.outputs.busy);

    let valid_edges = snapshots
        .iter()
        .filter(|s| s.state.inputs.lookup && s.state.outputs.valid && !s.state.outputs.busy)
        .count();
    assert_eq!(valid_edges, 1);
    assert!(snapshots.iter().any(|s| s.state.outputs.value == 90));
}

#[test]
fn test_trace_file_complete_after_close() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("waves.vcd");

    let ctx = SimContext::new(ContextConfig::new().with_trace(true));
    let mut model = ModelInstance::create(&ctx, ModelVariant::Kvs).with_clock_period(4);
    let recorder = TraceRecorder::attach(&mut model, TraceDestination::File(path.clone())).unwrap();

    let mut driver = TransactionDriver::new(model);
    driver.insert(1, 2).unwrap();
    let cycles = driver.model().cycles();
    recorder.close().unwrap();

    let vcd = std::fs::read_to_string(&path).unwrap();
    assert!(vcd.contains("$enddefinitions"));
    let times = vcd_timestamps(&vcd);
    assert_eq!(times.len() as u64, cycles * 2);
    assert_eq!(times[0], 4);
    assert_eq!(times[1], 6);
}

#[test]
fn test_trace_file_streams_during_run() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("live.vcd");

    let ctx = SimContext::new(ContextConfig::new().with_trace(true));
    let mut model = ModelInstance::with_capacity(&ctx, ModelVariant::HashMap, Some(16));
    let recorder = TraceRecorder::attach(&mut model, TraceDestination::File(path.clone())).unwrap();

    let header = std::fs::read_to_string(&path).unwrap();
    assert!(header.contains("$enddefinitions"));
    assert!(vcd_timestamps(&header).is_empty());

    let mut driver = TransactionDriver::new(model);
    for key in 0..5 {
        driver.insert(key, key).unwrap();
    }
    let cycles = driver.model().cycles();

    let live = std::fs::read_to_string(&path).unwrap();
    assert_eq!(vcd_timestamps(&live).len() as u64, cycles * 2);

    let summary = recorder.close().unwrap();
    assert_eq!(summary.snapshots as u64, cycles);
    assert_eq!(std::fs::read_to_string(&path).unwrap(), live);
}

#[test]
fn test_trace_disabled_context() {
    let ctx = SimContext::create();
    let mut model = ModelInstance::create(&ctx, ModelVariant::Kvs);
    let err = TraceRecorder::attach(&mut model, TraceDestination::Memory).unwrap_err();
    assert!(matches!(err, SimError::RecordingUnavailable));

    // The model still runs untraced.
    let mut driver = TransactionDriver::new(model);
    driver.insert(1, 1).unwrap();
    assert!(!driver.model().is_traced());
}

#[test]
fn test_write_vcd_empty() {
    let mut buf = Vec::new();
    write_vcd(&mut buf, "hashmap", &[]).unwrap();
    let vcd = String::from_utf8(buf).unwrap();
    assert!(vcd.contains("$scope module hashmap $end"));
    assert!(vcd_timestamps(&vcd).is_empty());
}
