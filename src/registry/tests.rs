use super::*;
use crate::device::{connect, EngineSettings};
use crate::io::mock::{eventually, ScriptedBus, ScriptedIo};
use crate::sink::recording::{RecordingSink, SinkEvent};
use std::time::Duration;

const PAD0: &str = r"\\.\FireShock0";
const PAD1: &str = r"\\.\FireShock1";
const DEVICE: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];
const HOST: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

fn settings() -> EngineSettings {
    EngineSettings {
        output_interval: Duration::from_millis(5),
        read_buffer_size: 64,
    }
}

/// Minimal DS3 report whose second byte tags it
fn ds3_report(seq: u8) -> Vec<u8> {
    let mut report = vec![0u8; 49];
    report[0] = 0x01;
    report[1] = seq;
    report[6] = 0x80;
    report[7] = 0x80;
    report
}

async fn register(registry: &DeviceRegistry, bus: &ScriptedBus, path: &str) -> DeviceIdentity {
    let engine = connect(path, bus, settings()).unwrap();
    registry.register(engine).await.unwrap()
}

fn plugged(bus: &ScriptedBus, path: &str) -> Arc<ScriptedIo> {
    let io = Arc::new(ScriptedIo::dualshock3(DEVICE, HOST));
    bus.plug(path, io.clone());
    io
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn lifecycle_reaches_sink_in_order() {
    let sink = Arc::new(RecordingSink::default());
    let registry = DeviceRegistry::new(sink.clone());
    let bus = ScriptedBus::default();
    let io = plugged(&bus, PAD0);

    let identity = register(&registry, &bus, PAD0).await;
    assert_eq!(identity.client_address.to_string(), "AA:BB:CC:DD:EE:FF");
    assert_eq!(registry.paths().await, vec![PAD0.to_string()]);

    io.push_report(ds3_report(1));
    io.push_report(ds3_report(2));
    eventually("two reports", || sink.reports_for(PAD0).len() == 2).await;

    io.unplug();
    eventually("removal", || sink.count_removed(PAD0) == 1).await;
    assert!(!registry.contains(PAD0).await);

    let events = sink.events();
    assert_eq!(events.first(), Some(&SinkEvent::Arrived(PAD0.to_string())));
    assert_eq!(events.last(), Some(&SinkEvent::Removed(PAD0.to_string())));
    assert_eq!(events.len(), 4);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn second_engine_for_a_path_is_disposed() {
    let sink = Arc::new(RecordingSink::default());
    let registry = DeviceRegistry::new(sink.clone());

    let first_bus = ScriptedBus::default();
    let first = plugged(&first_bus, PAD0);
    register(&registry, &first_bus, PAD0).await;

    let second_bus = ScriptedBus::default();
    let second = plugged(&second_bus, PAD0);
    let engine = connect(PAD0, &second_bus, settings()).unwrap();
    let err = registry.register(engine).await.unwrap_err();

    assert!(matches!(err, RegistryError::AlreadyRegistered(ref p) if p == PAD0));
    assert_eq!(second.close_count(), 1);
    assert_eq!(first.close_count(), 0);
    assert_eq!(registry.len().await, 1);
    assert!(registry.get(PAD0).await.unwrap().is_active());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn path_can_be_registered_again_after_removal() {
    let sink = Arc::new(RecordingSink::default());
    let registry = DeviceRegistry::new(sink.clone());

    let bus = ScriptedBus::default();
    let old = plugged(&bus, PAD0);
    register(&registry, &bus, PAD0).await;
    old.unplug();
    eventually("removal", || sink.count_removed(PAD0) == 1).await;
    assert!(!registry.contains(PAD0).await);

    let fresh_bus = ScriptedBus::default();
    let fresh = plugged(&fresh_bus, PAD0);
    register(&registry, &fresh_bus, PAD0).await;
    fresh.push_report(ds3_report(9));

    eventually("report from new device", || {
        sink.reports_for(PAD0).iter().any(|r| r[1] == 9)
    })
    .await;
    assert_eq!(sink.count_removed(PAD0), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn misbehaving_sink_does_not_stop_delivery() {
    let sink = Arc::new(RecordingSink::misbehaving());
    let registry = DeviceRegistry::new(sink.clone());
    let bus = ScriptedBus::default();
    let io = plugged(&bus, PAD0);

    register(&registry, &bus, PAD0).await;
    for seq in 0..10 {
        io.push_report(ds3_report(seq));
    }

    eventually("all reports", || sink.reports_for(PAD0).len() == 10).await;
    assert!(registry.get(PAD0).await.unwrap().is_active());

    io.unplug();
    eventually("removal", || sink.count_removed(PAD0) == 1).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn undecodable_reports_are_dropped() {
    let sink = Arc::new(RecordingSink::default());
    let registry = DeviceRegistry::new(sink.clone());
    let bus = ScriptedBus::default();
    let io = plugged(&bus, PAD0);

    register(&registry, &bus, PAD0).await;
    io.push_report(vec![0x01, 0x02]);
    io.push_report(vec![0x42; 49]);
    io.push_report(ds3_report(3));

    eventually("valid report", || !sink.reports_for(PAD0).is_empty()).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(sink.reports_for(PAD0), vec![ds3_report(3)]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_removes_every_device_once() {
    let sink = Arc::new(RecordingSink::default());
    let registry = DeviceRegistry::new(sink.clone());
    let bus = ScriptedBus::default();
    let pad0 = plugged(&bus, PAD0);
    let pad1 = plugged(&bus, PAD1);

    register(&registry, &bus, PAD0).await;
    register(&registry, &bus, PAD1).await;
    assert_eq!(registry.identities().await.len(), 2);

    registry.shutdown().await;

    assert!(registry.is_empty().await);
    assert_eq!(sink.count_removed(PAD0), 1);
    assert_eq!(sink.count_removed(PAD1), 1);
    assert_eq!(pad0.close_count(), 1);
    assert_eq!(pad1.close_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn commands_route_by_path() {
    let sink = Arc::new(RecordingSink::default());
    let registry = DeviceRegistry::new(sink.clone());
    let bus = ScriptedBus::default();
    let io = plugged(&bus, PAD0);
    register(&registry, &bus, PAD0).await;

    registry.rumble(PAD0, 0x40, 0).await.unwrap();
    eventually("rumble write", || io.writes().iter().any(|w| w[4] == 0x40)).await;

    let host: BdAddr = "01:02:03:04:05:06".parse().unwrap();
    registry.pair_to(PAD0, host).await.unwrap();
    assert_eq!(registry.identities().await[0].host_address, host);

    assert!(matches!(
        registry.set_leds(PAD1, 1).await,
        Err(RegistryError::NotFound(_))
    ));
    assert!(matches!(
        registry.pair_to(PAD1, host).await,
        Err(RegistryError::NotFound(_))
    ));
}

#[tokio::test]
async fn blocking_sink_stalls_only_its_own_device() {
    let sink = Arc::new(RecordingSink::default());
    let registry = DeviceRegistry::new(sink.clone());
    let bus = ScriptedBus::default();
    let slow = plugged(&bus, PAD0);
    let fast = plugged(&bus, PAD1);

    sink.stall_reports_for(PAD0);
    register(&registry, &bus, PAD0).await;
    slow.push_report(ds3_report(1));

    // Runtime stays free while PAD0's sink call is parked
    register(&registry, &bus, PAD1).await;
    fast.push_report(ds3_report(2));
    eventually("report from the other device", || {
        sink.reports_for(PAD1).len() == 1
    })
    .await;
    assert!(sink.reports_for(PAD0).is_empty());

    sink.release();
    eventually("stalled report", || sink.reports_for(PAD0).len() == 1).await;
    registry.shutdown().await;
}
