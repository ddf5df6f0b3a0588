use scroller::link::{TransportKind, WiredStatus, WirelessStatus};
use scroller::runtime::ScrollerSettings;
use scroller::scroll::{COARSE_DIVISOR, FINE_DIVISOR};
use scroller::sensor::scripted::ScriptedSensor;
use scroller::transport::bridge::{bridge, BridgeLink};
use scroller::transport::report::{RESET_FEATURE_ID, RESOLUTION_FEATURE_ID, WHEEL_REPORT_ID};
use scroller::transport::Transport;
use scroller::ScrollerHandle;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

struct Bench {
    handle: ScrollerHandle,
    sensor: Arc<ScriptedSensor>,
    links: Vec<BridgeLink>,
}

fn bench(kinds: &[TransportKind], rest_at: u16) -> Bench {
    let sensor = Arc::new(ScriptedSensor::resting(rest_at));
    let mut transports: Vec<Arc<dyn Transport>> = Vec::new();
    let mut links = Vec::new();
    for (i, kind) in kinds.iter().enumerate() {
        let (transport, link) = bridge(format!("link{i}"), *kind, 16);
        transports.push(Arc::new(transport));
        links.push(link);
    }
    let handle = ScrollerHandle::spawn(ScrollerSettings::default(), sensor.clone(), transports)
        .expect("scroller should start");
    Bench {
        handle,
        sensor,
        links,
    }
}

async fn next_wheel(link: &mut BridgeLink) -> Option<i16> {
    timeout(Duration::from_secs(1), link.next_report())
        .await
        .ok()
        .flatten()
        .map(|report| {
            assert_eq!(report.report_id, WHEEL_REPORT_ID);
            report.wheel
        })
}

#[tokio::test(start_paused = true)]
async fn configured_usb_link_receives_wheel_reports() {
    let mut bench = bench(&[TransportKind::Wired], 1000);
    let usb = bench.handle.transports()[0];
    let coordinator = bench.handle.coordinator().clone();

    coordinator.on_wired_status(usb, WiredStatus::Connected).unwrap();
    coordinator.on_wired_status(usb, WiredStatus::Configured).unwrap();
    sleep(Duration::from_millis(20)).await;

    // One coarse detent is 120 counts.
    bench.sensor.set_position(880);
    assert_eq!(next_wheel(&mut bench.links[0]).await, Some(-1));

    bench
        .handle
        .feature_reports()
        .on_feature_write(RESOLUTION_FEATURE_ID, &[1])
        .unwrap();
    assert_eq!(bench.handle.scroll_config().snapshot().divisor, FINE_DIVISOR);

    bench.sensor.set_position(893);
    assert_eq!(next_wheel(&mut bench.links[0]).await, Some(13));

    bench.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn suspended_link_gets_nothing_until_resumed() {
    let mut bench = bench(&[TransportKind::Wired], 2000);
    let usb = bench.handle.transports()[0];
    let coordinator = bench.handle.coordinator().clone();
    bench
        .handle
        .feature_reports()
        .on_feature_write(RESOLUTION_FEATURE_ID, &[1])
        .unwrap();

    coordinator.on_wired_status(usb, WiredStatus::Configured).unwrap();
    coordinator.on_wired_status(usb, WiredStatus::Suspend).unwrap();
    assert!(!coordinator.sampler_running());
    assert_eq!(coordinator.sender_running(usb), Some(false));

    bench.sensor.set_position(2050);
    sleep(Duration::from_millis(200)).await;
    assert!(bench.links[0].try_next_report().is_none());

    coordinator.on_wired_status(usb, WiredStatus::Resume).unwrap();
    assert!(coordinator.sampler_running());
    sleep(Duration::from_millis(20)).await;

    // Movement made while suspended is not replayed.
    assert!(bench.links[0].try_next_report().is_none());
    bench.sensor.set_position(2045);
    assert_eq!(next_wheel(&mut bench.links[0]).await, Some(-5));

    bench.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn every_deliverable_link_gets_its_own_copy() {
    let mut bench = bench(&[TransportKind::Wired, TransportKind::Wireless], 100);
    let (usb, ble) = (bench.handle.transports()[0], bench.handle.transports()[1]);
    let coordinator = bench.handle.coordinator().clone();
    bench
        .handle
        .feature_reports()
        .on_feature_write(RESOLUTION_FEATURE_ID, &[1])
        .unwrap();

    coordinator.on_wired_status(usb, WiredStatus::Configured).unwrap();
    coordinator
        .on_wireless_status(ble, WirelessStatus::Connected)
        .unwrap();
    sleep(Duration::from_millis(20)).await;

    bench.sensor.set_position(90);
    assert_eq!(next_wheel(&mut bench.links[0]).await, Some(-10));
    assert_eq!(next_wheel(&mut bench.links[1]).await, Some(-10));

    coordinator.on_wired_status(usb, WiredStatus::Disconnected).unwrap();
    assert!(coordinator.sampler_running());
    bench.sensor.set_position(80);
    assert_eq!(next_wheel(&mut bench.links[1]).await, Some(-10));
    sleep(Duration::from_millis(50)).await;
    assert!(bench.links[0].try_next_report().is_none());

    bench.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn motion_while_idle_wakes_the_wireless_link() {
    let mut bench = bench(&[TransportKind::Wireless], 500);
    let ble = bench.handle.transports()[0];
    let coordinator = bench.handle.coordinator().clone();
    assert!(coordinator.is_idle());

    // First idle poll happens after the initial delay.
    sleep(Duration::from_millis(600)).await;
    bench.sensor.set_position(560);
    timeout(Duration::from_secs(2), bench.links[0].wakeup_requested())
        .await
        .expect("wheel motion should request a wakeup");
    assert!(!coordinator.is_idle());

    coordinator
        .on_wireless_status(ble, WirelessStatus::AdvertisingStarted)
        .unwrap();
    coordinator
        .on_wireless_status(ble, WirelessStatus::Connected)
        .unwrap();
    assert!(coordinator.sampler_running());
    sleep(Duration::from_millis(20)).await;

    bench.sensor.set_position(440);
    assert_eq!(next_wheel(&mut bench.links[0]).await, Some(-1));

    bench.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unanswered_wake_powers_down_again() {
    let bench = bench(&[TransportKind::Wireless], 0);
    let coordinator = bench.handle.coordinator().clone();

    sleep(Duration::from_millis(600)).await;
    bench.sensor.set_position(100);
    timeout(Duration::from_secs(2), bench.links[0].wakeup_requested())
        .await
        .unwrap();
    assert!(!coordinator.is_idle());

    sleep(Duration::from_secs(31)).await;
    assert!(coordinator.is_idle());

    bench.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn bus_reset_and_reset_report_restore_coarse_scrolling() {
    let bench = bench(&[TransportKind::Wired], 0);
    let usb = bench.handle.transports()[0];
    let coordinator = bench.handle.coordinator().clone();
    let features = bench.handle.feature_reports();

    features.on_feature_write(RESOLUTION_FEATURE_ID, &[1]).unwrap();
    assert_eq!(features.read_feature(RESOLUTION_FEATURE_ID).unwrap(), vec![1]);
    coordinator.on_wired_status(usb, WiredStatus::Reset).unwrap();
    assert_eq!(bench.handle.scroll_config().snapshot().divisor, COARSE_DIVISOR);
    assert_eq!(features.read_feature(RESOLUTION_FEATURE_ID).unwrap(), vec![0]);

    features.on_feature_write(RESOLUTION_FEATURE_ID, &[1]).unwrap();
    features.on_feature_write(RESET_FEATURE_ID, &[]).unwrap();
    assert_eq!(bench.handle.scroll_config().snapshot().divisor, COARSE_DIVISOR);
    assert!(features.on_feature_write(RESOLUTION_FEATURE_ID, &[]).is_err());

    bench.handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn core_stays_idle_without_transports() {
    let sensor = Arc::new(ScriptedSensor::resting(0));
    let handle = ScrollerHandle::spawn(ScrollerSettings::default(), sensor.clone(), Vec::new())
        .expect("scroller should start without transports");
    let coordinator = handle.coordinator().clone();
    assert!(handle.transports().is_empty());
    assert!(coordinator.is_idle());
    assert!(!coordinator.sampler_running());

    sleep(Duration::from_secs(2)).await;
    let reads = sensor.reads();
    assert!(reads > 1, "idle monitor should keep polling the sensor");

    // A wake with nobody to answer it falls back to idle.
    sensor.set_position(300);
    timeout(Duration::from_secs(3), async {
        while coordinator.is_idle() {
            sleep(Duration::from_millis(50)).await;
        }
    })
    .await
    .expect("wheel motion should leave idle");
    assert!(!coordinator.sampler_running());

    sleep(Duration::from_secs(31)).await;
    assert!(coordinator.is_idle());
    assert!(sensor.reads() > reads);

    handle.shutdown().await;
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !done() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn failed_wired_gadget_leaves_wireless_link_running() {
    use scroller::transport::bridge_socket::{
        FRAME_FEATURE, FRAME_GET_FEATURE, FRAME_REPORT, FRAME_SET_FEATURE, FRAME_STATUS,
    };
    use scroller::transport::setup::TransportSet;
    use scroller::transport::{WiredSettings, WirelessSettings};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixStream;

    let dir = std::env::temp_dir().join(format!("scroller-bridge-{}", std::process::id()));
    let wired = WiredSettings {
        device: dir.join("hidg-missing"),
        udc: "udc-missing".to_string(),
        ..WiredSettings::default()
    };
    let wireless = WirelessSettings {
        socket: dir.join("ble.sock"),
        ..WirelessSettings::default()
    };

    let set = TransportSet::open(&wired, &wireless).await;
    assert_eq!(set.len(), 1);

    let sensor = Arc::new(ScriptedSensor::resting(1000));
    let handle = ScrollerHandle::spawn(ScrollerSettings::default(), sensor.clone(), set.transports())
        .expect("scroller should start with the wireless link alone");
    let coordinator = handle.coordinator().clone();
    let link_tasks = set.attach(&handle);
    assert!(coordinator.is_idle());

    let mut stack = UnixStream::connect(&wireless.socket).await.unwrap();
    stack
        .write_all(&[
            FRAME_STATUS,
            WirelessStatus::Connected.code(),
            FRAME_SET_FEATURE,
            RESOLUTION_FEATURE_ID,
            1,
            1,
        ])
        .await
        .unwrap();
    wait_until("link connected", || coordinator.sampler_running()).await;
    wait_until("fine resolution", || {
        handle.scroll_config().snapshot().divisor == FINE_DIVISOR
    })
    .await;
    sleep(Duration::from_millis(100)).await;

    sensor.set_position(990);
    let mut frame = [0u8; 4];
    timeout(Duration::from_secs(1), stack.read_exact(&mut frame))
        .await
        .expect("report frame")
        .unwrap();
    assert_eq!(frame, [FRAME_REPORT, WHEEL_REPORT_ID, 0xF6, 0xFF]);

    stack
        .write_all(&[FRAME_GET_FEATURE, RESOLUTION_FEATURE_ID])
        .await
        .unwrap();
    let mut reply = [0u8; 4];
    timeout(Duration::from_secs(1), stack.read_exact(&mut reply))
        .await
        .expect("feature frame")
        .unwrap();
    assert_eq!(reply, [FRAME_FEATURE, RESOLUTION_FEATURE_ID, 1, 1]);

    drop(stack);
    wait_until("link dropped", || !coordinator.any_deliverable()).await;
    assert!(!coordinator.sampler_running());

    for task in link_tasks {
        task.abort();
    }
    handle.shutdown().await;
    let _ = std::fs::remove_dir_all(&dir);
}
