mod common;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use audio_bridge_core::{
    AudioBridge, AudioSpec, BridgeConfig, BridgeError, DeviceState, Direction, InterruptHint,
    PlatformError, SampleFormat, StreamEvent, StreamState,
};
use audio_bridge_virtual::{
    DeviceProfile, FailPoint, PlatformCounters, StaticPermissions, VirtualPlatform,
};

use common::{fast_config, init_logging, session, session_with, Recorder};

fn spec() -> AudioSpec {
    AudioSpec::new(48000, SampleFormat::S16, 2, 256)
}

fn bridge(profile: DeviceProfile) -> (Arc<VirtualPlatform>, AudioBridge<VirtualPlatform>) {
    init_logging();
    let platform = Arc::new(VirtualPlatform::new(profile));
    let bridge = AudioBridge::new(
        Arc::clone(&platform),
        Arc::new(StaticPermissions::granted()),
        fast_config(),
    )
    .unwrap();
    (platform, bridge)
}

/// Start manual playback by pumping the first callback from another thread.
fn start_manual_playback(platform: &VirtualPlatform, bridge: &mut AudioBridge<VirtualPlatform>) {
    let driver = platform.driver(Direction::Playback).unwrap();
    let pump = thread::spawn(move || {
        driver.wait_for_state(StreamState::Running, Duration::from_secs(5));
        driver.pump_render()
    });
    bridge.start(Direction::Playback).unwrap();
    pump.join().unwrap().unwrap();
}

#[test]
fn suspend_pauses_and_resume_restarts_both_directions() {
    let (platform, mut bridge) = bridge(DeviceProfile::manual());
    bridge.open_device(Direction::Playback, &spec()).unwrap();
    bridge.open_device(Direction::Capture, &spec()).unwrap();
    start_manual_playback(&platform, &mut bridge);
    bridge.start(Direction::Capture).unwrap();

    let playback = platform.driver(Direction::Playback).unwrap();
    let capture = platform.driver(Direction::Capture).unwrap();

    bridge.pause_devices();
    for direction in [Direction::Playback, Direction::Capture] {
        let session = bridge.session(direction);
        assert_eq!(*session.state(), DeviceState::Paused);
        assert!(session.is_paused_for_lifecycle());
    }
    assert_eq!(playback.state(), StreamState::Paused);
    assert_eq!(capture.state(), StreamState::Paused);

    bridge.resume_devices();
    assert_eq!(*bridge.session(Direction::Playback).state(), DeviceState::Started);
    assert_eq!(*bridge.session(Direction::Capture).state(), DeviceState::Started);
    assert_eq!(playback.state(), StreamState::Running);
    assert_eq!(capture.state(), StreamState::Running);

    // data structures survived the round trip
    capture.pump_capture_bytes(&[5; 8]).unwrap();
    let mut out = [0u8; 8];
    bridge.capture_read(&mut out).unwrap();
    assert_eq!(out, [5; 8]);
}

#[test]
fn resume_leaves_stopped_devices_alone() {
    let (platform, mut bridge) = bridge(DeviceProfile::manual());
    bridge.open_device(Direction::Capture, &spec()).unwrap();
    bridge.start(Direction::Capture).unwrap();
    bridge.stop(Direction::Capture).unwrap();

    bridge.pause_devices();
    bridge.resume_devices();

    assert_eq!(*bridge.session(Direction::Capture).state(), DeviceState::Stopped);
    let driver = platform.driver(Direction::Capture).unwrap();
    assert_eq!(driver.state(), StreamState::Stopped);

    // playback was never opened
    assert_eq!(
        *bridge.session(Direction::Playback).state(),
        DeviceState::Uninitialized
    );
}

#[test]
fn lifecycle_paused_capture_is_not_restarted_by_reads() {
    let (platform, mut bridge) = bridge(DeviceProfile::manual());
    bridge.open_device(Direction::Capture, &spec()).unwrap();
    bridge.start(Direction::Capture).unwrap();
    let driver = platform.driver(Direction::Capture).unwrap();
    driver.pump_capture_bytes(&[4; 12]).unwrap();

    bridge.pause_devices();

    // buffered bytes are still readable; the stream stays paused
    let mut out = [0u8; 12];
    bridge.capture_read(&mut out).unwrap();
    assert_eq!(out, [4; 12]);
    assert_eq!(driver.state(), StreamState::Paused);
}

#[test]
fn stop_then_start_reuses_the_stream() {
    let (platform, mut bridge) = bridge(DeviceProfile::manual());
    bridge.open_device(Direction::Capture, &spec()).unwrap();
    bridge.start(Direction::Capture).unwrap();
    let driver = platform.driver(Direction::Capture).unwrap();
    driver.pump_capture_bytes(&[1; 10]).unwrap();

    bridge.stop(Direction::Capture).unwrap();
    assert!(driver.pump_capture_bytes(&[1; 10]).is_err());

    bridge.start(Direction::Capture).unwrap();
    assert_eq!(driver.state(), StreamState::Running);
    assert_eq!(platform.counters().streams_generated, 1);

    // restart flushed what was buffered before the stop
    driver.pump_capture_bytes(&[2; 4]).unwrap();
    let mut out = [0u8; 4];
    bridge.capture_read(&mut out).unwrap();
    assert_eq!(out, [2; 4]);
}

#[test]
fn generate_failure_rolls_back_and_session_reopens() {
    let (platform, mut session) = session(
        Direction::Playback,
        DeviceProfile::manual().failing(FailPoint::Generate),
    );
    let recorder = Arc::new(Recorder::default());
    session.set_delegate(recorder.clone());

    let err = session.open(&spec()).unwrap_err();
    assert!(matches!(err, BridgeError::Device(_)));
    assert_eq!(
        platform.counters(),
        PlatformCounters {
            builders_created: 1,
            builders_destroyed: 1,
            streams_generated: 0,
            streams_released: 0,
        }
    );
    assert_eq!(
        recorder.state_names(Direction::Playback),
        vec!["building", "configuring", "failed", "closed"]
    );

    platform.set_profile(DeviceProfile::manual());
    assert!(session.open(&spec()).is_ok());
    assert_eq!(*session.state(), DeviceState::Prepared);
}

#[test]
fn stream_not_prepared_is_released() {
    let (platform, mut session) = session(
        Direction::Capture,
        DeviceProfile::manual().failing(FailPoint::NotPrepared),
    );

    let err = session.open(&spec()).unwrap_err();
    assert!(matches!(err, BridgeError::Device(_)));
    assert_eq!(
        platform.counters(),
        PlatformCounters {
            builders_created: 1,
            builders_destroyed: 1,
            streams_generated: 1,
            streams_released: 1,
        }
    );
    assert!(session.spec().is_none());
}

#[test]
fn start_failure_closes_the_session() {
    let (platform, mut session) = session(
        Direction::Capture,
        DeviceProfile::manual().failing(FailPoint::Start),
    );
    session.open(&spec()).unwrap();

    assert!(matches!(session.start(), Err(BridgeError::Device(_))));
    assert_eq!(*session.state(), DeviceState::Closed);
    assert_eq!(platform.counters().streams_released, 1);
    assert!(session.capture_reader().is_err());
}

#[test]
fn close_is_idempotent_and_survives_teardown_errors() {
    let profile = DeviceProfile::manual()
        .failing(FailPoint::Release)
        .failing(FailPoint::Destroy);
    let (platform, mut session) = session(Direction::Capture, profile);
    session.open(&spec()).unwrap();
    session.start().unwrap();

    session.close();
    session.close();

    assert_eq!(*session.state(), DeviceState::Closed);
    let counters = platform.counters();
    assert_eq!(counters.streams_released, 1);
    assert_eq!(counters.builders_destroyed, 1);
}

#[test]
fn control_calls_out_of_order_are_rejected() {
    let (_platform, mut session) = session(Direction::Playback, DeviceProfile::manual());

    assert!(matches!(session.start(), Err(BridgeError::InvalidState(_))));
    assert!(matches!(session.stop(), Err(BridgeError::InvalidState(_))));
    assert!(matches!(
        session.playback_handle(),
        Err(BridgeError::InvalidState(_))
    ));

    session.open(&spec()).unwrap();
    assert!(matches!(
        session.open(&spec()),
        Err(BridgeError::InvalidState(_))
    ));
}

#[test]
fn invalid_spec_is_rejected_up_front() {
    let (platform, mut session) = session(Direction::Playback, DeviceProfile::manual());

    let err = session
        .open(&AudioSpec::new(48000, SampleFormat::S16, 0, 256))
        .unwrap_err();
    assert!(matches!(err, BridgeError::InvalidSpec(_)));
    assert_eq!(platform.counters().builders_created, 0);
}

#[test]
fn oversized_capture_headroom_fails_start_cleanly() {
    let config = BridgeConfig {
        capture_headroom_factor: usize::MAX,
        ..fast_config()
    };
    let (platform, mut session) = session_with(Direction::Capture, DeviceProfile::manual(), config);
    session.open(&spec()).unwrap();

    assert!(matches!(session.start(), Err(BridgeError::InvalidSpec(_))));
    assert_eq!(*session.state(), DeviceState::Closed);
    let counters = platform.counters();
    assert_eq!(counters.streams_released, 1);
    assert_eq!(counters.builders_destroyed, 1);
}

#[test]
fn invalid_config_is_rejected_by_the_bridge() {
    let config = BridgeConfig {
        capture_headroom_factor: 1,
        ..fast_config()
    };
    let result = AudioBridge::new(
        Arc::new(VirtualPlatform::default()),
        Arc::new(StaticPermissions::granted()),
        config,
    );
    assert!(matches!(result, Err(BridgeError::InvalidSpec(_))));
}

#[test]
fn stream_events_and_errors_reach_the_delegate() {
    let (platform, mut bridge) = bridge(DeviceProfile::manual());
    let recorder = Arc::new(Recorder::default());
    bridge.set_delegate(recorder.clone());

    bridge.open_device(Direction::Capture, &spec()).unwrap();
    bridge.start(Direction::Capture).unwrap();

    let driver = platform.driver(Direction::Capture).unwrap();
    driver.emit_event(StreamEvent::Interrupt(InterruptHint::Pause));
    driver.emit_event(StreamEvent::RoutingChanged);
    driver.emit_error(PlatformError::Failed {
        operation: "read",
        code: 7,
    });

    assert_eq!(
        *recorder.events.lock(),
        vec![
            (Direction::Capture, StreamEvent::Interrupt(InterruptHint::Pause)),
            (Direction::Capture, StreamEvent::RoutingChanged),
        ]
    );
    assert_eq!(recorder.errors.lock().len(), 1);
    assert_eq!(
        recorder.state_names(Direction::Capture),
        vec!["building", "configuring", "prepared", "started"]
    );

    let diagnostics = bridge.session(Direction::Capture).diagnostics();
    assert_eq!(diagnostics.stream_errors, 1);
    assert_eq!(diagnostics.state, "started");
}

#[test]
fn diagnostics_serialize_to_json() {
    let (_platform, mut session) = session(Direction::Capture, DeviceProfile::manual());
    session.open(&spec()).unwrap();
    session.start().unwrap();

    let json = session.diagnostics().to_json().unwrap();
    assert!(json.contains(&session.id().to_string()));
    assert!(json.contains("\"direction\": \"capture\""));
    assert!(json.contains("\"state\": \"started\""));
    assert!(json.contains("\"byte_depth\": 2"));
    assert!(session.diagnostics().opened_at.is_some());
}

#[test]
fn virtual_builder_sees_scenario_settings() {
    let (platform, mut bridge) = bridge(DeviceProfile::manual());
    bridge.open_device(Direction::Playback, &spec()).unwrap();
    bridge.open_device(Direction::Capture, &spec()).unwrap();

    use audio_bridge_core::{EncodingType, LatencyMode, SourceType, StreamInfo, StreamUsage};
    let playback = platform.driver(Direction::Playback).unwrap().params();
    assert_eq!(playback.info, Some(StreamInfo::Renderer(StreamUsage::Music)));
    assert_eq!(playback.encoding_type, Some(EncodingType::Raw));
    assert_eq!(playback.latency_mode, LatencyMode::Normal);

    let capture = platform.driver(Direction::Capture).unwrap().params();
    assert_eq!(capture.info, Some(StreamInfo::Capturer(SourceType::Mic)));

    bridge.close_all();
    assert_eq!(platform.counters().streams_released, 2);
}
