#![allow(dead_code)]

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use audio_bridge_core::{
    BridgeConfig, DeviceDelegate, DeviceSession, DeviceState, Direction, PlatformError,
    StreamEvent,
};
use audio_bridge_virtual::{DeviceProfile, StaticPermissions, VirtualPlatform};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn fast_config() -> BridgeConfig {
    BridgeConfig {
        poll_interval_ms: 1,
        ..Default::default()
    }
}

pub fn session(
    direction: Direction,
    profile: DeviceProfile,
) -> (Arc<VirtualPlatform>, DeviceSession<VirtualPlatform>) {
    session_with(direction, profile, fast_config())
}

pub fn session_with(
    direction: Direction,
    profile: DeviceProfile,
    config: BridgeConfig,
) -> (Arc<VirtualPlatform>, DeviceSession<VirtualPlatform>) {
    init_logging();
    let platform = Arc::new(VirtualPlatform::new(profile));
    let session = DeviceSession::new(
        direction,
        Arc::clone(&platform),
        Arc::new(StaticPermissions::granted()),
        config,
    );
    (platform, session)
}

/// Poll `done` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, done: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    done()
}

/// Delegate that keeps everything it is told.
#[derive(Default)]
pub struct Recorder {
    pub states: Mutex<Vec<(Direction, &'static str)>>,
    pub events: Mutex<Vec<(Direction, StreamEvent)>>,
    pub errors: Mutex<Vec<(Direction, PlatformError)>>,
}

impl Recorder {
    pub fn state_names(&self, direction: Direction) -> Vec<&'static str> {
        self.states
            .lock()
            .iter()
            .filter(|(d, _)| *d == direction)
            .map(|(_, s)| *s)
            .collect()
    }
}

impl DeviceDelegate for Recorder {
    fn on_state_changed(&self, direction: Direction, state: &DeviceState) {
        self.states.lock().push((direction, state.name()));
    }

    fn on_stream_event(&self, direction: Direction, event: StreamEvent) {
        self.events.lock().push((direction, event));
    }

    fn on_stream_error(&self, direction: Direction, error: &PlatformError) {
        self.errors.lock().push((direction, error.clone()));
    }
}
