use std::sync::Arc;

use crate::models::audio_format::{AudioSpec, Direction};
use crate::models::config::BridgeConfig;
use crate::models::error::BridgeError;
use crate::session::device_session::DeviceSession;
use crate::session::handles::{CaptureReader, PlaybackHandle};
use crate::traits::device_delegate::DeviceDelegate;
use crate::traits::permission::PermissionBroker;
use crate::traits::platform::AudioPlatform;

/// Both directions of the bridge over one platform.
///
/// ```text
///                    ┌─▶ DeviceSession(playback) ─▶ PlaybackHandoff ─▶ render callback
/// AudioBridge ───────┤
///                    └─▶ DeviceSession(capture)  ◀─ CaptureRingBuffer ◀─ capture callback
/// ```
///
/// `pause_devices`/`resume_devices` are the process suspend/resume hooks and
/// act on both directions.
pub struct AudioBridge<P: AudioPlatform> {
    playback: DeviceSession<P>,
    capture: DeviceSession<P>,
}

impl<P: AudioPlatform> AudioBridge<P> {
    pub fn new(
        platform: Arc<P>,
        permissions: Arc<dyn PermissionBroker>,
        config: BridgeConfig,
    ) -> Result<Self, BridgeError> {
        config.validate().map_err(BridgeError::InvalidSpec)?;
        Ok(Self {
            playback: DeviceSession::new(
                Direction::Playback,
                Arc::clone(&platform),
                Arc::clone(&permissions),
                config.clone(),
            ),
            capture: DeviceSession::new(Direction::Capture, platform, permissions, config),
        })
    }

    pub fn set_delegate(&mut self, delegate: Arc<dyn DeviceDelegate>) {
        self.playback.set_delegate(Arc::clone(&delegate));
        self.capture.set_delegate(delegate);
    }

    pub fn session(&self, direction: Direction) -> &DeviceSession<P> {
        match direction {
            Direction::Playback => &self.playback,
            Direction::Capture => &self.capture,
        }
    }

    pub fn session_mut(&mut self, direction: Direction) -> &mut DeviceSession<P> {
        match direction {
            Direction::Playback => &mut self.playback,
            Direction::Capture => &mut self.capture,
        }
    }

    pub fn open_device(
        &mut self,
        direction: Direction,
        spec: &AudioSpec,
    ) -> Result<AudioSpec, BridgeError> {
        self.session_mut(direction).open(spec)
    }

    pub fn start(&mut self, direction: Direction) -> Result<(), BridgeError> {
        self.session_mut(direction).start()
    }

    pub fn stop(&mut self, direction: Direction) -> Result<(), BridgeError> {
        self.session_mut(direction).stop()
    }

    pub fn close(&mut self, direction: Direction) {
        self.session_mut(direction).close();
    }

    pub fn close_all(&mut self) {
        self.playback.close();
        self.capture.close();
    }

    /// Process is being suspended: pause whatever is running.
    pub fn pause_devices(&mut self) {
        log::info!("pausing audio devices");
        self.playback.pause_for_lifecycle();
        self.capture.pause_for_lifecycle();
    }

    /// Process is back: restart what `pause_devices` paused.
    pub fn resume_devices(&mut self) {
        log::info!("resuming audio devices");
        self.playback.resume_for_lifecycle();
        self.capture.resume_for_lifecycle();
    }

    pub fn playback_handle(&self) -> Result<PlaybackHandle, BridgeError> {
        self.playback.playback_handle()
    }

    pub fn capture_reader(&self) -> Result<CaptureReader, BridgeError> {
        self.capture.capture_reader()
    }

    pub fn capture_read(&mut self, buffer: &mut [u8]) -> Result<usize, BridgeError> {
        self.capture.capture_read(buffer)
    }

    pub fn flush_capture(&mut self) -> Result<(), BridgeError> {
        self.capture.flush_capture()
    }
}
