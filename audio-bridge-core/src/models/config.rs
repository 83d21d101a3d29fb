use std::time::Duration;

use serde::Deserialize;

use super::error::BridgeError;
use super::stream_models::LatencyMode;

/// Tuning for the bridge, shared by both directions.
///
/// Every field has a default, so a JSON document only needs the keys it
/// overrides.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Sleep between capture ring polls while full/empty (default: 2).
    pub poll_interval_ms: u64,

    /// Polls before a blocked ring transfer gives up (None = until shutdown).
    pub max_poll_spins: Option<u32>,

    /// How long playback `start` waits for the first device callback
    /// (None = wait until close).
    pub first_callback_timeout_ms: Option<u64>,

    /// How long the device callback waits for the producer before emitting
    /// silence (None = wait for a frame or shutdown).
    pub callback_wait_ms: Option<u64>,

    /// How long the producer waits for the previous frame to drain
    /// (None = wait for drain or shutdown).
    pub producer_wait_ms: Option<u64>,

    /// Capture ring size in application buffers (default: 2).
    pub capture_headroom_factor: usize,

    /// Length of the detached playback buffer handed out when shutdown
    /// happens before the frame size was learned (default: 1024).
    pub fallback_frame_len: usize,

    /// Frames per buffer when the request leaves `samples` at 0.
    pub default_samples: u16,

    pub latency_mode: LatencyMode,

    /// Walk the fallback list when the requested format cannot be carried.
    pub allow_format_fallback: bool,

    /// Permission requested before opening a capture stream.
    pub capture_permission: String,
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_ms == 0 {
            return Err("poll interval must be positive".into());
        }
        if self.max_poll_spins == Some(0) {
            return Err("max poll spins must be positive when set".into());
        }
        if self.capture_headroom_factor < 2 {
            return Err(format!(
                "capture headroom factor must be at least 2, got {}",
                self.capture_headroom_factor
            ));
        }
        if self.fallback_frame_len == 0 {
            return Err("fallback frame length must be positive".into());
        }
        if self.default_samples == 0 {
            return Err("default samples must be positive".into());
        }
        Ok(())
    }

    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| BridgeError::InvalidSpec(format!("failed to parse config: {}", e)))?;
        config.validate().map_err(BridgeError::InvalidSpec)?;
        Ok(config)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn first_callback_timeout(&self) -> Option<Duration> {
        self.first_callback_timeout_ms.map(Duration::from_millis)
    }

    pub fn callback_wait(&self) -> Option<Duration> {
        self.callback_wait_ms.map(Duration::from_millis)
    }

    pub fn producer_wait(&self) -> Option<Duration> {
        self.producer_wait_ms.map(Duration::from_millis)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2,
            max_poll_spins: None,
            first_callback_timeout_ms: Some(2000),
            callback_wait_ms: None,
            producer_wait_ms: None,
            capture_headroom_factor: 2,
            fallback_frame_len: 1024,
            default_samples: 1024,
            latency_mode: LatencyMode::Normal,
            allow_format_fallback: true,
            capture_permission: "ohos.permission.MICROPHONE".into(),
        }
    }
}
