use serde::Serialize;

use super::audio_format::{AudioSpec, Direction};
use super::error::BridgeError;

/// Counters kept by the playback handoff.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HandoffStats {
    /// Callbacks that received a committed frame.
    pub frames_delivered: u64,
    /// Callbacks that emitted silence (first callback, shutdown, underrun).
    pub silence_fills: u64,
    /// Callbacks that gave up waiting for the producer.
    pub underruns: u64,
}

/// Counters kept by the capture path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureStats {
    pub bytes_written: u64,
    pub bytes_read: u64,
    /// Device bytes discarded because the ring was shut down or not installed.
    pub bytes_dropped: u64,
}

/// Snapshot of a device session for debugging and support reports.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDiagnostics {
    pub session_id: String,
    pub direction: Direction,
    pub state: &'static str,
    pub opened_at: Option<String>,
    pub effective_spec: Option<AudioSpec>,
    pub byte_depth: usize,
    pub frame_size: Option<usize>,
    pub playback: Option<HandoffStats>,
    pub capture: Option<CaptureStats>,
    pub stream_errors: u64,
    pub last_error: Option<String>,
}

impl SessionDiagnostics {
    pub fn to_json(&self) -> Result<String, BridgeError> {
        serde_json::to_string_pretty(self)
            .map_err(|e| BridgeError::Device(format!("failed to serialize diagnostics: {}", e)))
    }
}
