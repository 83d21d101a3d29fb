//! # audio-bridge-core
//!
//! Platform-agnostic PCM audio bridge.
//!
//! Moves PCM between a multimedia library's audio thread and a platform's
//! callback-driven audio streams: a lock-free SPSC ring buffer for capture,
//! a one-frame blocking handoff for playback, and a per-direction device
//! session that builds, starts, pauses and tears down platform streams.
//! Platform backends implement the `AudioPlatform` traits and plug into the
//! generic `DeviceSession`/`AudioBridge`.
//!
//! ## Architecture
//!
//! ```text
//! audio-bridge-core (this crate)
//! ├── traits/       ← AudioPlatform, StreamBuilder, AudioStream, PermissionBroker, DeviceDelegate
//! ├── models/       ← BridgeError, DeviceState, BridgeConfig, AudioSpec, formats, diagnostics
//! ├── processing/   ← CaptureRingBuffer, PlaybackHandoff
//! └── session/      ← DeviceSession, AudioBridge, PlaybackHandle, CaptureReader
//! ```

pub mod models;
pub mod processing;
pub mod session;
pub mod traits;

// Re-export key types at crate root for convenience.
pub use models::audio_format::{negotiate_format, AudioSpec, Direction, SampleFormat, StreamEncoding};
pub use models::config::BridgeConfig;
pub use models::diagnostics::{CaptureStats, HandoffStats, SessionDiagnostics};
pub use models::error::{BridgeError, PlatformError};
pub use models::state::DeviceState;
pub use models::stream_models::{
    EncodingType, InterruptHint, LatencyMode, SourceType, StreamEvent, StreamInfo, StreamState,
    StreamUsage,
};
pub use processing::capture_ring::{CaptureRingBuffer, PollBackoff};
pub use processing::playback_handoff::{
    CallbackOutcome, FrameKind, FrameSize, PlaybackFrame, PlaybackHandoff, SilenceReason,
};
pub use session::bridge::AudioBridge;
pub use session::device_session::DeviceSession;
pub use session::handles::{CaptureReader, PlaybackHandle};
pub use traits::device_delegate::DeviceDelegate;
pub use traits::permission::PermissionBroker;
pub use traits::platform::{
    AudioPlatform, AudioStream, CaptureDataCallback, DataCallback, RenderDataCallback,
    StreamBuilder, StreamCallbacks, StreamErrorCallback, StreamEventCallback,
};
