use std::sync::Arc;

use crate::models::audio_format::{Direction, StreamEncoding};
use crate::models::error::PlatformError;
use crate::models::stream_models::{EncodingType, LatencyMode, StreamEvent, StreamInfo, StreamState};

/// Render data callback: fill `buffer` with exactly `buffer.len()` bytes.
pub type RenderDataCallback = Arc<dyn Fn(&mut [u8]) + Send + Sync + 'static>;

/// Capture data callback: consume the captured bytes in `buffer`.
pub type CaptureDataCallback = Arc<dyn Fn(&[u8]) + Send + Sync + 'static>;

/// Stream event callback (routing changes, focus interrupts).
pub type StreamEventCallback = Arc<dyn Fn(StreamEvent) + Send + Sync + 'static>;

/// Asynchronous stream error callback.
pub type StreamErrorCallback = Arc<dyn Fn(PlatformError) + Send + Sync + 'static>;

/// Data callback matching the stream direction.
#[derive(Clone)]
pub enum DataCallback {
    Render(RenderDataCallback),
    Capture(CaptureDataCallback),
}

/// The three callback categories registered on a builder before the stream
/// is generated. The platform invokes them from its own threads.
#[derive(Clone)]
pub struct StreamCallbacks {
    pub data: DataCallback,
    pub on_event: StreamEventCallback,
    pub on_error: StreamErrorCallback,
}

/// Entry point of a platform audio API.
///
/// Implemented by:
/// - `VirtualPlatform` (software clock, used in tests and demos)
/// - Future: native OS stream backends
pub trait AudioPlatform: Send + Sync {
    type Builder: StreamBuilder<Stream = Self::Stream>;
    type Stream: AudioStream;

    /// Create a stream builder for one direction.
    fn create_builder(&self, direction: Direction) -> Result<Self::Builder, PlatformError>;
}

/// Collects stream parameters and produces a stream object.
///
/// The builder outlives the stream it generated and is destroyed last.
pub trait StreamBuilder: Send {
    type Stream: AudioStream;

    fn set_sampling_rate(&mut self, rate: u32) -> Result<(), PlatformError>;

    fn set_channel_count(&mut self, channels: u16) -> Result<(), PlatformError>;

    /// Rejecting the encoding with `PlatformError::Unsupported` makes `open`
    /// fail with `UnsupportedFormat`.
    fn set_sample_encoding(&mut self, encoding: StreamEncoding) -> Result<(), PlatformError>;

    fn set_latency_mode(&mut self, mode: LatencyMode) -> Result<(), PlatformError>;

    fn set_encoding_type(&mut self, encoding_type: EncodingType) -> Result<(), PlatformError>;

    fn set_stream_info(&mut self, info: StreamInfo) -> Result<(), PlatformError>;

    fn set_callbacks(&mut self, callbacks: StreamCallbacks) -> Result<(), PlatformError>;

    /// Construct the stream. A successful stream reports `StreamState::Prepared`.
    fn generate(&mut self) -> Result<Self::Stream, PlatformError>;

    fn destroy(self) -> Result<(), PlatformError>;
}

/// A platform stream object, exclusively owned by one device session.
pub trait AudioStream: Send {
    fn state(&self) -> StreamState;

    fn sampling_rate(&self) -> Result<u32, PlatformError>;

    fn channel_count(&self) -> Result<u16, PlatformError>;

    fn sample_encoding(&self) -> Result<StreamEncoding, PlatformError>;

    fn start(&mut self) -> Result<(), PlatformError>;

    fn pause(&mut self) -> Result<(), PlatformError>;

    fn stop(&mut self) -> Result<(), PlatformError>;

    /// Release the stream. After this returns, its callbacks never run again.
    fn release(self) -> Result<(), PlatformError>;
}
