//! Software implementation of the platform stream API.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use audio_bridge_core::models::audio_format::{Direction, StreamEncoding};
use audio_bridge_core::models::error::PlatformError;
use audio_bridge_core::models::stream_models::{
    EncodingType, LatencyMode, StreamInfo, StreamState,
};
use audio_bridge_core::traits::platform::{
    AudioPlatform, DataCallback, StreamBuilder, StreamCallbacks,
};

use crate::virtual_stream::{StreamConfig, StreamDriver, StreamParams, VirtualStream};

/// What drives the data callbacks of started streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMode {
    /// A worker thread per running stream, paced by the sample rate.
    Realtime,
    /// Nothing runs until a `StreamDriver` pumps a period.
    Manual,
}

/// Failures the virtual platform can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailPoint {
    CreateBuilder,
    Generate,
    /// The generated stream reports `New` instead of `Prepared`.
    NotPrepared,
    Start,
    Stop,
    Release,
    Destroy,
    /// Render streams start but never invoke the data callback.
    SilentRender,
}

/// Capabilities and behaviour of the virtual device.
#[derive(Debug, Clone)]
pub struct DeviceProfile {
    /// Encodings the builder accepts.
    pub supported_encodings: Vec<StreamEncoding>,
    /// Negotiated rate regardless of the request.
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub encoding: Option<StreamEncoding>,
    /// Frames per data callback.
    pub period_frames: usize,
    pub clock: ClockMode,
    /// Frequency of the tone capture streams produce.
    pub tone_frequency: f32,
    /// Cap on rendered bytes kept for inspection.
    pub record_limit: usize,
    pub fail_points: HashSet<FailPoint>,
}

impl DeviceProfile {
    /// Default device driven by hand.
    pub fn manual() -> Self {
        Self {
            clock: ClockMode::Manual,
            ..Default::default()
        }
    }

    pub fn failing(mut self, point: FailPoint) -> Self {
        self.fail_points.insert(point);
        self
    }

    pub fn fails(&self, point: FailPoint) -> bool {
        self.fail_points.contains(&point)
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self {
            supported_encodings: vec![
                StreamEncoding::U8,
                StreamEncoding::S16Le,
                StreamEncoding::S32Le,
            ],
            sample_rate: None,
            channels: None,
            encoding: None,
            period_frames: 240,
            clock: ClockMode::Realtime,
            tone_frequency: 440.0,
            record_limit: 1 << 20,
            fail_points: HashSet::new(),
        }
    }
}

/// Object lifetimes seen by the platform, for leak checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlatformCounters {
    pub builders_created: usize,
    pub builders_destroyed: usize,
    pub streams_generated: usize,
    pub streams_released: usize,
}

/// In-process audio platform.
///
/// Streams either run on a software clock (`ClockMode::Realtime`) or are
/// pumped by tests through the `StreamDriver` of each generated stream.
pub struct VirtualPlatform {
    profile: Mutex<DeviceProfile>,
    counters: Arc<Mutex<PlatformCounters>>,
    drivers: Arc<Mutex<Vec<StreamDriver>>>,
}

impl VirtualPlatform {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile: Mutex::new(profile),
            counters: Arc::new(Mutex::new(PlatformCounters::default())),
            drivers: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn profile(&self) -> DeviceProfile {
        self.profile.lock().clone()
    }

    /// Applies to builders created afterwards.
    pub fn set_profile(&self, profile: DeviceProfile) {
        *self.profile.lock() = profile;
    }

    pub fn counters(&self) -> PlatformCounters {
        *self.counters.lock()
    }

    /// Driver of the most recently generated stream for `direction`.
    pub fn driver(&self, direction: Direction) -> Option<StreamDriver> {
        self.drivers
            .lock()
            .iter()
            .rev()
            .find(|d| d.direction() == direction)
            .cloned()
    }
}

impl Default for VirtualPlatform {
    fn default() -> Self {
        Self::new(DeviceProfile::default())
    }
}

impl AudioPlatform for VirtualPlatform {
    type Builder = VirtualStreamBuilder;
    type Stream = VirtualStream;

    fn create_builder(&self, direction: Direction) -> Result<VirtualStreamBuilder, PlatformError> {
        let profile = self.profile();
        if profile.fails(FailPoint::CreateBuilder) {
            return Err(PlatformError::Failed {
                operation: "create_builder",
                code: -1,
            });
        }
        self.counters.lock().builders_created += 1;
        log::debug!("virtual {} builder created", direction);

        Ok(VirtualStreamBuilder {
            direction,
            profile,
            counters: Arc::clone(&self.counters),
            drivers: Arc::clone(&self.drivers),
            sample_rate: None,
            channels: None,
            encoding: None,
            params: StreamParams::default(),
            callbacks: None,
        })
    }
}

/// Builder handed out by `VirtualPlatform::create_builder`.
pub struct VirtualStreamBuilder {
    direction: Direction,
    profile: DeviceProfile,
    counters: Arc<Mutex<PlatformCounters>>,
    drivers: Arc<Mutex<Vec<StreamDriver>>>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
    encoding: Option<StreamEncoding>,
    params: StreamParams,
    callbacks: Option<StreamCallbacks>,
}

impl StreamBuilder for VirtualStreamBuilder {
    type Stream = VirtualStream;

    fn set_sampling_rate(&mut self, rate: u32) -> Result<(), PlatformError> {
        if rate == 0 {
            return Err(PlatformError::Unsupported {
                operation: "set_sampling_rate",
                detail: "rate 0".into(),
            });
        }
        self.sample_rate = Some(rate);
        Ok(())
    }

    fn set_channel_count(&mut self, channels: u16) -> Result<(), PlatformError> {
        if !(1..=16).contains(&channels) {
            return Err(PlatformError::Unsupported {
                operation: "set_channel_count",
                detail: format!("{} channels", channels),
            });
        }
        self.channels = Some(channels);
        Ok(())
    }

    fn set_sample_encoding(&mut self, encoding: StreamEncoding) -> Result<(), PlatformError> {
        if !self.profile.supported_encodings.contains(&encoding) {
            return Err(PlatformError::Unsupported {
                operation: "set_sample_encoding",
                detail: format!("{:?}", encoding),
            });
        }
        self.encoding = Some(encoding);
        Ok(())
    }

    fn set_latency_mode(&mut self, mode: LatencyMode) -> Result<(), PlatformError> {
        self.params.latency_mode = mode;
        Ok(())
    }

    fn set_encoding_type(&mut self, encoding_type: EncodingType) -> Result<(), PlatformError> {
        self.params.encoding_type = Some(encoding_type);
        Ok(())
    }

    fn set_stream_info(&mut self, info: StreamInfo) -> Result<(), PlatformError> {
        let matches = match info {
            StreamInfo::Renderer(_) => self.direction == Direction::Playback,
            StreamInfo::Capturer(_) => self.direction == Direction::Capture,
        };
        if !matches {
            return Err(PlatformError::Unsupported {
                operation: "set_stream_info",
                detail: format!("{:?} on a {} builder", info, self.direction),
            });
        }
        self.params.info = Some(info);
        Ok(())
    }

    fn set_callbacks(&mut self, callbacks: StreamCallbacks) -> Result<(), PlatformError> {
        let matches = match callbacks.data {
            DataCallback::Render(_) => self.direction == Direction::Playback,
            DataCallback::Capture(_) => self.direction == Direction::Capture,
        };
        if !matches {
            return Err(PlatformError::Unsupported {
                operation: "set_callbacks",
                detail: format!("wrong data callback for a {} builder", self.direction),
            });
        }
        self.callbacks = Some(callbacks);
        Ok(())
    }

    fn generate(&mut self) -> Result<VirtualStream, PlatformError> {
        if self.profile.fails(FailPoint::Generate) {
            return Err(PlatformError::Failed {
                operation: "generate",
                code: -1,
            });
        }
        let callbacks = self.callbacks.clone().ok_or_else(|| PlatformError::IllegalState {
            operation: "generate",
            state: "no callbacks registered".into(),
        })?;

        let config = StreamConfig {
            direction: self.direction,
            sample_rate: self.profile.sample_rate.or(self.sample_rate).unwrap_or(48000),
            channels: self.profile.channels.or(self.channels).unwrap_or(2),
            encoding: self
                .profile
                .encoding
                .or(self.encoding)
                .unwrap_or(StreamEncoding::S16Le),
            period_frames: self.profile.period_frames.max(1),
            clock: self.profile.clock,
            tone_frequency: self.profile.tone_frequency,
            record_limit: self.profile.record_limit,
            fail_points: self.profile.fail_points.clone(),
            params: self.params,
        };
        let initial = if self.profile.fails(FailPoint::NotPrepared) {
            StreamState::New
        } else {
            StreamState::Prepared
        };

        log::debug!(
            "virtual {} stream generated: {} Hz, {} channels, {:?}",
            config.direction,
            config.sample_rate,
            config.channels,
            config.encoding
        );
        let stream = VirtualStream::new(config, callbacks, Arc::clone(&self.counters), initial);
        self.counters.lock().streams_generated += 1;
        self.drivers.lock().push(stream.driver());
        Ok(stream)
    }

    fn destroy(self) -> Result<(), PlatformError> {
        self.counters.lock().builders_destroyed += 1;
        log::debug!("virtual {} builder destroyed", self.direction);
        if self.profile.fails(FailPoint::Destroy) {
            return Err(PlatformError::Failed {
                operation: "destroy",
                code: -1,
            });
        }
        Ok(())
    }
}
