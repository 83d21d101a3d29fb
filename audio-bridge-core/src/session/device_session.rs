use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::audio_format::{negotiate_format, AudioSpec, Direction};
use crate::models::config::BridgeConfig;
use crate::models::diagnostics::SessionDiagnostics;
use crate::models::error::{BridgeError, PlatformError};
use crate::models::state::DeviceState;
use crate::models::stream_models::{
    EncodingType, SourceType, StreamEvent, StreamInfo, StreamState, StreamUsage,
};
use crate::processing::capture_ring::{CaptureRingBuffer, PollBackoff};
use crate::processing::playback_handoff::{FrameSize, PlaybackFrame, PlaybackHandoff};
use crate::session::handles::{CaptureReader, PlaybackHandle};
use crate::traits::device_delegate::DeviceDelegate;
use crate::traits::permission::PermissionBroker;
use crate::traits::platform::{
    AudioPlatform, AudioStream, DataCallback, StreamBuilder, StreamCallbacks,
};

/// State shared between a session and the callbacks it registered on the
/// platform. The ring or handoff is installed by `start`; callbacks that run
/// before that see an empty slot.
struct StreamTaps {
    direction: Direction,
    silence: AtomicU8,
    capture: OnceLock<Arc<CaptureRingBuffer>>,
    playback: OnceLock<Arc<PlaybackHandoff>>,
    stream_errors: AtomicU64,
    delegate: Option<Arc<dyn DeviceDelegate>>,
}

impl StreamTaps {
    fn new(direction: Direction, silence: u8, delegate: Option<Arc<dyn DeviceDelegate>>) -> Self {
        Self {
            direction,
            silence: AtomicU8::new(silence),
            capture: OnceLock::new(),
            playback: OnceLock::new(),
            stream_errors: AtomicU64::new(0),
            delegate,
        }
    }

    fn callbacks(self: &Arc<Self>) -> StreamCallbacks {
        let data = match self.direction {
            Direction::Playback => {
                let taps = Arc::clone(self);
                DataCallback::Render(Arc::new(move |out: &mut [u8]| taps.render(out)))
            }
            Direction::Capture => {
                let taps = Arc::clone(self);
                DataCallback::Capture(Arc::new(move |data: &[u8]| taps.capture(data)))
            }
        };
        let events = Arc::clone(self);
        let errors = Arc::clone(self);
        StreamCallbacks {
            data,
            on_event: Arc::new(move |event| events.on_event(event)),
            on_error: Arc::new(move |err| errors.on_error(err)),
        }
    }

    fn render(&self, out: &mut [u8]) {
        match self.playback.get() {
            Some(handoff) => {
                handoff.on_device_callback(out);
            }
            None => out.fill(self.silence.load(Ordering::Relaxed)),
        }
    }

    fn capture(&self, data: &[u8]) {
        let Some(ring) = self.capture.get() else {
            log::trace!("capture callback before ring install, {} bytes dropped", data.len());
            return;
        };
        if let Err((written, e)) = ring.write_all(data) {
            if e != BridgeError::ShutDown {
                log::warn!("capture ring write failed: {}", e);
            }
            ring.record_dropped(data.len() - written);
        }
    }

    fn on_event(&self, event: StreamEvent) {
        log::info!("{} stream event: {:?}", self.direction, event);
        if let Some(ref delegate) = self.delegate {
            delegate.on_stream_event(self.direction, event);
        }
    }

    fn on_error(&self, err: PlatformError) {
        log::error!("{} stream error: {}", self.direction, err);
        self.stream_errors.fetch_add(1, Ordering::Relaxed);
        if let Some(ref delegate) = self.delegate {
            delegate.on_stream_error(self.direction, &err);
        }
    }

    /// Wake everything blocked on this stream's data structures.
    fn shut_down(&self) {
        if let Some(handoff) = self.playback.get() {
            handoff.prepare_close();
        }
        if let Some(ring) = self.capture.get() {
            ring.shut_down();
        }
    }
}

/// One direction of the bridge: owns the platform builder and stream and the
/// data structure sitting between the device callback and the application.
///
/// State transitions:
/// ```text
/// uninitialized ─open─▶ building ─▶ configuring ─▶ prepared ─start─▶ started
///                                                                  ⇅ stop/start
///                                                                 stopped
/// started ─pause_for_lifecycle─▶ paused ─resume_for_lifecycle─▶ started
/// any failure ─▶ failed ─rollback─▶ closed
/// ```
///
/// Control operations take `&mut self` and are meant for a single control
/// thread. Data flows through `PlaybackHandle`/`CaptureReader` or the
/// `&self` data methods.
pub struct DeviceSession<P: AudioPlatform> {
    id: Uuid,
    direction: Direction,
    platform: Arc<P>,
    permissions: Arc<dyn PermissionBroker>,
    config: BridgeConfig,
    delegate: Option<Arc<dyn DeviceDelegate>>,
    state: DeviceState,
    builder: Option<P::Builder>,
    stream: Option<P::Stream>,
    taps: Option<Arc<StreamTaps>>,
    spec: Option<AudioSpec>,
    byte_depth: usize,
    paused_for_lifecycle: bool,
    resume_requested: bool,
    opened_at: Option<DateTime<Utc>>,
    last_error: Option<BridgeError>,
}

impl<P: AudioPlatform> DeviceSession<P> {
    pub fn new(
        direction: Direction,
        platform: Arc<P>,
        permissions: Arc<dyn PermissionBroker>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            platform,
            permissions,
            config,
            delegate: None,
            state: DeviceState::Uninitialized,
            builder: None,
            stream: None,
            taps: None,
            spec: None,
            byte_depth: 0,
            paused_for_lifecycle: false,
            resume_requested: false,
            opened_at: None,
            last_error: None,
        }
    }

    /// Takes effect for streams opened after the call.
    pub fn set_delegate(&mut self, delegate: Arc<dyn DeviceDelegate>) {
        self.delegate = Some(delegate);
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Effective spec after negotiation.
    pub fn spec(&self) -> Option<AudioSpec> {
        self.spec
    }

    pub fn byte_depth(&self) -> usize {
        self.byte_depth
    }

    pub fn is_paused_for_lifecycle(&self) -> bool {
        self.paused_for_lifecycle
    }

    pub fn last_error(&self) -> Option<&BridgeError> {
        self.last_error.as_ref()
    }

    /// Build and prepare the platform stream. Returns the negotiated spec.
    ///
    /// On failure everything acquired so far is released and the session
    /// ends up `Closed`.
    pub fn open(&mut self, requested: &AudioSpec) -> Result<AudioSpec, BridgeError> {
        if !self.state.can_open() {
            return Err(BridgeError::InvalidState(format!(
                "cannot open {} device while {}",
                self.direction,
                self.state.name()
            )));
        }
        log::info!(
            "opening {} device: {} Hz, {} channels, {:?}",
            self.direction,
            requested.freq,
            requested.channels,
            requested.format
        );

        match self.open_stream(requested) {
            Ok(spec) => {
                log::info!(
                    "{} device prepared: {} Hz, {} channels, {:?}, {} bytes per buffer",
                    self.direction,
                    spec.freq,
                    spec.channels,
                    spec.format,
                    spec.size
                );
                Ok(spec)
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Start the device. From `Stopped`, restarts the existing stream.
    pub fn start(&mut self) -> Result<(), BridgeError> {
        let result = match self.state {
            DeviceState::Prepared => self.start_stream(),
            DeviceState::Stopped => self.restart_stream(),
            DeviceState::Started => return Ok(()),
            _ => {
                return Err(BridgeError::InvalidState(format!(
                    "cannot start {} device while {}",
                    self.direction,
                    self.state.name()
                )))
            }
        };

        match result {
            Ok(()) => {
                self.set_state(DeviceState::Started);
                Ok(())
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Stop the platform stream. The ring or handoff is kept for a later
    /// `start`.
    pub fn stop(&mut self) -> Result<(), BridgeError> {
        if !matches!(self.state, DeviceState::Started | DeviceState::Paused) {
            return Err(BridgeError::InvalidState(format!(
                "cannot stop {} device while {}",
                self.direction,
                self.state.name()
            )));
        }
        let stream = self.stream_mut()?;
        if let Err(e) = stream.stop() {
            log::warn!("failed to stop {} stream: {}", self.direction, e);
            return Err(e.into());
        }
        self.paused_for_lifecycle = false;
        self.resume_requested = false;
        self.set_state(DeviceState::Stopped);
        Ok(())
    }

    /// Release every resource. Idempotent; teardown failures are logged.
    pub fn close(&mut self) {
        if matches!(self.state, DeviceState::Uninitialized | DeviceState::Closed) {
            return;
        }
        log::info!("closing {} device", self.direction);
        self.release_resources();
        self.spec = None;
        self.byte_depth = 0;
        self.set_state(DeviceState::Closed);
    }

    /// Wake every thread blocked on the playback handoff. The next
    /// callbacks emit silence and producers get detached frames.
    pub fn prepare_close(&self) {
        if let Some(ref taps) = self.taps {
            taps.shut_down();
        }
    }

    /// Pause a running stream because the hosting process is being
    /// suspended. Remembers whether `resume_for_lifecycle` should restart it.
    pub fn pause_for_lifecycle(&mut self) {
        self.resume_requested = false;
        if !self.state.is_started() {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        if stream.state() != StreamState::Running {
            return;
        }
        match stream.pause() {
            Ok(()) => {
                log::debug!("{} stream paused for lifecycle", self.direction);
                self.resume_requested = true;
                self.paused_for_lifecycle = true;
                self.set_state(DeviceState::Paused);
            }
            Err(e) => log::warn!("failed to pause {} stream: {}", self.direction, e),
        }
    }

    /// Restart a stream paused by `pause_for_lifecycle`. Anything else is
    /// left alone.
    pub fn resume_for_lifecycle(&mut self) {
        let resume = std::mem::take(&mut self.resume_requested);
        if !resume || self.state != DeviceState::Paused {
            return;
        }
        let Some(stream) = self.stream.as_mut() else {
            return;
        };
        match stream.start() {
            Ok(()) => {
                log::debug!("{} stream resumed", self.direction);
                self.paused_for_lifecycle = false;
                self.set_state(DeviceState::Started);
            }
            Err(e) => log::warn!("failed to resume {} stream: {}", self.direction, e),
        }
    }

    /// Fill `buffer` with captured bytes, blocking until enough are
    /// available. A stream paused by `flush_capture` is restarted first.
    pub fn capture_read(&mut self, buffer: &mut [u8]) -> Result<usize, BridgeError> {
        let ring = self.capture_ring()?;
        if !self.paused_for_lifecycle {
            if let Some(stream) = self.stream.as_mut() {
                if stream.state() == StreamState::Paused {
                    stream.start()?;
                    log::debug!("capture stream restarted after flush");
                }
            }
        }
        ring.read_exact(buffer)?;
        Ok(buffer.len())
    }

    /// Pause a running capture stream and discard everything buffered.
    pub fn flush_capture(&mut self) -> Result<(), BridgeError> {
        let ring = self.capture_ring()?;
        if let Some(stream) = self.stream.as_mut() {
            if stream.state() == StreamState::Running {
                stream.pause()?;
            }
        }
        match ring.flush() {
            // a device callback is still finishing its write
            Err(BridgeError::InvalidState(_)) => {
                let discarded = ring.drain()?;
                log::debug!("capture flush drained {} bytes", discarded);
                Ok(())
            }
            other => other,
        }
    }

    pub fn acquire_frame(&self) -> Result<PlaybackFrame, BridgeError> {
        self.handoff()?.acquire()
    }

    pub fn commit_frame(&self, frame: PlaybackFrame) -> Result<(), BridgeError> {
        self.handoff()?.commit(frame)
    }

    /// Cross-thread producer handle, valid once playback has started.
    pub fn playback_handle(&self) -> Result<PlaybackHandle, BridgeError> {
        Ok(PlaybackHandle::new(self.handoff()?))
    }

    /// Cross-thread reader handle, valid once capture has started.
    pub fn capture_reader(&self) -> Result<CaptureReader, BridgeError> {
        Ok(CaptureReader::new(self.capture_ring()?))
    }

    pub fn diagnostics(&self) -> SessionDiagnostics {
        let taps = self.taps.as_ref();
        let handoff = taps.and_then(|t| t.playback.get());
        let ring = taps.and_then(|t| t.capture.get());
        SessionDiagnostics {
            session_id: self.id.to_string(),
            direction: self.direction,
            state: self.state.name(),
            opened_at: self.opened_at.map(|t| t.to_rfc3339()),
            effective_spec: self.spec,
            byte_depth: self.byte_depth,
            frame_size: handoff.and_then(|h| match h.frame_size() {
                FrameSize::Known(size) => Some(size),
                FrameSize::Unknown => None,
            }),
            playback: handoff.map(|h| h.stats()),
            capture: ring.map(|r| r.stats()),
            stream_errors: taps.map_or(0, |t| t.stream_errors.load(Ordering::Relaxed)),
            last_error: self.last_error.as_ref().map(|e| e.to_string()),
        }
    }

    // --- Internal helpers ---

    fn open_stream(&mut self, requested: &AudioSpec) -> Result<AudioSpec, BridgeError> {
        requested.validate()?;
        let format = negotiate_format(requested.format, self.config.allow_format_fallback)?;
        let encoding = format
            .stream_encoding()
            .ok_or_else(|| BridgeError::UnsupportedFormat(format!("{:?}", format)))?;

        self.set_state(DeviceState::Building);

        if self.direction.is_capture() {
            let name = &self.config.capture_permission;
            if !self.permissions.request_permission(name) {
                log::warn!("capture permission {} denied", name);
                return Err(BridgeError::PermissionDenied(name.clone()));
            }
        }

        let builder = self.platform.create_builder(self.direction)?;
        self.set_state(DeviceState::Configuring);

        let taps = Arc::new(StreamTaps::new(
            self.direction,
            format.silence(),
            self.delegate.clone(),
        ));
        self.taps = Some(Arc::clone(&taps));

        let builder = self.builder.insert(builder);
        builder.set_sampling_rate(requested.freq)?;
        builder.set_channel_count(requested.channels)?;
        builder
            .set_sample_encoding(encoding)
            .map_err(|e| {
                if matches!(e, PlatformError::Unsupported { .. }) {
                    BridgeError::UnsupportedFormat(e.to_string())
                } else {
                    e.into()
                }
            })?;
        builder.set_latency_mode(self.config.latency_mode)?;
        builder.set_encoding_type(EncodingType::Raw)?;
        builder.set_stream_info(match self.direction {
            Direction::Playback => StreamInfo::Renderer(StreamUsage::Music),
            Direction::Capture => StreamInfo::Capturer(SourceType::Mic),
        })?;
        builder.set_callbacks(taps.callbacks())?;
        let stream = self.stream.insert(builder.generate()?);

        let stream_state = stream.state();
        if stream_state != StreamState::Prepared {
            return Err(BridgeError::Device(format!(
                "generated stream is {:?}, expected Prepared",
                stream_state
            )));
        }

        let freq = stream.sampling_rate()?;
        let channels = stream.channel_count()?;
        let negotiated = stream.sample_encoding()?;
        let (format, byte_depth) = negotiated
            .to_sample_format()
            .ok_or_else(|| BridgeError::UnsupportedFormat(format!("{:?}", negotiated)))?;
        if negotiated != encoding {
            log::debug!("platform negotiated {:?} instead of {:?}", negotiated, encoding);
        }

        let samples = match requested.samples {
            0 => self.config.default_samples,
            n => n,
        };
        let spec = AudioSpec::new(freq, format, channels, samples);
        taps.silence.store(spec.silence, Ordering::Relaxed);

        self.spec = Some(spec);
        self.byte_depth = byte_depth;
        self.opened_at = Some(Utc::now());
        self.set_state(DeviceState::Prepared);
        Ok(spec)
    }

    fn start_stream(&mut self) -> Result<(), BridgeError> {
        let spec = self
            .spec
            .ok_or_else(|| BridgeError::InvalidState("device not opened".into()))?;
        let taps = self
            .taps
            .clone()
            .ok_or_else(|| BridgeError::InvalidState("device not opened".into()))?;

        match self.direction {
            Direction::Capture => {
                let buffer_len = (spec.samples as usize)
                    .checked_mul(spec.channels as usize)
                    .and_then(|n| n.checked_mul(self.byte_depth))
                    .ok_or_else(|| BridgeError::InvalidSpec("capture buffer size overflows".into()))?;
                let capacity = buffer_len
                    .checked_mul(self.config.capture_headroom_factor)
                    .ok_or_else(|| {
                        BridgeError::InvalidSpec(format!(
                            "capture ring of {} buffers of {} bytes overflows",
                            self.config.capture_headroom_factor, buffer_len
                        ))
                    })?;
                let ring = CaptureRingBuffer::new(capacity, PollBackoff::from_config(&self.config))?
                    .with_chunk_len(buffer_len);
                log::debug!(
                    "capture ring holds {} bytes, transfers in {} byte chunks",
                    capacity,
                    ring.chunk_len()
                );
                if taps.capture.set(Arc::new(ring)).is_err() {
                    return Err(BridgeError::InvalidState("capture ring already installed".into()));
                }
                self.stream_mut()?.start()?;
            }
            Direction::Playback => {
                let handoff = Arc::new(PlaybackHandoff::new(spec.silence, &self.config));
                if taps.playback.set(Arc::clone(&handoff)).is_err() {
                    return Err(BridgeError::InvalidState("playback handoff already installed".into()));
                }
                self.stream_mut()?.start()?;

                let timeout = self.config.first_callback_timeout();
                match handoff.wait_for_frame_size(timeout) {
                    Ok(size) => {
                        log::info!("playback frame size is {} bytes", size);
                        if let (Some(spec), Ok(size)) = (self.spec.as_mut(), u32::try_from(size)) {
                            spec.size = size;
                        }
                    }
                    Err(BridgeError::Timeout) => {
                        return Err(BridgeError::Device(format!(
                            "no render callback within {} ms",
                            self.config.first_callback_timeout_ms.unwrap_or_default()
                        )))
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }

    fn restart_stream(&mut self) -> Result<(), BridgeError> {
        if let Some(ring) = self.taps.as_ref().and_then(|t| t.capture.get()) {
            if let Err(e) = ring.flush() {
                log::warn!("capture ring not flushed before restart: {}", e);
            }
        }
        self.stream_mut()?.start()?;
        log::debug!("{} stream restarted", self.direction);
        Ok(())
    }

    /// Record `err`, pass through `Failed` and roll back to `Closed`.
    fn fail(&mut self, err: BridgeError) {
        log::error!("{} device failed: {}", self.direction, err);
        self.last_error = Some(err.clone());
        self.set_state(DeviceState::Failed(err));
        self.release_resources();
        self.spec = None;
        self.byte_depth = 0;
        self.set_state(DeviceState::Closed);
    }

    /// Release in reverse acquisition order: wake waiters, stream, data
    /// structures, builder.
    fn release_resources(&mut self) {
        if let Some(ref taps) = self.taps {
            taps.shut_down();
        }

        if let Some(mut stream) = self.stream.take() {
            if matches!(stream.state(), StreamState::Running | StreamState::Paused) {
                if let Err(e) = stream.stop() {
                    log::warn!("failed to stop {} stream: {}", self.direction, e);
                }
            }
            if let Err(e) = stream.release() {
                log::warn!("failed to release {} stream: {}", self.direction, e);
            }
        }

        self.taps = None;

        if let Some(builder) = self.builder.take() {
            if let Err(e) = builder.destroy() {
                log::warn!("failed to destroy {} stream builder: {}", self.direction, e);
            }
        }

        self.paused_for_lifecycle = false;
        self.resume_requested = false;
    }

    fn stream_mut(&mut self) -> Result<&mut P::Stream, BridgeError> {
        self.stream
            .as_mut()
            .ok_or_else(|| BridgeError::InvalidState("no stream".into()))
    }

    fn handoff(&self) -> Result<Arc<PlaybackHandoff>, BridgeError> {
        self.taps
            .as_ref()
            .and_then(|t| t.playback.get())
            .cloned()
            .ok_or_else(|| {
                BridgeError::InvalidState(format!(
                    "{} device has no playback handoff while {}",
                    self.direction,
                    self.state.name()
                ))
            })
    }

    fn capture_ring(&self) -> Result<Arc<CaptureRingBuffer>, BridgeError> {
        self.taps
            .as_ref()
            .and_then(|t| t.capture.get())
            .cloned()
            .ok_or_else(|| {
                BridgeError::InvalidState(format!(
                    "{} device has no capture ring while {}",
                    self.direction,
                    self.state.name()
                ))
            })
    }

    fn set_state(&mut self, new_state: DeviceState) {
        log::debug!(
            "{} device: {} -> {}",
            self.direction,
            self.state.name(),
            new_state.name()
        );
        self.state = new_state;
        if let Some(ref delegate) = self.delegate {
            delegate.on_state_changed(self.direction, &self.state);
        }
    }
}

impl<P: AudioPlatform> Drop for DeviceSession<P> {
    fn drop(&mut self) {
        self.close();
    }
}
