//! Virtual stream objects and the driver tests use to pump them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use audio_bridge_core::models::audio_format::{Direction, StreamEncoding};
use audio_bridge_core::models::error::PlatformError;
use audio_bridge_core::models::stream_models::{
    EncodingType, LatencyMode, StreamEvent, StreamInfo, StreamState,
};
use audio_bridge_core::traits::platform::{AudioStream, DataCallback, StreamCallbacks};

use crate::tone::ToneGenerator;
use crate::virtual_platform::{ClockMode, FailPoint, PlatformCounters};

/// Builder settings that do not affect the data path, kept for inspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamParams {
    pub latency_mode: LatencyMode,
    pub encoding_type: Option<EncodingType>,
    pub info: Option<StreamInfo>,
}

/// Everything a generated stream needs to know about itself.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub direction: Direction,
    pub sample_rate: u32,
    pub channels: u16,
    pub encoding: StreamEncoding,
    pub period_frames: usize,
    pub clock: ClockMode,
    pub tone_frequency: f32,
    pub record_limit: usize,
    pub fail_points: HashSet<FailPoint>,
    pub params: StreamParams,
}

impl StreamConfig {
    fn period_bytes(&self) -> usize {
        self.period_frames * self.channels as usize * self.encoding.byte_depth()
    }

    fn period(&self) -> Duration {
        Duration::from_secs_f64(self.period_frames as f64 / self.sample_rate as f64)
    }

    fn fails(&self, point: FailPoint) -> bool {
        self.fail_points.contains(&point)
    }
}

/// Errors from pumping a stream by hand.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("stream is {0:?}, not running")]
    NotRunning(StreamState),

    #[error("{0} stream has no {1} callback")]
    WrongDirection(Direction, &'static str),
}

struct StreamShared {
    config: StreamConfig,
    callbacks: StreamCallbacks,
    state: Mutex<StreamState>,
    state_changed: Condvar,
    /// Bumped whenever the running clock threads must exit.
    generation: AtomicU64,
    tone: Mutex<ToneGenerator>,
    rendered: Mutex<Vec<u8>>,
    data_callbacks: AtomicU64,
    counters: Arc<Mutex<PlatformCounters>>,
}

impl StreamShared {
    fn state(&self) -> StreamState {
        *self.state.lock()
    }

    fn set_state(&self, state: StreamState) {
        *self.state.lock() = state;
        self.state_changed.notify_all();
    }

    fn ensure_running(&self) -> Result<(), DriverError> {
        match self.state() {
            StreamState::Running => Ok(()),
            other => Err(DriverError::NotRunning(other)),
        }
    }

    /// One render period into `out`, recorded up to the record limit.
    fn render(&self, out: &mut [u8]) -> Result<(), DriverError> {
        let DataCallback::Render(ref callback) = self.callbacks.data else {
            return Err(DriverError::WrongDirection(self.config.direction, "render"));
        };
        callback(out);
        self.data_callbacks.fetch_add(1, Ordering::Relaxed);

        let mut rendered = self.rendered.lock();
        let room = self.config.record_limit.saturating_sub(rendered.len());
        rendered.extend_from_slice(&out[..room.min(out.len())]);
        Ok(())
    }

    fn capture(&self, data: &[u8]) -> Result<(), DriverError> {
        let DataCallback::Capture(ref callback) = self.callbacks.data else {
            return Err(DriverError::WrongDirection(self.config.direction, "capture"));
        };
        callback(data);
        self.data_callbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// One clock tick: a render period out or a tone period in.
    fn tick(&self, buffer: &mut [u8]) -> Result<(), DriverError> {
        match self.config.direction {
            Direction::Playback => self.render(buffer),
            Direction::Capture => {
                self.tone.lock().fill(buffer);
                self.capture(buffer)
            }
        }
    }
}

/// Stream object produced by `VirtualStreamBuilder::generate`.
///
/// In `ClockMode::Realtime`, `start` spawns a clock thread that invokes the
/// data callback once per period. `pause`/`stop` retire the thread without
/// joining it, since it may be blocked inside the callback; `release` joins
/// every thread it spawned, so no callback runs after it returns.
pub struct VirtualStream {
    shared: Arc<StreamShared>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl VirtualStream {
    pub(crate) fn new(
        config: StreamConfig,
        callbacks: StreamCallbacks,
        counters: Arc<Mutex<PlatformCounters>>,
        initial: StreamState,
    ) -> Self {
        let tone = ToneGenerator::new(
            config.tone_frequency,
            config.sample_rate,
            config.channels,
            config.encoding,
        );
        Self {
            shared: Arc::new(StreamShared {
                config,
                callbacks,
                state: Mutex::new(initial),
                state_changed: Condvar::new(),
                generation: AtomicU64::new(0),
                tone: Mutex::new(tone),
                rendered: Mutex::new(Vec::new()),
                data_callbacks: AtomicU64::new(0),
                counters,
            }),
            workers: Vec::new(),
        }
    }

    pub fn driver(&self) -> StreamDriver {
        StreamDriver {
            shared: Arc::clone(&self.shared),
        }
    }

    fn retire_workers(&self) {
        self.shared.generation.fetch_add(1, Ordering::AcqRel);
    }

    fn join_workers(&mut self) {
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                log::error!("virtual {} clock thread panicked", self.shared.config.direction);
            }
        }
    }

    fn spawn_worker(&mut self) -> Result<(), PlatformError> {
        self.workers.retain(|h| !h.is_finished());

        let shared = Arc::clone(&self.shared);
        let generation = shared.generation.load(Ordering::Acquire);
        let name = format!("virtual-{}-clock", shared.config.direction);
        let handle = thread::Builder::new()
            .name(name)
            .spawn(move || run_clock(shared, generation))
            .map_err(|e| PlatformError::Failed {
                operation: "start",
                code: e.raw_os_error().unwrap_or(-1),
            })?;
        self.workers.push(handle);
        Ok(())
    }

    fn fails(&self, point: FailPoint) -> bool {
        self.shared.config.fails(point)
    }

    fn illegal(&self, operation: &'static str) -> PlatformError {
        PlatformError::IllegalState {
            operation,
            state: format!("{:?}", self.shared.state()),
        }
    }
}

impl AudioStream for VirtualStream {
    fn state(&self) -> StreamState {
        self.shared.state()
    }

    fn sampling_rate(&self) -> Result<u32, PlatformError> {
        Ok(self.shared.config.sample_rate)
    }

    fn channel_count(&self) -> Result<u16, PlatformError> {
        Ok(self.shared.config.channels)
    }

    fn sample_encoding(&self) -> Result<StreamEncoding, PlatformError> {
        Ok(self.shared.config.encoding)
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        if self.fails(FailPoint::Start) {
            return Err(PlatformError::Failed {
                operation: "start",
                code: -2,
            });
        }
        match self.shared.state() {
            StreamState::Prepared | StreamState::Paused | StreamState::Stopped => {}
            StreamState::Running => return Ok(()),
            _ => return Err(self.illegal("start")),
        }

        self.shared.set_state(StreamState::Running);
        let config = &self.shared.config;
        let silent = config.direction == Direction::Playback && config.fails(FailPoint::SilentRender);
        let clocked = config.clock == ClockMode::Realtime && !silent;
        if clocked {
            if let Err(e) = self.spawn_worker() {
                self.shared.set_state(StreamState::Stopped);
                return Err(e);
            }
        }
        log::debug!("virtual {} stream started", self.shared.config.direction);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlatformError> {
        if self.shared.state() != StreamState::Running {
            return Err(self.illegal("pause"));
        }
        self.retire_workers();
        self.shared.set_state(StreamState::Paused);
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        if self.fails(FailPoint::Stop) {
            return Err(PlatformError::Failed {
                operation: "stop",
                code: -3,
            });
        }
        match self.shared.state() {
            StreamState::Running | StreamState::Paused => {}
            _ => return Err(self.illegal("stop")),
        }
        self.retire_workers();
        self.shared.set_state(StreamState::Stopped);
        Ok(())
    }

    fn release(mut self) -> Result<(), PlatformError> {
        self.retire_workers();
        self.shared.set_state(StreamState::Released);
        self.join_workers();
        self.shared.counters.lock().streams_released += 1;
        log::debug!("virtual {} stream released", self.shared.config.direction);

        if self.fails(FailPoint::Release) {
            return Err(PlatformError::Failed {
                operation: "release",
                code: -4,
            });
        }
        Ok(())
    }
}

impl Drop for VirtualStream {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.retire_workers();
            self.join_workers();
        }
    }
}

fn run_clock(shared: Arc<StreamShared>, generation: u64) {
    let period = shared.config.period();
    let mut buffer = vec![0u8; shared.config.period_bytes()];
    let mut next = Instant::now();

    while shared.generation.load(Ordering::Acquire) == generation {
        if let Err(e) = shared.tick(&mut buffer) {
            log::error!("virtual clock stopped: {}", e);
            return;
        }
        next += period;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            // fell behind, do not try to catch up in a burst
            next = now;
        }
    }
}

/// Test handle onto a generated stream.
///
/// Pumping only works while the stream is `Running`, matching a platform
/// that stops invoking callbacks once paused, stopped or released.
#[derive(Clone)]
pub struct StreamDriver {
    shared: Arc<StreamShared>,
}

impl StreamDriver {
    pub fn direction(&self) -> Direction {
        self.shared.config.direction
    }

    pub fn state(&self) -> StreamState {
        self.shared.state()
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.config.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.shared.config.channels
    }

    pub fn encoding(&self) -> StreamEncoding {
        self.shared.config.encoding
    }

    pub fn params(&self) -> StreamParams {
        self.shared.config.params
    }

    /// Bytes per data callback.
    pub fn period_bytes(&self) -> usize {
        self.shared.config.period_bytes()
    }

    /// Block until the stream reaches `state`. Returns `false` on timeout.
    pub fn wait_for_state(&self, state: StreamState, timeout: Duration) -> bool {
        let mut current = self.shared.state.lock();
        !self
            .shared
            .state_changed
            .wait_while_for(&mut current, |s| *s != state, timeout)
            .timed_out()
    }

    /// Run the render callback for one period and return what it produced.
    pub fn pump_render(&self) -> Result<Vec<u8>, DriverError> {
        self.shared.ensure_running()?;
        let mut out = vec![0u8; self.period_bytes()];
        self.shared.render(&mut out)?;
        Ok(out)
    }

    /// Run the capture callback with one period of tone.
    pub fn pump_capture(&self) -> Result<Vec<u8>, DriverError> {
        self.shared.ensure_running()?;
        let mut data = vec![0u8; self.period_bytes()];
        self.shared.tone.lock().fill(&mut data);
        self.shared.capture(&data)?;
        Ok(data)
    }

    /// Run the capture callback with caller-supplied bytes.
    pub fn pump_capture_bytes(&self, data: &[u8]) -> Result<(), DriverError> {
        self.shared.ensure_running()?;
        self.shared.capture(data)
    }

    pub fn emit_event(&self, event: StreamEvent) {
        (self.shared.callbacks.on_event)(event);
    }

    pub fn emit_error(&self, error: PlatformError) {
        (self.shared.callbacks.on_error)(error);
    }

    /// Everything rendered so far, up to the record limit.
    pub fn rendered(&self) -> Vec<u8> {
        self.shared.rendered.lock().clone()
    }

    pub fn data_callbacks(&self) -> u64 {
        self.shared.data_callbacks.load(Ordering::Relaxed)
    }
}
