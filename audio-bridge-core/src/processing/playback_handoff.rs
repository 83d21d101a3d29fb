use std::ops::{Deref, DerefMut};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::models::config::BridgeConfig;
use crate::models::diagnostics::HandoffStats;
use crate::models::error::BridgeError;

/// Size of one device period in bytes, learned from the first callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSize {
    Unknown,
    Known(usize),
}

/// Whether a frame handed to the producer will reach the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// The shared frame; committing it queues it for the next callback.
    Live,
    /// Scratch storage handed out after shutdown; committing discards it.
    Detached,
}

/// One period of PCM owned by the producer between `acquire` and `commit`.
#[derive(Debug)]
pub struct PlaybackFrame {
    data: Vec<u8>,
    kind: FrameKind,
}

impl PlaybackFrame {
    pub fn kind(&self) -> FrameKind {
        self.kind
    }

    pub fn is_detached(&self) -> bool {
        self.kind == FrameKind::Detached
    }
}

impl Deref for PlaybackFrame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl DerefMut for PlaybackFrame {
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// Why a device callback produced silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SilenceReason {
    /// This callback revealed the frame size; nothing could be queued yet.
    FirstCallback,
    ShuttingDown,
    /// The producer missed the callback wait bound.
    Underrun,
    /// The platform asked for zero bytes; nothing was waited for.
    EmptyBuffer,
}

/// Result of one device callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackOutcome {
    Frame,
    Silence(SilenceReason),
}

struct HandoffState {
    frame_size: FrameSize,
    /// `None` while the producer holds the frame or before it is allocated.
    frame: Option<Vec<u8>>,
    ready: bool,
    shutting_down: bool,
    stats: HandoffStats,
}

/// Strict one-frame handoff between the application and the render callback.
///
/// The producer fills at most one frame at a time and must wait for the
/// device callback to consume it before filling the next; the callback
/// waits for the producer in turn. Frame-size discovery, the ready flag and
/// shutdown all live under one mutex, so no thread sees a stale combination.
///
/// ```text
/// producer: acquire() ──fill──▶ commit() ──has_data──▶ on_device_callback()
///              ▲                                              │
///              └──────────────── wants_data ◀─────────────────┘
/// ```
pub struct PlaybackHandoff {
    state: Mutex<HandoffState>,
    has_data: Condvar,
    wants_data: Condvar,
    size_known: Condvar,
    silence: u8,
    fallback_len: usize,
    callback_wait: Option<Duration>,
    producer_wait: Option<Duration>,
}

impl PlaybackHandoff {
    /// Create a handoff that pads with `silence` and takes its wait bounds
    /// from `config`.
    pub fn new(silence: u8, config: &BridgeConfig) -> Self {
        Self {
            state: Mutex::new(HandoffState {
                frame_size: FrameSize::Unknown,
                frame: None,
                ready: false,
                shutting_down: false,
                stats: HandoffStats::default(),
            }),
            has_data: Condvar::new(),
            wants_data: Condvar::new(),
            size_known: Condvar::new(),
            silence,
            fallback_len: config.fallback_frame_len,
            callback_wait: config.callback_wait(),
            producer_wait: config.producer_wait(),
        }
    }

    /// Render callback body, invoked on the platform's real-time thread.
    ///
    /// Fills all of `out`. Never blocks once `prepare_close` has run.
    pub fn on_device_callback(&self, out: &mut [u8]) -> CallbackOutcome {
        if out.is_empty() {
            return CallbackOutcome::Silence(SilenceReason::EmptyBuffer);
        }
        let mut st = self.state.lock();

        if st.frame_size == FrameSize::Unknown {
            st.frame_size = FrameSize::Known(out.len());
            st.stats.silence_fills += 1;
            self.size_known.notify_all();
            self.wants_data.notify_all();
            log::debug!("playback frame size is {} bytes", out.len());
            out.fill(self.silence);
            return CallbackOutcome::Silence(SilenceReason::FirstCallback);
        }

        let waiting = |s: &mut HandoffState| !s.ready && !s.shutting_down;
        match self.callback_wait {
            Some(bound) => {
                self.has_data.wait_while_for(&mut st, waiting, bound);
            }
            None => self.has_data.wait_while(&mut st, waiting),
        }

        let state = &mut *st;
        if state.shutting_down {
            state.stats.silence_fills += 1;
            out.fill(self.silence);
            return CallbackOutcome::Silence(SilenceReason::ShuttingDown);
        }

        if state.ready {
            if let Some(frame) = state.frame.as_deref() {
                let n = frame.len().min(out.len());
                out[..n].copy_from_slice(&frame[..n]);
                out[n..].fill(self.silence);
                state.ready = false;
                state.stats.frames_delivered += 1;
                self.wants_data.notify_all();
                return CallbackOutcome::Frame;
            }
        }

        state.stats.underruns += 1;
        state.stats.silence_fills += 1;
        out.fill(self.silence);
        CallbackOutcome::Silence(SilenceReason::Underrun)
    }

    /// Hand the frame storage to the producer (getWritableBuffer).
    ///
    /// Waits until the frame size is known and the previous frame was
    /// consumed. After shutdown, returns a detached frame immediately: of
    /// the known frame size, or of the fallback length if no callback ever
    /// ran.
    pub fn acquire(&self) -> Result<PlaybackFrame, BridgeError> {
        let mut st = self.state.lock();

        let blocked = |s: &mut HandoffState| {
            !s.shutting_down && (s.frame_size == FrameSize::Unknown || s.ready)
        };
        match self.producer_wait {
            Some(bound) => {
                if self.wants_data.wait_while_for(&mut st, blocked, bound).timed_out() {
                    return Err(BridgeError::Timeout);
                }
            }
            None => self.wants_data.wait_while(&mut st, blocked),
        }

        if st.shutting_down {
            let len = match st.frame_size {
                FrameSize::Known(size) => size,
                FrameSize::Unknown => self.fallback_len,
            };
            drop(st);
            return Ok(PlaybackFrame {
                data: silent_buffer(len, self.silence)?,
                kind: FrameKind::Detached,
            });
        }

        let FrameSize::Known(size) = st.frame_size else {
            return Err(BridgeError::InvalidState("frame size unknown".into()));
        };
        let data = match st.frame.take() {
            Some(frame) => frame,
            None => silent_buffer(size, self.silence)?,
        };
        Ok(PlaybackFrame {
            data,
            kind: FrameKind::Live,
        })
    }

    /// Queue a filled frame for the next device callback.
    ///
    /// Detached frames and frames committed during shutdown are dropped.
    pub fn commit(&self, frame: PlaybackFrame) -> Result<(), BridgeError> {
        if frame.is_detached() {
            return Ok(());
        }

        let mut st = self.state.lock();
        if st.shutting_down {
            return Ok(());
        }
        if st.ready {
            return Err(BridgeError::InvalidState(
                "previous playback frame has not been consumed".into(),
            ));
        }
        st.frame = Some(frame.data);
        st.ready = true;
        self.has_data.notify_all();
        Ok(())
    }

    /// Block until the first callback revealed the frame size, then
    /// allocate the frame storage.
    pub fn wait_for_frame_size(&self, timeout: Option<Duration>) -> Result<usize, BridgeError> {
        let mut st = self.state.lock();

        let pending =
            |s: &mut HandoffState| s.frame_size == FrameSize::Unknown && !s.shutting_down;
        match timeout {
            Some(bound) => {
                self.size_known.wait_while_for(&mut st, pending, bound);
            }
            None => self.size_known.wait_while(&mut st, pending),
        }

        match st.frame_size {
            FrameSize::Known(size) => {
                if st.frame.is_none() && !st.ready {
                    st.frame = Some(silent_buffer(size, self.silence)?);
                }
                self.wants_data.notify_all();
                Ok(size)
            }
            FrameSize::Unknown if st.shutting_down => Err(BridgeError::ShutDown),
            FrameSize::Unknown => Err(BridgeError::Timeout),
        }
    }

    /// Enter shutdown and wake every waiter. Idempotent, callable from any
    /// thread.
    pub fn prepare_close(&self) {
        let mut st = self.state.lock();
        st.shutting_down = true;
        self.has_data.notify_all();
        self.wants_data.notify_all();
        self.size_known.notify_all();
    }

    pub fn frame_size(&self) -> FrameSize {
        self.state.lock().frame_size
    }

    pub fn is_shutting_down(&self) -> bool {
        self.state.lock().shutting_down
    }

    pub fn silence(&self) -> u8 {
        self.silence
    }

    pub fn stats(&self) -> HandoffStats {
        self.state.lock().stats
    }
}

fn silent_buffer(len: usize, silence: u8) -> Result<Vec<u8>, BridgeError> {
    let mut buffer = Vec::new();
    buffer
        .try_reserve_exact(len)
        .map_err(|_| BridgeError::Allocation(len))?;
    buffer.resize(len, silence);
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn handoff(silence: u8) -> PlaybackHandoff {
        PlaybackHandoff::new(silence, &BridgeConfig::default())
    }

    #[test]
    fn first_callback_learns_size_then_pattern_plays() {
        let handoff = handoff(0);

        let mut out = vec![0xFFu8; 480];
        assert_eq!(
            handoff.on_device_callback(&mut out),
            CallbackOutcome::Silence(SilenceReason::FirstCallback)
        );
        assert!(out.iter().all(|&b| b == 0));
        assert_eq!(handoff.frame_size(), FrameSize::Known(480));

        let mut frame = handoff.acquire().unwrap();
        assert_eq!(frame.kind(), FrameKind::Live);
        assert_eq!(frame.len(), 480);
        for (i, byte) in frame.iter_mut().enumerate() {
            *byte = (i % 256) as u8;
        }
        handoff.commit(frame).unwrap();

        let mut out = vec![0u8; 480];
        assert_eq!(handoff.on_device_callback(&mut out), CallbackOutcome::Frame);
        assert!(out.iter().enumerate().all(|(i, &b)| b == (i % 256) as u8));
    }

    #[test]
    fn every_commit_reaches_exactly_one_callback() {
        let handoff = Arc::new(handoff(0));
        let mut discovery = [0u8; 64];
        handoff.on_device_callback(&mut discovery);

        const FRAMES: usize = 200;
        let producer = {
            let handoff = Arc::clone(&handoff);
            thread::spawn(move || {
                for i in 0..FRAMES {
                    let mut frame = handoff.acquire().unwrap();
                    frame.fill(i as u8);
                    handoff.commit(frame).unwrap();
                }
            })
        };

        let mut seen = Vec::with_capacity(FRAMES);
        for _ in 0..FRAMES {
            let mut out = [0u8; 64];
            assert_eq!(handoff.on_device_callback(&mut out), CallbackOutcome::Frame);
            assert!(out.iter().all(|&b| b == out[0]));
            seen.push(out[0]);
        }
        producer.join().unwrap();

        let expected: Vec<u8> = (0..FRAMES).map(|i| i as u8).collect();
        assert_eq!(seen, expected);
        assert_eq!(handoff.stats().frames_delivered, FRAMES as u64);
    }

    #[test]
    fn after_prepare_close_callbacks_emit_silence_without_blocking() {
        let handoff = handoff(0x80);
        let mut out = [0u8; 32];
        handoff.on_device_callback(&mut out);

        handoff.prepare_close();
        handoff.prepare_close();

        for _ in 0..3 {
            let mut out = [0u8; 32];
            assert_eq!(
                handoff.on_device_callback(&mut out),
                CallbackOutcome::Silence(SilenceReason::ShuttingDown)
            );
            assert!(out.iter().all(|&b| b == 0x80));
        }

        let frame = handoff.acquire().unwrap();
        assert!(frame.is_detached());
        assert_eq!(frame.len(), 32);
        handoff.commit(frame).unwrap();
    }

    #[test]
    fn shutdown_before_first_callback_hands_out_fallback() {
        let handoff = handoff(0);
        handoff.prepare_close();

        let frame = handoff.acquire().unwrap();
        assert!(frame.is_detached());
        assert_eq!(frame.len(), 1024);
        assert_eq!(handoff.frame_size(), FrameSize::Unknown);
    }

    #[test]
    fn prepare_close_wakes_blocked_producer() {
        let handoff = Arc::new(handoff(0));
        let mut out = [0u8; 16];
        handoff.on_device_callback(&mut out);

        let frame = handoff.acquire().unwrap();
        handoff.commit(frame).unwrap();

        // Previous frame not consumed, so this acquire parks
        let producer = {
            let handoff = Arc::clone(&handoff);
            thread::spawn(move || handoff.acquire())
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!producer.is_finished());

        handoff.prepare_close();
        let frame = producer.join().unwrap().unwrap();
        assert!(frame.is_detached());
    }

    #[test]
    fn prepare_close_wakes_blocked_callback() {
        let handoff = Arc::new(handoff(0));
        let mut out = [0u8; 16];
        handoff.on_device_callback(&mut out);

        let consumer = {
            let handoff = Arc::clone(&handoff);
            thread::spawn(move || {
                let mut out = [1u8; 16];
                let outcome = handoff.on_device_callback(&mut out);
                (outcome, out)
            })
        };
        thread::sleep(Duration::from_millis(20));
        assert!(!consumer.is_finished());

        handoff.prepare_close();
        let (outcome, out) = consumer.join().unwrap();
        assert_eq!(outcome, CallbackOutcome::Silence(SilenceReason::ShuttingDown));
        assert_eq!(out, [0u8; 16]);
    }

    #[test]
    fn wait_for_frame_size_times_out_or_reports_shutdown() {
        let handoff = handoff(0);
        assert_eq!(
            handoff.wait_for_frame_size(Some(Duration::from_millis(10))),
            Err(BridgeError::Timeout)
        );

        handoff.prepare_close();
        assert_eq!(handoff.wait_for_frame_size(None), Err(BridgeError::ShutDown));
    }

    #[test]
    fn wait_for_frame_size_returns_after_callback_thread_runs() {
        let handoff = Arc::new(handoff(0));

        let device = {
            let handoff = Arc::clone(&handoff);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(10));
                let mut out = [0u8; 256];
                handoff.on_device_callback(&mut out)
            })
        };

        assert_eq!(handoff.wait_for_frame_size(Some(Duration::from_secs(5))), Ok(256));
        assert_eq!(
            device.join().unwrap(),
            CallbackOutcome::Silence(SilenceReason::FirstCallback)
        );
    }

    #[test]
    fn bounded_callback_wait_counts_underrun() {
        let config = BridgeConfig {
            callback_wait_ms: Some(5),
            ..Default::default()
        };
        let handoff = PlaybackHandoff::new(0, &config);
        let mut out = [0u8; 8];
        handoff.on_device_callback(&mut out);

        assert_eq!(
            handoff.on_device_callback(&mut out),
            CallbackOutcome::Silence(SilenceReason::Underrun)
        );
        let stats = handoff.stats();
        assert_eq!(stats.underruns, 1);
        assert_eq!(stats.silence_fills, 2);
    }

    #[test]
    fn bounded_producer_wait_times_out_before_first_callback() {
        let config = BridgeConfig {
            producer_wait_ms: Some(5),
            ..Default::default()
        };
        let handoff = PlaybackHandoff::new(0, &config);
        assert!(matches!(handoff.acquire(), Err(BridgeError::Timeout)));
    }

    #[test]
    fn longer_device_buffer_is_padded_with_silence() {
        let handoff = handoff(0x80);
        let mut out = [0u8; 4];
        handoff.on_device_callback(&mut out);

        let mut frame = handoff.acquire().unwrap();
        frame.copy_from_slice(&[1, 2, 3, 4]);
        handoff.commit(frame).unwrap();

        let mut out = [0u8; 6];
        assert_eq!(handoff.on_device_callback(&mut out), CallbackOutcome::Frame);
        assert_eq!(out, [1, 2, 3, 4, 0x80, 0x80]);
    }

    #[test]
    fn second_commit_without_consumption_is_rejected() {
        let handoff = handoff(0);
        let mut out = [0u8; 4];
        handoff.on_device_callback(&mut out);

        let first = handoff.acquire().unwrap();
        let second = handoff.acquire().unwrap();
        handoff.commit(first).unwrap();
        assert!(matches!(
            handoff.commit(second),
            Err(BridgeError::InvalidState(_))
        ));
    }

    #[test]
    fn empty_callback_returns_without_waiting() {
        let handoff = handoff(0);

        // before the frame size is known
        assert_eq!(
            handoff.on_device_callback(&mut []),
            CallbackOutcome::Silence(SilenceReason::EmptyBuffer)
        );
        assert_eq!(handoff.frame_size(), FrameSize::Unknown);

        // the next real callback still discovers the size
        let mut out = [0u8; 8];
        assert_eq!(
            handoff.on_device_callback(&mut out),
            CallbackOutcome::Silence(SilenceReason::FirstCallback)
        );

        // and with nothing committed an empty callback still does not park
        assert_eq!(
            handoff.on_device_callback(&mut []),
            CallbackOutcome::Silence(SilenceReason::EmptyBuffer)
        );
        assert_eq!(handoff.stats().underruns, 0);
    }
}
