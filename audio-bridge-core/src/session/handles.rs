use std::sync::Arc;

use crate::models::error::BridgeError;
use crate::processing::capture_ring::CaptureRingBuffer;
use crate::processing::playback_handoff::{FrameSize, PlaybackFrame, PlaybackHandoff};

/// Producer side of a started playback session, for the application's
/// audio thread.
#[derive(Clone)]
pub struct PlaybackHandle {
    handoff: Arc<PlaybackHandoff>,
}

impl PlaybackHandle {
    pub(crate) fn new(handoff: Arc<PlaybackHandoff>) -> Self {
        Self { handoff }
    }

    /// Wait for the frame storage (see `PlaybackHandoff::acquire`).
    pub fn acquire(&self) -> Result<PlaybackFrame, BridgeError> {
        self.handoff.acquire()
    }

    pub fn commit(&self, frame: PlaybackFrame) -> Result<(), BridgeError> {
        self.handoff.commit(frame)
    }

    /// Acquire, fill in place, commit.
    pub fn write_frame<F>(&self, fill: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&mut [u8]),
    {
        let mut frame = self.handoff.acquire()?;
        fill(&mut frame);
        self.handoff.commit(frame)
    }

    pub fn prepare_close(&self) {
        self.handoff.prepare_close();
    }

    pub fn frame_size(&self) -> FrameSize {
        self.handoff.frame_size()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.handoff.is_shutting_down()
    }
}

/// Consumer side of a started capture session, for the application's
/// audio thread.
#[derive(Clone)]
pub struct CaptureReader {
    ring: Arc<CaptureRingBuffer>,
}

impl CaptureReader {
    pub(crate) fn new(ring: Arc<CaptureRingBuffer>) -> Self {
        Self { ring }
    }

    /// Fill `buffer` completely, one application buffer at a time.
    pub fn read(&self, buffer: &mut [u8]) -> Result<(), BridgeError> {
        self.ring.read_exact(buffer)
    }

    /// Bytes readable without blocking.
    pub fn available(&self) -> usize {
        self.ring.available()
    }
}
