use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::BridgeError;

/// Stream direction. Each direction owns an independent device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Playback,
    Capture,
}

impl Direction {
    pub fn is_capture(self) -> bool {
        matches!(self, Self::Capture)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Playback => f.write_str("playback"),
            Self::Capture => f.write_str("capture"),
        }
    }
}

/// Sample format as the multimedia library names it (native endian).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    U8,
    S8,
    U16,
    S16,
    S32,
    F32,
}

impl SampleFormat {
    pub fn bits(self) -> u16 {
        match self {
            Self::U8 | Self::S8 => 8,
            Self::U16 | Self::S16 => 16,
            Self::S32 | Self::F32 => 32,
        }
    }

    /// Byte value of a silent sample.
    pub fn silence(self) -> u8 {
        match self {
            Self::U8 => 0x80,
            _ => 0,
        }
    }

    /// Candidate formats in preference order: the format itself, then
    /// the other formats of the same width, then wider before narrower.
    pub fn fallbacks(self) -> &'static [SampleFormat] {
        use SampleFormat::*;
        match self {
            U8 => &[U8, S8, S16, U16, S32, F32],
            S8 => &[S8, U8, S16, U16, S32, F32],
            U16 => &[U16, S16, S32, F32, U8, S8],
            S16 => &[S16, U16, S32, F32, U8, S8],
            S32 => &[S32, F32, S16, U16, U8, S8],
            F32 => &[F32, S32, S16, U16, U8, S8],
        }
    }

    /// Platform encoding used to carry this format, if any.
    ///
    /// The platform has no float path: `F32` travels as `S32Le` and the
    /// effective spec reports `S32` afterwards.
    pub fn stream_encoding(self) -> Option<StreamEncoding> {
        match self {
            Self::U8 => Some(StreamEncoding::U8),
            Self::S16 => Some(StreamEncoding::S16Le),
            Self::S32 | Self::F32 => Some(StreamEncoding::S32Le),
            Self::S8 | Self::U16 => None,
        }
    }
}

/// Sample encoding understood by the platform stream API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StreamEncoding {
    U8,
    S16Le,
    S24Le,
    S32Le,
    F32Le,
}

impl StreamEncoding {
    /// Bytes per sample on the wire.
    pub fn byte_depth(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16Le => 2,
            Self::S24Le => 3,
            Self::S32Le | Self::F32Le => 4,
        }
    }

    /// Map a negotiated encoding back to the application format and the
    /// byte depth the bridge sizes its buffers with.
    pub fn to_sample_format(self) -> Option<(SampleFormat, usize)> {
        match self {
            Self::U8 => Some((SampleFormat::U8, 1)),
            Self::S16Le => Some((SampleFormat::S16, 2)),
            Self::S32Le => Some((SampleFormat::S32, 4)),
            Self::S24Le | Self::F32Le => None,
        }
    }
}

/// Pick the format the bridge will request from the platform.
pub fn negotiate_format(
    requested: SampleFormat,
    allow_fallback: bool,
) -> Result<SampleFormat, BridgeError> {
    if requested.stream_encoding().is_some() {
        return Ok(requested);
    }
    if allow_fallback {
        if let Some(format) = requested
            .fallbacks()
            .iter()
            .copied()
            .find(|f| f.stream_encoding().is_some())
        {
            log::debug!("sample format {:?} negotiated down to {:?}", requested, format);
            return Ok(format);
        }
    }
    Err(BridgeError::UnsupportedFormat(format!("{:?}", requested)))
}

/// Audio parameters exchanged with the multimedia library.
///
/// Requested by the application, then overwritten with what the platform
/// actually negotiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioSpec {
    /// Frames per second.
    pub freq: u32,
    pub format: SampleFormat,
    pub channels: u16,
    /// Frames per application buffer (0 = let the bridge choose).
    pub samples: u16,
    pub silence: u8,
    /// Bytes per application buffer.
    pub size: u32,
}

impl AudioSpec {
    pub fn new(freq: u32, format: SampleFormat, channels: u16, samples: u16) -> Self {
        let mut spec = Self {
            freq,
            format,
            channels,
            samples,
            silence: 0,
            size: 0,
        };
        spec.calculate();
        spec
    }

    /// Recompute the derived `silence` and `size` fields.
    pub fn calculate(&mut self) {
        self.silence = self.format.silence();
        self.size =
            (self.format.bits() as u32 / 8) * self.channels as u32 * self.samples as u32;
    }

    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.freq == 0 {
            return Err(BridgeError::InvalidSpec("sample rate must be positive".into()));
        }
        if !(1..=8).contains(&self.channels) {
            return Err(BridgeError::InvalidSpec(format!(
                "unsupported channel count: {}",
                self.channels
            )));
        }
        Ok(())
    }
}
