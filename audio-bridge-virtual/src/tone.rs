//! Sine tone source for virtual capture streams, plus the matching decoder
//! used to check what came out of the bridge.

use std::f32::consts::TAU;

use audio_bridge_core::models::audio_format::StreamEncoding;

/// Interleaved sine generator writing one platform encoding.
///
/// Every channel carries the same sample. Phase is kept across calls, so
/// consecutive periods join without a discontinuity.
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    frequency: f32,
    sample_rate: u32,
    channels: u16,
    encoding: StreamEncoding,
    amplitude: f32,
    phase: f32,
}

impl ToneGenerator {
    pub fn new(frequency: f32, sample_rate: u32, channels: u16, encoding: StreamEncoding) -> Self {
        Self {
            frequency,
            sample_rate,
            channels,
            encoding,
            amplitude: 0.5,
            phase: 0.0,
        }
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude.clamp(0.0, 1.0);
        self
    }

    pub fn bytes_per_frame(&self) -> usize {
        self.encoding.byte_depth() * self.channels as usize
    }

    /// Fill `out` with whole frames; a trailing partial frame is zeroed.
    pub fn fill(&mut self, out: &mut [u8]) {
        let frame_len = self.bytes_per_frame();
        let step = TAU * self.frequency / self.sample_rate as f32;
        let depth = self.encoding.byte_depth();

        let mut frames = out.chunks_exact_mut(frame_len);
        for frame in &mut frames {
            let value = self.amplitude * self.phase.sin();
            for sample in frame.chunks_exact_mut(depth) {
                encode_sample(self.encoding, value, sample);
            }
            self.phase = (self.phase + step) % TAU;
        }
        frames.into_remainder().fill(0);
    }
}

fn encode_sample(encoding: StreamEncoding, value: f32, out: &mut [u8]) {
    match encoding {
        StreamEncoding::U8 => out[0] = ((value * 127.0) + 128.0).round() as u8,
        StreamEncoding::S16Le => {
            out.copy_from_slice(&((value * i16::MAX as f32) as i16).to_le_bytes())
        }
        StreamEncoding::S24Le => {
            let v = (value * 8_388_607.0) as i32;
            out.copy_from_slice(&v.to_le_bytes()[..3]);
        }
        StreamEncoding::S32Le => {
            out.copy_from_slice(&((value as f64 * i32::MAX as f64) as i32).to_le_bytes())
        }
        StreamEncoding::F32Le => out.copy_from_slice(&value.to_le_bytes()),
    }
}

/// Decode interleaved PCM back to floats in [-1, 1].
pub fn decode_samples(encoding: StreamEncoding, bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(encoding.byte_depth())
        .map(|s| match encoding {
            StreamEncoding::U8 => (s[0] as f32 - 128.0) / 127.0,
            StreamEncoding::S16Le => i16::from_le_bytes([s[0], s[1]]) as f32 / i16::MAX as f32,
            StreamEncoding::S24Le => {
                // sign-extend through the top byte
                let v = i32::from_le_bytes([0, s[0], s[1], s[2]]) >> 8;
                v as f32 / 8_388_607.0
            }
            StreamEncoding::S32Le => {
                (i32::from_le_bytes([s[0], s[1], s[2], s[3]]) as f64 / i32::MAX as f64) as f32
            }
            StreamEncoding::F32Le => f32::from_le_bytes([s[0], s[1], s[2], s[3]]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn s16_tone_follows_the_sine() {
        let mut tone = ToneGenerator::new(1000.0, 48000, 1, StreamEncoding::S16Le);
        let mut out = vec![0u8; 96]; // 48 frames, one full cycle
        tone.fill(&mut out);

        let samples = decode_samples(StreamEncoding::S16Le, &out);
        assert_eq!(samples.len(), 48);
        for (i, s) in samples.iter().enumerate() {
            let expected = 0.5 * (TAU * i as f32 / 48.0).sin();
            assert_abs_diff_eq!(*s, expected, epsilon = 1e-3);
        }
    }

    #[test]
    fn channels_carry_the_same_sample() {
        let mut tone = ToneGenerator::new(440.0, 44100, 2, StreamEncoding::F32Le);
        let mut out = vec![0u8; 8 * 32];
        tone.fill(&mut out);

        let samples = decode_samples(StreamEncoding::F32Le, &out);
        for frame in samples.chunks_exact(2) {
            assert_abs_diff_eq!(frame[0], frame[1]);
        }
    }

    #[test]
    fn phase_continues_across_calls() {
        let mut split = ToneGenerator::new(300.0, 8000, 1, StreamEncoding::S32Le);
        let mut whole = split.clone();

        let mut a = vec![0u8; 40];
        let mut b = vec![0u8; 40];
        split.fill(&mut a);
        split.fill(&mut b);

        let mut both = vec![0u8; 80];
        whole.fill(&mut both);

        a.extend_from_slice(&b);
        let joined = decode_samples(StreamEncoding::S32Le, &a);
        let reference = decode_samples(StreamEncoding::S32Le, &both);
        for (x, y) in joined.iter().zip(&reference) {
            assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
        }
    }

    #[test]
    fn u8_is_centred_on_0x80() {
        let mut tone = ToneGenerator::new(100.0, 8000, 1, StreamEncoding::U8).with_amplitude(0.0);
        let mut out = vec![0u8; 16];
        tone.fill(&mut out);
        assert!(out.iter().all(|&b| b == 0x80));
    }

    #[test]
    fn s24_decodes_negative_values() {
        let mut bytes = [0u8; 3];
        encode_sample(StreamEncoding::S24Le, -0.25, &mut bytes);
        let decoded = decode_samples(StreamEncoding::S24Le, &bytes);
        assert_abs_diff_eq!(decoded[0], -0.25, epsilon = 1e-5);
    }

    #[test]
    fn partial_frame_is_zeroed() {
        let mut tone = ToneGenerator::new(440.0, 48000, 2, StreamEncoding::S16Le);
        let mut out = vec![0xffu8; 6]; // one frame plus half of the next
        tone.fill(&mut out);
        assert_eq!(&out[4..], &[0, 0]);
    }
}
