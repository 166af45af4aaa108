//! Frame assembler — turns a raw PCM16LE byte stream into fixed-size
//! normalized waveform windows.
//!
//! Modeled on `itsmontoya-scribble`'s `PipeReader` (`src/pipe_reader/reader.rs`):
//! accumulate bytes from a non-blocking reader into a buffer, and once enough
//! bytes for one unit of work are present, slice it off and hand it to a
//! processing step. Here the "unit of work" is a fixed 31,200-byte frame
//! (15,600 i16 samples = 975ms at 16kHz mono) rather than `PipeReader`'s
//! min-bytes-or-EOF probe.

use crate::error::{Error, Result};

/// Samples per frame: 975ms at 16kHz mono.
pub const FRAME_SAMPLES: usize = 15_600;
/// Bytes per frame: `FRAME_SAMPLES` i16 samples, little-endian.
pub const FRAME_BYTES: usize = FRAME_SAMPLES * 2;

/// One normalized 975ms analysis window: `FRAME_SAMPLES` samples in `[-1, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform(Vec<f32>);

impl Waveform {
    pub fn samples(&self) -> &[f32] {
        &self.0
    }
}

impl AsRef<[f32]> for Waveform {
    fn as_ref(&self) -> &[f32] {
        &self.0
    }
}

fn normalize(frame: &[u8]) -> Waveform {
    debug_assert_eq!(frame.len(), FRAME_BYTES);
    let samples = frame
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect();
    Waveform(samples)
}

/// Accumulates raw decoder bytes and emits complete frames.
///
/// One instance per source; not `Send`-shared, owned exclusively by the
/// source's read loop (mirrors `PipeReader`'s ownership — a single consumer
/// drives reads and frame extraction).
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self { buf: Vec::with_capacity(FRAME_BYTES) }
    }

    /// Append newly-read bytes and drain as many complete frames as are
    /// now available. Leftover bytes (< `FRAME_BYTES`) remain buffered for
    /// the next call.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Waveform> {
        self.buf.extend_from_slice(bytes);
        let mut frames = Vec::new();
        while self.buf.len() >= FRAME_BYTES {
            let frame: Vec<u8> = self.buf.drain(..FRAME_BYTES).collect();
            frames.push(normalize(&frame));
        }
        frames
    }

    /// Number of bytes currently buffered, short of a complete frame.
    pub fn pending_bytes(&self) -> usize {
        self.buf.len()
    }

    /// Called when the decoder stream has ended. A partial frame is
    /// discarded, not zero-padded, and reported as [`Error::FrameTruncated`]
    /// when non-empty so callers can log it.
    pub fn finish(&mut self, source_name: &str) -> Result<()> {
        let discarded = self.buf.len();
        self.buf.clear();
        if discarded > 0 {
            return Err(Error::FrameTruncated(source_name.to_owned(), discarded));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    #[test]
    fn accumulates_partial_pushes_into_one_frame() {
        let mut asm = FrameAssembler::new();
        let samples: Vec<i16> = (0..FRAME_SAMPLES as i16).collect();
        let bytes = pcm_bytes(&samples);

        let (first, second) = bytes.split_at(bytes.len() / 2);
        assert!(asm.push(first).is_empty());
        let frames = asm.push(second);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].samples().len(), FRAME_SAMPLES);
    }

    #[test]
    fn normalizes_extremes_into_unit_range() {
        let mut asm = FrameAssembler::new();
        let mut samples = vec![0i16; FRAME_SAMPLES];
        samples[0] = i16::MAX;
        samples[1] = i16::MIN;
        let frames = asm.push(&pcm_bytes(&samples));

        assert_eq!(frames.len(), 1);
        let out = frames[0].samples();
        assert!(out[0] > 0.99 && out[0] <= 1.0);
        assert!(out[1] >= -1.0 && out[1] < -0.99);
    }

    #[test]
    fn emits_multiple_frames_from_one_large_push() {
        let mut asm = FrameAssembler::new();
        let samples = vec![0i16; FRAME_SAMPLES * 3];
        let frames = asm.push(&pcm_bytes(&samples));
        assert_eq!(frames.len(), 3);
        assert_eq!(asm.pending_bytes(), 0);
    }

    #[test]
    fn finish_with_empty_buffer_is_ok() {
        let mut asm = FrameAssembler::new();
        assert!(asm.finish("front_door").is_ok());
    }

    #[test]
    fn finish_with_partial_frame_reports_truncation() {
        let mut asm = FrameAssembler::new();
        asm.push(&[0u8; 10]);
        let err = asm.finish("front_door").unwrap_err();
        match err {
            Error::FrameTruncated(name, n) => {
                assert_eq!(name, "front_door");
                assert_eq!(n, 10);
            }
            other => panic!("expected FrameTruncated, got {other:?}"),
        }
        assert_eq!(asm.pending_bytes(), 0);
    }
}
