//! Inference engine — the opaque acoustic classifier contract.
//!
//! Grounded on `itsmontoya-scribble`'s `Backend` trait (`src/backend.rs`):
//! there, a `Backend` turns audio into transcript segments behind a trait
//! boundary so the rest of the crate never depends on a concrete model
//! runtime. Here an [`InferenceEngine`] turns one normalized waveform into
//! one score vector, for the same reason — the model itself is treated as
//! an external collaborator with a fixed input/output shape, never a
//! concrete dependency of this crate.

use crate::error::{Error, Result};
use crate::frame_assembler::{FRAME_SAMPLES, Waveform};
use crate::taxonomy::SCORE_VECTOR_LEN;

/// One score per taxonomy class, each in `[0, 1]`, aligned to taxonomy index.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector(Vec<f32>);

impl ScoreVector {
    pub fn new(scores: Vec<f32>) -> Result<Self> {
        if scores.len() != SCORE_VECTOR_LEN {
            return Err(Error::InferenceInvalid(format!(
                "expected {SCORE_VECTOR_LEN} scores, got {}",
                scores.len()
            )));
        }
        for &s in &scores {
            if !(0.0..=1.0).contains(&s) {
                return Err(Error::InferenceInvalid(format!(
                    "score {s} outside [0, 1]"
                )));
            }
        }
        Ok(Self(scores))
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

/// A classifier that maps one 975ms waveform window onto one score vector.
///
/// Implementations are free to hold model state (weights, a session handle)
/// behind `&self`; inference is assumed synchronous and is always called
/// from the worker thread that owns the waveform, never shared across
/// threads concurrently.
pub trait InferenceEngine {
    fn classify(&self, waveform: &Waveform) -> Result<ScoreVector>;
}

/// Test double returning a fixed score vector regardless of input, modeled
/// on `itsmontoya-scribble`'s `DummyBackend` (`src/scribble.rs` tests).
#[cfg(test)]
pub struct FixedEngine {
    pub scores: Vec<f32>,
}

#[cfg(test)]
impl InferenceEngine for FixedEngine {
    fn classify(&self, waveform: &Waveform) -> Result<ScoreVector> {
        assert_eq!(waveform.samples().len(), FRAME_SAMPLES);
        ScoreVector::new(self.scores.clone())
    }
}

/// Placeholder production engine: always reports silence.
///
/// The acoustic model itself is an external collaborator this crate never
/// ships — operators plug in a real [`InferenceEngine`] built
/// against their own model runtime. `NullEngine` lets the daemon and its
/// whole pipeline run end-to-end (decoder, framing, scoring, events, sink)
/// with a no-op classifier until one is wired in.
pub struct NullEngine;

impl InferenceEngine for NullEngine {
    fn classify(&self, waveform: &Waveform) -> Result<ScoreVector> {
        if waveform.samples().len() != FRAME_SAMPLES {
            return Err(Error::InferenceInvalid(format!(
                "expected {FRAME_SAMPLES} samples, got {}",
                waveform.samples().len()
            )));
        }
        ScoreVector::new(vec![0.0; SCORE_VECTOR_LEN])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        let err = ScoreVector::new(vec![0.1; 10]).unwrap_err();
        assert!(matches!(err, Error::InferenceInvalid(_)));
    }

    #[test]
    fn rejects_out_of_range_score() {
        let mut scores = vec![0.1; SCORE_VECTOR_LEN];
        scores[5] = 1.5;
        let err = ScoreVector::new(scores).unwrap_err();
        assert!(matches!(err, Error::InferenceInvalid(_)));
    }

    #[test]
    fn accepts_valid_vector() {
        let scores = vec![0.0; SCORE_VECTOR_LEN];
        assert!(ScoreVector::new(scores).is_ok());
    }

    #[test]
    fn null_engine_reports_silence() {
        let waveform = crate::frame_assembler::FrameAssembler::new()
            .push(&vec![0u8; FRAME_SAMPLES * 2])
            .remove(0);
        let out = NullEngine.classify(&waveform).unwrap();
        assert!(out.as_slice().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn fixed_engine_classifies_any_waveform() {
        let engine = FixedEngine { scores: vec![0.2; SCORE_VECTOR_LEN] };
        let waveform = crate::frame_assembler::FrameAssembler::new()
            .push(&vec![0u8; FRAME_SAMPLES * 2])
            .remove(0);
        let out = engine.classify(&waveform).unwrap();
        assert_eq!(out.as_slice().len(), SCORE_VECTOR_LEN);
    }
}
