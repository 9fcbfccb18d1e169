use ndarray::{Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// A time-ordered sequence of feature vectors.
///
/// Stored as a `T x F` matrix: one row per frame, one column per feature dimension.
/// Frame order is never changed by any stage of the pipeline.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSequence {
    frames: Array2<f64>,
}

impl FeatureSequence {
    /// Builds a sequence from a list of frames. All frames must have the same dimension.
    pub fn from_frames(frames: &[Vec<f64>]) -> Result<Self> {
        let num_dims = frames.first().map_or(0, |f| f.len());
        if let Some(bad) = frames.iter().position(|f| f.len() != num_dims) {
            return Err(Error::InvalidInput(format!(
                "frame {} has {} dimensions, expected {}",
                bad,
                frames[bad].len(),
                num_dims
            )));
        }
        let data: Vec<f64> = frames.iter().flatten().copied().collect();
        let frames = Array2::from_shape_vec((frames.len(), num_dims), data)?;
        Ok(Self { frames })
    }

    /// Builds a sequence from a feature-major matrix, where each inner vector is one feature
    /// dimension over time (i.e. columns are frames).
    pub fn from_columns(rows: &[Vec<f64>]) -> Result<Self> {
        let transposed = Self::from_frames(rows)?;
        Ok(Self::from_array(transposed.frames.reversed_axes()))
    }

    /// Wraps a `T x F` matrix.
    pub fn from_array(frames: Array2<f64>) -> Self {
        Self {
            frames: frames.as_standard_layout().into_owned(),
        }
    }

    pub fn num_frames(&self) -> usize {
        self.frames.nrows()
    }

    pub fn num_dims(&self) -> usize {
        self.frames.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.num_frames() == 0
    }

    /// Returns the feature vector of frame `index`.
    pub fn frame(&self, index: usize) -> ArrayView1<'_, f64> {
        self.frames.row(index)
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.frames.view()
    }

    /// Returns a new sequence with the first `count` feature dimensions removed.
    pub fn drop_leading_dims(&self, count: usize) -> Self {
        let count = count.min(self.num_dims());
        Self::from_array(self.frames.slice(ndarray::s![.., count..]).to_owned())
    }
}

/// Kind of feature sequence, used by the orchestration layer to prepare a sequence before
/// it enters the (kind-agnostic) pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
pub enum FeatureKind {
    /// Pitch-class energy (chroma). Quantized CENS-style before smoothing.
    Chroma,
    /// Timbral coefficients (MFCC). The two lowest-order coefficients are dropped.
    Timbral,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 2] = [FeatureKind::Chroma, FeatureKind::Timbral];

    /// Number of leading MFCC coefficients discarded for timbral features.
    const TIMBRAL_DROPPED_COEFFS: usize = 2;

    /// CENS quantization steps, highest first. A value at or above step `i` maps to
    /// `CENS_STEPS.len() - i`.
    const CENS_STEPS: [f64; 4] = [0.4, 0.2, 0.1, 0.05];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::Chroma => "chroma",
            FeatureKind::Timbral => "timbral",
        }
    }

    /// Applies the kind-specific preparation step.
    pub fn prepare(&self, features: &FeatureSequence) -> FeatureSequence {
        match self {
            FeatureKind::Chroma => Self::quantize_cens(features),
            FeatureKind::Timbral => features.drop_leading_dims(Self::TIMBRAL_DROPPED_COEFFS),
        }
    }

    // L1-normalizes every frame, then maps each entry onto the CENS quantization levels.
    // Silent frames (zero L1 norm) stay all-zero.
    fn quantize_cens(features: &FeatureSequence) -> FeatureSequence {
        let mut frames = features.frames.clone();
        for mut frame in frames.axis_iter_mut(Axis(0)) {
            let norm: f64 = frame.iter().map(|v| v.abs()).sum();
            frame.mapv_inplace(|v| {
                if norm <= 0.0 {
                    return 0.0;
                }
                let v = v.abs() / norm;
                Self::CENS_STEPS
                    .iter()
                    .position(|&step| v >= step)
                    .map_or(0.0, |i| (Self::CENS_STEPS.len() - i) as f64)
            });
        }
        FeatureSequence { frames }
    }
}

impl std::fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_columns_transposes() {
        // 2 dimensions over 3 frames.
        let seq = FeatureSequence::from_columns(&[vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        assert_eq!(seq.num_frames(), 3);
        assert_eq!(seq.num_dims(), 2);
        assert_eq!(seq.frame(1).to_vec(), vec![2.0, 5.0]);
    }

    #[test]
    fn test_ragged_frames_rejected() {
        let err = FeatureSequence::from_frames(&[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_empty_sequence_allowed() {
        let seq = FeatureSequence::from_frames(&[]).unwrap();
        assert!(seq.is_empty());
        assert_eq!(seq.num_dims(), 0);
    }

    #[test]
    fn test_timbral_drops_leading_coefficients() {
        let seq = FeatureSequence::from_frames(&[vec![9.0, 8.0, 1.0, 2.0]]).unwrap();
        let prepared = FeatureKind::Timbral.prepare(&seq);
        assert_eq!(prepared.frame(0).to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_chroma_quantization() {
        // L1 norm is 1.0, so values map directly onto the quantization levels.
        let seq = FeatureSequence::from_frames(&[
            vec![0.5, 0.25, 0.15, 0.07, 0.03],
            vec![0.0, 0.0, 0.0, 0.0, 0.0],
        ])
        .unwrap();
        let prepared = FeatureKind::Chroma.prepare(&seq);
        assert_eq!(prepared.frame(0).to_vec(), vec![4.0, 3.0, 2.0, 1.0, 0.0]);
        assert_eq!(prepared.frame(1).to_vec(), vec![0.0; 5]);
    }
}
