use ndarray::{Array2, ArrayView2, Axis};

use super::FeatureSequence;
use crate::{Error, Result};

/// Square `T x T` matrix of pairwise frame similarities.
#[derive(Clone, Debug, PartialEq)]
pub struct SimilarityMatrix {
    data: Array2<f64>,
}

impl SimilarityMatrix {
    /// Number of frames (rows and columns).
    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.data[[i, j]]
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    /// Returns true if every entry has the same value, i.e. the matrix carries no structure.
    pub fn is_uniform(&self) -> bool {
        match self.data.iter().next() {
            Some(&first) => self.data.iter().all(|&v| v == first),
            None => true,
        }
    }
}

/// Computes the self-similarity matrix of a feature sequence.
///
/// With `normalize` set, every frame is scaled to unit length first, so entries are cosine
/// similarities. A frame with zero norm has similarity 0 to every frame, itself included.
/// Without `normalize`, entries are raw inner products.
///
/// Cost is `O(T^2 * F)` time and `O(T^2)` memory, which dominates the whole pipeline for long
/// sequences. Only the upper triangle is computed; the lower triangle is mirrored from it.
pub fn build_ssm(features: &FeatureSequence, normalize: bool) -> Result<SimilarityMatrix> {
    if features.is_empty() {
        return Err(Error::InvalidInput(
            "feature sequence has no frames".to_string(),
        ));
    }
    if features.num_dims() == 0 {
        return Err(Error::InvalidInput(
            "feature vectors have zero dimensions".to_string(),
        ));
    }

    let span = tracing::span!(tracing::Level::TRACE, "build_ssm");
    let _enter = span.enter();

    let mut frames = features.view().to_owned();
    if normalize {
        for mut frame in frames.axis_iter_mut(Axis(0)) {
            let norm = frame.dot(&frame).sqrt();
            if norm > 0.0 {
                frame /= norm;
            } else {
                frame.fill(0.0);
            }
        }
    }

    let num_frames = frames.nrows();
    let mut data = Array2::<f64>::zeros((num_frames, num_frames));
    for i in 0..num_frames {
        let row_i = frames.row(i);
        for j in i..num_frames {
            let sim = row_i.dot(&frames.row(j));
            data[[i, j]] = sim;
            data[[j, i]] = sim;
        }
    }

    let ssm = SimilarityMatrix { data };
    if ssm.is_uniform() {
        tracing::warn!(
            frames = num_frames,
            value = ssm.get(0, 0),
            "similarity matrix is uniform; no structure to segment"
        );
    } else {
        tracing::debug!(frames = num_frames, "built similarity matrix");
    }

    Ok(ssm)
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> FeatureSequence {
        FeatureSequence::from_frames(&[
            vec![1.0, 0.0, 0.0],
            vec![3.0, 4.0, 0.0],
            vec![0.0, 0.0, 0.0],
            vec![0.2, -0.5, 2.0],
            vec![-1.0, 0.0, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_ssm_shape_and_diagonal() {
        let ssm = build_ssm(&sample(), true).unwrap();
        assert_eq!(ssm.len(), 5);
        assert_eq!(ssm.view().dim(), (5, 5));
        for i in 0..5 {
            let expected = if i == 2 { 0.0 } else { 1.0 };
            assert!((ssm.get(i, i) - expected).abs() < 1e-12, "S[{i},{i}]");
        }
    }

    #[test]
    fn test_ssm_symmetric() {
        for normalize in [true, false] {
            let ssm = build_ssm(&sample(), normalize).unwrap();
            for i in 0..5 {
                for j in 0..5 {
                    assert_eq!(ssm.get(i, j), ssm.get(j, i));
                }
            }
        }
    }

    #[test]
    fn test_ssm_zero_norm_frame() {
        let ssm = build_ssm(&sample(), true).unwrap();
        for j in 0..5 {
            assert_eq!(ssm.get(2, j), 0.0);
            assert!(!ssm.get(2, j).is_nan());
        }
    }

    #[test]
    fn test_ssm_cosine_values() {
        let ssm = build_ssm(&sample(), true).unwrap();
        assert!((ssm.get(0, 1) - 0.6).abs() < 1e-12);
        assert!((ssm.get(0, 4) + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_ssm_raw_inner_product() {
        let ssm = build_ssm(&sample(), false).unwrap();
        assert_eq!(ssm.get(1, 1), 25.0);
        assert_eq!(ssm.get(0, 1), 3.0);
    }

    #[test]
    fn test_ssm_invalid_input() {
        let empty = FeatureSequence::from_frames(&[]).unwrap();
        assert!(matches!(build_ssm(&empty, true), Err(Error::InvalidInput(_))));

        let no_dims = FeatureSequence::from_frames(&[vec![], vec![]]).unwrap();
        assert!(matches!(build_ssm(&no_dims, true), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_ssm_uniform() {
        let constant = FeatureSequence::from_frames(&vec![vec![0.3, 0.4]; 6]).unwrap();
        assert!(build_ssm(&constant, true).unwrap().is_uniform());
        assert!(!build_ssm(&sample(), true).unwrap().is_uniform());
    }
}
