use ndarray::s;

use super::{Kernel, SimilarityMatrix};

// Relative magnitude below which a kernel response is treated as rounding noise.
const NOVELTY_FLOOR: f64 = 1e-10;

/// Novelty values along the SSM diagonal.
///
/// `offset` is the frame index of the first value. It is `M` when the kernel overhang at the
/// edges was excluded and `0` otherwise.
#[derive(Clone, Debug, PartialEq)]
pub struct NoveltyCurve {
    values: Vec<f64>,
    offset: usize,
}

impl NoveltyCurve {
    pub fn new(values: Vec<f64>, offset: usize) -> Self {
        Self { values, offset }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Maps an index into this curve back to a frame index of the SSM.
    pub fn frame_index(&self, index: usize) -> usize {
        index + self.offset
    }
}

/// Correlates `kernel` with the SSM block centered on each diagonal entry `(n, n)`.
///
/// Only centers where the kernel lies fully inside the matrix (`M <= n < T - M`) are
/// computed. With `exclude_boundary` the curve holds just those `T - 2M` values and starts
/// at frame `M`; otherwise it has length `T` and the `M` frames at each end are 0.
/// A sequence shorter than `2M + 1` frames has no valid center.
///
/// Values are left unscaled. Because the kernel has zero mean, a block of uniform similarity
/// yields 0, and the response is largest where two dissimilar blocks meet on the diagonal.
/// Responses smaller than rounding noise (relative to the largest SSM magnitude) are reported
/// as exactly 0 so flat regions stay flat.
pub fn compute_novelty(ssm: &SimilarityMatrix, kernel: &Kernel, exclude_boundary: bool) -> NoveltyCurve {
    let span = tracing::span!(tracing::Level::TRACE, "compute_novelty");
    let _enter = span.enter();

    let num_frames = ssm.len();
    let m = kernel.half_width();
    let num_valid = num_frames.saturating_sub(2 * m);

    let (len, offset) = if exclude_boundary {
        (num_valid, m)
    } else {
        (num_frames, 0)
    };
    let mut values = vec![0.0; len];

    let matrix = ssm.view();
    let weights = kernel.view();
    let floor = NOVELTY_FLOOR * matrix.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    for n in m..m + num_valid {
        let block = matrix.slice(s![n - m..=n + m, n - m..=n + m]);
        let novelty: f64 = block.iter().zip(weights.iter()).map(|(s, k)| s * k).sum();
        values[n - offset] = if novelty.abs() < floor { 0.0 } else { novelty };
    }

    tracing::debug!(
        frames = num_frames,
        half_width = m,
        exclude_boundary,
        len,
        "computed novelty curve"
    );

    NoveltyCurve::new(values, offset)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::segment::{build_checkerboard_kernel, build_ssm, FeatureSequence};

    fn two_blocks(len_a: usize, len_b: usize) -> SimilarityMatrix {
        let mut frames = vec![vec![1.0, 0.0]; len_a];
        frames.extend(vec![vec![0.0, 1.0]; len_b]);
        build_ssm(&FeatureSequence::from_frames(&frames).unwrap(), true).unwrap()
    }

    #[test]
    fn test_novelty_length_excluded() {
        let ssm = two_blocks(15, 15);
        let kernel = build_checkerboard_kernel(4, 16.0).unwrap();
        let curve = compute_novelty(&ssm, &kernel, true);
        assert_eq!(curve.len(), 30 - 8);
        assert_eq!(curve.offset(), 4);
        assert_eq!(curve.frame_index(0), 4);
    }

    #[test]
    fn test_novelty_length_padded() {
        let ssm = two_blocks(15, 15);
        let kernel = build_checkerboard_kernel(4, 16.0).unwrap();
        let curve = compute_novelty(&ssm, &kernel, false);
        assert_eq!(curve.len(), 30);
        assert_eq!(curve.offset(), 0);
        assert!(curve.values()[..4].iter().all(|&v| v == 0.0));
        assert!(curve.values()[26..].iter().all(|&v| v == 0.0));

        // Interior values agree with the excluded variant.
        let excluded = compute_novelty(&ssm, &kernel, true);
        assert_eq!(&curve.values()[4..26], excluded.values());
    }

    #[test]
    fn test_novelty_peaks_at_transition() {
        let ssm = two_blocks(15, 15);
        let kernel = build_checkerboard_kernel(4, 16.0).unwrap();
        let curve = compute_novelty(&ssm, &kernel, true);
        let (argmax, _) = curve
            .values()
            .iter()
            .enumerate()
            .fold((0, f64::MIN), |best, (i, &v)| if v > best.1 { (i, v) } else { best });
        assert_eq!(curve.frame_index(argmax), 15);
    }

    #[test]
    fn test_novelty_uniform_region_is_zero() {
        let ssm = two_blocks(15, 15);
        let kernel = build_checkerboard_kernel(4, 16.0).unwrap();
        let curve = compute_novelty(&ssm, &kernel, false);
        // Kernel centered at frames 4..=6 only covers block A.
        for n in 4..=6 {
            assert_eq!(curve.values()[n], 0.0, "novelty[{}]", n);
        }
    }

    #[test]
    fn test_novelty_short_sequence() {
        let ssm = two_blocks(3, 3);
        let kernel = build_checkerboard_kernel(4, 16.0).unwrap();
        assert!(compute_novelty(&ssm, &kernel, true).is_empty());
        let padded = compute_novelty(&ssm, &kernel, false);
        assert_eq!(padded.values(), &[0.0; 6]);
    }
}
