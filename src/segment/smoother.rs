use ndarray::{s, Array2, Axis};

use super::FeatureSequence;
use crate::{Error, Result};

/// Smooths a feature sequence with a centered moving average, then keeps every
/// `downsample_factor`-th frame, starting with the first.
///
/// Near the sequence edges the window is truncated to the frames that exist, so edge frames
/// are averages of fewer neighbors instead of being diluted by padding. For an even
/// `window_length` the window extends one frame further to the right than to the left.
///
/// The output has `ceil(T / downsample_factor)` frames. `window_length = 1` together with
/// `downsample_factor = 1` is the identity.
pub fn smooth_and_downsample(
    features: &FeatureSequence,
    window_length: usize,
    downsample_factor: usize,
) -> Result<FeatureSequence> {
    if window_length == 0 {
        return Err(Error::parameter("window_length", "must be at least 1"));
    }
    if downsample_factor == 0 {
        return Err(Error::parameter("downsample_factor", "must be at least 1"));
    }

    let span = tracing::span!(tracing::Level::TRACE, "smooth_and_downsample");
    let _enter = span.enter();

    let input = features.view();
    let (num_frames, num_dims) = input.dim();

    let left = (window_length - 1) / 2;
    let right = window_length / 2;

    let num_out = (num_frames + downsample_factor - 1) / downsample_factor;
    let mut output = Array2::<f64>::zeros((num_out, num_dims));
    for (out_idx, t) in (0..num_frames).step_by(downsample_factor).enumerate() {
        let start = t.saturating_sub(left);
        let end = (t + right + 1).min(num_frames);
        // The window is never empty: it always contains frame `t`.
        if let Some(mean) = input.slice(s![start..end, ..]).mean_axis(Axis(0)) {
            output.row_mut(out_idx).assign(&mean);
        }
    }

    tracing::trace!(
        input_frames = num_frames,
        output_frames = output.len_of(Axis(0)),
        window_length,
        downsample_factor,
        "smoothed feature sequence"
    );

    Ok(FeatureSequence::from_array(output))
}

#[cfg(test)]
mod test {
    use super::*;

    fn ramp(num_frames: usize) -> FeatureSequence {
        let frames: Vec<Vec<f64>> = (0..num_frames).map(|t| vec![t as f64, 1.0]).collect();
        FeatureSequence::from_frames(&frames).unwrap()
    }

    #[test]
    fn test_identity() {
        let seq = FeatureSequence::from_frames(&[
            vec![0.1, 0.7],
            vec![0.3, 0.2],
            vec![1e-9, 5.5],
        ])
        .unwrap();
        let out = smooth_and_downsample(&seq, 1, 1).unwrap();
        assert_eq!(out, seq);
    }

    #[test]
    fn test_moving_average_truncates_at_edges() {
        let out = smooth_and_downsample(&ramp(5), 3, 1).unwrap();
        let col: Vec<f64> = (0..5).map(|t| out.frame(t)[0]).collect();
        // First frame averages frames 0 and 1, last averages frames 3 and 4.
        assert_eq!(col, vec![0.5, 1.0, 2.0, 3.0, 3.5]);
        // A constant dimension stays constant; no padding leaks in.
        assert!((0..5).all(|t| (out.frame(t)[1] - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_downsample_length() {
        for (num_frames, factor, expected) in [(10, 3, 4), (9, 3, 3), (1, 5, 1), (7, 1, 7)] {
            let out = smooth_and_downsample(&ramp(num_frames), 1, factor).unwrap();
            assert_eq!(out.num_frames(), expected);
        }
        let out = smooth_and_downsample(&ramp(10), 1, 3).unwrap();
        assert_eq!(out.frame(1)[0], 3.0);
        assert_eq!(out.frame(3)[0], 9.0);
    }

    #[test]
    fn test_smooth_then_downsample() {
        let out = smooth_and_downsample(&ramp(6), 3, 2).unwrap();
        // Smoothed ramp is [0.5, 1, 2, 3, 4, 4.5]; keep frames 0, 2 and 4.
        let col: Vec<f64> = (0..out.num_frames()).map(|t| out.frame(t)[0]).collect();
        assert_eq!(col, vec![0.5, 2.0, 4.0]);
    }

    #[test]
    fn test_invalid_parameters() {
        let seq = ramp(4);
        assert!(matches!(
            smooth_and_downsample(&seq, 0, 1),
            Err(Error::InvalidParameter { name: "window_length", .. })
        ));
        assert!(matches!(
            smooth_and_downsample(&seq, 3, 0),
            Err(Error::InvalidParameter { name: "downsample_factor", .. })
        ));
    }
}
