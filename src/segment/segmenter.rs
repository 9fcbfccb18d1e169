use std::borrow::Cow;

use super::{
    build_checkerboard_kernel, build_ssm, compute_novelty, pick_peaks, smooth_and_downsample,
    BoundaryList, FeatureSequence, Kernel, KernelBank, NoveltyCurve, ThresholdPolicy,
};
use crate::Result;

/// Result of running a [Segmenter] on one feature sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Segmentation {
    /// Boundary frame indices into the smoothed and downsampled sequence.
    pub boundaries: BoundaryList,
    pub novelty: NoveltyCurve,
    /// Number of frames after downsampling.
    pub num_frames: usize,
    pub downsample_factor: usize,
}

impl Segmentation {
    /// Boundaries in seconds, given the frame rate of the original (not downsampled) sequence.
    pub fn boundaries_secs(&self, feature_rate: f64) -> Vec<f64> {
        crate::util::frames_to_seconds(
            self.boundaries.indices(),
            feature_rate,
            self.downsample_factor,
        )
    }
}

/// Runs the full novelty pipeline with a fixed set of parameters.
///
/// A [Segmenter] holds no state between runs; the same instance can be shared between
/// threads and reused for any number of sequences.
///
/// # Example
///
/// ```
/// use foote::segment::{FeatureSequence, KernelBank, Segmenter};
///
/// let mut frames = vec![vec![1.0, 0.0]; 40];
/// frames.extend(vec![vec![0.0, 1.0]; 40]);
/// let features = FeatureSequence::from_frames(&frames).unwrap();
///
/// let segmenter = Segmenter::default().with_half_width(8);
/// let kernels = KernelBank::build([(8, segmenter.variance())]).unwrap();
/// let segmentation = segmenter.run(&features, &kernels).unwrap();
/// assert_eq!(segmentation.boundaries.indices(), &[40]);
/// ```
#[derive(Clone, Debug)]
pub struct Segmenter {
    window_length: usize,
    downsample_factor: usize,
    half_width: usize,
    variance: Option<f64>,
    normalize: bool,
    exclude_boundary: bool,
    min_distance: usize,
    threshold_policy: ThresholdPolicy,
}

impl Default for Segmenter {
    fn default() -> Self {
        Self {
            window_length: 1,
            downsample_factor: 1,
            half_width: super::DEFAULT_HALF_WIDTH,
            variance: None,
            normalize: true,
            exclude_boundary: true,
            min_distance: super::DEFAULT_MIN_DISTANCE,
            threshold_policy: ThresholdPolicy::default(),
        }
    }
}

impl Segmenter {
    /// Returns a new [Segmenter] with the provided smoothing `window_length` and
    /// `downsample_factor`.
    pub fn with_smoothing(mut self, window_length: usize, downsample_factor: usize) -> Self {
        self.window_length = window_length;
        self.downsample_factor = downsample_factor;
        self
    }

    /// Returns a new [Segmenter] with the provided kernel `half_width`.
    pub fn with_half_width(mut self, half_width: usize) -> Self {
        self.half_width = half_width;
        self
    }

    /// Returns a new [Segmenter] with the provided kernel `variance`. If unset, the variance
    /// is derived from the half-width.
    pub fn with_variance(mut self, variance: f64) -> Self {
        self.variance = Some(variance);
        self
    }

    /// Returns a new [Segmenter] with `normalize` set to the provided value.
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = normalize;
        self
    }

    /// Returns a new [Segmenter] with `exclude_boundary` set to the provided value.
    pub fn with_exclude_boundary(mut self, exclude_boundary: bool) -> Self {
        self.exclude_boundary = exclude_boundary;
        self
    }

    /// Returns a new [Segmenter] with the provided `min_distance`.
    pub fn with_min_distance(mut self, min_distance: usize) -> Self {
        self.min_distance = min_distance;
        self
    }

    /// Returns a new [Segmenter] with the provided `threshold_policy`.
    pub fn with_threshold_policy(mut self, threshold_policy: ThresholdPolicy) -> Self {
        self.threshold_policy = threshold_policy;
        self
    }

    pub fn half_width(&self) -> usize {
        self.half_width
    }

    pub fn variance(&self) -> f64 {
        self.variance
            .unwrap_or_else(|| super::default_variance(self.half_width))
    }

    pub fn window_length(&self) -> usize {
        self.window_length
    }

    pub fn downsample_factor(&self) -> usize {
        self.downsample_factor
    }

    /// Runs the pipeline, taking the kernel from `kernels`.
    ///
    /// If the bank has no kernel for this segmenter's `(half_width, variance)`, one is built
    /// for this run only.
    pub fn run(&self, features: &FeatureSequence, kernels: &KernelBank) -> Result<Segmentation> {
        let kernel = match kernels.get(self.half_width, self.variance()) {
            Some(kernel) => Cow::Borrowed(kernel),
            None => {
                tracing::debug!(
                    half_width = self.half_width,
                    variance = self.variance(),
                    "kernel not found in bank; building"
                );
                Cow::Owned(build_checkerboard_kernel(self.half_width, self.variance())?)
            }
        };
        self.run_with_kernel(features, &kernel)
    }

    /// Runs the pipeline with an explicit kernel. The kernel's half-width takes precedence
    /// over the one configured on this segmenter.
    pub fn run_with_kernel(&self, features: &FeatureSequence, kernel: &Kernel) -> Result<Segmentation> {
        let span = tracing::span!(tracing::Level::TRACE, "segment");
        let _enter = span.enter();

        let smoothed = smooth_and_downsample(features, self.window_length, self.downsample_factor)?;
        let ssm = build_ssm(&smoothed, self.normalize)?;
        let novelty = compute_novelty(&ssm, kernel, self.exclude_boundary);
        let peaks = pick_peaks(&novelty, self.min_distance, self.threshold_policy)?;
        let boundaries = peaks.map_indices(|i| novelty.frame_index(i));

        tracing::debug!(
            frames = smoothed.num_frames(),
            half_width = kernel.half_width(),
            boundaries = boundaries.len(),
            "finished segmentation"
        );

        Ok(Segmentation {
            boundaries,
            novelty,
            num_frames: smoothed.num_frames(),
            downsample_factor: self.downsample_factor,
        })
    }
}
