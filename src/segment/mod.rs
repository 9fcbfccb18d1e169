//! Foote novelty segmentation.
//!
//! The pipeline runs in a fixed order:
//!
//! 1. [smooth_and_downsample] averages frames over time and keeps every n-th frame
//! 2. [build_ssm] computes the self-similarity matrix of the sequence
//! 3. [compute_novelty] correlates a [Kernel] along the SSM diagonal
//! 4. [pick_peaks] selects local maxima of the novelty curve as boundaries
//!
//! [Segmenter] composes all four stages.

mod features;
mod kernel;
mod novelty;
mod peaks;
mod segmenter;
mod smoother;
mod ssm;

pub use features::{FeatureKind, FeatureSequence};
pub use kernel::{build_checkerboard_kernel, Kernel, KernelBank};
pub use novelty::{compute_novelty, NoveltyCurve};
pub use peaks::{pick_peaks, BoundaryList, ThresholdPolicy};
pub use segmenter::{Segmentation, Segmenter};
pub use smoother::smooth_and_downsample;
pub use ssm::{build_ssm, SimilarityMatrix};

/// Default kernel half-widths (frames) swept by a grid run.
pub const DEFAULT_HALF_WIDTHS: [usize; 4] = [20, 30, 40, 50];

/// Default `(window_length, downsample_factor)` pairs swept by a grid run.
pub const DEFAULT_SMOOTHING_PARAMS: [(usize, usize); 3] = [(9, 2), (9, 4), (21, 5)];

/// Default feature rate (frames per second) of the raw feature sequences.
pub const DEFAULT_FEATURE_RATE: f64 = 10.0;

/// Default minimum gap (frames) between two retained peaks.
pub const DEFAULT_MIN_DISTANCE: usize = 1;

/// Default multiplier for the median-absolute-deviation peak threshold.
pub const DEFAULT_MAD_MULTIPLIER: f64 = 1.0;

/// Default kernel half-width used by a [Segmenter].
pub const DEFAULT_HALF_WIDTH: usize = 20;

/// Default kernel variance for a given half-width.
///
/// The Gaussian taper has a standard deviation equal to the half-width, which keeps the
/// outermost kernel entries at roughly 60% of the center weight.
pub fn default_variance(half_width: usize) -> f64 {
    (half_width * half_width) as f64
}
