use std::collections::HashMap;

use ndarray::{Array2, ArrayView2};

use crate::{Error, Result};

/// A Gaussian-tapered checkerboard kernel of size `(2M + 1) x (2M + 1)`.
///
/// Entries sum to (approximately) zero and their absolute values sum to one.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    half_width: usize,
    variance: f64,
    data: Array2<f64>,
}

impl Kernel {
    pub fn half_width(&self) -> usize {
        self.half_width
    }

    pub fn variance(&self) -> f64 {
        self.variance
    }

    /// Full side length, `2M + 1`.
    pub fn size(&self) -> usize {
        2 * self.half_width + 1
    }

    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn sum(&self) -> f64 {
        self.data.sum()
    }
}

/// Builds a checkerboard kernel with half-width `M` over the grid `x, y in [-M, M]`.
///
/// Each entry is `exp(-(x^2 + y^2) / (2 * variance)) * sign(x) * sign(y)`, where `sign(0)`
/// is taken to be `+1`. The center row and column therefore belong to the lower-right
/// (positive) quadrant, which makes the response exactly symmetric for a transition that
/// falls on the center frame and slightly asymmetric one frame either side of it.
///
/// The kernel is then shifted to zero mean, so a uniform region of the SSM produces no
/// response, and scaled so its absolute values sum to one.
pub fn build_checkerboard_kernel(half_width: usize, variance: f64) -> Result<Kernel> {
    if half_width < 1 {
        return Err(Error::parameter("half_width", "must be at least 1"));
    }
    if !(variance.is_finite() && variance > 0.0) {
        return Err(Error::parameter(
            "variance",
            format!("must be a positive finite number, got {}", variance),
        ));
    }

    let m = half_width as isize;
    let size = 2 * half_width + 1;
    let sign = |v: isize| if v < 0 { -1.0 } else { 1.0 };

    let mut data = Array2::from_shape_fn((size, size), |(i, j)| {
        let x = i as isize - m;
        let y = j as isize - m;
        let r2 = (x * x + y * y) as f64;
        (-r2 / (2.0 * variance)).exp() * sign(x) * sign(y)
    });

    let mean = data.sum() / (size * size) as f64;
    data.mapv_inplace(|v| v - mean);

    let l1: f64 = data.iter().map(|v| v.abs()).sum();
    if l1 > 0.0 {
        data.mapv_inplace(|v| v / l1);
    }

    Ok(Kernel {
        half_width,
        variance,
        data,
    })
}

/// A read-only table of pre-built kernels keyed by `(half_width, variance)`.
///
/// The bank is populated once by its owner and then only looked up, so a shared reference
/// can be handed to any number of concurrent pipeline runs.
#[derive(Clone, Debug, Default)]
pub struct KernelBank {
    kernels: HashMap<(usize, u64), Kernel>,
}

impl KernelBank {
    /// Builds a kernel for every `(half_width, variance)` pair.
    pub fn build<I>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (usize, f64)>,
    {
        let mut kernels = HashMap::new();
        for (half_width, variance) in specs {
            let key = Self::key(half_width, variance);
            if kernels.contains_key(&key) {
                continue;
            }
            kernels.insert(key, build_checkerboard_kernel(half_width, variance)?);
        }
        tracing::debug!(num_kernels = kernels.len(), "built kernel bank");
        Ok(Self { kernels })
    }

    /// Builds a kernel for every half-width using [default_variance](super::default_variance).
    pub fn with_default_variance(half_widths: &[usize]) -> Result<Self> {
        Self::build(
            half_widths
                .iter()
                .map(|&m| (m, super::default_variance(m))),
        )
    }

    pub fn get(&self, half_width: usize, variance: f64) -> Option<&Kernel> {
        self.kernels.get(&Self::key(half_width, variance))
    }

    pub fn len(&self) -> usize {
        self.kernels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kernels.is_empty()
    }

    fn key(half_width: usize, variance: f64) -> (usize, u64) {
        (half_width, variance.to_bits())
    }
}
