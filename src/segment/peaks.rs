use serde::{Deserialize, Serialize};

use super::NoveltyCurve;
use crate::{Error, Result};

/// Rule deciding how high a local maximum must be to count as a boundary.
///
/// A candidate is kept only if its value is strictly greater than the bar.
#[derive(Copy, Clone, Debug, PartialEq, Deserialize, Serialize)]
pub enum ThresholdPolicy {
    /// Every strict local maximum qualifies.
    None,
    /// Bar is the given (non-negative) fraction of the curve's maximum value.
    FractionOfMax(f64),
    /// Bar is `median + multiplier * MAD`, where MAD is the median absolute deviation from the
    /// median.
    MedianMad { multiplier: f64 },
}

impl Default for ThresholdPolicy {
    fn default() -> Self {
        ThresholdPolicy::MedianMad {
            multiplier: super::DEFAULT_MAD_MULTIPLIER,
        }
    }
}

impl ThresholdPolicy {
    fn validate(&self) -> Result<()> {
        match *self {
            ThresholdPolicy::None => Ok(()),
            ThresholdPolicy::FractionOfMax(fraction) if !(fraction.is_finite() && fraction >= 0.0) => {
                Err(Error::parameter(
                    "threshold_policy",
                    "fraction of max must be a non-negative finite number",
                ))
            }
            ThresholdPolicy::MedianMad { multiplier } if !(multiplier.is_finite() && multiplier >= 0.0) => {
                Err(Error::parameter(
                    "threshold_policy",
                    "MAD multiplier must be a non-negative finite number",
                ))
            }
            _ => Ok(()),
        }
    }

    /// Computes the bar for the given curve. An empty curve has no bar.
    pub fn threshold(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return f64::NEG_INFINITY;
        }
        match *self {
            ThresholdPolicy::None => f64::NEG_INFINITY,
            ThresholdPolicy::FractionOfMax(fraction) => {
                fraction * values.iter().copied().fold(f64::MIN, f64::max)
            }
            ThresholdPolicy::MedianMad { multiplier } => {
                let center = median(values.to_vec());
                let mad = median(values.iter().map(|v| (v - center).abs()).collect());
                center + multiplier * mad
            }
        }
    }
}

fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

/// Strictly increasing list of selected peak indices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct BoundaryList(Vec<usize>);

impl BoundaryList {
    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<usize> {
        self.0
    }

    /// Applies `f` to every index. `f` must be strictly increasing to keep the list sorted.
    pub(crate) fn map_indices(self, f: impl Fn(usize) -> usize) -> Self {
        BoundaryList(self.0.into_iter().map(f).collect())
    }
}

/// Selects boundary candidates from a novelty curve.
///
/// A candidate at index `i` (`0 < i < len - 1`) must be a strict local maximum and clear the
/// `threshold_policy` bar; plateaus never produce a candidate. Candidates are then scanned in
/// order, and when one lies fewer than `min_distance` indices after the last retained peak,
/// only the higher of the two is kept (the earlier one on a tie).
///
/// Returned indices refer to the novelty curve, not to SSM frames. Use
/// [NoveltyCurve::frame_index] to map them back. A flat curve yields an empty list.
pub fn pick_peaks(
    novelty: &NoveltyCurve,
    min_distance: usize,
    threshold_policy: ThresholdPolicy,
) -> Result<BoundaryList> {
    threshold_policy.validate()?;

    let values = novelty.values();
    let bar = threshold_policy.threshold(values);

    let mut peaks: Vec<usize> = Vec::new();
    for i in 1..values.len().saturating_sub(1) {
        let v = values[i];
        if !(v > values[i - 1] && v > values[i + 1] && v > bar) {
            continue;
        }
        match peaks.last_mut() {
            Some(last) if i - *last < min_distance => {
                if v > values[*last] {
                    *last = i;
                }
            }
            _ => peaks.push(i),
        }
    }

    tracing::debug!(
        len = values.len(),
        threshold = bar,
        min_distance,
        num_peaks = peaks.len(),
        "picked novelty peaks"
    );

    Ok(BoundaryList(peaks))
}
