use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::segment::{BoundaryList, FeatureKind, FeatureSequence, ThresholdPolicy};
use crate::{Error, Result};

/// Raw features of one track as stored on disk (JSON).
///
/// Both matrices are feature-major: each inner vector is one feature dimension over time,
/// so columns are frames.
#[derive(Debug, Deserialize, Serialize)]
pub struct TrackFeatures {
    pub f_pitch: Vec<Vec<f64>>,
    pub f_mfcc: Vec<Vec<f64>>,
}

impl TrackFeatures {
    /// Load track features from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FeatureDataNotFound(path.to_owned()));
        }
        let f = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }

    /// Returns the raw sequence for the given feature kind.
    pub fn sequence(&self, kind: FeatureKind) -> Result<FeatureSequence> {
        match kind {
            FeatureKind::Chroma => FeatureSequence::from_columns(&self.f_pitch),
            FeatureKind::Timbral => FeatureSequence::from_columns(&self.f_mfcc),
        }
    }
}

/// One point of the parameter grid and the boundaries it produced.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AnalysisRun {
    pub kind: FeatureKind,
    pub half_width: usize,
    pub variance: f64,
    pub window_length: usize,
    pub downsample_factor: usize,
    /// Frame indices into the downsampled sequence.
    pub boundaries: BoundaryList,
}

impl AnalysisRun {
    /// Boundaries in seconds, given the frame rate of the raw features.
    pub fn boundaries_secs(&self, feature_rate: f64) -> Vec<f64> {
        crate::util::frames_to_seconds(
            self.boundaries.indices(),
            feature_rate,
            self.downsample_factor,
        )
    }

    pub(crate) fn grid_key(&self) -> (FeatureKind, usize, u64, usize, usize) {
        (
            self.kind,
            self.half_width,
            self.variance.to_bits(),
            self.window_length,
            self.downsample_factor,
        )
    }
}

/// Segmentation results for a single feature file. This is the result of running an
/// [Analyzer](super::Analyzer) on a track.
///
/// The md5 of the feature file and the peak-picking settings are included so that an
/// unchanged track analyzed with the same settings does not have to be analyzed again.
#[derive(Debug, Deserialize, Serialize)]
pub struct TrackAnalysis {
    pub(crate) feature_rate: f64,
    pub(crate) min_distance: usize,
    pub(crate) threshold_policy: ThresholdPolicy,
    pub(crate) runs: Vec<AnalysisRun>,
    pub(crate) md5: String,
}

impl TrackAnalysis {
    pub(crate) fn new(
        feature_rate: f64,
        min_distance: usize,
        threshold_policy: ThresholdPolicy,
        runs: Vec<AnalysisRun>,
        md5: String,
    ) -> Self {
        Self {
            feature_rate,
            min_distance,
            threshold_policy,
            runs,
            md5,
        }
    }

    /// Load a track analysis from a path.
    fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FeatureDataNotFound(path.to_owned()));
        }
        let f = std::fs::File::open(path)?;
        Ok(bincode::deserialize_from(BufReader::new(f))?)
    }

    /// Load the analysis stored alongside the given feature file.
    pub fn from_features(features: impl AsRef<Path>) -> Result<Self> {
        Self::from_path(super::analysis_path(features))
    }

    pub fn feature_rate(&self) -> f64 {
        self.feature_rate
    }

    pub fn min_distance(&self) -> usize {
        self.min_distance
    }

    pub fn threshold_policy(&self) -> ThresholdPolicy {
        self.threshold_policy
    }

    pub fn runs(&self) -> &[AnalysisRun] {
        &self.runs
    }

    pub fn md5(&self) -> &str {
        &self.md5
    }
}

/// Reference boundary annotations for a track, in seconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct ReferenceBoundaries {
    pub boundaries: Vec<f64>,
}

impl ReferenceBoundaries {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::AnnotationsNotFound(path.to_owned()));
        }
        let f = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(f))?)
    }
}
