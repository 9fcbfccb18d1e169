#[cfg(feature = "rayon")]
extern crate rayon;

use std::collections::BTreeSet;
use std::path::Path;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use super::{AnalysisRun, TrackAnalysis, TrackFeatures};
use crate::segment::{self, FeatureKind, KernelBank, Segmenter, ThresholdPolicy};
use crate::{Error, Result};

/// Runs the novelty pipeline over a grid of parameters for one or more feature files and
/// converts each into a [TrackAnalysis].
///
/// If `force` is set, any existing analysis data on disk will be **ignored**.
///
/// For every track, the analyzer:
///
/// 1. Loads the chroma and timbral feature matrices
/// 2. Prepares each sequence according to its [FeatureKind]
/// 3. Runs a [Segmenter] for every combination of kernel half-width and smoothing parameters
/// 4. Returns a [TrackAnalysis] with the boundaries of each run and (optionally) writes it
///    to disk alongside the feature file
///
/// All kernels of the grid are built once per [Analyzer::run] and shared read-only between
/// tracks.
#[derive(Debug)]
pub struct Analyzer<P: AsRef<Path>> {
    pub(crate) paths: Vec<P>,
    half_widths: Vec<usize>,
    smoothing_params: Vec<(usize, usize)>,
    kinds: Vec<FeatureKind>,
    feature_rate: f64,
    min_distance: usize,
    threshold_policy: ThresholdPolicy,
    force: bool,
}

impl<P: AsRef<Path>> Default for Analyzer<P> {
    fn default() -> Self {
        Self {
            paths: Default::default(),
            half_widths: segment::DEFAULT_HALF_WIDTHS.to_vec(),
            smoothing_params: segment::DEFAULT_SMOOTHING_PARAMS.to_vec(),
            kinds: FeatureKind::ALL.to_vec(),
            feature_rate: segment::DEFAULT_FEATURE_RATE,
            min_distance: segment::DEFAULT_MIN_DISTANCE,
            threshold_policy: ThresholdPolicy::default(),
            force: false,
        }
    }
}

impl<P: AsRef<Path>> Analyzer<P> {
    /// Constructs a new [Analyzer] from a list of feature file paths.
    pub fn from_files(paths: impl Into<Vec<P>>, force: bool) -> Self {
        let mut analyzer = Self::default().with_force(force);
        analyzer.paths = paths.into();
        analyzer
    }

    /// Returns the feature file paths used by this analyzer.
    pub fn paths(&self) -> &[P] {
        &self.paths
    }

    /// Returns a new [Analyzer] with the provided kernel `half_widths`.
    pub fn with_half_widths(mut self, half_widths: impl Into<Vec<usize>>) -> Self {
        self.half_widths = half_widths.into();
        self
    }

    /// Returns a new [Analyzer] with the provided `(window_length, downsample_factor)` pairs.
    pub fn with_smoothing_params(mut self, smoothing_params: impl Into<Vec<(usize, usize)>>) -> Self {
        self.smoothing_params = smoothing_params.into();
        self
    }

    /// Returns a new [Analyzer] that only analyzes the provided feature `kinds`.
    pub fn with_kinds(mut self, kinds: impl Into<Vec<FeatureKind>>) -> Self {
        self.kinds = kinds.into();
        self
    }

    /// Returns a new [Analyzer] with the provided `feature_rate` (frames per second).
    pub fn with_feature_rate(mut self, feature_rate: f64) -> Self {
        self.feature_rate = feature_rate;
        self
    }

    /// Returns a new [Analyzer] with the provided peak `min_distance`.
    pub fn with_min_distance(mut self, min_distance: usize) -> Self {
        self.min_distance = min_distance;
        self
    }

    /// Returns a new [Analyzer] with the provided peak `threshold_policy`.
    pub fn with_threshold_policy(mut self, threshold_policy: ThresholdPolicy) -> Self {
        self.threshold_policy = threshold_policy;
        self
    }

    /// Returns a new [Analyzer] with `force` set to the provided value.
    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn feature_rate(&self) -> f64 {
        self.feature_rate
    }

    /// Builds the kernels needed by this analyzer's grid.
    pub fn kernel_bank(&self) -> Result<KernelBank> {
        KernelBank::with_default_variance(&self.half_widths)
    }

    // One segmenter per (half-width, smoothing params) pair, in grid order.
    fn segmenters(&self) -> Vec<Segmenter> {
        let mut segmenters = Vec::new();
        for &half_width in &self.half_widths {
            for &(window_length, downsample_factor) in &self.smoothing_params {
                segmenters.push(
                    Segmenter::default()
                        .with_half_width(half_width)
                        .with_smoothing(window_length, downsample_factor)
                        .with_min_distance(self.min_distance)
                        .with_threshold_policy(self.threshold_policy),
                );
            }
        }
        segmenters
    }

    // Returns true if an existing analysis covers exactly this analyzer's grid and was picked
    // with the same peak settings.
    fn covers_grid(&self, analysis: &TrackAnalysis) -> bool {
        let existing: BTreeSet<_> = analysis.runs.iter().map(|r| r.grid_key()).collect();
        let mut expected = BTreeSet::new();
        for &kind in &self.kinds {
            for segmenter in self.segmenters() {
                expected.insert((
                    kind,
                    segmenter.half_width(),
                    segmenter.variance().to_bits(),
                    segmenter.window_length(),
                    segmenter.downsample_factor(),
                ));
            }
        }
        existing == expected
            && analysis.feature_rate == self.feature_rate
            && analysis.min_distance == self.min_distance
            && analysis.threshold_policy == self.threshold_policy
    }

    pub(crate) fn run_single(
        &self,
        path: impl AsRef<Path>,
        kernels: &KernelBank,
        persist: bool,
    ) -> Result<TrackAnalysis> {
        let span = tracing::span!(tracing::Level::TRACE, "run");
        let _enter = span.enter();

        let path = path.as_ref();
        let analysis_path = super::analysis_path(path);

        // Check if we've already analyzed this track by comparing MD5 hashes.
        let md5 = crate::util::compute_md5sum(path)?;
        if !self.force {
            if let Ok(data) = TrackAnalysis::from_features(path) {
                if data.md5() == md5 && self.covers_grid(&data) {
                    tracing::info!("skipping analysis for {}", path.display());
                    return Ok(data);
                }
            }
        }

        let features = TrackFeatures::from_path(path)?;
        let segmenters = self.segmenters();

        tracing::debug!(
            runs = segmenters.len() * self.kinds.len(),
            "starting grid analysis for {}",
            path.display()
        );

        let mut runs = Vec::new();
        for &kind in &self.kinds {
            let sequence = kind.prepare(&features.sequence(kind)?);
            for segmenter in &segmenters {
                let segmentation = segmenter.run(&sequence, kernels)?;
                runs.push(AnalysisRun {
                    kind,
                    half_width: segmenter.half_width(),
                    variance: segmenter.variance(),
                    window_length: segmenter.window_length(),
                    downsample_factor: segmenter.downsample_factor(),
                    boundaries: segmentation.boundaries,
                });
            }
        }

        tracing::debug!(runs = runs.len(), "completed grid analysis for {}", path.display());

        let analysis = TrackAnalysis::new(
            self.feature_rate,
            self.min_distance,
            self.threshold_policy,
            runs,
            md5,
        );

        // Write results to disk.
        if persist {
            let mut f = std::fs::File::create(&analysis_path)?;
            bincode::serialize_into(&mut f, &analysis)?;
        }

        Ok(analysis)
    }
}

impl<P: AsRef<Path> + Sync> Analyzer<P> {
    /// Runs this analyzer.
    ///
    /// If `threading` is set and the `rayon` feature is enabled, tracks are analyzed in
    /// parallel.
    pub fn run(&self, persist: bool, threading: bool) -> Result<Vec<TrackAnalysis>> {
        if self.paths.is_empty() {
            return Err(Error::AnalyzerMissingPaths);
        }

        let kernels = self.kernel_bank()?;
        let mut data = Vec::new();

        if cfg!(feature = "rayon") && threading {
            #[cfg(feature = "rayon")]
            {
                data = self
                    .paths
                    .par_iter()
                    .map(|path| self.run_single(path, &kernels, persist))
                    .collect::<Result<Vec<_>>>()?;
            }
        } else {
            for path in &self.paths {
                data.push(self.run_single(path, &kernels, persist)?);
            }
        }

        Ok(data)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::track::test_util::{sample_dir, write_sample_track};

    fn small_analyzer<P: AsRef<Path>>(paths: Vec<P>) -> Analyzer<P> {
        Analyzer::from_files(paths, false)
            .with_half_widths([6, 8])
            .with_smoothing_params([(1, 1), (3, 2)])
    }

    #[test]
    fn test_analyzer_grid() {
        let dir = sample_dir("analyzer-grid");
        let path = write_sample_track(&dir, "track", 120, 60);

        let analyzer = small_analyzer(vec![path.clone()]);
        let data = analyzer.run(false, false).unwrap();
        assert_eq!(data.len(), 1);

        let runs = data[0].runs();
        // 2 kinds x 2 half-widths x 2 smoothing settings.
        assert_eq!(runs.len(), 8);
        for run in runs {
            assert!(!run.boundaries.is_empty(), "{:?}", run);
            let secs = run.boundaries_secs(analyzer.feature_rate());
            assert!(
                secs.iter().any(|s| (s - 6.0).abs() <= 0.4),
                "{:?} -> {:?}",
                run,
                secs
            );
        }
        assert!(!crate::track::analysis_path(&path).exists());
    }

    // Replaces the boundaries of every stored run with an empty list, so a result read back
    // from disk can be told apart from a fresh one.
    fn mark_stored_analysis(path: &Path) {
        let mut stored = TrackAnalysis::from_features(path).unwrap();
        for run in &mut stored.runs {
            run.boundaries = Default::default();
        }
        let f = std::fs::File::create(crate::track::analysis_path(path)).unwrap();
        bincode::serialize_into(f, &stored).unwrap();
    }

    fn all_empty(analysis: &TrackAnalysis) -> bool {
        analysis.runs().iter().all(|run| run.boundaries.is_empty())
    }

    #[test]
    fn test_analyzer_persists_and_skips() {
        let dir = sample_dir("analyzer-persist");
        let path = write_sample_track(&dir, "track", 100, 50);

        let analyzer = small_analyzer(vec![path.clone()]).with_kinds([FeatureKind::Timbral]);
        let first = analyzer.run(true, false).unwrap();
        assert!(crate::track::analysis_path(&path).exists());
        assert!(!all_empty(&first[0]));

        let loaded = TrackAnalysis::from_features(&path).unwrap();
        assert_eq!(loaded.md5(), first[0].md5());
        assert_eq!(loaded.runs(), first[0].runs());
        assert_eq!(loaded.threshold_policy(), ThresholdPolicy::default());

        mark_stored_analysis(&path);
        let kernels = analyzer.kernel_bank().unwrap();

        // Same file and settings: the stored analysis is returned as is.
        let skipped = analyzer.run_single(&path, &kernels, false).unwrap();
        assert!(all_empty(&skipped));

        // `force` ignores the stored analysis.
        let forced = small_analyzer(vec![path.clone()])
            .with_kinds([FeatureKind::Timbral])
            .with_force(true)
            .run_single(&path, &kernels, false)
            .unwrap();
        assert_eq!(forced.runs(), first[0].runs());

        // A changed feature file has a new md5 and is analyzed again.
        write_sample_track(&dir, "track", 100, 40);
        let changed = analyzer.run_single(&path, &kernels, false).unwrap();
        assert_ne!(changed.md5(), first[0].md5());
        assert!(!all_empty(&changed));

        // A different grid does not reuse the stored analysis.
        let other = small_analyzer(vec![path.clone()]).with_half_widths([5]);
        let kernels = other.kernel_bank().unwrap();
        assert!(!other.covers_grid(&loaded));
        let rerun = other.run_single(&path, &kernels, false).unwrap();
        assert_eq!(rerun.runs().len(), 2 * 2);
    }

    #[test]
    fn test_analyzer_reanalyzes_on_new_peak_settings() {
        let dir = sample_dir("analyzer-peak-settings");
        let path = write_sample_track(&dir, "track", 100, 50);

        let analyzer = small_analyzer(vec![path.clone()])
            .with_kinds([FeatureKind::Timbral])
            .with_threshold_policy(ThresholdPolicy::None);
        let first = analyzer.run(true, false).unwrap();
        assert!(!all_empty(&first[0]));
        let stored = TrackAnalysis::from_features(&path).unwrap();
        assert!(analyzer.covers_grid(&stored));

        // A bar above the curve maximum leaves no peaks, so a stale result would show up.
        let stricter = small_analyzer(vec![path.clone()])
            .with_kinds([FeatureKind::Timbral])
            .with_threshold_policy(ThresholdPolicy::FractionOfMax(2.0));
        assert!(!stricter.covers_grid(&stored));
        let data = stricter.run(false, false).unwrap();
        assert!(all_empty(&data[0]));

        let spaced = small_analyzer(vec![path.clone()])
            .with_kinds([FeatureKind::Timbral])
            .with_threshold_policy(ThresholdPolicy::None)
            .with_min_distance(10);
        assert!(!spaced.covers_grid(&stored));
    }

    #[test]
    fn test_analyzer_missing_paths() {
        let analyzer: Analyzer<&Path> = Analyzer::default();
        assert!(matches!(
            analyzer.run(false, false),
            Err(Error::AnalyzerMissingPaths)
        ));
    }

    #[test]
    fn test_analyzer_parallel_matches_serial() {
        let dir = sample_dir("analyzer-parallel");
        let paths = vec![
            write_sample_track(&dir, "a", 90, 30),
            write_sample_track(&dir, "b", 90, 60),
        ];
        let analyzer = small_analyzer(paths);
        let serial = analyzer.run(false, false).unwrap();
        let parallel = analyzer.run(false, true).unwrap();
        for (s, p) in serial.iter().zip(parallel.iter()) {
            assert_eq!(s.runs(), p.runs());
        }
    }
}
