#[cfg(feature = "rayon")]
extern crate rayon;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::{Analyzer, ReferenceBoundaries, TrackAnalysis};
use crate::segment::{FeatureKind, KernelBank};
use crate::{Error, Result};

/// Precision, recall and F-measure of a set of estimated boundaries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct Scores {
    pub f_measure: f64,
    pub precision: f64,
    pub recall: f64,
}

/// Scores estimated boundaries against reference boundaries (both in seconds).
///
/// Each reference can be matched by at most one estimate and vice versa; a pair matches if
/// the two are at most `window` apart. Matching is done greedily in time order, which yields
/// a maximum matching for points on a line. If either list is empty, all scores are 0.
pub fn f_measure(reference: &[f64], estimated: &[f64], window: f64) -> Scores {
    if reference.is_empty() || estimated.is_empty() {
        return Scores::default();
    }

    let sorted = |values: &[f64]| {
        let mut values = values.to_vec();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        values
    };
    let (reference, estimated) = (sorted(reference), sorted(estimated));

    let (mut i, mut j, mut hits) = (0, 0, 0);
    while i < reference.len() && j < estimated.len() {
        if (estimated[j] - reference[i]).abs() <= window {
            hits += 1;
            i += 1;
            j += 1;
        } else if estimated[j] < reference[i] {
            j += 1;
        } else {
            i += 1;
        }
    }

    let precision = hits as f64 / estimated.len() as f64;
    let recall = hits as f64 / reference.len() as f64;
    let f_measure = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    Scores {
        f_measure,
        precision,
        recall,
    }
}

/// A single evaluation result: one track, one grid point, one tolerance window.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct EvaluationRow {
    pub track: String,
    pub kind: FeatureKind,
    pub half_width: usize,
    pub window_length: usize,
    pub downsample_factor: usize,
    pub window: f64,
    #[serde(flatten)]
    pub scores: Scores,
}

/// Evaluates the analysis of one or more feature files against reference annotations, using
/// either existing [TrackAnalysis] data or by running an [Analyzer] in-place.
///
/// References are looked up in `annotations_dir` as `<track name>.json`.
#[derive(Debug)]
pub struct Evaluator<P: AsRef<Path>> {
    paths: Vec<P>,
    annotations_dir: PathBuf,
    windows: Vec<f64>,
    analyzer: Analyzer<P>,
}

impl<P: AsRef<Path>> Evaluator<P> {
    /// Constructs an [Evaluator] from a list of feature file paths.
    pub fn from_files(paths: impl Into<Vec<P>>, annotations_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: paths.into(),
            annotations_dir: annotations_dir.into(),
            windows: super::DEFAULT_EVALUATION_WINDOWS.to_vec(),
            analyzer: Analyzer::default(),
        }
    }

    /// Returns the feature file paths used by this evaluator.
    pub fn paths(&self) -> &[P] {
        &self.paths
    }

    /// Returns a new [Evaluator] with the provided tolerance `windows` (seconds).
    pub fn with_windows(mut self, windows: impl Into<Vec<f64>>) -> Self {
        self.windows = windows.into();
        self
    }

    /// Returns a new [Evaluator] that uses `analyzer`'s configuration for in-place analysis.
    /// The analyzer's own paths are ignored.
    pub fn with_analyzer(mut self, analyzer: Analyzer<P>) -> Self {
        self.analyzer = analyzer;
        self
    }

    fn evaluate_track(
        &self,
        path: &Path,
        analyze: bool,
        kernels: &KernelBank,
    ) -> Result<Vec<EvaluationRow>> {
        let span = tracing::span!(tracing::Level::TRACE, "evaluate_track");
        let _enter = span.enter();

        let track = super::track_name(path);
        let reference =
            ReferenceBoundaries::from_path(self.annotations_dir.join(format!("{}.json", track)))?;

        let analysis = if analyze {
            tracing::debug!("starting in-place analysis for {}...", path.display());
            self.analyzer.run_single(path, kernels, false)?
        } else {
            TrackAnalysis::from_features(path)?
        };

        let mut rows = Vec::new();
        for &window in &self.windows {
            for run in analysis.runs() {
                let estimated = run.boundaries_secs(analysis.feature_rate());
                rows.push(EvaluationRow {
                    track: track.clone(),
                    kind: run.kind,
                    half_width: run.half_width,
                    window_length: run.window_length,
                    downsample_factor: run.downsample_factor,
                    window,
                    scores: f_measure(&reference.boundaries, &estimated, window),
                });
            }
        }

        tracing::debug!(rows = rows.len(), "evaluated {}", track);

        Ok(rows)
    }

    /// Returns the file name tag of a tolerance window: `0.5` becomes `05` and `3.0`
    /// becomes `3`.
    fn window_tag(window: f64) -> String {
        window.to_string().replace('.', "")
    }

    /// Writes one JSON report per tolerance window into `output_dir`.
    pub fn write_reports(&self, rows: &[EvaluationRow], output_dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)?;

        let mut reports = Vec::new();
        for &window in &self.windows {
            let window_rows: Vec<&EvaluationRow> =
                rows.iter().filter(|r| r.window == window).collect();
            let path = output_dir.join(format!(
                "{}-{}.json",
                super::REPORT_FILE_PREFIX,
                Self::window_tag(window)
            ));
            let mut f = std::fs::File::create(&path)?;
            serde_json::to_writer_pretty(&mut f, &window_rows)?;
            reports.push(path);
        }

        Ok(reports)
    }

    fn display_summary(&self, rows: &[EvaluationRow]) {
        // Mean F-measure per (window, kind, half-width, smoothing params) across tracks.
        let mut summary: BTreeMap<(String, FeatureKind, usize, usize, usize), (f64, usize)> =
            BTreeMap::new();
        for row in rows {
            let key = (
                Self::window_tag(row.window),
                row.kind,
                row.half_width,
                row.window_length,
                row.downsample_factor,
            );
            let entry = summary.entry(key).or_insert((0.0, 0));
            entry.0 += row.scores.f_measure;
            entry.1 += 1;
        }

        for ((window, kind, half_width, window_length, downsample_factor), (total, count)) in summary {
            println!(
                "* window={} kind={} half_width={} smoothing=({}, {}) - mean F={:.3} ({} tracks)",
                window,
                kind,
                half_width,
                window_length,
                downsample_factor,
                total / count as f64,
                count
            );
        }
    }
}

impl<P: AsRef<Path> + Sync> Evaluator<P> {
    /// Runs the evaluator.
    ///
    /// * If `analyze` is set to true, an [Analyzer] is run in-place for each track instead of
    ///   loading stored analysis data.
    /// * If `output_dir` is set, one JSON report per tolerance window is written there.
    /// * If `display` is set, a summary of mean F-measures is printed to stdout.
    pub fn run(
        &self,
        analyze: bool,
        display: bool,
        output_dir: Option<&Path>,
        threading: bool,
    ) -> Result<Vec<EvaluationRow>> {
        if self.paths.is_empty() {
            return Err(Error::AnalyzerMissingPaths);
        }

        // Only needed for in-place analysis.
        let kernels = if analyze {
            self.analyzer.kernel_bank()?
        } else {
            KernelBank::default()
        };

        let mut per_track = Vec::new();

        if cfg!(feature = "rayon") && threading {
            #[cfg(feature = "rayon")]
            {
                per_track = self
                    .paths
                    .par_iter()
                    .map(|path| self.evaluate_track(path.as_ref(), analyze, &kernels))
                    .collect::<Result<Vec<_>>>()?;
            }
        } else {
            for path in &self.paths {
                per_track.push(self.evaluate_track(path.as_ref(), analyze, &kernels)?);
            }
        }

        let rows: Vec<EvaluationRow> = per_track.into_iter().flatten().collect();

        if let Some(output_dir) = output_dir {
            for report in self.write_reports(&rows, output_dir)? {
                tracing::info!("wrote evaluation report to {}", report.display());
            }
        }
        if display {
            self.display_summary(&rows);
        }

        Ok(rows)
    }
}
