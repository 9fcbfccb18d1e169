use std::path::{Path, PathBuf};

mod analyzer;
mod data;
mod evaluator;

pub use analyzer::Analyzer;
pub use data::{AnalysisRun, ReferenceBoundaries, TrackAnalysis, TrackFeatures};
pub use evaluator::{f_measure, EvaluationRow, Evaluator, Scores};

/// Default evaluation tolerance windows (seconds).
///
/// An estimated boundary counts as a hit if it lies within this distance of an unmatched
/// reference boundary.
pub const DEFAULT_EVALUATION_WINDOWS: [f64; 2] = [0.5, 3.0];

static ANALYSIS_FILE_EXT: &str = "foote.bin";
static REPORT_FILE_PREFIX: &str = "evaluation_winlength";

/// Path of the analysis file stored alongside a feature file.
pub fn analysis_path(features: impl AsRef<Path>) -> PathBuf {
    features.as_ref().with_extension(ANALYSIS_FILE_EXT)
}

/// Track name of a feature file: its file name without extension.
pub fn track_name(features: impl AsRef<Path>) -> String {
    features
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
pub(crate) mod test_util {
    use std::path::{Path, PathBuf};

    use super::TrackFeatures;

    /// Creates an empty scratch directory for a test.
    pub fn sample_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("foote-test-{}-{}", name, std::process::id()));
        if dir.exists() {
            std::fs::remove_dir_all(&dir).unwrap();
        }
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Writes a two-section track with a single transition at `boundary` (frame index).
    ///
    /// Both sections are constant. The two leading MFCC coefficients are the same in both
    /// sections, so only the coefficients kept for timbral analysis differ.
    pub fn write_sample_track(dir: &Path, name: &str, num_frames: usize, boundary: usize) -> PathBuf {
        let column = |a: Vec<f64>, b: Vec<f64>| -> Vec<Vec<f64>> {
            (0..num_frames)
                .map(|t| if t < boundary { a.clone() } else { b.clone() })
                .collect()
        };
        let transpose = |frames: Vec<Vec<f64>>| -> Vec<Vec<f64>> {
            (0..frames[0].len())
                .map(|d| frames.iter().map(|f| f[d]).collect())
                .collect()
        };

        let mut pitch_a = vec![0.0; 12];
        pitch_a[0] = 1.0;
        pitch_a[7] = 0.5;
        let mut pitch_b = vec![0.0; 12];
        pitch_b[2] = 1.0;
        pitch_b[9] = 0.5;

        let mut mfcc_a = vec![0.0; 13];
        let mut mfcc_b = vec![0.0; 13];
        for mfcc in [&mut mfcc_a, &mut mfcc_b] {
            mfcc[0] = -300.0;
            mfcc[1] = 40.0;
        }
        mfcc_a[2] = 12.0;
        mfcc_a[3] = -4.0;
        mfcc_b[5] = 9.0;
        mfcc_b[6] = 3.0;

        let features = TrackFeatures {
            f_pitch: transpose(column(pitch_a, pitch_b)),
            f_mfcc: transpose(column(mfcc_a, mfcc_b)),
        };

        let path = dir.join(format!("{}.json", name));
        let f = std::fs::File::create(&path).unwrap();
        serde_json::to_writer(f, &features).unwrap();
        path
    }
}
