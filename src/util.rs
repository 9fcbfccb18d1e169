use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::track::TrackFeatures;
use crate::{Error, Result};

/// Formats the given [Duration] as "MM:SSs"
pub fn format_time(t: Duration) -> String {
    let minutes = t.as_secs() / 60;
    let seconds = t.as_secs() % 60;
    format!("{:02}:{:02}s", minutes, seconds)
}

/// Converts frame indices of a downsampled feature sequence into seconds.
///
/// The effective rate of the sequence is `feature_rate / downsample_factor` frames per second.
pub fn frames_to_seconds(frames: &[usize], feature_rate: f64, downsample_factor: usize) -> Vec<f64> {
    let rate = feature_rate / downsample_factor as f64;
    frames.iter().map(|&f| f as f64 / rate).collect()
}

/// Checks if the given path points to a feature file.
///
/// If `full` is set to **false**, only the file extension is checked. This is a very cheap
/// operation, but it does not guarantee validity. If set to **true**, the file is parsed and
/// must contain both feature matrices.
pub fn is_valid_feature_file(path: impl AsRef<Path>, full: bool) -> bool {
    let path = path.as_ref();
    let is_json = path.is_file() && path.extension().map_or(false, |ext| ext == "json");
    if !full || !is_json {
        return is_json;
    }
    TrackFeatures::from_path(path).is_ok()
}

/// Expands the given list of files and directories into a sorted list of feature files.
///
/// Directories are scanned one level deep. Explicitly listed files that are not valid feature
/// files are reported as an error rather than skipped.
pub fn find_feature_files(paths: &[PathBuf], full: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in std::fs::read_dir(path)? {
                let entry = entry?.path();
                if is_valid_feature_file(&entry, full) {
                    files.push(entry);
                }
            }
        } else if is_valid_feature_file(path, full) {
            files.push(path.clone());
        } else {
            return Err(Error::FeatureDataNotFound(path.clone()));
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Computes the md5 checksum of a file's contents as a lowercase hex string.
pub(crate) fn compute_md5sum(path: impl AsRef<Path>) -> Result<String> {
    let data = std::fs::read(path.as_ref())?;
    Ok(format!("{:x}", md5::compute(&data)))
}
