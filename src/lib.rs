use std::path::PathBuf;

pub mod segment;
pub mod track;
pub mod util;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("feature data not found at: {0:?}")]
    FeatureDataNotFound(PathBuf),
    #[error("reference annotations not found at: {0:?}")]
    AnnotationsNotFound(PathBuf),
    #[error("no paths provided to analyzer")]
    AnalyzerMissingPaths,
    #[error("ndarray shape error: {0}")]
    ShapeError(#[from] ndarray::ShapeError),
    #[error("bincode error: {0}")]
    BincodeError(#[from] bincode::Error),
    #[error("serde_json error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn parameter(name: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidParameter {
            name,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
