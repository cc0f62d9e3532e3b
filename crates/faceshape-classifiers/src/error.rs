use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by the face shape pipeline.
///
/// Per-image problems never show up here: they are absorbed by the dataset
/// builder as skips (see [`crate::corpus::SkipReason`]). Everything below is
/// either a setup problem or a dataset-level problem and ends the run.
#[derive(Error, Debug)]
pub enum FaceShapeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corpus root not found or not a directory: {}", .0.display())]
    CorpusNotFound(PathBuf),

    #[error("landmark detector error: {0}")]
    Detector(#[from] DetectorError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("dataset is empty: no image produced usable landmarks")]
    EmptyDataset,

    #[error("class '{label}' has only {count} sample(s); at least {required} are needed")]
    InsufficientSamples {
        label: String,
        count: usize,
        required: usize,
    },

    #[error("at least two classes are required, found {0}")]
    TooFewClasses(usize),

    #[error("test fraction must be in (0, 1), got {0}")]
    InvalidTestFraction(f64),

    #[error("cannot make {folds} folds: every class has fewer members (largest class has {largest})")]
    TooManyFolds { folds: usize, largest: usize },

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("model error: {0}")]
    Model(String),

    #[error("model has not been fitted")]
    NotFitted,

    #[error("report error: {0}")]
    Report(String),
}

/// Errors from a landmark detection backend.
#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),

    #[error("failed to load model: {0}")]
    LoadFailed(String),

    #[error("inference failed: {0}")]
    InferenceFailed(String),
}

#[cfg(feature = "onnx")]
impl From<ort::Error> for DetectorError {
    fn from(e: ort::Error) -> Self {
        DetectorError::InferenceFailed(e.to_string())
    }
}

impl From<csv::Error> for FaceShapeError {
    fn from(e: csv::Error) -> Self {
        FaceShapeError::Report(e.to_string())
    }
}

impl From<serde_json::Error> for FaceShapeError {
    fn from(e: serde_json::Error) -> Self {
        FaceShapeError::Report(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FaceShapeError>;
