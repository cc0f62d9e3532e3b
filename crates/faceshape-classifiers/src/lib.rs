//! faceshape-classifiers: face shape classification from facial landmarks.
//!
//! The crate turns a labeled directory of face photographs into a feature
//! matrix (via a pluggable [`landmarks::LandmarkDetector`]), splits it with
//! stratification, trains a random forest baseline and a grid-searched
//! scaler → PCA → RBF SVM pipeline, and evaluates the result with held-out
//! accuracy, k-fold CV and a confusion matrix.
//!
//! The ONNX face mesh detector is behind the `onnx` feature so the numeric
//! core builds and tests without the ONNX Runtime.
pub mod config;
pub mod corpus;
pub mod data_handling;
pub mod error;
pub mod evaluation;
pub mod experiment;
pub mod features;
pub mod landmarks;
pub mod math;
pub mod models;
pub mod preprocessing;
pub mod report;
pub mod search;

pub use error::{DetectorError, FaceShapeError, Result};
