//! Numeric helpers that sit below the preprocessing stages.
pub mod eigen;

pub use eigen::{symmetric_eigen, SymmetricEigen};
