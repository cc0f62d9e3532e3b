use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{FaceShapeError, Result};

/// Random forest baseline settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ForestConfig {
    pub n_trees: usize,
    pub seed: u64,
    /// Features drawn per tree; `None` means `floor(sqrt(n_features))`.
    pub max_features: Option<usize>,
    /// `None` grows trees until leaves are pure.
    pub max_depth: Option<usize>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_trees: 300,
            seed: 42,
            max_features: None,
            max_depth: None,
        }
    }
}

/// One concrete scaler → PCA → RBF SVM configuration.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SvmConfig {
    pub n_components: usize,
    pub c: f64,
    pub gamma: f64,
    /// Solver stopping tolerance.
    pub eps: f64,
}

impl Default for SvmConfig {
    fn default() -> Self {
        Self {
            n_components: 100,
            c: 10.0,
            gamma: 0.01,
            eps: 1e-3,
        }
    }
}

/// Grid searched by the tuned model stage.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SvmSearchConfig {
    pub n_components: usize,
    pub c_values: Vec<f64>,
    pub gamma_values: Vec<f64>,
    pub folds: usize,
    pub eps: f64,
}

impl Default for SvmSearchConfig {
    fn default() -> Self {
        Self {
            n_components: 100,
            c_values: vec![10.0, 50.0, 100.0, 200.0, 500.0],
            gamma_values: vec![0.001, 0.005, 0.01, 0.02, 0.05],
            folds: 5,
            eps: 1e-3,
        }
    }
}

impl SvmSearchConfig {
    /// Concrete model for one grid point.
    pub fn candidate(&self, c: f64, gamma: f64) -> SvmConfig {
        SvmConfig {
            n_components: self.n_components,
            c,
            gamma,
            eps: self.eps,
        }
    }
}

/// A buildable model description; see [`crate::models::factory::build_model`].
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelConfig {
    Forest(ForestConfig),
    Svm(SvmConfig),
}

impl Default for ModelConfig {
    fn default() -> Self {
        ModelConfig::Forest(ForestConfig::default())
    }
}

impl FromStr for ModelConfig {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "forest" | "random_forest" | "rf" => Ok(ModelConfig::Forest(ForestConfig::default())),
            "svm" => Ok(ModelConfig::Svm(SvmConfig::default())),
            _ => Err(format!(
                "Unknown model type: {}. Valid options are: forest, svm",
                s
            )),
        }
    }
}

/// Settings for a full split → baseline → search → evaluate run.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ExperimentConfig {
    pub test_fraction: f64,
    pub seed: u64,
    /// Folds of the independent cross-validation on the final model.
    pub cv_folds: usize,
    pub baseline: ForestConfig,
    pub search: SvmSearchConfig,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.25,
            seed: 42,
            cv_folds: 5,
            baseline: ForestConfig::default(),
            search: SvmSearchConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// Reject values that would fail later in the run.
    pub fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(FaceShapeError::InvalidTestFraction(self.test_fraction));
        }
        if self.cv_folds < 2 {
            return Err(invalid(format!("cv_folds must be >= 2, got {}", self.cv_folds)));
        }
        if self.baseline.n_trees == 0 {
            return Err(invalid("baseline.n_trees must be > 0".to_string()));
        }
        if self.baseline.max_features == Some(0) {
            return Err(invalid("baseline.max_features must be > 0".to_string()));
        }
        let search = &self.search;
        if search.folds < 2 {
            return Err(invalid(format!("search.folds must be >= 2, got {}", search.folds)));
        }
        if search.n_components == 0 {
            return Err(invalid("search.n_components must be > 0".to_string()));
        }
        if search.c_values.is_empty() || search.gamma_values.is_empty() {
            return Err(invalid("search grid must not be empty".to_string()));
        }
        if search.c_values.iter().chain(&search.gamma_values).any(|v| !(*v > 0.0)) {
            return Err(invalid("C and gamma values must be positive".to_string()));
        }
        if !(search.eps > 0.0) {
            return Err(invalid("search.eps must be positive".to_string()));
        }
        Ok(())
    }
}

fn invalid(msg: String) -> FaceShapeError {
    FaceShapeError::InvalidConfig(msg)
}
