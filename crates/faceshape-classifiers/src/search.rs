//! Exhaustive hyperparameter search under stratified k-fold CV.
//!
//! The search is a list of candidate parameter sets and a max-by-mean
//! reducer. All (candidate, fold) fits run in parallel on the rayon pool;
//! results are collected in enumeration order and reduced sequentially, so
//! the winner never depends on scheduling.

use std::fmt;

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::{ModelConfig, SvmSearchConfig};
use crate::data_handling::{encode_labels, stratified_kfold, Fold};
use crate::error::{FaceShapeError, Result};
use crate::evaluation::accuracy_idx;
use crate::models::classifier_trait::ClassifierModel;
use crate::models::TrainedModel;

/// Ordered parameter name → ordered candidate values.
#[derive(Debug, Clone, Default)]
pub struct HyperparameterGrid {
    params: Vec<(String, Vec<f64>)>,
}

impl HyperparameterGrid {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter axis. Axes added first vary slowest.
    pub fn with(mut self, name: &str, values: Vec<f64>) -> Self {
        self.params.push((name.to_string(), values));
        self
    }

    pub fn len(&self) -> usize {
        if self.params.is_empty() {
            return 0;
        }
        self.params.iter().map(|(_, v)| v.len()).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cartesian product; the first parameter varies slowest.
    pub fn candidates(&self) -> Vec<ParamSet> {
        if self.is_empty() {
            return Vec::new();
        }
        let mut out = vec![ParamSet::default()];
        for (name, values) in &self.params {
            out = out
                .into_iter()
                .flat_map(|base| {
                    values.iter().map(move |&v| {
                        let mut next = base.clone();
                        next.values.push((name.clone(), v));
                        next
                    })
                })
                .collect();
        }
        out
    }
}

/// One point of the grid.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParamSet {
    values: Vec<(String, f64)>,
}

impl ParamSet {
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(n, v)| (n.as_str(), *v))
    }
}

impl fmt::Display for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.values.iter().map(|(n, v)| format!("{}={}", n, v)).collect();
        write!(f, "{}", parts.join(", "))
    }
}

/// Fold scores of one candidate.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateScore {
    pub params: ParamSet,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub best_params: ParamSet,
    pub best_score: f64,
    /// Every candidate in enumeration order.
    pub candidates: Vec<CandidateScore>,
}

/// Grid search over a model factory.
pub struct GridSearch {
    grid: HyperparameterGrid,
    folds: usize,
}

impl GridSearch {
    pub fn new(grid: HyperparameterGrid, folds: usize) -> Self {
        Self { grid, folds }
    }

    /// Score every candidate with stratified k-fold accuracy.
    ///
    /// `factory` must return a fresh, unfitted model for a parameter set; each
    /// (candidate, fold) unit fits its own instance.
    pub fn run<F>(&self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize, factory: F) -> Result<SearchResult>
    where
        F: Fn(&ParamSet) -> Box<dyn ClassifierModel> + Sync,
    {
        let candidates = self.grid.candidates();
        if candidates.is_empty() {
            return Err(FaceShapeError::InvalidConfig("empty hyperparameter grid".to_string()));
        }
        let folds = stratified_kfold(&y.to_vec(), self.folds)?;

        let units: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..folds.len()).map(move |f| (c, f)))
            .collect();
        log::info!(
            "Grid search: {} candidates x {} folds = {} fits",
            candidates.len(),
            folds.len(),
            units.len()
        );

        // A failed fit scores NaN for its fold, which rules the candidate out
        // without stopping the rest of the search.
        let scores: Vec<f64> = units
            .par_iter()
            .map(|&(c, f)| {
                let mut model = factory(&candidates[c]);
                match score_fold(model.as_mut(), x, y, n_classes, &folds[f]) {
                    Ok(score) => {
                        log::trace!("  [{}] fold {}: {:.4}", candidates[c], f, score);
                        score
                    }
                    Err(e) => {
                        log::warn!("  [{}] fold {} failed: {}", candidates[c], f, e);
                        f64::NAN
                    }
                }
            })
            .collect();

        let k = folds.len();
        let mut results = Vec::with_capacity(candidates.len());
        let mut best = 0;
        let mut best_score = f64::NEG_INFINITY;
        for (c, params) in candidates.into_iter().enumerate() {
            let fold_scores = scores[c * k..(c + 1) * k].to_vec();
            let mean_score = fold_scores.iter().sum::<f64>() / k as f64;
            log::debug!("  {} -> mean accuracy {:.4}", params, mean_score);
            // Strictly greater: ties keep the first candidate.
            if mean_score > best_score {
                best = c;
                best_score = mean_score;
            }
            results.push(CandidateScore {
                params,
                fold_scores,
                mean_score,
            });
        }

        if !best_score.is_finite() {
            return Err(FaceShapeError::Model(format!(
                "every one of the {} grid candidates failed to fit",
                results.len()
            )));
        }

        Ok(SearchResult {
            best_params: results[best].params.clone(),
            best_score,
            candidates: results,
        })
    }
}

/// Fit on the fold's training rows and score accuracy on its test rows.
pub(crate) fn score_fold(
    model: &mut dyn ClassifierModel,
    x: &Array2<f64>,
    y: &Array1<usize>,
    n_classes: usize,
    fold: &Fold,
) -> Result<f64> {
    let x_train = x.select(Axis(0), &fold.train);
    let y_train = y.select(Axis(0), &fold.train);
    let x_test = x.select(Axis(0), &fold.test);
    let y_test = y.select(Axis(0), &fold.test);

    model.fit(&x_train, &y_train, n_classes)?;
    let pred = model.predict(&x_test)?;
    Ok(accuracy_idx(&y_test, &pred))
}

/// Outcome of the tuned-model stage.
#[derive(Debug)]
pub struct TunedModel {
    pub model: TrainedModel,
    pub best_params: ParamSet,
    pub best_cv_score: f64,
    pub search: SearchResult,
}

/// Build the C × gamma grid of a search configuration.
pub fn svm_grid(config: &SvmSearchConfig) -> HyperparameterGrid {
    HyperparameterGrid::new()
        .with("C", config.c_values.clone())
        .with("gamma", config.gamma_values.clone())
}

fn svm_candidate(config: &SvmSearchConfig, params: &ParamSet) -> ModelConfig {
    let c = params.get("C").unwrap_or(1.0);
    let gamma = params.get("gamma").unwrap_or(1.0);
    ModelConfig::Svm(config.candidate(c, gamma))
}

/// Grid-search the scaler → PCA → SVM pipeline, then refit the winner on all
/// of `(x, labels)`.
pub fn tune_svm(x: &Array2<f64>, labels: &[String], config: &SvmSearchConfig) -> Result<TunedModel> {
    let (classes, y) = encode_labels(labels);
    let search = GridSearch::new(svm_grid(config), config.folds);
    let result = search.run(x, &y, classes.len(), |params| {
        crate::models::factory::build_model(&svm_candidate(config, params))
    })?;

    log::info!(
        "Best parameters: {} (mean CV accuracy {:.4})",
        result.best_params,
        result.best_score
    );

    let model = TrainedModel::fit(&svm_candidate(config, &result.best_params), x, labels)?;
    Ok(TunedModel {
        model,
        best_params: result.best_params.clone(),
        best_cv_score: result.best_score,
        search: result,
    })
}
