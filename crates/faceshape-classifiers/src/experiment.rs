//! The offline run: split, baseline, tuned search and evaluation.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::{ExperimentConfig, ModelConfig};
use crate::data_handling::{stratified_split, Dataset};
use crate::error::Result;
use crate::evaluation::{accuracy, Evaluator, Metrics};
use crate::models::TrainedModel;
use crate::search::{tune_svm, ParamSet, SearchResult};

/// Everything a run reports, ready to serialize.
#[derive(Debug, Clone, Serialize)]
pub struct ExperimentReport {
    pub classes: Vec<String>,
    pub class_counts: BTreeMap<String, usize>,
    pub n_features: usize,
    pub n_train: usize,
    pub n_test: usize,
    pub baseline_accuracy: f64,
    pub best_params: ParamSet,
    pub best_cv_score: f64,
    pub metrics: Metrics,
    pub search: SearchResult,
}

impl ExperimentReport {
    pub fn log_summary(&self) {
        log::info!("Baseline (random forest) test accuracy: {:.4}", self.baseline_accuracy);
        log::info!("Best parameters: {}", self.best_params);
        log::info!("Best CV score: {:.4}", self.best_cv_score);
        self.metrics.log_summary();
    }
}

/// Fitted models of a run plus its report.
#[derive(Debug)]
pub struct ExperimentOutcome {
    pub baseline: TrainedModel,
    pub tuned: TrainedModel,
    pub report: ExperimentReport,
}

/// Run the full model selection on `dataset`.
pub fn run(dataset: &Dataset, config: &ExperimentConfig) -> Result<ExperimentOutcome> {
    config.validate()?;

    let split = stratified_split(dataset, config.test_fraction, config.seed)?;
    log::info!(
        "Split: {} train / {} test (test fraction {}, seed {})",
        split.train.n_samples(),
        split.test.n_samples(),
        config.test_fraction,
        config.seed
    );

    log::info!("Training baseline random forest ({} trees)", config.baseline.n_trees);
    let baseline = TrainedModel::fit(
        &ModelConfig::Forest(config.baseline.clone()),
        split.train_x(),
        split.train_y(),
    )?;
    let baseline_accuracy = accuracy(split.test_y(), &baseline.predict(split.test_x())?);
    log::info!("Baseline test accuracy: {:.4}", baseline_accuracy);

    log::info!("Searching scaler -> PCA -> SVM hyperparameters");
    let tuned = tune_svm(split.train_x(), split.train_y(), &config.search)?;

    let metrics = Evaluator::new(config.cv_folds).evaluate(
        &tuned.model,
        split.test_x(),
        split.test_y(),
        split.train_x(),
        split.train_y(),
    )?;

    let report = ExperimentReport {
        classes: dataset.classes(),
        class_counts: dataset.class_counts(),
        n_features: dataset.n_features(),
        n_train: split.train.n_samples(),
        n_test: split.test.n_samples(),
        baseline_accuracy,
        best_params: tuned.best_params,
        best_cv_score: tuned.best_cv_score,
        metrics,
        search: tuned.search,
    };

    Ok(ExperimentOutcome {
        baseline,
        tuned: tuned.model,
        report,
    })
}
