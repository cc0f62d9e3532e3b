//! Accuracy, cross-validated accuracy and confusion matrices.

use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::ModelConfig;
use crate::data_handling::{encode_labels, stratified_kfold};
use crate::error::{FaceShapeError, Result};
use crate::models::factory::build_model;
use crate::models::TrainedModel;
use crate::search::score_fold;

/// Fraction of exact label matches; 0 for empty input.
pub fn accuracy(y_true: &[String], y_pred: &[String]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(a, b)| a == b).count();
    correct as f64 / y_true.len() as f64
}

pub(crate) fn accuracy_idx(y_true: &Array1<usize>, y_pred: &Array1<usize>) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred.iter()).filter(|(a, b)| a == b).count();
    correct as f64 / y_true.len() as f64
}

/// Square count matrix indexed by sorted labels; cell (i, j) counts samples
/// of true label i predicted as j.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfusionMatrix {
    labels: Vec<String>,
    counts: Vec<Vec<usize>>,
}

impl ConfusionMatrix {
    /// Tally predictions over a fixed label vocabulary (sorted on entry).
    pub fn new(labels: &[String], y_true: &[String], y_pred: &[String]) -> Result<Self> {
        if y_true.len() != y_pred.len() {
            return Err(FaceShapeError::ShapeMismatch {
                expected: format!("{} predictions", y_true.len()),
                actual: format!("{} predictions", y_pred.len()),
            });
        }
        let mut labels = labels.to_vec();
        labels.sort();
        labels.dedup();

        let index_of = |l: &String| {
            labels.binary_search(l).map_err(|_| {
                FaceShapeError::InvalidConfig(format!("label '{}' is not in the vocabulary", l))
            })
        };

        let mut counts = vec![vec![0usize; labels.len()]; labels.len()];
        for (t, p) in y_true.iter().zip(y_pred) {
            counts[index_of(t)?][index_of(p)?] += 1;
        }
        Ok(ConfusionMatrix { labels, counts })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Rows are true labels, columns predicted labels.
    pub fn counts(&self) -> &[Vec<usize>] {
        &self.counts
    }

    pub fn get(&self, true_label: usize, predicted: usize) -> usize {
        self.counts[true_label][predicted]
    }

    /// Samples per true label.
    pub fn row_sums(&self) -> Vec<usize> {
        self.counts.iter().map(|r| r.iter().sum()).collect()
    }

    pub fn total(&self) -> usize {
        self.row_sums().iter().sum()
    }

    /// Trace over total.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        let diag: usize = (0..self.labels.len()).map(|i| self.counts[i][i]).sum();
        diag as f64 / total as f64
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CvScores {
    pub fold_scores: Vec<f64>,
    pub mean: f64,
}

/// Stratified k-fold accuracy of a fresh model built from `config` for every
/// fold. Folds are fit in parallel.
pub fn cross_val_score(config: &ModelConfig, x: &Array2<f64>, labels: &[String], k: usize) -> Result<CvScores> {
    let (classes, y) = encode_labels(labels);
    let folds = stratified_kfold(&y.to_vec(), k)?;

    let fold_scores = folds
        .par_iter()
        .map(|fold| {
            let mut model = build_model(config);
            score_fold(model.as_mut(), x, &y, classes.len(), fold)
        })
        .collect::<Result<Vec<f64>>>()?;

    let mean = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
    Ok(CvScores { fold_scores, mean })
}

/// Held-out and cross-validated quality of a trained model.
#[derive(Debug, Clone, Serialize)]
pub struct Metrics {
    pub model: String,
    pub test_accuracy: f64,
    pub cv: CvScores,
    pub confusion: ConfusionMatrix,
}

impl Metrics {
    pub fn log_summary(&self) {
        log::info!("Test accuracy ({}): {:.4}", self.model, self.test_accuracy);
        let folds: Vec<String> = self.cv.fold_scores.iter().map(|s| format!("{:.4}", s)).collect();
        log::info!(
            "{}-fold CV accuracy: [{}] mean {:.4}",
            self.cv.fold_scores.len(),
            folds.join(", "),
            self.cv.mean
        );
    }
}

/// Scores a trained model on held-out data and re-validates its configuration.
pub struct Evaluator {
    folds: usize,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self { folds: 5 }
    }
}

impl Evaluator {
    pub fn new(folds: usize) -> Self {
        Self { folds }
    }

    pub fn evaluate(
        &self,
        model: &TrainedModel,
        test_x: &Array2<f64>,
        test_y: &[String],
        train_x: &Array2<f64>,
        train_y: &[String],
    ) -> Result<Metrics> {
        let predicted = model.predict(test_x)?;
        let test_accuracy = accuracy(test_y, &predicted);
        let confusion = ConfusionMatrix::new(model.classes(), test_y, &predicted)?;
        let cv = cross_val_score(model.config(), train_x, train_y, self.folds)?;

        Ok(Metrics {
            model: model.name().to_string(),
            test_accuracy,
            cv,
            confusion,
        })
    }
}
