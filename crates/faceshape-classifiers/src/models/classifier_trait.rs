use ndarray::{Array1, Array2};

use crate::error::Result;

/// Contract shared by the baseline forest and the tuned kernel pipeline.
///
/// Labels are class indices in `0..n_classes`; mapping them back to names is
/// the job of [`TrainedModel`](crate::models::TrainedModel). Implementations
/// must be `Send + Sync` so cross-validation folds can run on the rayon pool.
pub trait ClassifierModel: Send + Sync {
    /// Fit on rows of `x` with labels `y`.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> Result<()>;

    /// Predict a class index per row.
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>>;

    /// Class probabilities, one row per sample and one column per class.
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Index of the largest value; ties go to the lowest index.
pub(crate) fn argmax_first<'a>(values: impl IntoIterator<Item = &'a f64>) -> usize {
    let mut best = 0;
    let mut best_value = f64::NEG_INFINITY;
    for (i, &v) in values.into_iter().enumerate() {
        if v > best_value {
            best = i;
            best_value = v;
        }
    }
    best
}
