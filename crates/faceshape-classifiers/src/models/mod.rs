pub mod classifier_trait;
pub mod factory;
pub mod forest;
pub mod pipeline;
pub mod svm;

use ndarray::{Array1, Array2, Axis};

use crate::config::ModelConfig;
use crate::data_handling::encode_labels;
use crate::error::{FaceShapeError, Result};
use crate::features::FeatureVector;
use classifier_trait::ClassifierModel;

/// A fitted classifier together with its label vocabulary.
///
/// Columns of [`predict_proba`](Self::predict_proba) follow the sorted
/// vocabulary returned by [`classes`](Self::classes).
pub struct TrainedModel {
    config: ModelConfig,
    classes: Vec<String>,
    model: Box<dyn ClassifierModel>,
}

impl TrainedModel {
    /// Build the model described by `config` and fit it on `(x, labels)`.
    pub fn fit(config: &ModelConfig, x: &Array2<f64>, labels: &[String]) -> Result<Self> {
        if x.nrows() != labels.len() {
            return Err(FaceShapeError::ShapeMismatch {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        let (classes, y) = encode_labels(labels);
        if classes.len() < 2 {
            return Err(FaceShapeError::TooFewClasses(classes.len()));
        }

        let mut model = factory::build_model(config);
        model.fit(x, &y, classes.len())?;
        log::debug!(
            "Fitted {} on {} samples, {} classes",
            model.name(),
            x.nrows(),
            classes.len()
        );

        Ok(TrainedModel {
            config: config.clone(),
            classes,
            model,
        })
    }

    /// Configuration this model was built from; refitting it yields a fresh copy.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Vec<String>> {
        let idx = self.model.predict(x)?;
        Ok(idx.iter().map(|&i| self.classes[i].clone()).collect())
    }

    pub fn predict_one(&self, features: &FeatureVector) -> Result<String> {
        let row = features.view().insert_axis(Axis(0)).to_owned();
        let mut labels = self.predict(&row)?;
        labels.pop().ok_or(FaceShapeError::EmptyDataset)
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.model.predict_proba(x)
    }

    /// Probabilities for one feature vector, in vocabulary order.
    pub fn predict_proba_one(&self, features: &FeatureVector) -> Result<Array1<f64>> {
        let row = features.view().insert_axis(Axis(0)).to_owned();
        Ok(self.predict_proba(&row)?.row(0).to_owned())
    }
}

impl std::fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedModel")
            .field("model", &self.model.name())
            .field("classes", &self.classes)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ForestConfig;

    #[test]
    fn trained_model_maps_indices_back_to_labels() {
        let x = Array2::from_shape_fn((20, 3), |(i, j)| if i < 10 { j as f64 } else { 10.0 + j as f64 });
        let labels: Vec<String> = (0..20)
            .map(|i| if i < 10 { "round" } else { "oval" }.to_string())
            .collect();
        let config = ModelConfig::Forest(ForestConfig {
            n_trees: 15,
            ..ForestConfig::default()
        });

        let model = TrainedModel::fit(&config, &x, &labels).unwrap();
        assert_eq!(model.classes(), ["oval", "round"]);
        assert_eq!(model.predict(&x).unwrap(), labels);

        let first = x.row(0).to_owned();
        assert_eq!(model.predict_one(&first).unwrap(), "round");
        let proba = model.predict_proba_one(&first).unwrap();
        assert!(proba[1] > proba[0]);
    }

    #[test]
    fn single_class_is_rejected() {
        let x = Array2::zeros((4, 2));
        let labels = vec!["oval".to_string(); 4];
        assert!(matches!(
            TrainedModel::fit(&ModelConfig::default(), &x, &labels),
            Err(FaceShapeError::TooFewClasses(1))
        ));
    }
}
