use ndarray::{Array1, Array2};

use crate::config::SvmConfig;
use crate::error::{FaceShapeError, Result};
use crate::models::classifier_trait::ClassifierModel;
use crate::models::svm::SvmClassifier;
use crate::preprocessing::{Pca, Scaler};

/// Standardize → PCA → RBF SVM, fit as one unit.
///
/// Every call to [`fit`](ClassifierModel::fit) refits the scaler and the
/// projection on the rows it is given, so a cross-validation fold never sees
/// statistics from its held-out part.
pub struct SvmPipeline {
    config: SvmConfig,
    scaler: Option<Scaler>,
    pca: Option<Pca>,
    svm: SvmClassifier,
}

impl SvmPipeline {
    pub fn new(config: SvmConfig) -> Self {
        let svm = SvmClassifier::new(config.c, config.gamma, config.eps);
        SvmPipeline {
            config,
            scaler: None,
            pca: None,
            svm,
        }
    }

    #[cfg(test)]
    fn pca(&self) -> Option<&Pca> {
        self.pca.as_ref()
    }

    fn project(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (Some(scaler), Some(pca)) = (&self.scaler, &self.pca) else {
            return Err(FaceShapeError::NotFitted);
        };
        pca.transform(&scaler.transform(x)?)
    }
}

impl ClassifierModel for SvmPipeline {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> Result<()> {
        let (scaler, scaled) = Scaler::fit_transform(x)?;
        let pca = Pca::fit(&scaled, self.config.n_components)?;
        log::debug!(
            "PCA kept {} of {} requested components, {:.1}% of the variance (C={}, gamma={})",
            pca.n_components(),
            self.config.n_components,
            pca.explained_variance_ratio().iter().sum::<f64>() * 100.0,
            self.config.c,
            self.config.gamma
        );
        let projected = pca.transform(&scaled)?;
        self.svm.fit(&projected, y, n_classes)?;
        self.scaler = Some(scaler);
        self.pca = Some(pca);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        self.svm.predict(&self.project(x)?)
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.svm.predict_proba(&self.project(x)?)
    }

    fn name(&self) -> &str {
        "scaler_pca_svm"
    }
}
