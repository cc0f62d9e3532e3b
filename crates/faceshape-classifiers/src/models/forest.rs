use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::config::ForestConfig;
use crate::error::{FaceShapeError, Result};
use crate::models::classifier_trait::{argmax_first, ClassifierModel};

/// One bagged tree and the feature columns it was trained on.
struct ForestTree {
    tree: DecisionTree<f64, usize>,
    features: Vec<usize>,
}

/// Bagged decision trees with a random feature subspace per tree.
///
/// Tree `t` draws its bootstrap rows and feature subset from
/// `StdRng::seed_from_u64(seed + t)`, so the fitted forest does not depend on
/// how rayon schedules the trees.
pub struct RandomForestClassifier {
    config: ForestConfig,
    trees: Vec<ForestTree>,
    n_classes: usize,
    n_features: usize,
}

impl RandomForestClassifier {
    pub fn new(config: ForestConfig) -> Self {
        RandomForestClassifier {
            config,
            trees: Vec::new(),
            n_classes: 0,
            n_features: 0,
        }
    }

    fn features_per_tree(&self, n_features: usize) -> usize {
        let m = self
            .config
            .max_features
            .unwrap_or_else(|| (n_features as f64).sqrt().floor() as usize);
        m.clamp(1, n_features)
    }

    fn fit_tree(
        &self,
        index: usize,
        x: &Array2<f64>,
        y: &Array1<usize>,
        n_sub: usize,
    ) -> Result<ForestTree> {
        let mut rng = StdRng::seed_from_u64(self.config.seed.wrapping_add(index as u64));
        let n = x.nrows();
        let rows: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
        let mut features = rand::seq::index::sample(&mut rng, x.ncols(), n_sub).into_vec();
        features.sort_unstable();

        let records = x.select(Axis(0), &rows).select(Axis(1), &features);
        let targets: Array1<usize> = rows.iter().map(|&r| y[r]).collect();
        let dataset = Dataset::new(records, targets);

        let tree = DecisionTree::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(self.config.max_depth)
            .fit(&dataset)
            .map_err(|e| FaceShapeError::Model(format!("decision tree {}: {}", index, e)))?;

        Ok(ForestTree { tree, features })
    }

    /// Vote counts, one row per sample and one column per class.
    fn votes(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(FaceShapeError::NotFitted);
        }
        if x.ncols() != self.n_features {
            return Err(FaceShapeError::ShapeMismatch {
                expected: format!("{} columns", self.n_features),
                actual: format!("{} columns", x.ncols()),
            });
        }

        let per_tree: Vec<Array1<usize>> = self
            .trees
            .par_iter()
            .map(|t| t.tree.predict(&x.select(Axis(1), &t.features)))
            .collect();

        let mut votes = Array2::zeros((x.nrows(), self.n_classes));
        for preds in &per_tree {
            for (row, &class) in preds.iter().enumerate() {
                votes[[row, class]] += 1.0;
            }
        }
        Ok(votes)
    }
}

impl ClassifierModel for RandomForestClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> Result<()> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(FaceShapeError::EmptyDataset);
        }
        if x.nrows() != y.len() {
            return Err(FaceShapeError::ShapeMismatch {
                expected: format!("{} labels", x.nrows()),
                actual: format!("{} labels", y.len()),
            });
        }

        let n_sub = self.features_per_tree(x.ncols());
        log::debug!(
            "Fitting random forest: {} trees, {} of {} features per tree, seed {}",
            self.config.n_trees,
            n_sub,
            x.ncols(),
            self.config.seed
        );

        let trees = (0..self.config.n_trees)
            .into_par_iter()
            .map(|t| self.fit_tree(t, x, y, n_sub))
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.n_classes = n_classes;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let votes = self.votes(x)?;
        Ok(votes.rows().into_iter().map(|r| argmax_first(r.iter())).collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let votes = self.votes(x)?;
        Ok(votes / self.trees.len() as f64)
    }

    fn name(&self) -> &str {
        "random_forest"
    }
}
