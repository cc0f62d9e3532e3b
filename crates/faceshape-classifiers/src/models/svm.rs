use linfa::dataset::Pr;
use linfa::prelude::*;
use linfa_svm::{Svm, SvmParams};
use ndarray::{Array1, Array2, Axis};

use crate::error::{FaceShapeError, Result};
use crate::models::classifier_trait::{argmax_first, ClassifierModel};

/// Binary decision for one pair of classes.
enum PairDecision {
    /// Platt-scaled RBF machine; probability is for class `a`.
    Fitted(Svm<f64, Pr>),
    /// Only one side of the pair had training rows.
    Constant(f64),
}

struct PairwiseSvm {
    a: usize,
    b: usize,
    decision: PairDecision,
}

/// One-vs-one multi-class SVM with an RBF kernel.
///
/// Prediction takes the pairwise vote; ties go to the class with the larger
/// summed pairwise probability, then to the lowest index. Class probabilities
/// are the pairwise probabilities averaged per class and normalized.
pub struct SvmClassifier {
    c: f64,
    gamma: f64,
    eps: f64,
    machines: Vec<PairwiseSvm>,
    n_classes: usize,
}

impl SvmClassifier {
    pub fn new(c: f64, gamma: f64, eps: f64) -> Self {
        SvmClassifier {
            c,
            gamma,
            eps,
            machines: Vec::new(),
            n_classes: 0,
        }
    }

    fn params(&self) -> SvmParams<f64, Pr> {
        // linfa's gaussian kernel is exp(-|x - y|^2 / eps), i.e. eps = 1 / gamma.
        Svm::<f64, Pr>::params()
            .eps(self.eps)
            .pos_neg_weights(self.c, self.c)
            .gaussian_kernel(1.0 / self.gamma)
    }

    fn fit_pair(&self, x: &Array2<f64>, y: &Array1<usize>, a: usize, b: usize) -> Result<PairwiseSvm> {
        let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == a || y[i] == b).collect();
        let targets: Array1<bool> = rows.iter().map(|&i| y[i] == a).collect();
        let positives = targets.iter().filter(|&&t| t).count();

        let decision = if positives == 0 || positives == targets.len() {
            log::warn!(
                "SVM pair ({}, {}) has training rows for one class only",
                a,
                b
            );
            PairDecision::Constant(if positives == 0 { 0.0 } else { 1.0 })
        } else {
            let dataset = Dataset::new(x.select(Axis(0), &rows), targets);
            let model = self
                .params()
                .fit(&dataset)
                .map_err(|e| FaceShapeError::Model(format!("svm pair ({}, {}): {}", a, b, e)))?;
            PairDecision::Fitted(model)
        };

        Ok(PairwiseSvm { a, b, decision })
    }

    /// Returns (votes, summed pairwise probabilities) per sample and class.
    fn pairwise(&self, x: &Array2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
        if self.machines.is_empty() {
            return Err(FaceShapeError::NotFitted);
        }
        let n = x.nrows();
        let mut votes = Array2::zeros((n, self.n_classes));
        let mut prob_sum = Array2::zeros((n, self.n_classes));

        for m in &self.machines {
            let p_a: Vec<f64> = match &m.decision {
                PairDecision::Fitted(model) => {
                    let pred: Array1<Pr> = model.predict(x);
                    pred.iter().map(|p| **p as f64).collect()
                }
                PairDecision::Constant(p) => vec![*p; n],
            };
            for (row, &p) in p_a.iter().enumerate() {
                if p > 0.5 {
                    votes[[row, m.a]] += 1.0;
                } else {
                    votes[[row, m.b]] += 1.0;
                }
                prob_sum[[row, m.a]] += p;
                prob_sum[[row, m.b]] += 1.0 - p;
            }
        }
        Ok((votes, prob_sum))
    }
}

impl ClassifierModel for SvmClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>, n_classes: usize) -> Result<()> {
        if x.nrows() == 0 {
            return Err(FaceShapeError::EmptyDataset);
        }
        if n_classes < 2 {
            return Err(FaceShapeError::TooFewClasses(n_classes));
        }

        let mut machines = Vec::with_capacity(n_classes * (n_classes - 1) / 2);
        for a in 0..n_classes {
            for b in (a + 1)..n_classes {
                machines.push(self.fit_pair(x, y, a, b)?);
            }
        }
        log::trace!(
            "Fitted {} pairwise SVMs (C={}, gamma={})",
            machines.len(),
            self.c,
            self.gamma
        );

        self.machines = machines;
        self.n_classes = n_classes;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let (votes, prob_sum) = self.pairwise(x)?;
        // Fold the probability tie-break into the vote score; sums stay below
        // n_classes so they never outweigh a full vote once scaled.
        let scale = self.n_classes as f64;
        let score = &votes + &(prob_sum / scale);
        Ok(score.rows().into_iter().map(|r| argmax_first(r.iter())).collect())
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let (_, prob_sum) = self.pairwise(x)?;
        let mut proba = prob_sum;
        for mut row in proba.rows_mut() {
            let total = row.sum();
            if total > 0.0 {
                row /= total;
            }
        }
        Ok(proba)
    }

    fn name(&self) -> &str {
        "svm_ovo"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_clusters() -> (Array2<f64>, Array1<usize>) {
        let centers = [(0.0, 0.0), (4.0, 0.0), (0.0, 4.0)];
        let n_per = 12;
        let mut flat = Vec::new();
        let mut y = Vec::new();
        for (class, (cx, cy)) in centers.iter().enumerate() {
            for i in 0..n_per {
                let angle = i as f64 * 0.7;
                flat.push(cx + 0.4 * angle.cos());
                flat.push(cy + 0.4 * angle.sin());
                y.push(class);
            }
        }
        (
            Array2::from_shape_vec((y.len(), 2), flat).unwrap(),
            Array1::from_vec(y),
        )
    }

    #[test]
    fn separates_three_clusters() {
        let (x, y) = three_clusters();
        let mut svm = SvmClassifier::new(10.0, 0.5, 1e-3);
        svm.fit(&x, &y, 3).unwrap();

        let pred = svm.predict(&x).unwrap();
        let correct = pred.iter().zip(y.iter()).filter(|(a, b)| a == b).count();
        assert!(correct >= 34, "only {} of 36 correct", correct);

        let proba = svm.predict_proba(&x).unwrap();
        assert_eq!(proba.dim(), (36, 3));
        for row in proba.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn vote_ties_fall_back_to_probability_then_index() {
        let svm = SvmClassifier {
            c: 1.0,
            gamma: 1.0,
            eps: 1e-3,
            machines: vec![
                PairwiseSvm { a: 0, b: 1, decision: PairDecision::Constant(0.9) },
                PairwiseSvm { a: 0, b: 2, decision: PairDecision::Constant(0.2) },
                PairwiseSvm { a: 1, b: 2, decision: PairDecision::Constant(0.6) },
            ],
            n_classes: 3,
        };
        // Votes: 0 beats 1, 2 beats 0, 1 beats 2 -> one each.
        // Probability sums: 0 -> 1.1, 1 -> 0.7, 2 -> 1.2.
        let pred = svm.predict(&Array2::zeros((1, 2))).unwrap();
        assert_eq!(pred[0], 2);

        let even = SvmClassifier {
            machines: vec![PairwiseSvm { a: 0, b: 1, decision: PairDecision::Constant(0.5) }],
            n_classes: 2,
            ..svm
        };
        // p = 0.5 votes for b, so b wins outright.
        assert_eq!(even.predict(&Array2::zeros((1, 2))).unwrap()[0], 1);
    }

    #[test]
    fn unfitted_svm_refuses_to_predict() {
        let svm = SvmClassifier::new(1.0, 1.0, 1e-3);
        assert!(matches!(
            svm.predict(&Array2::zeros((1, 2))),
            Err(FaceShapeError::NotFitted)
        ));
    }
}
