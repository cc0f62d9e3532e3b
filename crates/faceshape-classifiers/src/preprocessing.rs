//! Feature preprocessing stages for the kernel model.
//!
//! [`Scaler`] standardizes columns to zero mean and unit (population)
//! variance; [`Pca`] projects onto the leading principal components. Both are
//! fit on one matrix and applied to others, so cross-validation can refit
//! them per fold.

use ndarray::{Array1, Array2, Axis};

use crate::error::{FaceShapeError, Result};
use crate::math::symmetric_eigen;

fn check_width(x: &Array2<f64>, expected: usize) -> Result<()> {
    if x.ncols() != expected {
        return Err(FaceShapeError::ShapeMismatch {
            expected: format!("{} columns", expected),
            actual: format!("{} columns", x.ncols()),
        });
    }
    Ok(())
}

/// Per-column standard scaler.
#[derive(Clone, Debug)]
pub struct Scaler {
    pub mean: Array1<f64>,
    pub std: Array1<f64>,
}

impl Scaler {
    /// Columns with a standard deviation below this are left unscaled.
    const MIN_STD: f64 = 1e-12;

    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(FaceShapeError::EmptyDataset);
        }
        let mean = x.mean_axis(Axis(0)).ok_or(FaceShapeError::EmptyDataset)?;
        let std = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s < Self::MIN_STD { 1.0 } else { s });
        Ok(Scaler { mean, std })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_width(x, self.mean.len())?;
        Ok((x - &self.mean) / &self.std)
    }

    pub fn fit_transform(x: &Array2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(x)?;
        let out = scaler.transform(x)?;
        Ok((scaler, out))
    }
}

/// Principal component projection.
///
/// The number of components is clamped to what the fitting data can support
/// (`min(n_samples, n_features)`). Directions with no variance behind them
/// are kept as zero components so the output width stays predictable.
#[derive(Clone, Debug)]
pub struct Pca {
    mean: Array1<f64>,
    /// One component per row.
    components: Array2<f64>,
    explained_variance: Vec<f64>,
    total_variance: f64,
}

impl Pca {
    /// Relative eigenvalue floor below which a component is treated as empty.
    const RANK_TOLERANCE: f64 = 1e-10;

    pub fn fit(x: &Array2<f64>, n_components: usize) -> Result<Self> {
        let (n, d) = x.dim();
        if n == 0 || d == 0 {
            return Err(FaceShapeError::EmptyDataset);
        }
        if n_components == 0 {
            return Err(FaceShapeError::InvalidConfig(
                "PCA needs at least one component".to_string(),
            ));
        }

        let mean = x.mean_axis(Axis(0)).ok_or(FaceShapeError::EmptyDataset)?;
        let centered = x - &mean;
        let k = n_components.min(n).min(d);
        if k < n_components {
            log::debug!(
                "PCA: clamping {} requested components to {} ({} samples x {} features)",
                n_components,
                k,
                n,
                d
            );
        }

        // Decompose whichever of X Xᵀ and Xᵀ X is smaller; both share the
        // non-zero spectrum.
        let mut components = Array2::zeros((k, d));
        let eig = if n <= d {
            symmetric_eigen(&centered.dot(&centered.t()))?
        } else {
            symmetric_eigen(&centered.t().dot(&centered))?
        };

        let top = eig.values.first().copied().unwrap_or(0.0).max(0.0);
        let floor = top * Self::RANK_TOLERANCE;
        let denom = (n.max(2) - 1) as f64;
        let mut explained_variance = Vec::with_capacity(k);

        for c in 0..k {
            let lambda = eig.values[c];
            if lambda <= floor || lambda <= 0.0 {
                explained_variance.push(0.0);
                continue;
            }
            let u = eig.vectors.column(c);
            if n <= d {
                // Map the Gram eigenvector back to feature space.
                let v = centered.t().dot(&u) / lambda.sqrt();
                components.row_mut(c).assign(&v);
            } else {
                components.row_mut(c).assign(&u);
            }
            explained_variance.push(lambda / denom);
        }

        let total_variance = eig.values.iter().filter(|&&l| l > 0.0).sum::<f64>() / denom;
        Ok(Pca {
            mean,
            components,
            explained_variance,
            total_variance,
        })
    }

    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        check_width(x, self.mean.len())?;
        Ok((x - &self.mean).dot(&self.components.t()))
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    pub fn components(&self) -> &Array2<f64> {
        &self.components
    }

    /// Share of the total variance captured by each kept component.
    pub fn explained_variance_ratio(&self) -> Vec<f64> {
        if self.total_variance <= 0.0 {
            return vec![0.0; self.explained_variance.len()];
        }
        self.explained_variance
            .iter()
            .map(|v| v / self.total_variance)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn scaler_uses_population_std_and_guards_constant_columns() {
        let x = array![[1.0, 5.0], [3.0, 5.0]];
        let (scaler, z) = Scaler::fit_transform(&x).unwrap();
        assert_eq!(scaler.mean, array![2.0, 5.0]);
        assert_eq!(scaler.std, array![1.0, 1.0]);
        assert_eq!(z, array![[-1.0, 0.0], [1.0, 0.0]]);
    }

    #[test]
    fn scaler_rejects_wrong_width() {
        let scaler = Scaler::fit(&array![[1.0, 2.0], [2.0, 3.0]]).unwrap();
        assert!(matches!(
            scaler.transform(&array![[1.0, 2.0, 3.0]]),
            Err(FaceShapeError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn pca_recovers_dominant_direction() {
        // Points along y = 2x with small orthogonal noise.
        let x = Array2::from_shape_fn((20, 2), |(i, j)| {
            let t = i as f64 - 10.0;
            let noise = if i % 2 == 0 { 0.01 } else { -0.01 };
            if j == 0 {
                t - 2.0 * noise
            } else {
                2.0 * t + noise
            }
        });
        let pca = Pca::fit(&x, 1).unwrap();
        let c = pca.components().row(0);
        let ratio = (c[1] / c[0]).abs();
        assert!((ratio - 2.0).abs() < 1e-3);
        assert!(pca.explained_variance_ratio()[0] > 0.99);
    }

    #[test]
    fn pca_clamps_components_to_available_rank() {
        let x = Array2::from_shape_fn((6, 10), |(i, j)| ((i * 3 + j) % 7) as f64);
        let pca = Pca::fit(&x, 100).unwrap();
        assert_eq!(pca.n_components(), 6);
        let z = pca.transform(&x).unwrap();
        assert_eq!(z.dim(), (6, 6));
        assert!(z.iter().all(|v| v.is_finite()));
        // Centered data of 6 rows has rank <= 5: last component is empty.
        assert!(pca.components().row(5).iter().all(|&v| v == 0.0));
    }

    #[test]
    fn pca_components_are_orthonormal_for_wide_and_tall_data() {
        let wide = Array2::from_shape_fn((5, 8), |(i, j)| ((i * 5 + j * 2) % 9) as f64 - 4.0);
        let tall = Array2::from_shape_fn((14, 4), |(i, j)| ((i * 5 + j * 3) % 11) as f64);
        for x in [wide, tall] {
            let pca = Pca::fit(&x, 3).unwrap();
            let c = pca.components();
            let gram = c.dot(&c.t());
            for i in 0..3 {
                for j in 0..3 {
                    let expected = if i == j { 1.0 } else { 0.0 };
                    assert!((gram[[i, j]] - expected).abs() < 1e-8);
                }
            }
            let ratios = pca.explained_variance_ratio();
            assert!(ratios.windows(2).all(|w| w[0] >= w[1]));
        }
    }
}
