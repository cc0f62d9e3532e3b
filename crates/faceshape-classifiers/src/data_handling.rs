//! Dataset container, stratified train/test split and stratified k-fold.
//!
//! Labels travel as strings; models see them encoded as indices into the
//! sorted class vocabulary (see [`encode_labels`]).
use std::collections::BTreeMap;

use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::{FaceShapeError, Result};
use crate::features::FeatureVector;

/// Feature matrix plus row-aligned labels. Built once, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Dataset {
    features: Array2<f64>,
    labels: Vec<String>,
}

impl Dataset {
    pub fn new(features: Array2<f64>, labels: Vec<String>) -> Result<Self> {
        if features.nrows() != labels.len() {
            return Err(FaceShapeError::ShapeMismatch {
                expected: format!("{} labels", features.nrows()),
                actual: format!("{} labels", labels.len()),
            });
        }
        Ok(Self { features, labels })
    }

    /// Stack feature vectors of length `width` into a dataset.
    pub fn from_rows(rows: &[FeatureVector], labels: Vec<String>, width: usize) -> Result<Self> {
        let mut flat = Vec::with_capacity(rows.len() * width);
        for row in rows {
            if row.len() != width {
                return Err(FaceShapeError::ShapeMismatch {
                    expected: format!("feature vector of length {}", width),
                    actual: format!("length {}", row.len()),
                });
            }
            flat.extend(row.iter().copied());
        }
        let features = Array2::from_shape_vec((rows.len(), width), flat).map_err(|e| {
            FaceShapeError::ShapeMismatch {
                expected: format!("{} x {}", rows.len(), width),
                actual: e.to_string(),
            }
        })?;
        Self::new(features, labels)
    }

    pub fn features(&self) -> &Array2<f64> {
        &self.features
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Sorted label vocabulary.
    pub fn classes(&self) -> Vec<String> {
        self.class_counts().into_keys().collect()
    }

    pub fn class_counts(&self) -> BTreeMap<String, usize> {
        class_counts(&self.labels)
    }

    /// Rows at `indices`, in that order.
    pub fn select(&self, indices: &[usize]) -> Dataset {
        Dataset {
            features: self.features.select(Axis(0), indices),
            labels: indices.iter().map(|&i| self.labels[i].clone()).collect(),
        }
    }

    pub fn log_summary(&self) {
        log::info!(
            "Dataset: {} samples x {} features, {} classes",
            self.n_samples(),
            self.n_features(),
            self.class_counts().len()
        );
        for (label, count) in self.class_counts() {
            log::info!("  {}: {}", label, count);
        }
    }
}

pub fn class_counts(labels: &[String]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for l in labels {
        *counts.entry(l.clone()).or_insert(0) += 1;
    }
    counts
}

/// Encode labels as indices into their sorted vocabulary.
pub fn encode_labels(labels: &[String]) -> (Vec<String>, Array1<usize>) {
    let classes: Vec<String> = class_counts(labels).into_keys().collect();
    let encoded = labels
        .iter()
        .map(|l| classes.binary_search(l).unwrap_or_default())
        .collect();
    (classes, encoded)
}

/// Train/test partition of a dataset.
#[derive(Debug, Clone)]
pub struct Split {
    pub train: Dataset,
    pub test: Dataset,
}

impl Split {
    pub fn train_x(&self) -> &Array2<f64> {
        self.train.features()
    }

    pub fn test_x(&self) -> &Array2<f64> {
        self.test.features()
    }

    pub fn train_y(&self) -> &[String] {
        self.train.labels()
    }

    pub fn test_y(&self) -> &[String] {
        self.test.labels()
    }
}

/// Number of test samples per class for a stratified split.
///
/// The overall test size is `ceil(test_fraction * n)`. Each class gets the
/// floor of its proportional share, the remainder goes to the classes with the
/// largest fractional parts (ties by label order), and every class is then
/// clamped to keep at least one sample on each side.
fn test_allocation(counts: &BTreeMap<String, usize>, test_fraction: f64) -> Vec<usize> {
    let n: usize = counts.values().sum();
    let n_test = (test_fraction * n as f64).ceil() as usize;

    let shares: Vec<f64> = counts
        .values()
        .map(|&c| n_test as f64 * c as f64 / n as f64)
        .collect();
    let mut alloc: Vec<usize> = shares.iter().map(|s| s.floor() as usize).collect();

    let assigned: usize = alloc.iter().sum();
    let mut order: Vec<usize> = (0..shares.len()).collect();
    // Stable sort keeps label order among equal fractional parts.
    order.sort_by(|&a, &b| {
        let fa = shares[a] - shares[a].floor();
        let fb = shares[b] - shares[b].floor();
        fb.partial_cmp(&fa).unwrap_or(std::cmp::Ordering::Equal)
    });
    for &idx in order.iter().take(n_test.saturating_sub(assigned)) {
        alloc[idx] += 1;
    }

    alloc
        .iter()
        .zip(counts.values())
        .map(|(&a, &c)| a.clamp(1, c - 1))
        .collect()
}

/// Both sides of the split must be able to hold one member of every class at
/// the requested fraction; otherwise the smallest class is reported, along
/// with the class size a proportional share on the short side would need.
fn check_side_sizes(counts: &BTreeMap<String, usize>, test_fraction: f64) -> Result<()> {
    let n: usize = counts.values().sum();
    let n_test = (test_fraction * n as f64).ceil() as usize;
    let n_train = n.saturating_sub(n_test);

    let short_side = [n_test, n_train].into_iter().find(|&side| side < counts.len());
    let Some(side) = short_side else {
        return Ok(());
    };

    let (label, &count) = counts
        .iter()
        .min_by_key(|(_, &c)| c)
        .ok_or(FaceShapeError::EmptyDataset)?;
    Err(FaceShapeError::InsufficientSamples {
        label: label.clone(),
        count,
        required: n.div_ceil(side.max(1)),
    })
}

/// Stratified, seeded train/test split.
pub fn stratified_split(dataset: &Dataset, test_fraction: f64, seed: u64) -> Result<Split> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(FaceShapeError::InvalidTestFraction(test_fraction));
    }
    if dataset.is_empty() {
        return Err(FaceShapeError::EmptyDataset);
    }

    let counts = dataset.class_counts();
    if counts.len() < 2 {
        return Err(FaceShapeError::TooFewClasses(counts.len()));
    }
    if let Some((label, &count)) = counts.iter().find(|(_, &c)| c < 2) {
        return Err(FaceShapeError::InsufficientSamples {
            label: label.clone(),
            count,
            required: 2,
        });
    }
    check_side_sizes(&counts, test_fraction)?;

    let alloc = test_allocation(&counts, test_fraction);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train_idx = Vec::new();
    let mut test_idx = Vec::new();

    for (label, &n_test) in counts.keys().zip(alloc.iter()) {
        let mut members: Vec<usize> = dataset
            .labels()
            .iter()
            .enumerate()
            .filter(|(_, l)| *l == label)
            .map(|(i, _)| i)
            .collect();
        members.shuffle(&mut rng);
        test_idx.extend_from_slice(&members[..n_test]);
        train_idx.extend_from_slice(&members[n_test..]);
    }
    train_idx.shuffle(&mut rng);
    test_idx.shuffle(&mut rng);

    log::debug!(
        "Stratified split (seed {}): {} train / {} test",
        seed,
        train_idx.len(),
        test_idx.len()
    );

    Ok(Split {
        train: dataset.select(&train_idx),
        test: dataset.select(&test_idx),
    })
}

/// Row indices of one cross-validation fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified k-fold without shuffling.
///
/// Classes are ranked by first appearance in `y`; the sorted class sequence is
/// dealt round-robin over the folds to decide how many members of each class
/// each fold receives, and each class's samples are then assigned to folds in
/// their original order.
pub fn stratified_kfold(y: &[usize], k: usize) -> Result<Vec<Fold>> {
    if k < 2 {
        return Err(FaceShapeError::InvalidConfig(format!(
            "cross-validation needs at least 2 folds, got {}",
            k
        )));
    }
    if y.len() < k {
        return Err(FaceShapeError::TooManyFolds {
            folds: k,
            largest: y.len(),
        });
    }

    // Re-rank classes by first appearance.
    let mut rank_of: BTreeMap<usize, usize> = BTreeMap::new();
    let mut ranked = Vec::with_capacity(y.len());
    for &label in y {
        let next = rank_of.len();
        ranked.push(*rank_of.entry(label).or_insert(next));
    }
    let n_classes = rank_of.len();

    let mut class_sizes = vec![0usize; n_classes];
    for &r in &ranked {
        class_sizes[r] += 1;
    }
    let largest = class_sizes.iter().copied().max().unwrap_or(0);
    let smallest = class_sizes.iter().copied().min().unwrap_or(0);
    if largest < k {
        return Err(FaceShapeError::TooManyFolds { folds: k, largest });
    }
    if smallest < k {
        log::warn!(
            "The least populated class has only {} members, fewer than {} folds",
            smallest,
            k
        );
    }

    let mut sorted = ranked.clone();
    sorted.sort_unstable();
    // allocation[fold][class]
    let mut allocation = vec![vec![0usize; n_classes]; k];
    for (i, &class) in sorted.iter().enumerate() {
        allocation[i % k][class] += 1;
    }

    let mut test_fold = vec![0usize; y.len()];
    for class in 0..n_classes {
        let fold_ids = (0..k).flat_map(|f| std::iter::repeat(f).take(allocation[f][class]));
        let members = ranked
            .iter()
            .enumerate()
            .filter(|(_, &r)| r == class)
            .map(|(i, _)| i);
        for (i, fold) in members.zip(fold_ids) {
            test_fold[i] = fold;
        }
    }

    Ok((0..k)
        .map(|f| {
            let (test, train): (Vec<usize>, Vec<usize>) =
                (0..y.len()).partition(|&i| test_fold[i] == f);
            Fold { train, test }
        })
        .collect())
}
