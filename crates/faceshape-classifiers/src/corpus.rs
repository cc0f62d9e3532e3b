//! Labeled image corpus → [`Dataset`].
//!
//! A corpus is a directory whose subdirectories are class labels and whose
//! files are face photographs. Samples that cannot be turned into a feature
//! vector are skipped and recorded in a [`BuildReport`]; only a missing corpus
//! root stops the build.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;

use crate::data_handling::Dataset;
use crate::error::{FaceShapeError, Result};
use crate::features::{self, FeatureVector};
use crate::landmarks::{LandmarkDetector, LandmarkExtractor};

/// Why a corpus file did not become a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The file could not be read or decoded as an image.
    DecodeFailed,
    /// The image decoded to zero width or height.
    EmptyImage,
    /// The detector ran but found no face.
    NoFace,
    /// The detector returned an error for this image.
    DetectorFailed,
    /// The detector returned a point count that does not match its schema.
    LandmarkCountMismatch,
    /// Encoding produced NaN or infinite values.
    NonFiniteFeatures,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::DecodeFailed => "decode_failed",
            SkipReason::EmptyImage => "empty_image",
            SkipReason::NoFace => "no_face",
            SkipReason::DetectorFailed => "detector_failed",
            SkipReason::LandmarkCountMismatch => "landmark_count_mismatch",
            SkipReason::NonFiniteFeatures => "non_finite_features",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedSample {
    pub path: PathBuf,
    pub label: String,
    pub reason: SkipReason,
}

/// Outcome of a corpus walk besides the dataset itself.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Image files visited (hidden files excluded).
    pub files_seen: usize,
    /// Files that became samples.
    pub samples_kept: usize,
    pub skipped: Vec<SkippedSample>,
}

impl BuildReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    pub fn counts_by_reason(&self) -> BTreeMap<SkipReason, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.skipped {
            *counts.entry(s.reason).or_insert(0) += 1;
        }
        counts
    }

    pub fn counts_by_label(&self) -> BTreeMap<String, usize> {
        let mut counts = BTreeMap::new();
        for s in &self.skipped {
            *counts.entry(s.label.clone()).or_insert(0) += 1;
        }
        counts
    }

    /// Log the skip summary at info level.
    pub fn log_summary(&self) {
        log::info!(
            "Corpus walk: {} files, {} samples kept, {} skipped",
            self.files_seen,
            self.samples_kept,
            self.skipped_count()
        );
        for (reason, count) in self.counts_by_reason() {
            log::info!("  skipped ({}): {}", reason, count);
        }
        for (label, count) in self.counts_by_label() {
            log::debug!("  skipped in '{}': {}", label, count);
        }
    }
}

/// One corpus file scheduled for processing.
#[derive(Debug, Clone)]
struct CorpusEntry {
    label: String,
    path: PathBuf,
}

/// Walks a labeled corpus and turns every usable image into a sample.
pub struct DatasetBuilder<'a> {
    extractor: LandmarkExtractor<'a>,
}

impl<'a> DatasetBuilder<'a> {
    pub fn new(detector: &'a dyn LandmarkDetector) -> Self {
        Self {
            extractor: LandmarkExtractor::new(detector),
        }
    }

    /// Build the dataset for `corpus_root`.
    ///
    /// Labels are visited in sorted order and files in sorted name order;
    /// images are processed on the rayon pool but rows come out in walk
    /// order. The returned dataset may be empty; callers decide whether that
    /// is fatal.
    pub fn build(&self, corpus_root: &Path) -> Result<(Dataset, BuildReport)> {
        let entries = walk_corpus(corpus_root)?;
        log::info!(
            "Found {} image files under {}",
            entries.len(),
            corpus_root.display()
        );

        let outcomes: Vec<std::result::Result<FeatureVector, SkipReason>> = entries
            .par_iter()
            .map(|entry| self.process_file(&entry.path))
            .collect();

        let width = self.extractor.schema().feature_len();
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        let mut report = BuildReport {
            files_seen: entries.len(),
            ..Default::default()
        };

        for (entry, outcome) in entries.into_iter().zip(outcomes) {
            match outcome {
                Ok(features) => {
                    rows.push(features);
                    labels.push(entry.label);
                }
                Err(reason) => {
                    log::debug!("Skipping {} ({})", entry.path.display(), reason);
                    report.skipped.push(SkippedSample {
                        path: entry.path,
                        label: entry.label,
                        reason,
                    });
                }
            }
        }
        report.samples_kept = rows.len();

        let dataset = Dataset::from_rows(&rows, labels, width)?;
        Ok((dataset, report))
    }

    fn process_file(&self, path: &Path) -> std::result::Result<FeatureVector, SkipReason> {
        let image = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                log::trace!("Decode failed for {}: {}", path.display(), e);
                return Err(SkipReason::DecodeFailed);
            }
        };

        let landmarks = self.extractor.try_extract(&image)?;
        let features = features::encode(&landmarks);
        if !features::is_finite(&features) {
            return Err(SkipReason::NonFiniteFeatures);
        }
        Ok(features)
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = fs::read_dir(dir)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();
    Ok(paths)
}

/// Label directories in sorted order, their files in sorted order.
fn walk_corpus(root: &Path) -> Result<Vec<CorpusEntry>> {
    if !root.is_dir() {
        return Err(FaceShapeError::CorpusNotFound(root.to_path_buf()));
    }

    let mut entries = Vec::new();
    for label_dir in sorted_entries(root)? {
        if !label_dir.is_dir() || is_hidden(&label_dir) {
            continue;
        }
        let Some(label) = label_dir.file_name().and_then(|n| n.to_str()) else {
            log::warn!("Ignoring non UTF-8 label directory {}", label_dir.display());
            continue;
        };

        for path in sorted_entries(&label_dir)? {
            if path.is_file() && !is_hidden(&path) {
                entries.push(CorpusEntry {
                    label: label.to_string(),
                    path,
                });
            }
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn walk_is_sorted_and_ignores_hidden_and_loose_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("round")).unwrap();
        fs::create_dir(root.join("oval")).unwrap();
        fs::create_dir(root.join(".cache")).unwrap();
        fs::write(root.join("README.txt"), b"x").unwrap();
        fs::write(root.join("round").join("b.png"), b"x").unwrap();
        fs::write(root.join("round").join("a.png"), b"x").unwrap();
        fs::write(root.join("round").join(".DS_Store"), b"x").unwrap();
        fs::write(root.join("oval").join("z.jpg"), b"x").unwrap();
        fs::write(root.join(".cache").join("c.png"), b"x").unwrap();

        let entries = walk_corpus(root).unwrap();
        let seen: Vec<(String, String)> = entries
            .iter()
            .map(|e| {
                (
                    e.label.clone(),
                    e.path.file_name().unwrap().to_string_lossy().into_owned(),
                )
            })
            .collect();
        assert_eq!(
            seen,
            vec![
                ("oval".to_string(), "z.jpg".to_string()),
                ("round".to_string(), "a.png".to_string()),
                ("round".to_string(), "b.png".to_string()),
            ]
        );
    }

    #[test]
    fn missing_root_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(
            walk_corpus(&missing),
            Err(FaceShapeError::CorpusNotFound(p)) if p == missing
        ));
    }

    #[test]
    fn report_counts_group_by_reason_and_label() {
        let skip = |label: &str, reason| SkippedSample {
            path: PathBuf::from("x"),
            label: label.to_string(),
            reason,
        };
        let report = BuildReport {
            files_seen: 5,
            samples_kept: 2,
            skipped: vec![
                skip("oval", SkipReason::NoFace),
                skip("round", SkipReason::NoFace),
                skip("round", SkipReason::DecodeFailed),
            ],
        };
        let by_reason = report.counts_by_reason();
        assert_eq!(by_reason[&SkipReason::NoFace], 2);
        assert_eq!(by_reason[&SkipReason::DecodeFailed], 1);
        assert_eq!(report.counts_by_label()["round"], 2);
        assert_eq!(SkipReason::LandmarkCountMismatch.to_string(), "landmark_count_mismatch");
    }
}
