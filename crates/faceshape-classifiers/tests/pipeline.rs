mod common;

use std::fs;

use common::{write_corpus, write_face, PixelGeometryDetector, OVAL_RATIO, ROUND_RATIO};
use faceshape_classifiers::config::{ExperimentConfig, ForestConfig, SvmSearchConfig};
use faceshape_classifiers::corpus::{DatasetBuilder, SkipReason};
use faceshape_classifiers::data_handling::stratified_split;
use faceshape_classifiers::search::tune_svm;
use faceshape_classifiers::{experiment, report, FaceShapeError};

fn small_search() -> SvmSearchConfig {
    SvmSearchConfig {
        n_components: 10,
        c_values: vec![1.0, 10.0],
        gamma_values: vec![0.01, 0.1],
        folds: 3,
        eps: 1e-3,
    }
}

fn small_experiment() -> ExperimentConfig {
    ExperimentConfig {
        baseline: ForestConfig {
            n_trees: 25,
            ..ForestConfig::default()
        },
        search: small_search(),
        cv_folds: 3,
        ..ExperimentConfig::default()
    }
}

// ---------------------------------------------------------------------------
// Dataset building
// ---------------------------------------------------------------------------

#[test]
fn builder_skips_unusable_files_and_keeps_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_corpus(root, &[("oval", 4, OVAL_RATIO), ("round", 3, ROUND_RATIO)]);
    fs::write(root.join("round").join("broken.png"), b"").unwrap();
    write_face(&root.join("oval").join("zz_blank.png"), 0, 10, 10);

    let (dataset, build) = DatasetBuilder::new(&PixelGeometryDetector).build(root).unwrap();

    assert_eq!(build.files_seen, 9);
    assert_eq!(build.samples_kept, 7);
    assert_eq!(dataset.n_samples(), 7);
    assert_eq!(dataset.n_features(), 468 * 2);
    assert_eq!(dataset.labels()[..4], ["oval", "oval", "oval", "oval"]);
    assert_eq!(dataset.labels()[4..], ["round", "round", "round"]);

    let reasons = build.counts_by_reason();
    assert_eq!(reasons[&SkipReason::DecodeFailed], 1);
    assert_eq!(reasons[&SkipReason::NoFace], 1);
}

#[test]
fn corpus_without_faces_yields_empty_dataset_that_cannot_be_split() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), &[("oval", 3, 0), ("round", 3, 0)]);

    let (dataset, build) = DatasetBuilder::new(&PixelGeometryDetector)
        .build(dir.path())
        .unwrap();
    assert!(dataset.is_empty());
    assert_eq!(build.skipped_count(), 6);
    assert!(matches!(
        stratified_split(&dataset, 0.25, 42),
        Err(FaceShapeError::EmptyDataset)
    ));
}

#[test]
fn features_do_not_depend_on_face_size() {
    let dir = tempfile::tempdir().unwrap();
    let label = dir.path().join("round");
    fs::create_dir_all(&label).unwrap();
    write_face(&label.join("a_small.png"), ROUND_RATIO, 77, 0);
    write_face(&label.join("b_large.png"), ROUND_RATIO, 77, 250);

    let (dataset, _) = DatasetBuilder::new(&PixelGeometryDetector)
        .build(dir.path())
        .unwrap();
    let x = dataset.features();
    for (a, b) in x.row(0).iter().zip(x.row(1).iter()) {
        assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
    }
}

// ---------------------------------------------------------------------------
// Model selection
// ---------------------------------------------------------------------------

#[test]
fn grid_search_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path(), &[("oval", 12, OVAL_RATIO), ("round", 12, ROUND_RATIO)]);
    let (dataset, _) = DatasetBuilder::new(&PixelGeometryDetector)
        .build(dir.path())
        .unwrap();

    let first = tune_svm(dataset.features(), dataset.labels(), &small_search()).unwrap();
    let second = tune_svm(dataset.features(), dataset.labels(), &small_search()).unwrap();

    assert_eq!(first.best_params, second.best_params);
    assert_eq!(first.best_cv_score, second.best_cv_score);
    let scores = |t: &faceshape_classifiers::search::TunedModel| -> Vec<f64> {
        t.search.candidates.iter().map(|c| c.mean_score).collect()
    };
    assert_eq!(scores(&first), scores(&second));
    assert_eq!(first.search.candidates.len(), 4);
}

#[test]
fn end_to_end_run_separates_round_and_oval_faces() {
    let dir = tempfile::tempdir().unwrap();
    let corpus = dir.path().join("corpus");
    write_corpus(&corpus, &[("oval", 30, OVAL_RATIO), ("round", 30, ROUND_RATIO)]);
    fs::write(corpus.join("oval").join("empty.png"), b"").unwrap();
    write_face(&corpus.join("round").join("no_face.png"), 0, 1, 1);

    let (dataset, build) = DatasetBuilder::new(&PixelGeometryDetector)
        .build(&corpus)
        .unwrap();
    assert_eq!(dataset.n_samples(), 60);
    assert_eq!(build.skipped_count(), 2);

    let config = small_experiment();
    let outcome = experiment::run(&dataset, &config).unwrap();
    let rep = &outcome.report;

    assert_eq!(rep.classes, vec!["oval".to_string(), "round".to_string()]);
    assert_eq!(rep.n_train, 45);
    assert_eq!(rep.n_test, 15);
    assert_eq!(rep.metrics.confusion.row_sums(), vec![8, 7]);
    assert_eq!(rep.metrics.confusion.total(), 15);
    assert_eq!(rep.metrics.cv.fold_scores.len(), 3);

    let c = rep.best_params.get("C").unwrap();
    let gamma = rep.best_params.get("gamma").unwrap();
    assert!(config.search.c_values.contains(&c));
    assert!(config.search.gamma_values.contains(&gamma));

    assert!(rep.baseline_accuracy >= 0.8, "baseline {}", rep.baseline_accuracy);
    assert!(rep.metrics.test_accuracy >= 0.8, "tuned {}", rep.metrics.test_accuracy);
    assert!((rep.metrics.test_accuracy - rep.metrics.confusion.accuracy()).abs() < 1e-12);

    let out = dir.path().join("report");
    let written = report::write_all(&out, rep, &rep.metrics.confusion, &build).unwrap();
    assert_eq!(written.len(), 4);
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(out.join(report::METRICS_FILE)).unwrap())
            .unwrap();
    assert_eq!(json["n_test"], 15);
    let skipped = fs::read_to_string(out.join(report::SKIPPED_FILE)).unwrap();
    assert!(skipped.contains("decode_failed"));
    assert!(skipped.contains("no_face"));
}
