use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use faceshape_classifiers::corpus::{BuildReport, DatasetBuilder};
use faceshape_classifiers::data_handling::Dataset;
use faceshape_classifiers::experiment::{self, ExperimentReport};
use faceshape_classifiers::landmarks::face_box::FaceBoxDetector;
use faceshape_classifiers::landmarks::face_mesh::FaceMeshDetector;
use faceshape_classifiers::report;

use super::input::TrainConfig;

/// Build the dataset, run model selection and (optionally) write the report
/// artifacts into `config.output_dir`.
pub fn run_training(config: &TrainConfig, write_report: bool) -> Result<ExperimentReport> {
    config.validate()?;
    with_pool(config.threads, || {
        let (dataset, build) = build_dataset(config)?;
        if dataset.is_empty() {
            anyhow::bail!(
                "No usable samples in {} ({} files, all skipped)",
                config.corpus_dir,
                build.files_seen
            );
        }

        let outcome = experiment::run(&dataset, &config.experiment())
            .context("Model selection failed")?;
        outcome.report.log_summary();

        if write_report {
            let written: Vec<PathBuf> = report::write_all(
                Path::new(&config.output_dir),
                &outcome.report,
                &outcome.report.metrics.confusion,
                &build,
            )
            .with_context(|| format!("Failed to write report to {}", config.output_dir))?;
            log::info!("Wrote {} report files to {}", written.len(), config.output_dir);
        }

        Ok(outcome.report)
    })
}

/// Build the dataset only and print what was kept and what was skipped.
pub fn run_scan(config: &TrainConfig) -> Result<BuildReport> {
    config.validate()?;
    with_pool(config.threads, || {
        let (dataset, build) = build_dataset(config)?;
        print_scan_summary(&dataset, &build);
        Ok(build)
    })
}

fn build_dataset(config: &TrainConfig) -> Result<(Dataset, BuildReport)> {
    let mut detector = FaceMeshDetector::load(
        Path::new(&config.model_path),
        config.landmark_schema()?,
        config.layout()?,
    )
    .with_context(|| format!("Failed to load landmark model {}", config.model_path))?;

    match &config.face_model_path {
        Some(face_model) => {
            let face_boxes = FaceBoxDetector::load(Path::new(face_model))
                .with_context(|| format!("Failed to load face box model {}", face_model))?;
            detector = detector.with_face_detector(face_boxes);
        }
        None => log::warn!(
            "No face box model configured; the landmark model runs on whole images"
        ),
    }

    let (dataset, build) = DatasetBuilder::new(&detector)
        .build(Path::new(&config.corpus_dir))
        .with_context(|| format!("Failed to read corpus {}", config.corpus_dir))?;
    build.log_summary();
    dataset.log_summary();
    Ok((dataset, build))
}

fn print_scan_summary(dataset: &Dataset, build: &BuildReport) {
    println!("label\tkept\tskipped");
    let skipped = build.counts_by_label();
    let kept = dataset.class_counts();
    let mut labels: Vec<&String> = kept.keys().chain(skipped.keys()).collect();
    labels.sort();
    labels.dedup();
    for label in labels {
        println!(
            "{}\t{}\t{}",
            label,
            kept.get(label).copied().unwrap_or(0),
            skipped.get(label).copied().unwrap_or(0)
        );
    }

    if build.skipped_count() > 0 {
        println!();
        println!("reason\tcount");
        for (reason, count) in build.counts_by_reason() {
            println!("{}\t{}", reason, count);
        }
    }
}

fn with_pool<T, F>(threads: Option<usize>, f: F) -> Result<T>
where
    T: Send,
    F: FnOnce() -> Result<T> + Send,
{
    match threads {
        Some(n) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .context("Failed to build thread pool")?;
            log::info!("Using a dedicated pool of {} threads", n);
            pool.install(f)
        }
        None => f(),
    }
}
