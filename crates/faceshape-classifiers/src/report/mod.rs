//! Writers for run artifacts: metrics JSON, confusion matrix CSV and HTML
//! heatmap, and the list of skipped corpus files.
pub mod plots;

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::corpus::BuildReport;
use crate::error::Result;
use crate::evaluation::ConfusionMatrix;

pub const METRICS_FILE: &str = "metrics.json";
pub const CONFUSION_CSV_FILE: &str = "confusion_matrix.csv";
pub const CONFUSION_HTML_FILE: &str = "confusion_matrix.html";
pub const SKIPPED_FILE: &str = "skipped.tsv";

/// Pretty-printed JSON of any serializable report.
pub fn write_metrics_json<T: Serialize>(path: &Path, report: &T) -> Result<()> {
    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, report)?;
    Ok(())
}

/// Confusion matrix as CSV: header row of predicted labels, one row per true
/// label.
pub fn write_confusion_csv(path: &Path, cm: &ConfusionMatrix) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    let mut header = vec!["true\\predicted".to_string()];
    header.extend(cm.labels().iter().cloned());
    wtr.write_record(&header)?;
    for (label, row) in cm.labels().iter().zip(cm.counts()) {
        let mut record = vec![label.clone()];
        record.extend(row.iter().map(|c| c.to_string()));
        wtr.write_record(&record)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Skipped corpus files as TSV (`path`, `label`, `reason`).
pub fn write_skipped_tsv(path: &Path, report: &BuildReport) -> Result<()> {
    let mut wtr = csv::WriterBuilder::new().delimiter(b'\t').from_path(path)?;
    wtr.write_record(["path", "label", "reason"])?;
    for s in &report.skipped {
        let path = s.path.to_string_lossy();
        wtr.write_record([&*path, s.label.as_str(), s.reason.as_str()])?;
    }
    wtr.flush()?;
    Ok(())
}

/// Render the confusion matrix heatmap to a standalone HTML file.
pub fn write_confusion_html(path: &Path, cm: &ConfusionMatrix, title: &str) -> Result<()> {
    let plot = plots::plot_confusion_matrix(cm, title);
    fs::write(path, plot.to_html())?;
    Ok(())
}

/// Write every artifact into `out_dir` (created if missing). Returns the
/// written paths.
pub fn write_all<T: Serialize>(
    out_dir: &Path,
    report: &T,
    cm: &ConfusionMatrix,
    build: &BuildReport,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(out_dir)?;
    let metrics = out_dir.join(METRICS_FILE);
    let csv = out_dir.join(CONFUSION_CSV_FILE);
    let html = out_dir.join(CONFUSION_HTML_FILE);
    let skipped = out_dir.join(SKIPPED_FILE);

    write_metrics_json(&metrics, report)?;
    write_confusion_csv(&csv, cm)?;
    write_confusion_html(&html, cm, "Confusion matrix (test split)")?;
    write_skipped_tsv(&skipped, build)?;

    for p in [&metrics, &csv, &html, &skipped] {
        log::info!("Wrote {}", p.display());
    }
    Ok(vec![metrics, csv, html, skipped])
}
