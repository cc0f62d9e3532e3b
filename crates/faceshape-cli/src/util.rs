use anyhow::Result;
use std::path::Path;

/// The corpus root must be an existing directory.
pub fn validate_corpus_dir(path: &str) -> Result<()> {
    if path.is_empty() {
        anyhow::bail!("No corpus directory given (set corpus_dir or pass --corpus)");
    }
    let p = Path::new(path);
    if !p.is_dir() {
        anyhow::bail!("Corpus directory does not exist: {}", path);
    }
    Ok(())
}

/// The detector model must be an existing `.onnx` file.
pub fn validate_onnx_file(path: &str) -> Result<()> {
    if path.is_empty() {
        anyhow::bail!("No landmark model given (set model_path or pass --model)");
    }
    let p = Path::new(path);

    let ext = p
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    if ext.as_deref() != Some("onnx") {
        anyhow::bail!("Landmark model must have a .onnx extension: {}", path);
    }

    if !p.exists() {
        anyhow::bail!("Landmark model does not exist: {}", path);
    }

    Ok(())
}
