use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use faceshape_classifiers::config::{ExperimentConfig, ForestConfig, SvmSearchConfig};
use faceshape_classifiers::landmarks::face_mesh::InputLayout;
use faceshape_classifiers::landmarks::LandmarkSchema;

use crate::util::{validate_corpus_dir, validate_onnx_file};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct TrainConfig {
    pub version: String,
    /// Root of the labeled image corpus (one subdirectory per face shape).
    pub corpus_dir: String,
    /// ONNX face mesh landmark model.
    pub model_path: String,
    /// Optional ONNX face box model (SCRFD). When set, each image is cropped
    /// to its most confident face before the mesh runs.
    pub face_model_path: Option<String>,
    /// "face-mesh" (468 points) or "face-landmarker" (478 points).
    pub schema: String,
    /// "nhwc" or "nchw".
    pub input_layout: String,
    pub output_dir: String,
    pub test_fraction: f64,
    pub seed: u64,
    pub cv_folds: usize,
    pub baseline: ForestConfig,
    pub search: SvmSearchConfig,
    /// Size of a dedicated rayon pool; `None` uses the global pool.
    pub threads: Option<usize>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        let experiment = ExperimentConfig::default();
        TrainConfig {
            version: clap::crate_version!().to_string(),
            corpus_dir: String::new(),
            model_path: String::from("face_mesh.onnx"),
            face_model_path: None,
            schema: String::from("face-mesh"),
            input_layout: String::from("nhwc"),
            output_dir: String::from("faceshape_report"),
            test_fraction: experiment.test_fraction,
            seed: experiment.seed,
            cv_folds: experiment.cv_folds,
            baseline: experiment.baseline,
            search: experiment.search,
            threads: None,
        }
    }
}

impl TrainConfig {
    /// Config file (if any) with command line overrides applied.
    pub fn from_arguments(config_path: Option<&PathBuf>, matches: &ArgMatches) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => TrainConfig::load(path)?,
            None => TrainConfig::default(),
        };
        config.apply_overrides(matches);
        Ok(config)
    }

    /// Read a JSON config. Missing or malformed fields fall back to their
    /// defaults with a warning.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_json = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
        Self::from_json(&config_json)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let partial: serde_json::Value = serde_json::from_str(json)?;
        let mut config = TrainConfig::default();

        macro_rules! load_or_default {
            ($field:ident) => {
                if let Some(val) = partial.get(stringify!($field)) {
                    if let Ok(parsed) = serde_json::from_value(val.clone()) {
                        config.$field = parsed;
                    } else {
                        log::warn!(
                            "Config Invalid value for '{}', using default: {:?}",
                            stringify!($field),
                            config.$field
                        );
                    }
                } else {
                    log::debug!(
                        "Config Missing field '{}', using default: {:?}",
                        stringify!($field),
                        config.$field
                    );
                }
            };
        }

        load_or_default!(corpus_dir);
        load_or_default!(model_path);
        load_or_default!(face_model_path);
        load_or_default!(schema);
        load_or_default!(input_layout);
        load_or_default!(output_dir);
        load_or_default!(test_fraction);
        load_or_default!(seed);
        load_or_default!(cv_folds);
        load_or_default!(baseline);
        load_or_default!(search);
        load_or_default!(threads);

        Ok(config)
    }

    pub fn apply_overrides(&mut self, matches: &ArgMatches) {
        if let Some(corpus) = matches.get_one::<String>("corpus") {
            self.corpus_dir = corpus.clone();
        }
        if let Some(model) = matches.get_one::<String>("model") {
            self.model_path = model.clone();
        }
        if let Some(face_model) = matches.get_one::<String>("face_model") {
            self.face_model_path = Some(face_model.clone());
        }
        if let Some(schema) = matches.get_one::<String>("schema") {
            self.schema = schema.clone();
        }
        if let Ok(Some(output_dir)) = matches.try_get_one::<String>("output_dir") {
            self.output_dir = output_dir.clone();
        }
        if let Ok(Some(threads)) = matches.try_get_one::<usize>("threads") {
            self.threads = Some(*threads);
        }
    }

    pub fn experiment(&self) -> ExperimentConfig {
        ExperimentConfig {
            test_fraction: self.test_fraction,
            seed: self.seed,
            cv_folds: self.cv_folds,
            baseline: self.baseline.clone(),
            search: self.search.clone(),
        }
    }

    pub fn landmark_schema(&self) -> Result<LandmarkSchema> {
        LandmarkSchema::from_name(&self.schema).ok_or_else(|| {
            anyhow::anyhow!(
                "Unknown landmark schema: {}. Valid options are: face-mesh, face-landmarker",
                self.schema
            )
        })
    }

    pub fn layout(&self) -> Result<InputLayout> {
        self.input_layout
            .parse::<InputLayout>()
            .map_err(anyhow::Error::msg)
    }

    /// Check everything that does not need the model to be loaded: paths,
    /// names and the experiment settings.
    pub fn validate(&self) -> Result<()> {
        validate_corpus_dir(&self.corpus_dir)?;
        validate_onnx_file(&self.model_path)?;
        if let Some(face_model) = &self.face_model_path {
            validate_onnx_file(face_model).context("Invalid face box model")?;
        }
        self.landmark_schema()?;
        self.layout()?;
        if self.threads == Some(0) {
            anyhow::bail!("threads must be > 0");
        }
        self.experiment()
            .validate()
            .context("Invalid experiment settings")?;
        Ok(())
    }
}
