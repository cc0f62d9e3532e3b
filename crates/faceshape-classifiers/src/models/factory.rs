use crate::config::ModelConfig;
use crate::models::classifier_trait::ClassifierModel;
use crate::models::forest::RandomForestClassifier;
use crate::models::pipeline::SvmPipeline;

/// Build an unfitted classifier from a `ModelConfig`.
pub fn build_model(config: &ModelConfig) -> Box<dyn ClassifierModel> {
    match config {
        ModelConfig::Forest(params) => Box::new(RandomForestClassifier::new(params.clone())),
        ModelConfig::Svm(params) => Box::new(SvmPipeline::new(params.clone())),
    }
}
