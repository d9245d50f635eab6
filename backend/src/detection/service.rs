use crate::detection::decision::{DetectionOutcome, Threshold, ThresholdPolicy};
use crate::detection::request::{DetectionRequest, UploadedImage};
use crate::error::{DetectionError, ModelError};
use crate::inference::{load_classifier, ClassLabels, Classifier, DetectorConfig, Preprocessor};
use sha2::{Digest, Sha256};
use shared::{Action, DetectionSettings};
use std::sync::Arc;

pub const REPORT_ACKNOWLEDGEMENT: &str =
    "Thank you for reporting. Your input will help improve our system.";

/// Result of running one image through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub outcome: DetectionOutcome,
    pub class_index: usize,
    pub class_name: Option<String>,
    pub threshold: Threshold,
    pub image_digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportAck {
    pub message: &'static str,
    pub image_digest: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Detected(Detection),
    Reported(ReportAck),
}

/// Owns the loaded classifier and runs the preprocess, classify, decide
/// pipeline. Cheap to clone; clones share the same model.
#[derive(Clone)]
pub struct DetectionService {
    preprocessor: Preprocessor,
    classifier: Arc<dyn Classifier>,
    labels: Option<Arc<ClassLabels>>,
    policy: ThresholdPolicy,
}

impl DetectionService {
    pub fn new(preprocessor: Preprocessor, classifier: Arc<dyn Classifier>, policy: ThresholdPolicy) -> Self {
        Self {
            preprocessor,
            classifier,
            labels: None,
            policy,
        }
    }

    pub fn with_labels(mut self, labels: ClassLabels) -> Self {
        self.labels = Some(Arc::new(labels));
        self
    }

    /// Loads the model and optional labels named in `config`.
    pub fn from_config(config: &DetectorConfig) -> Result<Self, ModelError> {
        let preprocessor = Preprocessor::new(config.preprocessing.clone());
        let classifier = load_classifier(&config.model, config.preprocessing.input_shape())?;
        let service = Self::new(preprocessor, classifier, config.detection);

        match &config.model.labels_path {
            Some(path) => {
                let labels = ClassLabels::load(path)?;
                log::info!("Loaded {} class labels from {}", labels.len(), path.display());
                Ok(service.with_labels(labels))
            }
            None => Ok(service),
        }
    }

    pub fn policy(&self) -> &ThresholdPolicy {
        &self.policy
    }

    pub fn settings(&self) -> DetectionSettings {
        self.policy.settings()
    }

    pub fn describe_model(&self) -> String {
        self.classifier.describe()
    }

    pub fn detect(&self, image: &UploadedImage, threshold: Threshold) -> Result<Detection, DetectionError> {
        let image_digest = image_digest(image.bytes());

        let tensor = self.preprocessor.preprocess(image.bytes()).map_err(|e| {
            log::warn!("Failed to preprocess {} upload {}: {}", image.kind(), image_digest, e);
            e
        })?;

        let prediction = self.classifier.classify(&tensor).map_err(|e| {
            log::error!("Inference failed for {}: {}", image_digest, e);
            e
        })?;

        let top = prediction.top();
        let outcome = DetectionOutcome::evaluate(top.probability, threshold);
        log::debug!(
            "Image {} class {} p={:.4} threshold={} -> {}",
            image_digest,
            top.class_index,
            top.probability,
            threshold.value(),
            outcome.label
        );

        Ok(Detection {
            outcome,
            class_index: top.class_index,
            class_name: self
                .labels
                .as_ref()
                .and_then(|labels| labels.get(top.class_index))
                .map(str::to_string),
            threshold,
            image_digest,
        })
    }

    /// Reports are acknowledged without touching the model or storing anything.
    pub fn handle(&self, request: &DetectionRequest) -> Result<Outcome, DetectionError> {
        match request.action {
            Action::Detect => self
                .detect(&request.image, request.threshold)
                .map(Outcome::Detected),
            Action::Report => {
                let image_digest = image_digest(request.image.bytes());
                log::info!("Received fake image report for {}", image_digest);
                Ok(Outcome::Reported(ReportAck {
                    message: REPORT_ACKNOWLEDGEMENT,
                    image_digest,
                }))
            }
        }
    }
}

pub fn image_digest(image_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_data);
    hex::encode(hasher.finalize())
}
