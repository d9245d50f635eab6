use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Verdict rendered for an uploaded image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr)]
pub enum Label {
    Fake,
    Real,
}

/// What the caller wants done with an upload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Action {
    #[default]
    Detect,
    Report,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display, derive_more::From)]
#[serde(transparent)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

/// JSON upload body. `image_data` is base64, optionally as a `data:` URL.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InferenceRequest {
    pub image_data: String,
    #[serde(default)]
    pub threshold: Option<f32>,
    #[serde(default)]
    pub action: Action,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionResponse {
    pub request_id: RequestId,
    /// Top-class probability, in [0, 1].
    pub probability: f32,
    pub label: Label,
    pub class_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub threshold: f32,
    pub image_digest: String,
    pub created_at: String,
}

impl DetectionResponse {
    pub fn headline(&self) -> String {
        format!("Probability of Fake Image: {:.2}%", self.probability * 100.0)
    }

    pub fn verdict(&self) -> String {
        format!("This image is classified as {}.", self.label)
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ReportResponse {
    pub request_id: RequestId,
    pub acknowledged: bool,
    pub message: String,
    pub image_digest: String,
}

/// Bounds and default of the sensitivity slider.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct DetectionSettings {
    pub min_threshold: f32,
    pub max_threshold: f32,
    pub default_threshold: f32,
    pub step: f32,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct HealthResponse {
    pub status: String,
    pub model: String,
    pub version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn label_serializes_as_title_case() {
        assert_eq!(serde_json::to_string(&Label::Fake).unwrap(), "\"Fake\"");
        assert_eq!(Label::Real.to_string(), "Real");
        assert_eq!(Label::from_str("Fake").unwrap(), Label::Fake);
    }

    #[test]
    fn action_parses_case_insensitively() {
        assert_eq!(Action::from_str("report").unwrap(), Action::Report);
        assert_eq!(Action::from_str("DETECT").unwrap(), Action::Detect);
        assert!(Action::from_str("delete").is_err());
        assert_eq!(serde_json::to_string(&Action::Report).unwrap(), "\"report\"");
    }

    #[test]
    fn inference_request_defaults_to_detect() {
        let req: InferenceRequest = serde_json::from_str(r#"{"image_data":"abc"}"#).unwrap();
        assert_eq!(req.action, Action::Detect);
        assert!(req.threshold.is_none());
    }

    #[test]
    fn response_text_matches_result_card() {
        let resp = DetectionResponse {
            request_id: RequestId::new(),
            probability: 0.8123,
            label: Label::Fake,
            class_index: 3,
            class_name: None,
            threshold: 0.5665,
            image_digest: String::new(),
            created_at: String::new(),
        };
        assert_eq!(resp.headline(), "Probability of Fake Image: 81.23%");
        assert_eq!(resp.verdict(), "This image is classified as Fake.");
    }
}
