use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use shared::ErrorResponse;
use std::path::PathBuf;

/// The upload could not be turned into pixels.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("{0}")]
    Image(#[from] image::ImageError),
    #[error("failed to read image stream: {0}")]
    Io(#[from] std::io::Error),
    #[error("image has no pixels")]
    Empty,
}

/// The classifier could not produce a distribution for a tensor.
#[derive(Debug, thiserror::Error)]
pub enum InferenceError {
    #[error("tensor shape {actual:?} does not match model input {expected:?}")]
    ShapeMismatch {
        expected: [usize; 4],
        actual: Vec<usize>,
    },
    #[error("model returned an empty distribution")]
    EmptyOutput,
    #[error("model returned an invalid probability {value} for class {class_index}")]
    InvalidProbability { class_index: usize, value: f32 },
    #[error("model output sums to {sum}, not a probability distribution")]
    NotADistribution { sum: f32 },
    #[error("model runtime failure: {0}")]
    Runtime(String),
    #[error("model lock poisoned by an earlier panic")]
    Poisoned,
}

#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("Please upload an image and click 'Detect Deepfake'.")]
    MissingImage,
    #[error("Please upload a valid image (JPG, JPEG, PNG); got {0}")]
    UnsupportedFormat(String),
    #[error("Sensitivity {value} is outside [{min}, {max}]")]
    ThresholdOutOfRange { value: f32, min: f32, max: f32 },
    #[error("Sensitivity must be a number, got '{0}'")]
    MalformedThreshold(String),
    #[error("Unknown action '{0}'")]
    UnknownAction(String),
    #[error("Invalid base64 image data: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Upload exceeds the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("Malformed upload: {0}")]
    Multipart(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("failed to load model: {0}")]
    Load(String),
    #[error("failed to read class labels from {}: {source}", .path.display())]
    Labels {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("this build has no model runtime; rebuild with `--features torch`")]
    BackendUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("environment variable {key} has invalid value '{value}'")]
    Env { key: &'static str, value: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything that can end a detection request.
#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("{0}")]
    Request(#[from] RequestError),
    #[error("Error processing image: {0}")]
    Decode(#[from] DecodeError),
    #[error("Error during prediction: {0}")]
    Inference(#[from] InferenceError),
}

impl DetectionError {
    pub fn code(&self) -> &'static str {
        match self {
            DetectionError::Request(RequestError::MissingImage) => "MISSING_IMAGE",
            DetectionError::Request(RequestError::UnsupportedFormat(_)) => "UNSUPPORTED_FORMAT",
            DetectionError::Request(RequestError::TooLarge { .. }) => "FILE_TOO_LARGE",
            DetectionError::Request(
                RequestError::ThresholdOutOfRange { .. } | RequestError::MalformedThreshold(_),
            ) => "INVALID_THRESHOLD",
            DetectionError::Request(_) => "INVALID_INPUT",
            DetectionError::Decode(_) => "DECODE_ERROR",
            DetectionError::Inference(_) => "INFERENCE_ERROR",
        }
    }
}

impl ResponseError for DetectionError {
    fn status_code(&self) -> StatusCode {
        match self {
            DetectionError::Request(RequestError::TooLarge { .. }) => StatusCode::PAYLOAD_TOO_LARGE,
            DetectionError::Request(RequestError::UnsupportedFormat(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            DetectionError::Request(_) => StatusCode::BAD_REQUEST,
            DetectionError::Decode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DetectionError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.to_string(),
            code: self.code().to_string(),
        })
    }
}
