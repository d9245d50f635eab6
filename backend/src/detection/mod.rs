pub mod decision;
pub mod request;
pub mod service;

pub use decision::{decide, DetectionOutcome, Threshold, ThresholdPolicy};
pub use request::{DetectionRequest, ImageKind, UploadedImage};
pub use service::{Detection, DetectionService, Outcome, ReportAck};
