use crate::detection::decision::{Threshold, ThresholdPolicy};
use crate::error::RequestError;
use base64::Engine;
use image::ImageFormat;
use shared::Action;
use std::fmt;

/// Encodings the detector accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// `None` when the type carries no usable hint.
    fn from_mime(mime: &str) -> Option<Result<Self, RequestError>> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(Ok(ImageKind::Jpeg)),
            "image/png" => Some(Ok(ImageKind::Png)),
            "" | "application/octet-stream" => None,
            _ => Some(Err(RequestError::UnsupportedFormat(essence))),
        }
    }

    fn sniff(bytes: &[u8]) -> Option<Result<Self, RequestError>> {
        match image::guess_format(bytes).ok()? {
            ImageFormat::Jpeg => Some(Ok(ImageKind::Jpeg)),
            ImageFormat::Png => Some(Ok(ImageKind::Png)),
            other => Some(Err(RequestError::UnsupportedFormat(format!("{:?}", other)))),
        }
    }
}

impl fmt::Display for ImageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageKind::Jpeg => f.write_str("JPEG"),
            ImageKind::Png => f.write_str("PNG"),
        }
    }
}

/// Raw bytes of one upload plus the format they were accepted as.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    bytes: Vec<u8>,
    kind: ImageKind,
}

impl UploadedImage {
    /// The sniffed signature wins over the declared type; undecodable bytes
    /// declared as JPEG/PNG are let through so decoding reports them.
    pub fn new(bytes: Vec<u8>, content_type: Option<&str>) -> Result<Self, RequestError> {
        if bytes.is_empty() {
            return Err(RequestError::MissingImage);
        }
        let declared = content_type.and_then(ImageKind::from_mime);
        let kind = match (ImageKind::sniff(&bytes), declared) {
            (Some(sniffed), _) => sniffed?,
            (None, Some(declared)) => declared?,
            (None, None) => return Err(RequestError::UnsupportedFormat("unknown".to_string())),
        };
        Ok(Self { bytes, kind })
    }

    /// Accepts plain base64 or a `data:image/...;base64,` URL.
    pub fn from_base64(data: &str, limit: usize) -> Result<Self, RequestError> {
        let (declared, payload) = match data.strip_prefix("data:") {
            Some(rest) => match rest.split_once(',') {
                Some((meta, payload)) => (meta.split(';').next(), payload),
                None => (None, rest),
            },
            None => (None, data),
        };
        if payload.trim().is_empty() {
            return Err(RequestError::MissingImage);
        }
        // Decoded size is about three quarters of the encoded length.
        if payload.len() / 4 * 3 > limit {
            return Err(RequestError::TooLarge { limit });
        }
        let bytes = base64::engine::general_purpose::STANDARD.decode(payload.trim())?;
        if bytes.len() > limit {
            return Err(RequestError::TooLarge { limit });
        }
        Self::new(bytes, declared)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// One validated submission: an image, a sensitivity and what to do with them.
#[derive(Debug, Clone)]
pub struct DetectionRequest {
    pub image: UploadedImage,
    pub threshold: Threshold,
    pub action: Action,
}

impl DetectionRequest {
    pub fn new(
        image: Option<UploadedImage>,
        threshold: Option<f32>,
        action: Action,
        policy: &ThresholdPolicy,
    ) -> Result<Self, RequestError> {
        let image = image.ok_or(RequestError::MissingImage)?;
        // Reports never reach the decision, so their sensitivity is not checked.
        let threshold = match action {
            Action::Detect => policy.threshold(threshold)?,
            Action::Report => policy.threshold(None)?,
        };
        Ok(Self {
            image,
            threshold,
            action,
        })
    }
}

pub fn parse_threshold(text: &str) -> Result<Option<f32>, RequestError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    text.parse::<f32>()
        .map(Some)
        .map_err(|_| RequestError::MalformedThreshold(text.to_string()))
}

pub fn parse_action(text: &str) -> Result<Action, RequestError> {
    let text = text.trim();
    if text.is_empty() {
        return Ok(Action::default());
    }
    text.parse()
        .map_err(|_| RequestError::UnknownAction(text.to_string()))
}
