use actix_web::http::{header, StatusCode};
use actix_web::{test, web, App};
use base64::Engine;
use deepfake_backend::detection::{DetectionService, ThresholdPolicy};
use deepfake_backend::error::InferenceError;
use deepfake_backend::inference::model::ensure_input_shape;
use deepfake_backend::inference::{Classifier, ImageTensor, PredictionResult, PreprocessConfig, Preprocessor};
use deepfake_backend::routes::{configure_routes, RouteOptions};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    DetectionResponse, DetectionSettings, ErrorResponse, HealthResponse, InferenceRequest, Label, ReportResponse,
};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const BOUNDARY: &str = "----deepfake-test-boundary";

/// Always answers with the same two-class distribution.
struct FixedClassifier {
    fake: f32,
    calls: AtomicUsize,
}

impl FixedClassifier {
    fn new(fake: f32) -> Arc<Self> {
        Arc::new(Self {
            fake,
            calls: AtomicUsize::new(0),
        })
    }
}

impl Classifier for FixedClassifier {
    fn input_shape(&self) -> [usize; 4] {
        [1, 224, 224, 3]
    }

    fn classify(&self, tensor: &ImageTensor) -> Result<PredictionResult, InferenceError> {
        ensure_input_shape(self.input_shape(), tensor)?;
        self.calls.fetch_add(1, Ordering::SeqCst);
        PredictionResult::from_probabilities(vec![1.0 - self.fake, self.fake])
    }

    fn describe(&self) -> String {
        "fixed".to_string()
    }
}

fn service(classifier: Arc<FixedClassifier>) -> DetectionService {
    DetectionService::new(
        Preprocessor::new(PreprocessConfig::default()),
        classifier,
        ThresholdPolicy::default(),
    )
}

fn options(max_upload_bytes: usize) -> RouteOptions {
    RouteOptions {
        max_upload_bytes,
        static_dir: None,
    }
}

fn noise_image(width: u32, height: u32, seed: u64, format: ImageFormat) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let img = RgbImage::from_fn(width, height, |_, _| Rgb([rng.random(), rng.random(), rng.random()]));
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut bytes), format)
        .unwrap();
    bytes
}

enum Part<'a> {
    File {
        name: &'a str,
        content_type: &'a str,
        bytes: &'a [u8],
    },
    Text {
        name: &'a str,
        value: &'a str,
    },
}

fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for part in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File {
                name,
                content_type,
                bytes,
            } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"upload\"\r\nContent-Type: {}\r\n\r\n",
                        name, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(bytes);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}", name, value).as_bytes(),
                );
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_request(uri: &str, parts: &[Part<'_>]) -> test::TestRequest {
    test::TestRequest::post()
        .uri(uri)
        .insert_header((
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        ))
        .set_payload(multipart(parts))
}

macro_rules! app {
    ($classifier:expr, $limit:expr) => {{
        let service = service($classifier);
        let options = options($limit);
        test::init_service(
            App::new()
                .app_data(web::Data::new(service))
                .configure(|cfg| configure_routes(cfg, &options)),
        )
        .await
    }};
}

#[actix_web::test]
async fn detect_upload_returns_a_verdict() {
    let classifier = FixedClassifier::new(0.7);
    let app = app!(classifier.clone(), 10 * 1024 * 1024);
    let jpeg = noise_image(500, 500, 42, ImageFormat::Jpeg);

    let req = multipart_request(
        "/api/detect",
        &[
            Part::File {
                name: "file",
                content_type: "image/jpeg",
                bytes: &jpeg,
            },
            Part::Text {
                name: "sensitivity",
                value: "0.5",
            },
        ],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: DetectionResponse = test::read_body_json(resp).await;
    assert!((body.probability - 0.7).abs() < 1e-6);
    assert_eq!(body.label, Label::Fake);
    assert_eq!(body.class_index, 1);
    assert_eq!(body.threshold, 0.5);
    assert_eq!(body.image_digest.len(), 64);
    assert_eq!(body.headline(), "Probability of Fake Image: 70.00%");
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 1);
}

#[actix_web::test]
async fn default_threshold_applies_when_slider_is_absent() {
    let app = app!(FixedClassifier::new(0.55), 10 * 1024 * 1024);
    let png = noise_image(64, 48, 7, ImageFormat::Png);

    let req = multipart_request(
        "/api/detect",
        &[Part::File {
            name: "file",
            content_type: "image/png",
            bytes: &png,
        }],
    )
    .to_request();
    let body: DetectionResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.threshold, 0.5665);
    // 0.55 is the top class but stays under the default threshold.
    assert_eq!(body.label, Label::Real);
}

#[actix_web::test]
async fn missing_image_is_a_bad_request() {
    let app = app!(FixedClassifier::new(0.7), 10 * 1024 * 1024);
    let req = multipart_request(
        "/api/detect",
        &[Part::Text {
            name: "sensitivity",
            value: "0.5",
        }],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.code, "MISSING_IMAGE");
    assert_eq!(body.error, "Please upload an image and click 'Detect Deepfake'.");
}

#[actix_web::test]
async fn corrupt_jpeg_is_unprocessable() {
    let classifier = FixedClassifier::new(0.7);
    let app = app!(classifier.clone(), 10 * 1024 * 1024);
    let req = multipart_request(
        "/api/detect",
        &[Part::File {
            name: "file",
            content_type: "image/jpeg",
            bytes: b"definitely not a jpeg",
        }],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);

    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.code, "DECODE_ERROR");
    assert!(body.error.starts_with("Error processing image: "));
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn out_of_range_threshold_is_rejected() {
    let app = app!(FixedClassifier::new(0.7), 10 * 1024 * 1024);
    let jpeg = noise_image(32, 32, 1, ImageFormat::Jpeg);

    for value in ["0.95", "0.05", "high"] {
        let req = multipart_request(
            "/api/detect",
            &[
                Part::File {
                    name: "file",
                    content_type: "image/jpeg",
                    bytes: &jpeg,
                },
                Part::Text {
                    name: "sensitivity",
                    value,
                },
            ],
        )
        .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "sensitivity {}", value);
        let body: ErrorResponse = test::read_body_json(resp).await;
        assert_eq!(body.code, "INVALID_THRESHOLD");
    }
}

#[actix_web::test]
async fn unsupported_format_is_rejected() {
    let app = app!(FixedClassifier::new(0.7), 10 * 1024 * 1024);
    let gif = b"GIF89a\x01\x00\x01\x00\x00\x00\x00;";
    let req = multipart_request(
        "/api/detect",
        &[Part::File {
            name: "file",
            content_type: "image/gif",
            bytes: gif,
        }],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.code, "UNSUPPORTED_FORMAT");
}

#[actix_web::test]
async fn oversized_upload_is_rejected() {
    let app = app!(FixedClassifier::new(0.7), 1024);
    let jpeg = noise_image(200, 200, 9, ImageFormat::Jpeg);
    assert!(jpeg.len() > 1024);

    let req = multipart_request(
        "/api/detect",
        &[Part::File {
            name: "file",
            content_type: "image/jpeg",
            bytes: &jpeg,
        }],
    )
    .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.code, "FILE_TOO_LARGE");
}

#[actix_web::test]
async fn json_detect_accepts_a_data_url() {
    let app = app!(FixedClassifier::new(0.3), 10 * 1024 * 1024);
    let png = noise_image(40, 40, 3, ImageFormat::Png);
    let encoded = base64::engine::general_purpose::STANDARD.encode(&png);

    let req = test::TestRequest::post()
        .uri("/api/detect/json")
        .set_json(InferenceRequest {
            image_data: format!("data:image/png;base64,{}", encoded),
            threshold: Some(0.2),
            action: Default::default(),
        })
        .to_request();
    let body: DetectionResponse = test::call_and_read_body_json(&app, req).await;
    // Top class is index 0 at 0.7, above the 0.2 threshold.
    assert_eq!(body.class_index, 0);
    assert_eq!(body.label, Label::Fake);
}

#[actix_web::test]
async fn malformed_json_is_a_bad_request() {
    let app = app!(FixedClassifier::new(0.7), 10 * 1024 * 1024);
    let req = test::TestRequest::post()
        .uri("/api/detect/json")
        .insert_header((header::CONTENT_TYPE, "application/json"))
        .set_payload("{\"threshold\": 0.5")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    let body: ErrorResponse = test::read_body_json(resp).await;
    assert_eq!(body.code, "INVALID_INPUT");
}

#[actix_web::test]
async fn report_is_acknowledged_without_inference() {
    let classifier = FixedClassifier::new(0.7);
    let app = app!(classifier.clone(), 10 * 1024 * 1024);
    let jpeg = noise_image(64, 64, 5, ImageFormat::Jpeg);

    for (uri, action) in [("/api/report", None), ("/api/detect", Some("report"))] {
        let mut parts = vec![Part::File {
            name: "file",
            content_type: "image/jpeg",
            bytes: &jpeg,
        }];
        if let Some(value) = action {
            parts.push(Part::Text { name: "action", value });
        }
        // Out of range, but a report never applies it.
        parts.push(Part::Text {
            name: "sensitivity",
            value: "0.95",
        });
        let req = multipart_request(uri, &parts).to_request();
        let body: ReportResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.acknowledged);
        assert_eq!(body.message, "Thank you for reporting. Your input will help improve our system.");
    }
    assert_eq!(classifier.calls.load(Ordering::SeqCst), 0);
}

#[actix_web::test]
async fn settings_and_health() {
    let app = app!(FixedClassifier::new(0.7), 10 * 1024 * 1024);

    let req = test::TestRequest::get().uri("/api/settings").to_request();
    let settings: DetectionSettings = test::call_and_read_body_json(&app, req).await;
    assert_eq!(settings.min_threshold, 0.1);
    assert_eq!(settings.max_threshold, 0.9);
    assert_eq!(settings.default_threshold, 0.5665);

    let req = test::TestRequest::get().uri("/api/health").to_request();
    let health: HealthResponse = test::call_and_read_body_json(&app, req).await;
    assert_eq!(health.status, "healthy");
    assert_eq!(health.model, "fixed");
}
