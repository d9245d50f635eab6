use crate::detection::request::{parse_action, parse_threshold};
use crate::detection::{DetectionRequest, DetectionService, Outcome, UploadedImage};
use crate::error::{DetectionError, InferenceError, RequestError};
use actix_files::Files;
use actix_multipart::Multipart;
use actix_web::{error, web, HttpResponse};
use futures::TryStreamExt;
use log::{info, warn};
use shared::{Action, DetectionResponse, ErrorResponse, HealthResponse, InferenceRequest, ReportResponse, RequestId};
use std::path::PathBuf;
use std::time::Instant;

/// Per-app HTTP options.
#[derive(Debug, Clone)]
pub struct RouteOptions {
    pub max_upload_bytes: usize,
    pub static_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy)]
struct UploadLimit(usize);

pub fn configure_routes(cfg: &mut web::ServiceConfig, options: &RouteOptions) {
    // base64 inflates by a third; leave room for the JSON envelope.
    let json_limit = options.max_upload_bytes / 3 * 4 + 4096;

    cfg.app_data(web::Data::new(UploadLimit(options.max_upload_bytes)))
        .app_data(
            web::JsonConfig::default()
                .limit(json_limit)
                .error_handler(|err, _req| {
                    let body = ErrorResponse {
                        error: err.to_string(),
                        code: "INVALID_INPUT".to_string(),
                    };
                    error::InternalError::from_response(err, HttpResponse::BadRequest().json(body)).into()
                }),
        )
        .service(web::resource("/api/detect").route(web::post().to(detect_upload)))
        .service(web::resource("/api/detect/json").route(web::post().to(detect_json)))
        .service(web::resource("/api/report").route(web::post().to(report_upload)))
        .service(web::resource("/api/settings").route(web::get().to(settings)))
        .service(web::resource("/api/health").route(web::get().to(health)));

    if let Some(dir) = &options.static_dir {
        cfg.service(Files::new("/", dir).index_file("index.html"));
    }
}

#[derive(Debug, Default)]
struct UploadForm {
    image: Option<Vec<u8>>,
    content_type: Option<String>,
    threshold: Option<String>,
    action: Action,
}

async fn read_form(mut payload: Multipart, limit: usize) -> Result<UploadForm, RequestError> {
    let mut form = UploadForm::default();

    while let Some(mut field) = payload
        .try_next()
        .await
        .map_err(|e| RequestError::Multipart(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(|mime| mime.essence_str().to_string());

        let mut data = Vec::new();
        while let Some(chunk) = field
            .try_next()
            .await
            .map_err(|e| RequestError::Multipart(e.to_string()))?
        {
            if data.len() + chunk.len() > limit {
                return Err(RequestError::TooLarge { limit });
            }
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "file" | "image" => {
                form.image = Some(data);
                form.content_type = content_type;
            }
            "sensitivity" | "threshold" => {
                form.threshold = Some(String::from_utf8_lossy(&data).into_owned());
            }
            "action" => form.action = parse_action(&String::from_utf8_lossy(&data))?,
            other => log::debug!("Ignoring unknown form field: {}", other),
        }
    }

    Ok(form)
}

fn build_request(
    service: &DetectionService,
    image: Option<Vec<u8>>,
    content_type: Option<&str>,
    threshold: Option<&str>,
    action: Action,
) -> Result<DetectionRequest, RequestError> {
    let image = image
        .filter(|bytes| !bytes.is_empty())
        .map(|bytes| UploadedImage::new(bytes, content_type))
        .transpose()?;
    let threshold = match (action, threshold) {
        (Action::Detect, Some(text)) => parse_threshold(text)?,
        _ => None,
    };
    DetectionRequest::new(image, threshold, action, service.policy())
}

async fn run(service: web::Data<DetectionService>, request: DetectionRequest) -> Result<HttpResponse, DetectionError> {
    let request_id = RequestId::new();
    let started = Instant::now();
    let (action, size, kind) = (request.action, request.image.len(), request.image.kind());

    let svc = service.clone();
    let outcome = web::block(move || svc.handle(&request))
        .await
        .map_err(|_| InferenceError::Runtime("inference worker pool is unavailable".to_string()))??;

    let response = match outcome {
        Outcome::Detected(detection) => {
            info!(
                "request_id={} action={} image={} ({} bytes) p={:.4} threshold={} label={} time={:.3}s",
                request_id,
                action,
                kind,
                size,
                detection.outcome.probability,
                detection.threshold.value(),
                detection.outcome.label,
                started.elapsed().as_secs_f32()
            );
            HttpResponse::Ok().json(DetectionResponse {
                request_id,
                probability: detection.outcome.probability,
                label: detection.outcome.label,
                class_index: detection.class_index,
                class_name: detection.class_name,
                threshold: detection.threshold.value(),
                image_digest: detection.image_digest,
                created_at: chrono::Utc::now().to_rfc3339(),
            })
        }
        Outcome::Reported(ack) => {
            info!("request_id={} action={} image={} acknowledged", request_id, action, ack.image_digest);
            HttpResponse::Ok().json(ReportResponse {
                request_id,
                acknowledged: true,
                message: ack.message.to_string(),
                image_digest: ack.image_digest,
            })
        }
    };
    Ok(response)
}

fn log_rejection(err: DetectionError) -> DetectionError {
    warn!("Rejected request: {}", err);
    err
}

async fn detect_upload(
    service: web::Data<DetectionService>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, DetectionError> {
    let form = read_form(payload, limit.0).await.map_err(|e| log_rejection(e.into()))?;
    let request = build_request(
        &service,
        form.image,
        form.content_type.as_deref(),
        form.threshold.as_deref(),
        form.action,
    )
    .map_err(|e| log_rejection(e.into()))?;
    run(service, request).await
}

async fn report_upload(
    service: web::Data<DetectionService>,
    limit: web::Data<UploadLimit>,
    payload: Multipart,
) -> Result<HttpResponse, DetectionError> {
    let form = read_form(payload, limit.0).await.map_err(|e| log_rejection(e.into()))?;
    let request = build_request(
        &service,
        form.image,
        form.content_type.as_deref(),
        form.threshold.as_deref(),
        Action::Report,
    )
    .map_err(|e| log_rejection(e.into()))?;
    run(service, request).await
}

async fn detect_json(
    service: web::Data<DetectionService>,
    limit: web::Data<UploadLimit>,
    body: web::Json<InferenceRequest>,
) -> Result<HttpResponse, DetectionError> {
    let body = body.into_inner();
    let image = if body.image_data.trim().is_empty() {
        None
    } else {
        Some(UploadedImage::from_base64(&body.image_data, limit.0).map_err(|e| log_rejection(e.into()))?)
    };
    let request = DetectionRequest::new(image, body.threshold, body.action, service.policy())
        .map_err(|e| log_rejection(e.into()))?;
    run(service, request).await
}

async fn settings(service: web::Data<DetectionService>) -> HttpResponse {
    HttpResponse::Ok().json(service.settings())
}

async fn health(service: web::Data<DetectionService>) -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "healthy".to_string(),
        model: service.describe_model(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
