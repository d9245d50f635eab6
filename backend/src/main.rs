use actix_cors::Cors;
use actix_web::{http, middleware, web, App, HttpServer};
use deepfake_backend::config::ServerSettings;
use deepfake_backend::detection::DetectionService;
use deepfake_backend::inference::DetectorConfig;
use deepfake_backend::routes::{configure_routes, RouteOptions};
use std::env;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let settings = ServerSettings::from_env().map_err(|e| {
        log::error!("Invalid server settings: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let mut config = DetectorConfig::load(&settings.config_path).map_err(|e| {
        log::error!("Failed to load {}: {}", settings.config_path.display(), e);
        std::io::Error::other(e.to_string())
    })?;
    settings.apply_overrides(&mut config);

    let service = DetectionService::from_config(&config).map_err(|e| {
        log::error!("Failed to preload model at startup: {}", e);
        std::io::Error::other(format!("Model loading failed: {}", e))
    })?;
    log::info!("Model ready: {}", service.describe_model());

    let options = RouteOptions {
        max_upload_bytes: settings.max_upload_bytes,
        static_dir: settings.static_dir.clone(),
    };
    if let Some(dir) = &options.static_dir {
        log::info!("Serving static files from {}", dir.display());
    }

    let bind_address = settings.bind_address();
    log::info!("Starting server at http://{}", bind_address);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allowed_methods(vec!["GET", "POST", "OPTIONS"])
            .allowed_headers(vec![
                http::header::CONTENT_TYPE,
                http::header::ACCEPT,
            ])
            .max_age(3600);

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(web::Data::new(service.clone()))
            .configure(|cfg| configure_routes(cfg, &options))
    })
    .bind(bind_address)?
    .run()
    .await
}
