mod auth;
mod config;
mod db;
mod pipeline;
mod routes;
mod storage;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use auth::jwt::JwtService;
use auth::middleware::AuthMiddleware;
use config::AppConfig;
use db::analysis_repository::AnalysisRepository;
use db::user_repository::UserRepository;
use pipeline::classifier::RandomClassifier;
use pipeline::orchestrator::AnalysisPipeline;
use routes::configure_routes;
use std::sync::Arc;
use storage::upload_store::UploadStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string())
    })?;

    log::info!(
        "Tiling with {}px tiles, at most {} tiles per image",
        config.analysis.tile_edge,
        config.analysis.max_tiles
    );
    log::warn!("Using the random placeholder classifier; tile labels are not model predictions");
    let pipeline = AnalysisPipeline::new(config.analysis.clone(), Arc::new(RandomClassifier));

    let upload_store = UploadStore::new(config.upload_dir.clone(), config.max_upload_bytes);
    upload_store.ensure_dir().await.map_err(|e| {
        log::error!(
            "Failed to create upload directory {}: {}",
            config.upload_dir.display(),
            e
        );
        std::io::Error::other(e.to_string())
    })?;

    let analyses = AnalysisRepository::new();
    let users = UserRepository::new();
    let jwt_service = JwtService::new(&config.jwt_secret, config.token_expiry_minutes);
    let auth_middleware = AuthMiddleware::new(jwt_service.clone(), config.require_login);

    if config.require_login {
        log::info!("Login required for analysis routes");
    } else {
        log::warn!("Login not enforced; requests without a valid token run as the guest user");
    }

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    let allowed_origins = config.allowed_origins.clone();

    HttpServer::new(move || {
        let cors = allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allow_any_method()
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(auth_middleware.clone())
            .wrap(cors)
            .app_data(web::Data::new(pipeline.clone()))
            .app_data(web::Data::new(upload_store.clone()))
            .app_data(web::Data::new(analyses.clone()))
            .app_data(web::Data::new(users.clone()))
            .app_data(web::Data::new(jwt_service.clone()))
            .configure(configure_routes)
    })
    .bind(&bind_address)?
    .run()
    .await
}
