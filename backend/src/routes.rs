use actix_multipart::Multipart;
use actix_web::{http::header, web, HttpResponse, Result};
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use shared::UploadResponse;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::auth::middleware::CurrentUser;
use crate::db::analysis_repository::AnalysisRepository;
use crate::db::models::AnalysisRecord;
use crate::pipeline::orchestrator::{AnalysisPipeline, PipelineError};
use crate::pipeline::round_to;
use crate::storage::upload_store::{UploadStore, UploadStoreError};

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_json(message: impl Into<String>) -> ErrorResponse {
    ErrorResponse {
        error: message.into(),
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    skip: usize,
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    50
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index)).service(
        web::scope("/api")
            .configure(crate::auth::routes::configure)
            .service(
                web::scope("/analysis")
                    .route("/upload", web::post().to(upload_and_analyze))
                    .route("/history/list", web::get().to(list_history))
                    .route("/{analysis_id}", web::get().to(get_analysis))
                    .route("/{analysis_id}/download/report", web::get().to(download_report)),
            ),
    );
}

async fn index() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "app": "Crop health analysis",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

struct UploadedImage {
    filename: String,
    data: Vec<u8>,
}

enum UploadRejection {
    NotAnImage,
    Missing,
    TooLarge,
}

async fn read_image_field(
    payload: &mut Multipart,
    max_bytes: usize,
) -> Result<std::result::Result<UploadedImage, UploadRejection>> {
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some("file") {
            continue;
        }
        let is_image = field
            .content_type()
            .map(|mime| mime.essence_str().starts_with("image/"))
            .unwrap_or(false);
        if !is_image {
            return Ok(Err(UploadRejection::NotAnImage));
        }
        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .filter(|name| !name.is_empty())
            .unwrap_or("image.png")
            .to_string();

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk?;
            if data.len() + chunk.len() > max_bytes {
                return Ok(Err(UploadRejection::TooLarge));
            }
            data.extend_from_slice(&chunk);
        }
        return Ok(Ok(UploadedImage { filename, data }));
    }
    Ok(Err(UploadRejection::Missing))
}

async fn upload_and_analyze(
    user: CurrentUser,
    mut payload: Multipart,
    pipeline: web::Data<AnalysisPipeline>,
    upload_store: web::Data<UploadStore>,
    analyses: web::Data<AnalysisRepository>,
) -> Result<HttpResponse> {
    let max_bytes = upload_store.max_bytes();
    let upload = match read_image_field(&mut payload, max_bytes).await? {
        Ok(upload) => upload,
        Err(UploadRejection::NotAnImage) => {
            return Ok(HttpResponse::BadRequest().json(error_json("File must be an image")));
        }
        Err(UploadRejection::Missing) => {
            return Ok(HttpResponse::BadRequest().json(error_json("No file uploaded")));
        }
        Err(UploadRejection::TooLarge) => {
            return Ok(HttpResponse::BadRequest().json(error_json(format!(
                "Image too large (max {}MB)",
                max_bytes / (1024 * 1024)
            ))));
        }
    };
    if let Err(e) = upload_store.validate_image_size(&upload.data) {
        return Ok(HttpResponse::BadRequest().json(error_json(e.to_string())));
    }

    let data = web::Bytes::from(upload.data);
    let filename = upload.filename;

    // Dropping the request future cancels the run at the next tile.
    let cancel = CancellationToken::new();
    let _cancel_on_drop = cancel.clone().drop_guard();
    let run_pipeline = pipeline.into_inner();
    let run_data = data.clone();
    let run_filename = filename.clone();
    let outcome =
        web::block(move || run_pipeline.run(&run_data, &run_filename, &cancel)).await;

    let output = match outcome {
        Ok(Ok(output)) => output,
        Ok(Err(e @ PipelineError::Decode { .. })) => {
            warn!("Rejected upload '{}' at {} stage: {}", filename, e.stage(), e);
            return Ok(HttpResponse::BadRequest().json(error_json("File is not a readable image")));
        }
        Ok(Err(e)) => {
            warn!("Analysis of '{}' stopped at {} stage: {}", filename, e.stage(), e);
            return Ok(HttpResponse::ServiceUnavailable().json(error_json(e.to_string())));
        }
        Err(e) => {
            error!("Analysis worker failed for '{}': {:?}", filename, e);
            return Ok(HttpResponse::InternalServerError().json(error_json("Analysis failed")));
        }
    };

    let stored_filename = match upload_store.save(&data, &filename).await {
        Ok(name) => name,
        Err(UploadStoreError::Io(e)) => {
            error!("Failed to store upload '{}': {:?}", filename, e);
            return Ok(HttpResponse::InternalServerError().json(error_json("Failed to store image")));
        }
        Err(e) => return Ok(HttpResponse::BadRequest().json(error_json(e.to_string()))),
    };

    let record = AnalysisRecord {
        analysis_id: Uuid::new_v4(),
        user_id: user.0.id,
        original_filename: filename,
        stored_filename,
        image_size_mb: round_to(data.len() as f64 / (1024.0 * 1024.0), 2),
        summary: output.summary,
        chunk_results: output.chunk_results,
        processing_time_seconds: output.processing_time_seconds,
        created_at: Utc::now(),
    };

    let response = UploadResponse {
        analysis_id: record.analysis_id,
        original_filename: record.original_filename.clone(),
        image_size_mb: record.image_size_mb,
        summary: record.summary.clone(),
        processing_time_seconds: record.processing_time_seconds,
        created_at: record.created_at,
    };

    if let Err(e) = analyses.insert(record).await {
        error!("Failed to persist analysis {}: {:?}", response.analysis_id, e);
        return Ok(HttpResponse::InternalServerError().json(error_json("Failed to save analysis")));
    }

    info!(
        "Analysis {} for user {}: {}x{} image, {} tiles ({} dropped), health {}%, dominant {}",
        response.analysis_id,
        user.0.id,
        output.dimensions.width,
        output.dimensions.height,
        response.summary.chunks_total,
        output.tiles_dropped,
        response.summary.overall_health_score,
        response.summary.dominant_class
    );
    Ok(HttpResponse::Ok().json(response))
}

async fn list_history(
    user: CurrentUser,
    query: web::Query<HistoryQuery>,
    analyses: web::Data<AnalysisRepository>,
) -> HttpResponse {
    let items: Vec<_> = analyses
        .list_for_user(user.0.id, query.skip, query.limit)
        .await
        .iter()
        .map(AnalysisRecord::to_list_item)
        .collect();
    HttpResponse::Ok().json(items)
}

fn parse_analysis_id(raw: &str) -> std::result::Result<Uuid, HttpResponse> {
    Uuid::parse_str(raw)
        .map_err(|_| HttpResponse::BadRequest().json(error_json("Invalid analysis id")))
}

async fn get_analysis(
    user: CurrentUser,
    path: web::Path<String>,
    analyses: web::Data<AnalysisRepository>,
) -> HttpResponse {
    let analysis_id = match parse_analysis_id(&path) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match analyses.get(analysis_id).await {
        Some(record) if record.user_id == user.0.id => HttpResponse::Ok().json(record),
        Some(_) => {
            warn!("User {} denied access to analysis {}", user.0.id, analysis_id);
            HttpResponse::Forbidden().json(error_json("Not your analysis"))
        }
        None => HttpResponse::NotFound().json(error_json("Analysis not found")),
    }
}

async fn download_report(
    user: CurrentUser,
    path: web::Path<String>,
    analyses: web::Data<AnalysisRepository>,
) -> HttpResponse {
    let analysis_id = match parse_analysis_id(&path) {
        Ok(id) => id,
        Err(response) => return response,
    };
    let record = match analyses.get(analysis_id).await {
        Some(record) if record.user_id == user.0.id => record,
        _ => return HttpResponse::NotFound().json(error_json("Analysis not found")),
    };

    match serde_json::to_string_pretty(&record.to_report()) {
        Ok(body) => HttpResponse::Ok()
            .content_type("application/json")
            .insert_header((
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"health_report_{}.json\"", analysis_id),
            ))
            .body(body),
        Err(e) => {
            error!("Failed to render report {}: {:?}", analysis_id, e);
            HttpResponse::InternalServerError().json(error_json("Failed to render report"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::JwtService;
    use crate::auth::middleware::AuthMiddleware;
    use crate::config::AnalysisConfig;
    use crate::db::models::User;
    use crate::db::user_repository::UserRepository;
    use crate::pipeline::classifier::{TileClassification, TileClassifier};
    use actix_web::{http::StatusCode, test, App};
    use image::{DynamicImage, ImageFormat, RgbImage};
    use shared::{AnalysisListItem, ClassificationLabel, Role, TileRect};
    use std::io::Cursor;
    use std::sync::Arc;

    const BOUNDARY: &str = "----tile-test-boundary";

    /// Alternates mild and healthy tiles by id.
    struct AlternatingClassifier;

    impl TileClassifier for AlternatingClassifier {
        fn classify(&self, tile: &TileRect, _pixels: &DynamicImage) -> TileClassification {
            if tile.chunk_id % 2 == 0 {
                TileClassification::new(ClassificationLabel::MildInfection, 0.8, 0.4)
            } else {
                TileClassification::healthy(0.95)
            }
        }
    }

    struct TestContext {
        upload_dir: tempfile::TempDir,
        analyses: AnalysisRepository,
        jwt: JwtService,
    }

    impl TestContext {
        fn new() -> Self {
            Self {
                upload_dir: tempfile::tempdir().unwrap(),
                analyses: AnalysisRepository::new(),
                jwt: JwtService::new("route-secret", 60),
            }
        }

        fn token_for(&self, email: &str) -> (Uuid, String) {
            let user = User::new(
                email.to_string(),
                "salt$digest".to_string(),
                "Tester".to_string(),
                Role::User,
                None,
            );
            (user.id, self.jwt.generate_token(&user).unwrap())
        }
    }

    macro_rules! analysis_app {
        ($ctx:expr, $max_bytes:expr) => {
            analysis_app!($ctx, $max_bytes, false)
        };
        ($ctx:expr, $max_bytes:expr, $require_login:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(AnalysisPipeline::new(
                        AnalysisConfig::default(),
                        Arc::new(AlternatingClassifier),
                    )))
                    .app_data(web::Data::new(UploadStore::new(
                        $ctx.upload_dir.path().to_path_buf(),
                        $max_bytes,
                    )))
                    .app_data(web::Data::new($ctx.analyses.clone()))
                    .app_data(web::Data::new(UserRepository::new()))
                    .app_data(web::Data::new($ctx.jwt.clone()))
                    .wrap(AuthMiddleware::new($ctx.jwt.clone(), $require_login))
                    .configure(configure_routes),
            )
            .await
        };
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn multipart(filename: &str, content_type: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn upload_request(body: Vec<u8>, token: Option<&str>) -> test::TestRequest {
        let mut req = test::TestRequest::post()
            .uri("/api/analysis/upload")
            .insert_header((
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(body);
        if let Some(token) = token {
            req = req.insert_header((header::AUTHORIZATION, format!("Bearer {token}")));
        }
        req
    }

    #[actix_web::test]
    async fn upload_analyses_and_persists_for_the_guest() {
        let ctx = TestContext::new();
        let app = analysis_app!(ctx, 1024 * 1024);

        let req = upload_request(multipart("strip.png", "image/png", &png(300, 100)), None)
            .to_request();
        let response: UploadResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(response.original_filename, "strip.png");
        assert_eq!(response.summary.chunks_total, 2);
        assert_eq!(response.summary.chunks_mild, 1);
        assert_eq!(response.summary.chunks_healthy, 1);
        assert_eq!(response.summary.overall_health_score, 50.0);
        assert_eq!(response.summary.dominant_class, ClassificationLabel::Healthy);

        let record = ctx.analyses.get(response.analysis_id).await.unwrap();
        assert!(record.user_id.is_nil());
        let tiles: Vec<(u32, u32, u32, u32)> = record
            .chunk_results
            .iter()
            .map(|r| (r.tile.x, r.tile.y, r.tile.width, r.tile.height))
            .collect();
        assert_eq!(tiles, vec![(0, 0, 256, 100), (256, 0, 44, 100)]);
        assert_eq!(record.chunk_results[0].severity_score, Some(0.4));
        assert_eq!(record.chunk_results[1].severity_score, None);
        assert!(ctx.upload_dir.path().join(&record.stored_filename).exists());
    }

    #[actix_web::test]
    async fn uploads_are_validated() {
        let ctx = TestContext::new();
        let app = analysis_app!(ctx, 64);

        let cases = [
            multipart("notes.txt", "text/plain", b"hello"),
            multipart("broken.png", "image/png", b"not really a png"),
            multipart("big.png", "image/png", &png(512, 512)),
            multipart("empty.png", "image/png", b""),
        ];
        for body in cases {
            let req = upload_request(body, None).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[actix_web::test]
    async fn records_are_scoped_to_their_owner() {
        let ctx = TestContext::new();
        let app = analysis_app!(ctx, 1024 * 1024);
        let (owner_id, owner_token) = ctx.token_for("owner@example.com");
        let (_, other_token) = ctx.token_for("other@example.com");

        let req = upload_request(
            multipart("field.png", "image/png", &png(512, 512)),
            Some(&owner_token),
        )
        .to_request();
        let uploaded: UploadResponse = test::call_and_read_body_json(&app, req).await;
        let record = ctx.analyses.get(uploaded.analysis_id).await.unwrap();
        assert_eq!(record.user_id, owner_id);

        let req = test::TestRequest::get()
            .uri("/api/analysis/history/list")
            .insert_header((header::AUTHORIZATION, format!("Bearer {owner_token}")))
            .to_request();
        let history: Vec<AnalysisListItem> = test::call_and_read_body_json(&app, req).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, uploaded.analysis_id);

        let detail_uri = format!("/api/analysis/{}", uploaded.analysis_id);
        let req = test::TestRequest::get()
            .uri(&detail_uri)
            .insert_header((header::AUTHORIZATION, format!("Bearer {owner_token}")))
            .to_request();
        let detail: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(detail["chunks_total"], 4);
        assert_eq!(detail["chunk_results"].as_array().unwrap().len(), 4);

        let req = test::TestRequest::get()
            .uri(&detail_uri)
            .insert_header((header::AUTHORIZATION, format!("Bearer {other_token}")))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::FORBIDDEN
        );

        let req = test::TestRequest::get()
            .uri(&format!("{detail_uri}/download/report"))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );

        let req = test::TestRequest::get()
            .uri("/api/analysis/history/list")
            .to_request();
        let guest_history: Vec<AnalysisListItem> = test::call_and_read_body_json(&app, req).await;
        assert!(guest_history.is_empty());
    }

    #[actix_web::test]
    async fn report_download_is_a_flat_json_attachment() {
        let ctx = TestContext::new();
        let app = analysis_app!(ctx, 1024 * 1024);

        let req = upload_request(multipart("field.png", "image/png", &png(512, 256)), None)
            .to_request();
        let uploaded: UploadResponse = test::call_and_read_body_json(&app, req).await;

        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/analysis/{}/download/report",
                uploaded.analysis_id
            ))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.contains(&format!(
            "health_report_{}.json",
            uploaded.analysis_id
        )));

        let report: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(report["analysis_id"], uploaded.analysis_id.to_string());
        assert_eq!(report["chunks_total"], 2);
        assert_eq!(report["dominant_class"], "healthy");
        assert_eq!(report["chunk_results"][1]["x"], 256);
        assert!(report.get("user_id").is_none());
    }

    #[actix_web::test]
    async fn malformed_and_unknown_ids() {
        let ctx = TestContext::new();
        let app = analysis_app!(ctx, 1024 * 1024);

        let req = test::TestRequest::get()
            .uri("/api/analysis/not-a-uuid")
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::BAD_REQUEST
        );

        let req = test::TestRequest::get()
            .uri(&format!("/api/analysis/{}", Uuid::new_v4()))
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::NOT_FOUND
        );
    }

    #[actix_web::test]
    async fn index_is_public() {
        let ctx = TestContext::new();
        let app = analysis_app!(ctx, 1024);
        let req = test::TestRequest::get().uri("/").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    }

    #[actix_web::test]
    async fn required_login_rejects_guests_but_not_public_paths() {
        let ctx = TestContext::new();
        let app = analysis_app!(ctx, 1024 * 1024, true);

        let req = test::TestRequest::get()
            .uri("/api/analysis/history/list")
            .to_request();
        assert_eq!(
            test::call_service(&app, req).await.status(),
            StatusCode::UNAUTHORIZED
        );

        let req = test::TestRequest::get().uri("/").to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);

        let (_, token) = ctx.token_for("member@example.com");
        let req = test::TestRequest::get()
            .uri("/api/analysis/history/list")
            .insert_header(("Authorization", format!("Bearer {token}")))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
    }
}
