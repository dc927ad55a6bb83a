// HTTP surface of the gallery: uploads, listing, deletion, manual save
// trigger, health, and static assets.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::{header::HeaderValue, Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use gallery_common::media::{is_image_content_type, is_image_file};
use gallery_common::types::{
    AutoSaveStatus, DeleteResponse, Environment, HealthResponse, ImageListResponse,
    SaveTriggerResponse, UploadResponse, UploadedFile, UPLOADS_URL_PREFIX,
};
use tower_http::services::ServeDir;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cors::cors_layer;
use crate::error::{ApiError, ErrorCode};
use crate::git::autosave::{SaveScheduler, UPLOAD_SETTLE_DELAY};
use crate::uploads::{ImageStore, StoreError, MAX_FILES_PER_UPLOAD};

/// Multipart field carrying the uploaded images.
pub const UPLOAD_FIELD: &str = "images";

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Headroom for multipart framing on top of the file payloads.
const MULTIPART_OVERHEAD_BYTES: usize = 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    store: ImageStore,
    autosave: Option<Arc<dyn SaveScheduler>>,
    autosave_interval_minutes: u64,
    upload_settle_delay: Duration,
    environment: Environment,
}

impl AppState {
    pub fn new(store: ImageStore, environment: Environment) -> Self {
        Self {
            store,
            autosave: None,
            autosave_interval_minutes: 0,
            upload_settle_delay: UPLOAD_SETTLE_DELAY,
            environment,
        }
    }

    pub fn with_autosave(mut self, scheduler: Arc<dyn SaveScheduler>, interval_minutes: u64) -> Self {
        self.autosave = Some(scheduler);
        self.autosave_interval_minutes = interval_minutes;
        self
    }

    pub fn with_upload_settle_delay(mut self, delay: Duration) -> Self {
        self.upload_settle_delay = delay;
        self
    }

    pub fn store(&self) -> &ImageStore {
        &self.store
    }
}

/// API routes plus `/uploads` and the static front end (`/` serves
/// `index.html`) as fallback.
pub fn build_router(state: AppState, static_dir: &Path, cors_origins: Option<&str>) -> Router {
    let body_limit = state.store.max_file_bytes() * MAX_FILES_PER_UPLOAD + MULTIPART_OVERHEAD_BYTES;
    let uploads = ServeDir::new(state.store.dir());
    let site = ServeDir::new(static_dir);

    api_routes()
        .with_state(state)
        .nest_service(UPLOADS_URL_PREFIX, uploads)
        .fallback_service(site)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors_layer(cors_origins))
        .layer(middleware::from_fn(request_context_middleware))
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/api/upload", post(upload_images))
        .route("/api/images", get(list_images))
        .route("/api/images/{filename}", delete(delete_image))
        .route("/api/git-save", post(trigger_save))
        .route("/health", get(health))
}

async fn upload_images(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    info!("upload request received");

    let mut stored = Vec::new();
    if let Err(error) = read_uploads(&state.store, &mut multipart, &mut stored).await {
        state.store.discard(&stored).await;
        warn!(error = error.message(), "upload rejected");
        return Err(error);
    }

    if stored.is_empty() {
        warn!("upload request carried no files");
        return Err(ApiError::new(ErrorCode::ValidationFailed, "No files uploaded"));
    }

    let response = UploadResponse::new(stored);

    if let Some(scheduler) = &state.autosave {
        info!(
            files = response.files.len(),
            delay_secs = state.upload_settle_delay.as_secs(),
            "scheduling auto-save after upload"
        );
        Arc::clone(scheduler).trigger_after(state.upload_settle_delay);
    }

    Ok(Json(response))
}

async fn read_uploads(
    store: &ImageStore,
    multipart: &mut Multipart,
    stored: &mut Vec<UploadedFile>,
) -> Result<(), ApiError> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        if stored.len() >= MAX_FILES_PER_UPLOAD {
            return Err(ApiError::new(
                ErrorCode::ValidationFailed,
                format!("at most {MAX_FILES_PER_UPLOAD} files per upload"),
            ));
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        if !is_image_file(&original_name) || !is_image_content_type(&content_type) {
            return Err(ApiError::new(
                ErrorCode::UnsupportedMediaType,
                "Only image files are allowed!",
            ));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
            if bytes.len() + chunk.len() > store.max_file_bytes() {
                return Err(StoreError::TooLarge { limit: store.max_file_bytes() }.into());
            }
            bytes.extend_from_slice(&chunk);
        }

        stored.push(store.save(&original_name, &bytes).await?);
    }
    Ok(())
}

fn multipart_error(error: MultipartError) -> ApiError {
    let code = if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ErrorCode::PayloadTooLarge
    } else {
        ErrorCode::ValidationFailed
    };
    ApiError::new(code, error.body_text())
}

async fn list_images(State(state): State<AppState>) -> Result<Json<ImageListResponse>, ApiError> {
    let images = state.store.list().await?;
    info!(count = images.len(), "listed images");
    Ok(Json(ImageListResponse { success: true, images }))
}

async fn delete_image(
    State(state): State<AppState>,
    axum::extract::Path(filename): axum::extract::Path<String>,
) -> Result<Json<DeleteResponse>, ApiError> {
    state.store.delete(&filename).await?;
    Ok(Json(DeleteResponse { success: true, filename }))
}

async fn trigger_save(State(state): State<AppState>) -> Json<SaveTriggerResponse> {
    match &state.autosave {
        Some(scheduler) => {
            info!("manual auto-save triggered");
            Arc::clone(scheduler).trigger_now();
            Json(SaveTriggerResponse {
                success: true,
                message: "Git auto-save triggered".to_string(),
            })
        }
        None => Json(SaveTriggerResponse {
            success: false,
            message: "Auto-save not available in production. Use download feature instead."
                .to_string(),
        }),
    }
}

async fn health(State(state): State<AppState>) -> Result<Json<HealthResponse>, ApiError> {
    let images = state.store.count().await?;
    let (auto_save, interval) = match state.autosave {
        Some(_) => (AutoSaveStatus::Enabled, minutes_label(state.autosave_interval_minutes)),
        None => (AutoSaveStatus::Disabled, "disabled".to_string()),
    };
    let storage = match state.environment {
        Environment::Production => "temporary (ephemeral)",
        Environment::Development => "permanent (local)",
    };

    Ok(Json(HealthResponse {
        status: "OK".to_string(),
        environment: state.environment,
        images,
        auto_save,
        interval,
        storage: storage.to_string(),
        timestamp: Utc::now(),
    }))
}

fn minutes_label(minutes: u64) -> String {
    if minutes == 1 {
        "1 minute".to_string()
    } else {
        format!("{minutes} minutes")
    }
}

async fn request_context_middleware(request: Request<Body>, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_owned();
    let started_at = Instant::now();

    let mut response = next.run(request).await;

    if let Ok(request_id_header) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, request_id_header);
    }

    info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        latency_ms = started_at.elapsed().as_millis() as u64,
        "request completed"
    );

    response
}
