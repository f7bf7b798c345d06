//! HTTP JSON server.
//!
//! Hosts one upload context and one library context side by side. The two
//! contexts share nothing in memory: each holds its own [`Catalog`] handle
//! over the same storage, so the library endpoints only see uploads after
//! the library context's next catalog poll.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`    | `/health` | Health check (returns version) |
//! | `POST`   | `/upload` | Validate a batch and start ingesting it |
//! | `GET`    | `/upload` | Upload context records and in-flight count |
//! | `POST`   | `/upload/{id}/cancel` | Stop one record's ticker |
//! | `GET`    | `/library` | Filtered, sorted, paginated library page |
//! | `DELETE` | `/library/{id}` | Remove a record from the catalog |
//! | `GET`    | `/notifications` | Drain pending toasts |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "files must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::backend::TimerBackend;
use crate::catalog::{Catalog, SqliteStorage, Storage};
use crate::config::Config;
use crate::ingest::UploadContext;
use crate::library::{FileTypeFilter, LibraryContext, LibraryPage, LibraryQuery, SortKey};
use crate::models::{DocumentRecord, FileDescriptor};
use crate::notify::{Notification, QueueNotifier};
use crate::validate::{Rejection, UploadForm};

/// Toasts kept for clients that have not polled yet.
const NOTIFICATION_BACKLOG: usize = 256;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
struct AppState {
    upload: Arc<UploadContext>,
    library: Arc<LibraryContext>,
    notifications: Arc<QueueNotifier>,
}

/// Mounts both contexts over `storage` and builds the router.
pub async fn build_app(storage: Arc<dyn Storage>, config: &Config) -> Router {
    let notifications = Arc::new(QueueNotifier::new(NOTIFICATION_BACKLOG));

    let upload = UploadContext::mount(
        Catalog::new(storage.clone(), config.catalog.key.clone()),
        Arc::new(TimerBackend::from_config(&config.ingest)),
        notifications.clone(),
        config.ingest.clone(),
    )
    .await;
    let library = LibraryContext::mount(
        Catalog::new(storage, config.catalog.key.clone()),
        &config.library,
    )
    .await;

    let state = AppState {
        upload: Arc::new(upload),
        library: Arc::new(library),
        notifications,
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/upload", post(handle_upload).get(handle_upload_state))
        .route("/upload/{id}/cancel", post(handle_cancel))
        .route("/library", get(handle_library))
        .route("/library/{id}", delete(handle_remove))
        .route("/notifications", get(handle_notifications))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` with the SQLite catalog.
///
/// Runs until the process is terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let storage = Arc::new(SqliteStorage::open(config).await?);
    let app = build_app(storage, config).await;

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("desk server listening on http://{}", config.server.bind);
    tracing::info!(bind = %config.server.bind, "server started");

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal",
        message: format!("{:#}", err),
    }
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ /upload ============

#[derive(Deserialize)]
struct UploadRequest {
    files: Vec<FileDescriptor>,
    #[serde(default)]
    title: String,
    #[serde(default)]
    tags: String,
}

#[derive(Serialize)]
struct UploadResponse {
    accepted: Vec<DocumentRecord>,
    rejected: Vec<Rejection>,
}

async fn handle_upload(
    State(state): State<AppState>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<UploadResponse>, AppError> {
    if req.files.is_empty() {
        return Err(bad_request("files must not be empty"));
    }
    let mut form = UploadForm::new(req.title, req.tags);
    let batch = state.upload.submit(&req.files, &mut form).await;
    Ok(Json(UploadResponse {
        accepted: batch.accepted,
        rejected: batch.rejected,
    }))
}

#[derive(Serialize)]
struct UploadStateResponse {
    records: Vec<DocumentRecord>,
    in_flight: usize,
}

async fn handle_upload_state(State(state): State<AppState>) -> Json<UploadStateResponse> {
    Json(UploadStateResponse {
        records: state.upload.records().await,
        in_flight: state.upload.in_flight(),
    })
}

async fn handle_cancel(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    if state.upload.cancel(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(not_found(format!("no upload in flight with id: {}", id)))
    }
}

// ============ /library ============

#[derive(Deserialize, Default)]
struct LibraryParams {
    #[serde(default)]
    search: String,
    #[serde(default, rename = "type")]
    file_type: String,
    #[serde(default)]
    sort: SortKey,
    #[serde(default)]
    page: usize,
}

async fn handle_library(
    State(state): State<AppState>,
    Query(params): Query<LibraryParams>,
) -> Json<LibraryPage> {
    let query = LibraryQuery {
        search: params.search,
        file_type: FileTypeFilter::parse(&params.file_type),
        sort: params.sort,
        page: params.page,
    };
    Json(state.library.query(&query))
}

async fn handle_remove(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    match state.library.remove(&id).await {
        Ok(true) => Ok(StatusCode::NO_CONTENT),
        Ok(false) => Err(not_found(format!("document not found: {}", id))),
        Err(e) => Err(internal(e)),
    }
}

// ============ GET /notifications ============

#[derive(Serialize)]
struct NotificationsResponse {
    notifications: Vec<NotificationItem>,
}

#[derive(Serialize)]
struct NotificationItem {
    level: &'static str,
    message: String,
    #[serde(flatten)]
    detail: Notification,
}

async fn handle_notifications(State(state): State<AppState>) -> Json<NotificationsResponse> {
    let notifications = state
        .notifications
        .drain()
        .into_iter()
        .map(|n| NotificationItem {
            level: if n.is_error() { "error" } else { "success" },
            message: n.message(),
            detail: n,
        })
        .collect();
    Json(NotificationsResponse { notifications })
}
