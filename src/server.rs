//! HTTP front end: `POST /compare` takes a multipart form with `image1` and
//! `image2` file fields and answers `{"similar": bool}`.

use axum::body::Bytes;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

use crate::config::Config;
use crate::core::engine::{EngineError, ImageSlot, SimilarityEngine};

/// Extensions accepted by the upload pre-filter. Decoding still decides
/// whether the bytes really are an image.
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpeg", "jpg"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CompareResponse {
    pub similar: bool,
}

#[derive(Debug, Error)]
pub enum CompareRejection {
    #[error("{message}")]
    Multipart { status: StatusCode, message: String },

    #[error("Missing {0} field in the form")]
    MissingField(ImageSlot),

    #[error("Invalid image file type for {field} ({filename}). Supported types: .png and .jpeg")]
    InvalidFileType { field: ImageSlot, filename: String },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("comparison worker failed")]
    Worker(#[from] tokio::task::JoinError),
}

impl CompareRejection {
    pub fn status(&self) -> StatusCode {
        match self {
            CompareRejection::Multipart { status, .. } => *status,
            CompareRejection::MissingField(_) | CompareRejection::InvalidFileType { .. } => {
                StatusCode::BAD_REQUEST
            }
            CompareRejection::Engine(err) if err.is_client_error() => StatusCode::BAD_REQUEST,
            CompareRejection::Engine(_) | CompareRejection::Worker(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<MultipartRejection> for CompareRejection {
    fn from(rejection: MultipartRejection) -> Self {
        CompareRejection::Multipart {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

impl From<MultipartError> for CompareRejection {
    fn from(err: MultipartError) -> Self {
        CompareRejection::Multipart {
            status: err.status(),
            message: err.body_text(),
        }
    }
}

impl IntoResponse for CompareRejection {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("compare request failed: {}", self);
        } else {
            log::warn!("compare request rejected: {}", self);
        }
        (status, self.to_string()).into_response()
    }
}

/// Case-insensitive check of `filename` against [`ALLOWED_EXTENSIONS`].
pub fn has_allowed_extension(filename: &str) -> bool {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ALLOWED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

struct Upload {
    filename: Option<String>,
    bytes: Bytes,
}

#[derive(Default)]
struct Uploads {
    first: Option<Upload>,
    second: Option<Upload>,
}

impl Uploads {
    async fn read(mut multipart: Multipart) -> Result<Self, CompareRejection> {
        let mut uploads = Uploads::default();

        while let Some(field) = multipart.next_field().await? {
            let slot = match field.name() {
                Some("image1") => &mut uploads.first,
                Some("image2") => &mut uploads.second,
                _ => continue,
            };
            if slot.is_some() {
                continue;
            }

            let filename = field
                .file_name()
                .filter(|name| !name.is_empty())
                .map(str::to_string);
            let bytes = field.bytes().await?;
            *slot = Some(Upload { filename, bytes });
        }

        Ok(uploads)
    }

    fn take(slot: Option<Upload>, image: ImageSlot) -> Result<Bytes, CompareRejection> {
        let upload = slot.ok_or(CompareRejection::MissingField(image))?;
        if let Some(filename) = upload.filename {
            if !has_allowed_extension(&filename) {
                return Err(CompareRejection::InvalidFileType {
                    field: image,
                    filename,
                });
            }
        }
        Ok(upload.bytes)
    }
}

async fn compare_images(
    State(engine): State<Arc<SimilarityEngine>>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<CompareResponse>, CompareRejection> {
    let uploads = Uploads::read(multipart?).await?;
    let first = Uploads::take(uploads.first, ImageSlot::First)?;
    let second = Uploads::take(uploads.second, ImageSlot::Second)?;

    let (first_len, second_len) = (first.len(), second.len());
    let worker = engine.clone();
    let verdict =
        tokio::task::spawn_blocking(move || worker.compare(&first, &second)).await??;

    log::info!(
        "compared {} and {} bytes with {}: similar={} distance={:?}",
        first_len,
        second_len,
        engine.strategy(),
        verdict.similar,
        verdict.distance
    );

    Ok(Json(CompareResponse {
        similar: verdict.similar,
    }))
}

pub fn router(engine: Arc<SimilarityEngine>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/compare", post(compare_images))
        .route("/health", get(|| async { "ok" }))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .with_state(engine)
}

/// Bind `config.bind` and serve until Ctrl-C.
pub async fn serve(config: &Config) -> std::io::Result<()> {
    let engine = SimilarityEngine::new(config.engine)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    let engine = Arc::new(engine);
    let app = router(engine, config.max_upload_bytes);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    log::info!(
        "imgsim listening on {} (strategy: {})",
        listener.local_addr()?,
        config.engine.strategy
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    log::info!("imgsim stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
