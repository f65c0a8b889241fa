use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use snapcam_common::analysis::{AnalysisResult, AnalyzeRequest, ErrorBody};
use snapcam_common::dataurl::strip_data_url_prefix;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::vision::{VisionClient, VisionError};

const BODY_LIMIT_BYTES: usize = 10 * 1024 * 1024;
pub const LIVENESS_TEXT: &str = "snapcam analysis server is running";

// ---------------------------------------------------------------------------
// App state
// ---------------------------------------------------------------------------

pub struct AppState {
    pub vision: VisionClient,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("No image provided")]
    NoImage { details: Option<String> },
    #[error("Failed to analyze image")]
    Analyze(#[from] VisionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            ApiError::NoImage { details } => (StatusCode::BAD_REQUEST, details.clone()),
            ApiError::Analyze(e) => (StatusCode::INTERNAL_SERVER_ERROR, Some(e.to_string())),
        };
        let body = ErrorBody {
            error: self.to_string(),
            details,
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// GET / (liveness check)
async fn liveness() -> &'static str {
    LIVENESS_TEXT
}

/// POST /analyze-image
/// Body: { "image": "data:image/jpeg;base64,..." }
async fn analyze_image(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> Result<Json<AnalysisResult>, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::NoImage {
        details: Some(e.body_text()),
    })?;

    let image = match body.image.as_deref() {
        Some(image) if !image.is_empty() => image,
        _ => return Err(ApiError::NoImage { details: None }),
    };

    let content = strip_data_url_prefix(image);
    match state.vision.annotate(content).await {
        Ok(result) => {
            info!(
                objects = result.objects.len(),
                labels = result.labels.len(),
                "image analyzed"
            );
            Ok(Json(result))
        }
        Err(e) => {
            error!(error = %e, "error analyzing image");
            Err(e.into())
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(liveness))
        .route("/analyze-image", post(analyze_image))
        .layer(DefaultBodyLimit::max(BODY_LIMIT_BYTES))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
