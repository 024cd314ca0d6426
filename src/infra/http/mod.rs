mod generate;
mod middleware;

use std::sync::Arc;

use axum::Json;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Router, middleware as axum_middleware};
use serde::Serialize;

use crate::application::error::ErrorReport;
use crate::application::jobs::{JobError, RenderJobService};

#[derive(Clone)]
pub struct HttpState {
    pub jobs: Arc<RenderJobService>,
}

pub fn build_router(state: HttpState, upload_body_limit: usize) -> Router {
    Router::new()
        .route("/generate", post(generate::generate_video))
        .route("/_health", get(health))
        .layer(DefaultBodyLimit::max(upload_body_limit))
        .with_state(state)
        .layer(axum_middleware::from_fn(middleware::log_responses))
        .layer(axum_middleware::from_fn(middleware::set_request_context))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: String,
}

/// Error response with a generic public body and a rich internal report. The
/// caller-visible contract never distinguishes failure kinds beyond the status
/// code; diagnostics travel in the attached [`ErrorReport`] and the logs.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl ApiError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_message(source, status, detail),
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn std::error::Error,
    ) -> Self {
        Self {
            status,
            public_message,
            report: ErrorReport::from_error(source, status, error),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            error: self.public_message.to_string(),
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

/// Collapse the internal failure taxonomy into the public contract: a bad
/// submission is the caller's problem, everything else is a generic failure.
pub(crate) fn job_error_response(source: &'static str, error: JobError) -> ApiError {
    let (status, public_message) = match &error {
        JobError::InvalidInput => (StatusCode::BAD_REQUEST, "No input images were submitted"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Video generation failed"),
    };
    ApiError::from_error(source, status, public_message, &error)
}
