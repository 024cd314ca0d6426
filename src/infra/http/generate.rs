//! The generate endpoint: multipart images in, rendered video bytes out.

use axum::extract::State;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::Multipart;
use tracing::error;

use crate::domain::job::InputImage;

use super::{ApiError, HttpState, job_error_response};

const SOURCE: &str = "infra::http::generate";

/// Multipart field name carrying each input image. Repeated once per file;
/// field order fixes the staging order.
const IMAGES_FIELD: &str = "images";

const FALLBACK_DOWNLOAD_NAME: &str = "attachment; filename=\"video.mp4\"";

pub(super) async fn generate_video(
    State(state): State<HttpState>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let images = read_image_payloads(&mut multipart).await?;

    let video = state
        .jobs
        .run(images)
        .await
        .map_err(|err| job_error_response(SOURCE, err))?;

    let disposition = format!("attachment; filename=\"{}\"", video.file_name);
    let disposition = HeaderValue::from_str(&disposition)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_DOWNLOAD_NAME));

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static("video/mp4")),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        video.bytes,
    )
        .into_response())
}

/// Collect every `images` field in arrival order. Unknown fields are skipped;
/// an empty collection is left for the job service to reject so the invalid
/// submission path stays in one place.
async fn read_image_payloads(multipart: &mut Multipart) -> Result<Vec<InputImage>, ApiError> {
    let mut images = Vec::new();
    loop {
        match multipart.next_field().await {
            Ok(Some(field)) => {
                if field.name() != Some(IMAGES_FIELD) {
                    continue;
                }

                let original_name = field
                    .file_name()
                    .map(|value| value.to_string())
                    .filter(|value| !value.trim().is_empty())
                    .unwrap_or_else(|| "image.png".to_string());

                let bytes = field.bytes().await.map_err(|err| {
                    ApiError::new(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        "Image payload could not be read",
                        err.to_string(),
                    )
                })?;

                images.push(InputImage {
                    original_name,
                    bytes,
                });
            }
            Ok(None) => break,
            Err(err) => {
                let status = err.status();
                error!(
                    target = SOURCE,
                    status = status.as_u16(),
                    error = %err,
                    "failed to read multipart payload"
                );
                return Err(match status {
                    StatusCode::PAYLOAD_TOO_LARGE => ApiError::new(
                        SOURCE,
                        StatusCode::PAYLOAD_TOO_LARGE,
                        "Upload exceeds the request size limit",
                        err.to_string(),
                    ),
                    _ => ApiError::new(
                        SOURCE,
                        StatusCode::BAD_REQUEST,
                        "Request form data is invalid",
                        err.to_string(),
                    ),
                });
            }
        }
    }
    Ok(images)
}
