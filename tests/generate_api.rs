#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use bytes::Bytes;
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

use reelpress::application::jobs::RenderJobService;
use reelpress::infra::archive::ArchiveStore;
use reelpress::infra::http::{HttpState, build_router};
use reelpress::infra::renderer::SubprocessRenderer;
use reelpress::infra::workspace::WorkspaceManager;

const BOUNDARY: &str = "reelpress-test-boundary";
const CAPTURE_CAP: usize = 64 * 1024;
const BODY_LIMIT: usize = 1024 * 1024;

fn write_script(root: &TempDir, body: &str) -> PathBuf {
    let path = root.path().join("fake-renderer");
    fs::write(&path, format!("#!/bin/sh\n{body}")).expect("write script");
    let mut perms = fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    fs::set_permissions(&path, perms).expect("set perms");
    path
}

fn build_app(root: &TempDir, script: PathBuf, body_limit: usize) -> Router {
    let jobs = Arc::new(RenderJobService::new(
        WorkspaceManager::new(root.path().join("scratch")),
        Arc::new(SubprocessRenderer::new(script, CAPTURE_CAP)),
        ArchiveStore::new(root.path().join("archive")),
        Duration::from_secs(10),
    ));
    build_router(HttpState { jobs }, body_limit)
}

fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Bytes {
    let mut body = Vec::new();
    for (name, filename, payload) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/png\r\n\r\n");
        body.extend_from_slice(payload);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    Bytes::from(body)
}

fn generate_request(body: Bytes) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/generate")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .expect("request")
}

async fn response_bytes(response: axum::response::Response) -> Bytes {
    response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes()
}

async fn error_message(response: axum::response::Response) -> String {
    let bytes = response_bytes(response).await;
    let value: serde_json::Value = serde_json::from_slice(&bytes).expect("error body is JSON");
    value["error"]
        .as_str()
        .expect("error field is a string")
        .to_string()
}

fn assert_scratch_empty(root: &TempDir) {
    let scratch = root.path().join("scratch");
    if !scratch.exists() {
        return;
    }
    let leftovers: Vec<_> = fs::read_dir(&scratch)
        .expect("read scratch")
        .collect::<Result<_, _>>()
        .expect("scratch entries");
    assert!(
        leftovers.is_empty(),
        "scratch must be empty after the request, found {leftovers:?}"
    );
}

#[tokio::test]
async fn health_probe_responds_no_content() {
    let root = TempDir::new().expect("temp dir");
    let script = write_script(&root, "exit 0");
    let app = build_app(&root, script, BODY_LIMIT);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/_health")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn generated_video_is_delivered_with_download_headers() {
    let root = TempDir::new().expect("temp dir");
    let script = write_script(
        &root,
        r#"cat "$INPUT_DIR"/input_*.png > "$OUTPUT_DIR/tutorial.mp4""#,
    );
    let app = build_app(&root, script, BODY_LIMIT);

    let body = multipart_body(&[
        ("images", "first.png", b"frame one "),
        ("images", "second.png", b"frame two"),
    ]);
    let response = app.oneshot(generate_request(body)).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .expect("content type"),
        "video/mp4"
    );
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_DISPOSITION)
            .expect("content disposition"),
        "attachment; filename=\"tutorial.mp4\""
    );

    let video = response_bytes(response).await;
    assert_eq!(video.as_ref(), b"frame one frame two");

    let archived: Vec<_> = fs::read_dir(root.path().join("archive"))
        .expect("read archive")
        .collect::<Result<_, _>>()
        .expect("archive entries");
    assert_eq!(archived.len(), 1, "exactly one archive entry per job");
    let name = archived[0].file_name();
    let name = name.to_string_lossy();
    assert!(
        name.starts_with("tutorial_") && name.ends_with(".mp4"),
        "unexpected archive name {name}"
    );
    let copy = fs::read(archived[0].path()).expect("read archive copy");
    assert_eq!(copy, video.as_ref());

    assert_scratch_empty(&root);
}

#[tokio::test]
async fn images_are_staged_in_field_order() {
    let root = TempDir::new().expect("temp dir");
    // The renderer reports the staged names back through the artifact.
    let script = write_script(&root, r#"ls "$INPUT_DIR" > "$OUTPUT_DIR/out.mp4""#);
    let app = build_app(&root, script, BODY_LIMIT);

    let body = multipart_body(&[
        ("images", "zebra.png", b"z"),
        ("images", "../../escape.png", b"e"),
        ("images", "apple.png", b"a"),
    ]);
    let response = app.oneshot(generate_request(body)).await.expect("response");

    assert_eq!(response.status(), StatusCode::OK);
    let listing = response_bytes(response).await;
    assert_eq!(
        listing.as_ref(),
        b"input_0.png\ninput_1.png\ninput_2.png\n",
        "staged names come from the arrival index, never the upload names"
    );
}

#[tokio::test]
async fn submission_without_images_is_rejected() {
    let root = TempDir::new().expect("temp dir");
    let script = write_script(&root, "exit 0");
    let app = build_app(&root, script, BODY_LIMIT);

    // A well-formed multipart request whose fields are all irrelevant.
    let body = multipart_body(&[("notes", "notes.txt", b"not an image")]);
    let response = app.oneshot(generate_request(body)).await.expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "No input images were submitted");

    assert!(
        !root.path().join("scratch").exists(),
        "an empty submission must not touch the filesystem"
    );
    assert!(!root.path().join("archive").exists());
}

#[tokio::test]
async fn renderer_failure_yields_generic_error() {
    let root = TempDir::new().expect("temp dir");
    let script = write_script(&root, "echo render blew up >&2\nexit 2");
    let app = build_app(&root, script, BODY_LIMIT);

    let body = multipart_body(&[("images", "a.png", b"payload")]);
    let response = app.oneshot(generate_request(body)).await.expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(response).await, "Video generation failed");

    assert_scratch_empty(&root);
    assert!(
        !root.path().join("archive").exists(),
        "nothing may be archived for a failed render"
    );
}

#[tokio::test]
async fn renderer_without_artifact_yields_generic_error() {
    let root = TempDir::new().expect("temp dir");
    let script = write_script(&root, "exit 0");
    let app = build_app(&root, script, BODY_LIMIT);

    let body = multipart_body(&[("images", "a.png", b"payload")]);
    let response = app.oneshot(generate_request(body)).await.expect("response");

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(error_message(response).await, "Video generation failed");
    assert_scratch_empty(&root);
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let root = TempDir::new().expect("temp dir");
    let script = write_script(&root, "exit 0");
    let app = build_app(&root, script, 1024);

    let oversized = vec![0u8; 8 * 1024];
    let body = multipart_body(&[("images", "big.png", oversized.as_slice())]);
    let response = app.oneshot(generate_request(body)).await.expect("response");

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        error_message(response).await,
        "Upload exceeds the request size limit"
    );
    assert!(
        !root.path().join("scratch").exists(),
        "a rejected upload must not reach the job pipeline"
    );
}

#[tokio::test]
async fn malformed_multipart_is_a_client_error() {
    let root = TempDir::new().expect("temp dir");
    let script = write_script(&root, "exit 0");
    let app = build_app(&root, script, BODY_LIMIT);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/generate")
                .header(
                    header::CONTENT_TYPE,
                    format!("multipart/form-data; boundary={BOUNDARY}"),
                )
                .body(Body::from("this is not multipart at all"))
                .expect("request"),
        )
        .await
        .expect("response");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "Request form data is invalid");
}
