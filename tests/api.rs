mod support;

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use folio::infra::http::{ApiState, build_router};
use folio::infra::records::FsProjectSource;
use folio_api_types::{ExportStage, ExportStatus, ExportSubmitted};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use support::{FAKE_PDF, FakeBrowser, bare_record, export_service, export_settings};

struct Harness {
    _records: TempDir,
    router: Router,
}

fn harness(browser: &FakeBrowser) -> Harness {
    let records = TempDir::new().expect("temp dir");
    let record = bare_record("atlas");
    std::fs::write(
        records.path().join("atlas.json"),
        serde_json::to_vec(&record).expect("serialize record"),
    )
    .expect("write record");

    let source = Arc::new(FsProjectSource::new(records.path()));
    let service = export_service(browser, source.clone(), source, export_settings());
    Harness {
        _records: records,
        router: build_router(ApiState::new(service)),
    }
}

fn request(method: &str, uri: &str, caller: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(caller) = caller {
        builder = builder.header("x-folio-user", caller);
    }
    builder.body(Body::empty()).expect("request")
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes()
        .to_vec();
    (status, headers, body)
}

async fn submit(router: &Router) -> Uuid {
    let (status, _, body) = send(
        router,
        request("POST", "/api/v1/projects/atlas/exports", Some("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let submitted: ExportSubmitted = serde_json::from_slice(&body).expect("submitted body");
    submitted.job_id
}

async fn poll(router: &Router, job_id: Uuid) -> ExportStatus {
    loop {
        let (status, _, body) = send(
            router,
            request("GET", &format!("/api/v1/exports/{job_id}"), Some("alice")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let snapshot: ExportStatus = serde_json::from_slice(&body).expect("status body");
        if snapshot.download_ready || snapshot.stage.is_terminal() {
            return snapshot;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
}

#[tokio::test(start_paused = true)]
async fn submit_poll_and_download() {
    let browser = FakeBrowser::working();
    let harness = harness(&browser);

    let job_id = submit(&harness.router).await;
    let status = poll(&harness.router, job_id).await;
    assert_eq!(status.stage, ExportStage::Completed);
    assert_eq!(status.progress, 100);

    let (code, headers, body) = send(
        &harness.router,
        request(
            "GET",
            &format!("/api/v1/exports/{job_id}/download"),
            Some("alice"),
        ),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "application/pdf");
    let disposition = headers[header::CONTENT_DISPOSITION]
        .to_str()
        .expect("ascii header");
    assert!(disposition.starts_with("attachment; filename=\"atlas-crm-"));
    assert!(disposition.ends_with(".pdf\""));
    assert_eq!(body, FAKE_PDF);
}

#[tokio::test]
async fn missing_caller_is_unauthorized() {
    let harness = harness(&FakeBrowser::working());
    let (status, _, body) = send(
        &harness.router,
        request("POST", "/api/v1/projects/atlas/exports", None),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let body: Value = serde_json::from_slice(&body).expect("error body");
    assert_eq!(body["error"]["code"], "unauthorized");
}

#[tokio::test]
async fn non_owner_is_forbidden() {
    let harness = harness(&FakeBrowser::working());
    let (status, _, body) = send(
        &harness.router,
        request("POST", "/api/v1/projects/atlas/exports", Some("mallory")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let body: Value = serde_json::from_slice(&body).expect("error body");
    assert_eq!(body["error"]["code"], "forbidden");
}

#[tokio::test]
async fn unknown_project_is_not_found() {
    let harness = harness(&FakeBrowser::working());
    let (status, _, _) = send(
        &harness.router,
        request("POST", "/api/v1/projects/nope/exports", Some("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let harness = harness(&FakeBrowser::working());
    let job_id = Uuid::new_v4();
    for uri in [
        format!("/api/v1/exports/{job_id}"),
        format!("/api/v1/exports/{job_id}/download"),
    ] {
        let (status, _, _) = send(&harness.router, request("GET", &uri, Some("alice"))).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
    }
    let (status, _, _) = send(
        &harness.router,
        request(
            "POST",
            &format!("/api/v1/exports/{job_id}/cancel"),
            Some("alice"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn download_before_completion_conflicts() {
    let browser = FakeBrowser {
        load: support::LoadBehaviour::Delay(std::time::Duration::from_secs(10)),
        ..FakeBrowser::working()
    };
    let harness = harness(&browser);
    let job_id = submit(&harness.router).await;

    let (status, _, body) = send(
        &harness.router,
        request(
            "GET",
            &format!("/api/v1/exports/{job_id}/download"),
            Some("alice"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    let body: Value = serde_json::from_slice(&body).expect("error body");
    assert_eq!(body["error"]["code"], "not_ready");

    let (status, _, _) = send(
        &harness.router,
        request(
            "POST",
            &format!("/api/v1/exports/{job_id}/cancel"),
            Some("alice"),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let final_status = poll(&harness.router, job_id).await;
    assert_eq!(final_status.stage, ExportStage::Error);
    assert_eq!(final_status.message, "Export cancelled");
}

#[tokio::test]
async fn health_probe_needs_no_caller() {
    let harness = harness(&FakeBrowser::working());
    let (status, _, _) = send(&harness.router, request("GET", "/health", None)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn malformed_job_id_is_a_bad_request() {
    let harness = harness(&FakeBrowser::working());
    let (status, _, body) = send(
        &harness.router,
        request("GET", "/api/v1/exports/not-a-uuid", Some("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let body: Value = serde_json::from_slice(&body).expect("error body");
    assert_eq!(body["error"]["code"], "bad_request");
}
