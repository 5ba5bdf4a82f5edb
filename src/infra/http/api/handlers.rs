use axum::Json;
use axum::body::Body;
use axum::extract::rejection::PathRejection;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use folio_api_types::{ExportStatus, ExportSubmitted};
use uuid::Uuid;

use crate::application::export::{StoreError, SubmitError, TakeResult};

use super::error::{ApiError, codes};
use super::middleware::Caller;
use super::state::ApiState;

pub async fn submit_export(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(project_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = state
        .exports
        .submit(caller.as_str(), &project_id)
        .await
        .map_err(submit_error_to_api)?;

    Ok((StatusCode::ACCEPTED, Json(ExportSubmitted { job_id })))
}

pub async fn export_status(
    State(state): State<ApiState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<ExportStatus>, ApiError> {
    let job_id = parse_job_id(path)?;
    state
        .exports
        .status(job_id)
        .await
        .map_err(store_error_to_api)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Export not found"))
}

pub async fn download_export(
    State(state): State<ApiState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Response, ApiError> {
    let job_id = parse_job_id(path)?;
    let artifact = match state
        .exports
        .take_result(job_id)
        .await
        .map_err(store_error_to_api)?
    {
        TakeResult::Ready(artifact) => artifact,
        TakeResult::NotReady(stage) => return Err(ApiError::not_ready(stage.as_str())),
        TakeResult::NotFound => return Err(ApiError::not_found("Export not found")),
    };

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        artifact.filename
    ))
    .map_err(|err| {
        ApiError::internal(codes::STORE, "Export artifact unavailable")
            .with_detail(format!("invalid filename header: {err}"))
    })?;

    let mut response = Response::new(Body::from(artifact.bytes));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static(artifact.content_type),
    );
    headers.insert(header::CONTENT_DISPOSITION, disposition);
    Ok(response)
}

pub async fn cancel_export(
    State(state): State<ApiState>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<StatusCode, ApiError> {
    let job_id = parse_job_id(path)?;
    if state.exports.cancel(job_id) {
        Ok(StatusCode::ACCEPTED)
    } else {
        Err(ApiError::not_found("No running export with this id"))
    }
}

fn parse_job_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(job_id)| job_id)
        .map_err(|rejection| ApiError::bad_request("Invalid export id", Some(rejection.body_text())))
}

fn submit_error_to_api(err: SubmitError) -> ApiError {
    match err {
        SubmitError::Forbidden => ApiError::forbidden(),
        SubmitError::UnknownProject => ApiError::not_found("Project not found"),
        SubmitError::Ownership(err) => {
            ApiError::internal(codes::REPO, "Project lookup failed").with_detail(err.to_string())
        }
        SubmitError::Store(err) => store_error_to_api(err),
    }
}

fn store_error_to_api(err: StoreError) -> ApiError {
    ApiError::internal(codes::STORE, "Export store unavailable").with_detail(err.to_string())
}
