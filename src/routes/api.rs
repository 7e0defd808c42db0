use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use std::sync::Arc;

use super::pages::{admin_page, lookup_holder, read_upload};
use crate::dataset::{Dataset, DatasetKind};
use crate::db::VerificationView;
use crate::error::AppError;
use crate::pipeline;
use crate::session::Session;
use crate::state::AppState;

pub const BATCH_ARCHIVE_NAME: &str = "certificates_batch.zip";

/// Issues a certificate for the logged-in holder.
pub async fn download_certificate(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let Some((token, Session::Holder { national_id })) = state.sessions.current(&headers) else {
        return Ok(Redirect::to("/").into_response());
    };
    let Some(holder) = lookup_holder(&state, &national_id, None, false).await else {
        state.sessions.remove(&token);
        return Err(AppError::NotFound(format!(
            "national id {} left the dataset",
            national_id
        )));
    };

    let certificate =
        pipeline::issue_certificate(state.config.clone(), state.registry.as_ref(), &holder)
            .await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", certificate.filename),
            ),
        ],
        certificate.content,
    )
        .into_response())
}

/// Issues certificates for the first `count` rows of the uploaded dataset.
pub async fn generate_batch(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    if !state.sessions.is_admin(&headers) {
        return Redirect::to("/").into_response();
    }

    let rejected = |message: &str| {
        (StatusCode::BAD_REQUEST, admin_page(&state, None, Some(message))).into_response()
    };

    let upload = match read_upload(&mut multipart).await {
        Ok(upload) => upload,
        Err(message) => return rejected(&message),
    };
    let count = match upload.count.as_deref().map(str::trim).map(str::parse::<i64>) {
        Some(Ok(count)) if count > 0 => count as usize,
        _ => return rejected("The number of certificates must be greater than 0."),
    };
    let Some((filename, bytes)) = upload.file else {
        return rejected("Please select a dataset file.");
    };
    let Some(kind) = DatasetKind::from_path(std::path::Path::new(&filename)) else {
        return rejected(&format!("Unsupported dataset format: {}", filename));
    };
    let rows = match tokio::task::spawn_blocking(move || Dataset::from_bytes(bytes, kind)).await {
        Ok(Ok(dataset)) => dataset.into_rows(),
        Ok(Err(e)) => return rejected(&format!("Error processing the file: {}", e)),
        Err(e) => return AppError::fatal(e).into_response(),
    };

    tracing::info!(requested = count, rows = rows.len(), "Batch generation started");
    let outcome =
        match pipeline::generate_batch(state.config.clone(), state.registry.as_ref(), &rows, count)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => return rejected(&format!("Error processing the file: {}", e)),
        };

    (
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", BATCH_ARCHIVE_NAME),
            ),
            (
                header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate".to_string(),
            ),
            (header::PRAGMA, "no-cache".to_string()),
            (header::EXPIRES, "0".to_string()),
        ],
        outcome.archive,
    )
        .into_response()
}

pub async fn verify_certificate(
    State(state): State<Arc<AppState>>,
    Path(certificate_id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = match state.registry.find(&certificate_id).await? {
        Some(record) => serde_json::json!({
            "valid": true,
            "certificate": VerificationView::from(&record),
        }),
        None => serde_json::json!({
            "valid": false,
            "message": "This certificate is not registered.",
        }),
    };
    Ok(Json(body))
}
