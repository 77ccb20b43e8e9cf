//! Handlers for batch submission and archive downloads.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Multipart, Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use rawbatch_core::batch_events::ARCHIVE_DOWNLOAD_NAME;
use rawbatch_core::error::CoreError;
use rawbatch_core::types::{new_batch_id, BatchId};
use rawbatch_pipeline::{AcceptedJobs, ConversionJob};
use serde::Serialize;

use crate::background::batch_runner::BatchRunner;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying one uploaded file (repeated).
pub const FIELD_FILES: &str = "files";

/// Multipart fields that switch on low-resolution output. The second name is
/// what the bundled upload form sends.
pub const FIELD_LOW_RES: &[&str] = &["low_res", "baixa_resolucao"];

/// Response header naming the batch an archive belongs to.
pub const BATCH_ID_HEADER: &str = "x-batch-id";

/// Typed response for an accepted batch.
#[derive(Debug, Serialize)]
pub struct BatchAccepted {
    pub batch_id: BatchId,
    /// Uploaded names that will be converted.
    pub accepted_files: Vec<String>,
    /// Uploaded names ignored for lacking a RAW extension.
    pub skipped_files: Vec<String>,
    pub low_res: bool,
}

/// Checkbox-style flag: `on`, `true` or `1`.
fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "on" | "true" | "1"
    )
}

// ── Submit ───────────────────────────────────────────────────────────

/// POST /api/v1/batches
///
/// Accept a multipart upload of RAW files, validate it and start the
/// conversion in the background. Progress is pushed over `/api/v1/ws`.
pub async fn submit_batch(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<BatchAccepted>>)> {
    let mut uploads: Vec<(String, Bytes)> = Vec::new();
    let mut low_res = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();

        if FIELD_LOW_RES.contains(&name.as_str()) {
            let value = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(e.to_string()))?;
            low_res = parse_flag(&value);
            continue;
        }

        if name != FIELD_FILES {
            tracing::debug!(field = %name, "Ignoring unknown multipart field");
            continue;
        }

        // Empty file inputs arrive as a part without a name.
        let filename = field.file_name().unwrap_or_default().to_string();
        if filename.is_empty() {
            continue;
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        uploads.push((filename, data));
    }

    let jobs = uploads
        .into_iter()
        .map(|(filename, data)| ConversionJob::new(filename, data.to_vec(), low_res))
        .collect();
    let accepted = AcceptedJobs::validate(jobs)?;

    let batch_id = new_batch_id();
    let response = BatchAccepted {
        batch_id,
        accepted_files: accepted.jobs().iter().map(|j| j.source_name.clone()).collect(),
        skipped_files: accepted.skipped.clone(),
        low_res,
    };

    tracing::info!(
        %batch_id,
        accepted = response.accepted_files.len(),
        skipped = response.skipped_files.len(),
        low_res,
        "Batch accepted",
    );

    let runner = BatchRunner {
        coordinator: Arc::clone(&state.coordinator),
        archive_store: Arc::clone(&state.archive_store),
        event_bus: Arc::clone(&state.event_bus),
    };
    state.batch_tasks.spawn(runner.run(batch_id, accepted));

    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: response })))
}

// ── Downloads ────────────────────────────────────────────────────────

/// ZIP attachment response.
fn archive_response(batch_id: BatchId, bytes: Vec<u8>) -> Response {
    (
        StatusCode::OK,
        [
            (CONTENT_TYPE, "application/zip".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{ARCHIVE_DOWNLOAD_NAME}\""),
            ),
            (HeaderName::from_static(BATCH_ID_HEADER), batch_id.to_string()),
        ],
        bytes,
    )
        .into_response()
}

/// GET /api/v1/batches/{id}/archive
pub async fn download_archive(
    State(state): State<AppState>,
    Path(batch_id): Path<BatchId>,
) -> AppResult<Response> {
    let bytes = state
        .archive_store
        .get(batch_id)
        .await
        .map_err(|e| CoreError::Internal(format!("Failed to read archive: {e}")))?
        .ok_or_else(|| CoreError::NotFound {
            entity: "Archive",
            id: batch_id.to_string(),
        })?;

    Ok(archive_response(batch_id, bytes))
}

/// GET /api/v1/archives/latest
///
/// The archive of the most recently packaged batch.
pub async fn latest_archive(State(state): State<AppState>) -> AppResult<Response> {
    let (batch_id, bytes) = state
        .archive_store
        .latest()
        .await
        .map_err(|e| CoreError::Internal(format!("Failed to read archive: {e}")))?
        .ok_or_else(|| CoreError::NotFound {
            entity: "Archive",
            id: "latest".to_string(),
        })?;

    Ok(archive_response(batch_id, bytes))
}
