//! HTTP handlers

use std::path::{Path, PathBuf};
use std::str::FromStr;

use axum::{
    body::Body,
    extract::{multipart::Field, rejection::JsonRejection, Multipart, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{ApiError, ApiResult};
use super::AppState;
use crate::dispatcher::InputCheck;
use crate::error::BridgeError;
use crate::protocol::{Mode, ProcessingRequest, ProcessingResponse};

pub const BRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// "healthy" or "degraded"
    pub status: String,
    pub bridge: String,
    /// "connected" or "disconnected"
    pub acestep: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub bridge_version: String,
    pub acestep_connected: bool,
    pub acestep_url: String,
    pub auto_start_enabled: bool,
    pub supervisor_state: String,
    pub started_at: DateTime<Utc>,
    pub uptime_seconds: i64,
    pub available_models: Vec<String>,
    pub available_modes: Vec<String>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let healthy = state.dispatcher.supervisor().health_check().await;
    Json(HealthResponse {
        status: if healthy { "healthy" } else { "degraded" }.to_string(),
        bridge: "running".to_string(),
        acestep: if healthy { "connected" } else { "disconnected" }.to_string(),
    })
}

/// GET /status
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let supervisor = state.dispatcher.supervisor();
    let healthy = supervisor.health_check().await;
    let available_models = if healthy {
        state.dispatcher.client().get_models().await
    } else {
        Vec::new()
    };

    Json(StatusResponse {
        bridge_version: BRIDGE_VERSION.to_string(),
        acestep_connected: healthy,
        acestep_url: supervisor.upstream_url().to_string(),
        auto_start_enabled: supervisor.auto_start(),
        supervisor_state: supervisor.state().to_string(),
        started_at: state.started_at,
        uptime_seconds: (Utc::now() - state.started_at).num_seconds(),
        available_models,
        available_modes: Mode::ALL.iter().map(|m| m.as_str().to_string()).collect(),
    })
}

/// POST /process
pub async fn process(
    State(state): State<AppState>,
    payload: Result<Json<ProcessingRequest>, JsonRejection>,
) -> ApiResult<Json<ProcessingResponse>> {
    let Json(request) = payload.map_err(|e| ApiError::InvalidBody(e.body_text()))?;
    info!(mode = %request.mode, input = %request.input_path, "Received request");

    let response = state
        .dispatcher
        .process(&request, InputCheck::MustExist)
        .await?;
    info!(
        success = response.success,
        time_ms = response.processing_time_ms,
        "Processing complete"
    );
    Ok(Json(response))
}

/// Removes a staged upload when dropped, whatever happened in between.
struct StagedFile(PathBuf);

impl Drop for StagedFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.0.display(), error = %e, "could not remove staged upload");
            }
        }
    }
}

/// Final path component of a client filename, safe to embed in a header.
pub fn upload_basename(file_name: Option<&str>) -> String {
    let base = file_name
        .and_then(|name| name.rsplit(['/', '\\']).next())
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| if c == '"' || c.is_control() { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "upload.wav".to_string(),
        _ => cleaned,
    }
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> ApiError {
    ApiError::InvalidBody(e.body_text())
}

async fn field_text(field: Field<'_>) -> ApiResult<String> {
    field.text().await.map_err(multipart_error)
}

#[derive(Default)]
struct UploadForm {
    staged: Option<StagedFile>,
    file_name: String,
    mode: Option<String>,
    prompt: Option<String>,
    intensity: Option<String>,
}

async fn read_upload(state: &AppState, upload_id: Uuid, mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = upload_basename(field.file_name());
                let path = state
                    .temp_dir
                    .join(format!("input_{}_{}", upload_id, file_name));
                // Guard first so a partial write is cleaned up too.
                form.staged = Some(StagedFile(path.clone()));

                let mut file = tokio::fs::File::create(&path).await?;
                let mut written = 0usize;
                while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
                    file.write_all(&chunk).await?;
                    written += chunk.len();
                }
                file.flush().await?;
                debug!(path = %path.display(), bytes = written, "staged upload");
                form.file_name = file_name;
            }
            "mode" => form.mode = Some(field_text(field).await?),
            "prompt" => form.prompt = Some(field_text(field).await?),
            "intensity" => form.intensity = Some(field_text(field).await?),
            other => debug!(field = other, "ignoring unknown upload field"),
        }
    }
    Ok(form)
}

fn upload_request(form: &UploadForm, output_path: &Path) -> ApiResult<ProcessingRequest> {
    let input_path = match &form.staged {
        Some(staged) => staged.0.to_string_lossy().to_string(),
        None => return Err(BridgeError::missing("file").into()),
    };
    let mode = match form.mode.as_deref().map(str::trim) {
        Some(raw) if !raw.is_empty() => {
            Mode::from_str(raw).map_err(|e| BridgeError::invalid("mode", e.to_string()))?
        }
        _ => return Err(BridgeError::missing("mode").into()),
    };

    let mut request =
        ProcessingRequest::new(mode, input_path, output_path.to_string_lossy().to_string());
    if let Some(prompt) = form.prompt.as_deref().filter(|p| !p.trim().is_empty()) {
        request = request.with_prompt(prompt);
    }
    if let Some(raw) = form.intensity.as_deref().filter(|i| !i.trim().is_empty()) {
        let intensity = raw
            .trim()
            .parse::<f64>()
            .map_err(|_| BridgeError::invalid("intensity", format!("'{}' is not a number", raw)))?;
        request = request.with_intensity(intensity);
    }
    Ok(request)
}

/// POST /process/upload
///
/// Stages the uploaded file, processes it like `/process`, and streams the
/// result back when there is one. The staged input is always removed.
pub async fn process_upload(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Response> {
    tokio::fs::create_dir_all(&state.temp_dir).await?;
    let upload_id = Uuid::new_v4();

    let form = read_upload(&state, upload_id, multipart).await?;
    let output_path = state
        .temp_dir
        .join(format!("output_{}_{}", upload_id, form.file_name));
    let request = upload_request(&form, &output_path)?;
    info!(mode = %request.mode, file = %form.file_name, "Received upload");

    let response = state
        .dispatcher
        .process(&request, InputCheck::MustExist)
        .await?;

    let produced = match response.output_path.as_deref() {
        Some(path) if response.success => PathBuf::from(path),
        _ => return Ok(Json(response).into_response()),
    };
    let file = match tokio::fs::File::open(&produced).await {
        Ok(file) => file,
        Err(e) => {
            warn!(path = %produced.display(), error = %e, "processed file not readable, returning JSON");
            return Ok(Json(response).into_response());
        }
    };
    // The open handle keeps streaming after the staged output is unlinked.
    if produced.starts_with(&state.temp_dir) {
        if let Err(e) = tokio::fs::remove_file(&produced).await {
            debug!(path = %produced.display(), error = %e, "staged output left in place");
        }
    }

    let disposition = format!("attachment; filename=\"processed_{}\"", form.file_name);
    let headers = [
        (header::CONTENT_TYPE, "audio/wav".to_string()),
        (header::CONTENT_DISPOSITION, disposition),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

/// POST /restart-acestep
pub async fn restart(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    let supervisor = state.dispatcher.supervisor();
    if supervisor.restart().await {
        return Ok(Json(serde_json::json!({"status": "restarted", "healthy": true})));
    }

    let message = match supervisor.last_error() {
        Some(reason) => format!("Failed to restart ACE-Step API: {}", reason),
        None => "Failed to restart ACE-Step API".to_string(),
    };
    Err(ApiError::RestartFailed(message))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Some("song.wav"), "song.wav" ; "plain name")]
    #[test_case(Some("../../etc/passwd"), "passwd" ; "traversal stripped")]
    #[test_case(Some("C:\\music\\take 1.wav"), "take 1.wav" ; "windows path")]
    #[test_case(Some("a\"b.wav"), "a_b.wav" ; "quote replaced")]
    #[test_case(Some(".."), "upload.wav" ; "dot dot")]
    #[test_case(None, "upload.wav" ; "missing")]
    fn test_upload_basename(input: Option<&str>, expected: &str) {
        assert_eq!(upload_basename(input), expected);
    }

    #[test]
    fn test_upload_request_requires_mode() {
        let form = UploadForm {
            staged: None,
            file_name: "a.wav".into(),
            mode: None,
            prompt: None,
            intensity: None,
        };
        let err = upload_request(&form, Path::new("/tmp/out.wav")).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(BridgeError::MissingParameter { .. })));
    }
}
