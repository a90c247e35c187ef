use std::path::PathBuf;

use axum::{
    body::Body,
    extract::{
        rejection::{FormRejection, JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use anyhow::Context;
use chrono::{DateTime, Utc};
use percent_encoding::utf8_percent_encode;
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use url::Url;

use super::{error::ApiError, AppState};
use crate::{
    helpers::publish::PATH_SEGMENT,
    jobs::{job::JobSnapshot, runner::JobRequest},
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub jobs: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        jobs: state.registry.len(),
    })
}

#[derive(Debug, Default, Deserialize)]
pub struct StartRequest {
    #[serde(default)]
    pub urls: Vec<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub no_playlist: bool,
    #[serde(default)]
    pub archive: Option<bool>,
}

/// Form variant: `url` may hold several URLs separated by whitespace,
/// checkboxes arrive as `on`.
#[derive(Debug, Default, Deserialize)]
pub struct StartForm {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub folder: Option<String>,
    #[serde(default)]
    pub quality: Option<String>,
    #[serde(default)]
    pub no_playlist: Option<String>,
    #[serde(default)]
    pub archive: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub job_id: String,
}

pub async fn start_json(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Result<Json<StartResponse>, ApiError> {
    let Json(req) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let mut urls = req.urls;
    urls.extend(req.url);

    submit(&state, &urls, req.folder.as_deref(), req.quality, req.no_playlist, req.archive)
}

pub async fn start_form(
    State(state): State<AppState>,
    payload: Result<Form<StartForm>, FormRejection>,
) -> Result<Json<StartResponse>, ApiError> {
    let Form(form) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let urls = form.url.into_iter().collect::<Vec<_>>();

    submit(
        &state,
        &urls,
        form.folder.as_deref(),
        form.quality,
        form.no_playlist.as_deref().is_some_and(is_checked),
        form.archive.as_deref().map(is_checked),
    )
}

fn is_checked(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "on" | "true" | "1" | "yes")
}

fn submit(
    state: &AppState,
    raw_urls: &[String],
    folder: Option<&str>,
    quality: Option<String>,
    no_playlist: bool,
    archive: Option<bool>,
) -> Result<Json<StartResponse>, ApiError> {
    let urls = parse_urls(raw_urls)?;

    let quality = quality
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty())
        .unwrap_or_else(|| state.config.default_quality.clone());
    if quality.len() > 8 || !quality.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ApiError::BadRequest(format!("Invalid quality: {quality:?}")));
    }

    let job = state.registry.create(folder);
    let request = JobRequest {
        urls,
        quality,
        no_playlist,
        archive: archive.unwrap_or(state.config.archive_enabled),
    };

    info!(job = job.id(), urls = request.urls.len(), "Job submitted");
    let job_id = job.id().to_string();
    state.runner.spawn(job, request);

    Ok(Json(StartResponse { job_id }))
}

fn parse_urls(raw_urls: &[String]) -> Result<Vec<Url>, ApiError> {
    let urls = raw_urls
        .iter()
        .flat_map(|u| u.split_whitespace())
        .map(|raw| match Url::parse(raw) {
            Ok(u) if matches!(u.scheme(), "http" | "https") => Ok(u),
            _ => Err(ApiError::BadRequest(format!("Invalid URL: {raw}"))),
        })
        .collect::<Result<Vec<_>, _>>()?;

    if urls.is_empty() {
        return Err(ApiError::BadRequest("No URL given".to_string()));
    }

    Ok(urls)
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusQuery {
    #[serde(default)]
    pub since: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub log: Vec<String>,
    #[serde(default)]
    pub next_cursor: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_zip: Option<String>,
    #[serde(default)]
    pub public_files: Vec<String>,
    #[serde(default)]
    pub ready_titles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}
impl StatusResponse {
    fn unknown(log: Vec<String>, next_cursor: usize) -> Self {
        Self {
            status: "unknown".to_string(),
            next_cursor,
            log,
            target_folder: None,
            public_zip: None,
            public_files: Vec::new(),
            ready_titles: Vec::new(),
            failure_log: None,
            started_at: None,
            finished_at: None,
        }
    }
}
impl From<JobSnapshot> for StatusResponse {
    fn from(s: JobSnapshot) -> Self {
        Self {
            status: s.status.to_string(),
            log: s.log,
            next_cursor: s.next_cursor,
            target_folder: Some(s.target_folder),
            public_zip: s.public_zip,
            public_files: s.public_files,
            ready_titles: s.ready_titles,
            failure_log: s
                .failure_log
                .and_then(|p| p.file_name().map(|x| x.to_string_lossy().into_owned())),
            started_at: s.started_at,
            finished_at: s.finished_at,
        }
    }
}

pub async fn job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    query: Result<Query<StatusQuery>, QueryRejection>,
) -> Response {
    let query = match query {
        Ok(Query(q)) => q,
        Err(e) => return ApiError::BadRequest(e.body_text()).into_response(),
    };

    if let Some(job) = state.registry.get(&job_id) {
        return Json(StatusResponse::from(job.snapshot(query.since))).into_response();
    }

    match state.registry.read_log_file(&job_id).await {
        Some(lines) => {
            debug!(%job_id, "Job not in memory, serving log file");
            let total = lines.len();
            let lines = lines.into_iter().skip(query.since).collect();
            Json(StatusResponse::unknown(lines, total)).into_response()
        }
        None => (StatusCode::NOT_FOUND, Json(StatusResponse::unknown(Vec::new(), 0))).into_response(),
    }
}

pub async fn download_file(
    State(state): State<AppState>,
    Path(file): Path<String>,
) -> Result<Response, ApiError> {
    serve_public_file(&state, &[file.as_str()]).await
}

pub async fn download_job_file(
    State(state): State<AppState>,
    Path((job_id, file)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    serve_public_file(&state, &[job_id.as_str(), file.as_str()]).await
}

async fn serve_public_file(state: &AppState, segments: &[&str]) -> Result<Response, ApiError> {
    let mut path = PathBuf::from(&state.config.public_dir);
    for segment in segments {
        if segment.is_empty()
            || *segment == "."
            || *segment == ".."
            || segment.contains(['/', '\\'])
            || segment.starts_with('.')
        {
            return Err(ApiError::BadRequest("Invalid file name".to_string()));
        }
        path.push(segment);
    }

    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ApiError::NotFound("File not found".to_string()));
        }
        Err(e) => {
            return Err(anyhow::Error::new(e)
                .context(format!("Failed to open {}", path.display()))
                .into());
        }
    };
    let metadata = file
        .metadata()
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    if !metadata.is_file() {
        return Err(ApiError::NotFound("File not found".to_string()));
    }

    let file_name = segments.last().copied().unwrap_or_default();
    debug!(?path, size = metadata.len(), "Serving public file");

    Ok((
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type(file_name))),
            (header::CONTENT_DISPOSITION, content_disposition(file_name)),
            (header::CONTENT_LENGTH, HeaderValue::from(metadata.len())),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

fn content_type(file_name: &str) -> &'static str {
    let ext = file_name.rsplit_once('.').map(|(_, e)| e.to_lowercase());

    match ext.as_deref() {
        Some("zip") => "application/zip",
        Some("mp3") => "audio/mpeg",
        Some("m4a" | "aac") => "audio/mp4",
        Some("opus" | "ogg") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

fn content_disposition(file_name: &str) -> HeaderValue {
    let fallback = file_name
        .chars()
        .map(|c| match c {
            ' ' => c,
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() => c,
            _ => '_',
        })
        .collect::<String>();
    let encoded = utf8_percent_encode(file_name, PATH_SEGMENT);

    HeaderValue::from_str(&format!(
        "attachment; filename=\"{fallback}\"; filename*=UTF-8''{encoded}"
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}
