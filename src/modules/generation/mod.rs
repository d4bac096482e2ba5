use std::{io::ErrorKind, path::Path};

use anyhow::{Context, Result, bail};
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::Local;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::{
    backend::{GeneratedNewsletter, GenerationOutcome},
    utils::local_files::list_local_newsletters,
    web::{ApiResult, AppState, json_error},
};

const FINAL_LOG: &str = "generation_final.log";
const RUNNING_LOG: &str = "generation.log";
const IN_PROGRESS: &str =
    "Newsletter generation is already in progress. Please wait for it to complete.";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/generate-newsletter", post(generate_newsletter))
        .route("/api/generation-status", get(generation_status))
        .route("/api/generation-logs", get(generation_logs))
}

#[derive(Debug, Serialize)]
struct GenerationReport {
    success: bool,
    message: String,
    newsletter_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_time: Option<f64>,
}

#[derive(Debug, Serialize)]
struct GenerationStatus {
    status: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest_file: Option<String>,
}

#[derive(Debug, Serialize)]
struct GenerationLogs {
    logs: String,
    source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tmp_dir: Option<String>,
}

/// Ask the backend for a fresh issue and keep a local copy of the result.
///
/// The lock file is owned by the external generation process; this only
/// checks for it, so two triggers arriving together can both get through.
async fn generate_newsletter(State(state): State<AppState>) -> Result<Json<GenerationReport>, Response> {
    if state.config().mock_mode {
        return Ok(Json(GenerationReport {
            success: true,
            message: "[MOCK] Newsletter generated!".to_string(),
            newsletter_id: format!("alphaminr_{}.html", Local::now().format("%Y-%m-%d")),
            generation_time: None,
            total_time: None,
        }));
    }

    if lock_present(&state.config().paths.lock_path).await {
        info!("generation requested while lock file is present");
        return Err(json_error(StatusCode::CONFLICT, IN_PROGRESS).into_response());
    }

    let backend_url = state.backend().base_url().to_string();
    let outcome = state.backend().generate().await;

    let generated = match outcome {
        Ok(GenerationOutcome::Generated(generated)) => generated,
        Ok(GenerationOutcome::Rejected(reason)) => {
            warn!(%reason, "backend rejected generation");
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Backend generation failed: {reason}"),
            )
            .into_response());
        }
        Ok(GenerationOutcome::HttpFailure { status, body }) => {
            warn!(status, "generation call returned an error status");
            return Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("API call failed with status {status}: {body}"),
            )
            .into_response());
        }
        Err(err) => return Err(generation_failure(&err, &backend_url)),
    };

    match store_generated(&state.config().paths.newsletter_dir, &generated).await {
        Ok(newsletter_id) => {
            info!(%newsletter_id, "generated newsletter saved locally");
            Ok(Json(GenerationReport {
                success: true,
                message: format!("Newsletter generated successfully! Saved as {newsletter_id}"),
                newsletter_id,
                generation_time: Some(generated.generation_time_seconds),
                total_time: Some(generated.total_time_seconds),
            }))
        }
        Err(err) => Err(generation_failure(&err, &backend_url)),
    }
}

fn generation_failure(err: &anyhow::Error, backend_url: &str) -> Response {
    error!(?err, backend_url, "newsletter generation failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": format!("Failed to generate newsletter: {err:#}"),
            "traceback": format!("{err:?}"),
            "railway_url": backend_url,
        })),
    )
        .into_response()
}

/// Write the generated HTML under the newsletter directory and return the
/// filename it was saved as, which is the id later routes use.
async fn store_generated(dir: &Path, generated: &GeneratedNewsletter) -> Result<String> {
    let requested = generated.newsletter_id.clone().unwrap_or_else(|| {
        format!("alphaminr_{}.html", Local::now().format("%Y-%m-%d_%H%M"))
    });
    let newsletter_id = sanitize_filename::sanitize(&requested);
    if newsletter_id.trim().is_empty() {
        bail!("backend returned an unusable newsletter id {requested:?}");
    }

    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(&newsletter_id);
    tokio::fs::write(&path, &generated.html)
        .await
        .with_context(|| format!("failed to write {}", path.display()))?;

    Ok(newsletter_id)
}

async fn lock_present(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn generation_status(State(state): State<AppState>) -> ApiResult<GenerationStatus> {
    let paths = &state.config().paths;
    if lock_present(&paths.lock_path).await {
        return Ok(Json(GenerationStatus {
            status: "in_progress",
            message: "Newsletter generation is currently running...".to_string(),
            latest_file: None,
        }));
    }

    let newsletters = list_local_newsletters(&paths.newsletter_dir)
        .await
        .map_err(|err| {
            error!(?err, "failed to list local newsletters");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Status check failed: {err:#}"),
            )
        })?;

    Ok(Json(match newsletters.into_iter().next() {
        Some(latest) => GenerationStatus {
            status: "completed",
            message: format!("Latest newsletter: {}", latest.filename),
            latest_file: Some(latest.filename),
        },
        None => GenerationStatus {
            status: "idle",
            message: "No generation in progress and no newsletters found".to_string(),
            latest_file: None,
        },
    }))
}

/// Final log first, then the running log.
async fn generation_logs(State(state): State<AppState>) -> ApiResult<GenerationLogs> {
    let log_dir = &state.config().paths.log_dir;

    for (name, source) in [(FINAL_LOG, "final"), (RUNNING_LOG, "regular")] {
        let path = log_dir.join(name);
        match tokio::fs::read_to_string(&path).await {
            Ok(logs) => {
                return Ok(Json(GenerationLogs {
                    logs,
                    source,
                    path: Some(path.display().to_string()),
                    tmp_dir: None,
                }));
            }
            Err(err) if err.kind() == ErrorKind::NotFound => continue,
            Err(err) => {
                error!(?err, path = %path.display(), "failed to read generation log");
                return Err(json_error(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Failed to read logs: {err}"),
                ));
            }
        }
    }

    Ok(Json(GenerationLogs {
        logs: "No logs available yet".to_string(),
        source: "none",
        path: None,
        tmp_dir: Some(log_dir.display().to_string()),
    }))
}
