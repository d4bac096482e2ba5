use std::{env, path::Path};

use axum::{
    Json, Router,
    extract::{Path as UrlPath, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::Local;
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{error, warn};

use crate::{
    backend::preview,
    utils::local_files::{directory_listing, list_local_newsletters, newsletter_path},
    web::AppState,
};

const PROBED_FILES: [&str; 3] = ["generation.log", "generation_final.log", "generation.lock"];
const FILE_PREVIEW_CHARS: usize = 500;
const CONTENT_PREVIEW_CHARS: usize = 200;

/// Introspection routes that sit behind the editor gate.
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/api/env-check", get(env_check))
        .route("/api/debug-backend", get(debug_backend))
        .route("/api/debug-files", get(debug_files))
        .route("/api/newsletters", get(local_newsletters))
        .route("/api/debug-newsletter/:newsletter_id", get(debug_newsletter))
}

#[derive(Debug, Serialize)]
pub struct Integrations {
    css_inliner: bool,
    github: bool,
    mailchimp: bool,
    anthropic: bool,
    mock_mode: bool,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    status: &'static str,
    timestamp: String,
    integrations: Integrations,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthReport> {
    let config = state.config();
    Json(HealthReport {
        status: "healthy",
        timestamp: Local::now().to_rfc3339(),
        integrations: Integrations {
            css_inliner: true,
            github: state.store().is_configured(),
            mailchimp: config.mailchimp.credentials().is_some(),
            anthropic: config.anthropic.api_key.is_some(),
            mock_mode: config.mock_mode,
        },
    })
}

pub async fn test_endpoint() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Portal is working",
        "timestamp": Local::now().to_rfc3339(),
    }))
}

fn failure(context: &str, err: &anyhow::Error) -> Response {
    error!(?err, context, "diagnostic route failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({
            "error": format!("{context}: {err:#}"),
            "traceback": format!("{err:?}"),
        })),
    )
        .into_response()
}

fn environment_variables(state: &AppState) -> Map<String, Value> {
    state
        .config()
        .environment_report()
        .into_iter()
        .map(|(name, value)| (name.to_string(), Value::String(value)))
        .collect()
}

async fn env_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "environment_variables": environment_variables(&state),
    }))
}

/// Probe `{backend}/health`. A connection failure is reported, not raised.
async fn debug_backend(State(state): State<AppState>) -> Json<Value> {
    let backend_url = state.backend().base_url().to_string();

    let (backend_status, backend_error, backend_response) =
        match state.backend().probe(&["health"]).await {
            Ok(probe) => {
                let failed = probe.status_code != 200;
                (
                    format!("Status: {}", probe.status_code),
                    failed.then(|| probe.body.clone()),
                    Some(probe.body),
                )
            }
            Err(err) => {
                warn!(?err, %backend_url, "backend health probe failed");
                ("Failed to connect".to_string(), Some(format!("{err:#}")), None)
            }
        };

    Json(json!({
        "railway_backend_url": backend_url,
        "backend_status": backend_status,
        "backend_error": backend_error,
        "backend_response": backend_response,
        "environment_check": environment_variables(&state),
    }))
}

async fn debug_files(State(state): State<AppState>) -> Response {
    match collect_file_report(&state).await {
        Ok(report) => Json(report).into_response(),
        Err(err) => failure("Debug failed", &err),
    }
}

async fn collect_file_report(state: &AppState) -> anyhow::Result<Value> {
    let base_dir = env::current_dir()?;
    let paths = &state.config().paths;

    let mut files = Map::new();
    for name in PROBED_FILES {
        let base_path = base_dir.join(name);
        let tmp_path = paths.log_dir.join(name);

        let mut tmp_entry = json!({
            "path": tmp_path.display().to_string(),
            "exists": exists(&tmp_path).await,
        });
        if exists(&tmp_path).await {
            match tokio::fs::read_to_string(&tmp_path).await {
                Ok(content) => {
                    tmp_entry["size"] = json!(content.len());
                    tmp_entry["content_preview"] = if content.is_empty() {
                        json!("empty")
                    } else {
                        json!(preview(&content, FILE_PREVIEW_CHARS))
                    };
                }
                Err(err) => tmp_entry["error"] = json!(err.to_string()),
            }
        }

        files.insert(
            name.to_string(),
            json!({
                "base_dir": {
                    "path": base_path.display().to_string(),
                    "exists": exists(&base_path).await,
                },
                "tmp_dir": tmp_entry,
            }),
        );
    }

    let newsletters = match directory_listing(&paths.newsletter_dir).await? {
        Some(listing) => json!({ "exists": true, "files": listing }),
        None => json!({ "exists": false }),
    };
    files.insert("newsletters".to_string(), newsletters);

    Ok(json!({
        "base_dir": base_dir.display().to_string(),
        "tmp_dir": paths.log_dir.display().to_string(),
        "files": files,
    }))
}

async fn local_newsletters(State(state): State<AppState>) -> Response {
    match list_local_newsletters(&state.config().paths.newsletter_dir).await {
        Ok(newsletters) => Json(newsletters).into_response(),
        Err(err) => failure("Failed to list newsletters", &err),
    }
}

/// Walk one newsletter through each read path and report what each one saw.
async fn debug_newsletter(
    State(state): State<AppState>,
    UrlPath(newsletter_id): UrlPath<String>,
) -> Json<Value> {
    let backend = state.backend();

    let raw = match backend.probe(&["newsletter", &newsletter_id]).await {
        Ok(probe) => json!({
            "status_code": probe.status_code,
            "success": probe.status_code == 200,
            "content_length": probe.body.len(),
            "content_preview": content_preview(&probe.body),
        }),
        Err(err) => json!({ "error": format!("{err:#}"), "success": false }),
    };

    let content = backend.newsletter_content(&newsletter_id).await;
    let proxied = json!({
        "success": content.is_some(),
        "content_length": content.as_ref().map(String::len).unwrap_or(0),
        "content_preview": content.as_deref().map(content_preview).unwrap_or_else(|| "No content".to_string()),
    });

    let file_path = newsletter_path(&state.config().paths.newsletter_dir, &newsletter_id);
    let is_file = tokio::fs::metadata(&file_path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false);
    let local = json!({
        "file_path": file_path.display().to_string(),
        "exists": exists(&file_path).await,
        "is_file": is_file,
    });

    Json(json!({
        "newsletter_id": newsletter_id,
        "railway_url": backend.base_url(),
        "api_url": format!("{}/newsletter/{newsletter_id}", backend.base_url()),
        "tests": {
            "railway_api": raw,
            "get_newsletter_content": proxied,
            "local_file": local,
        },
    }))
}

fn content_preview(body: &str) -> String {
    if body.is_empty() {
        "No content".to_string()
    } else {
        preview(body, CONTENT_PREVIEW_CHARS)
    }
}

async fn exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}
