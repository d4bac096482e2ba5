use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tracing::{error, info};

use crate::web::{
    ApiMessage, ApiResult, AppState, json_error, render_dashboard, render_editor,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(dashboard))
        .route("/editor/:newsletter_id", get(editor_page))
        .route("/api/newsletter/:newsletter_id", post(save_newsletter))
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    #[serde(default)]
    html_content: Option<String>,
    #[serde(default)]
    editor_notes: Option<String>,
}

async fn dashboard(State(state): State<AppState>) -> Html<String> {
    let newsletters = state.backend().list_newsletters().await;
    Html(render_dashboard(&newsletters, state.auth().enforcing()))
}

async fn editor_page(
    State(state): State<AppState>,
    Path(newsletter_id): Path<String>,
) -> Response {
    match state.backend().newsletter_content(&newsletter_id).await {
        Some(content) => Html(render_editor(&newsletter_id, &content)).into_response(),
        None => (StatusCode::NOT_FOUND, "Newsletter not found").into_response(),
    }
}

/// Commit edited HTML to the repository. Every save is a new commit.
async fn save_newsletter(
    State(state): State<AppState>,
    Path(newsletter_id): Path<String>,
    Json(request): Json<SaveRequest>,
) -> ApiResult<ApiMessage> {
    let Some(content) = request.html_content.filter(|content| !content.is_empty()) else {
        return Err(json_error(StatusCode::BAD_REQUEST, "No content"));
    };

    let filename = sanitize_filename::sanitize(&newsletter_id);
    let path = state.config().github.content_path(&filename);
    let message = commit_message(&newsletter_id, request.editor_notes.as_deref());

    match state.store().commit_file(&path, &content, &message).await {
        Ok(receipt) => {
            info!(%newsletter_id, commit = %receipt.commit_sha, "newsletter saved");
            Ok(Json(ApiMessage::success("Saved to GitHub.")))
        }
        Err(err) => {
            error!(?err, %newsletter_id, "failed to save newsletter");
            Err(json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("GitHub Save Failed: {err}"),
            ))
        }
    }
}

fn commit_message(newsletter_id: &str, notes: Option<&str>) -> String {
    format!(
        "docs: update {newsletter_id}\n\nNotes: {}",
        notes.unwrap_or("n/a")
    )
}
